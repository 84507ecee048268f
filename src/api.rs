//! API, которое видят моды.
//!
//! Устанавливается в движок как глобальная таблица (по умолчанию `mod_api`):
//!
//! ```text
//! mod_api.mods.all()        mod_api.hooks.intercept(name, observer)
//! mod_api.mods.enabled()    mod_api.hooks.mock(name, producer)
//! mod_api.mods.loaded()     mod_api.hooks.detour(table, field, wrapper)
//! mod_api.logger.info(...)  mod_api.logger.logs()
//! ```
//!
//! Кроме того, глобальная функция импорта (`require`) заменяется вызовом
//! [`ImportMediator::resolve`].

use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::Level;

use crate::config::LoaderConfig;
use crate::diagnostics::LogBuffer;
use crate::engine::ScriptEngine;
use crate::error::{ScriptError, ScriptResult};
use crate::modules::{ImportMediator, Mod, ModRegistry, Revocation};
use crate::value::{NativeFunction, Table, Value};

static NIL: Value = Value::Nil;

fn arg<'a>(args: &'a [Value], index: usize) -> &'a Value {
    args.get(index).unwrap_or(&NIL)
}

fn bad_argument(function: &str, index: usize, expected: &str, got: &Value) -> ScriptError {
    ScriptError::BadArgument {
        function: function.to_string(),
        index: index + 1,
        message: format!("expected {}, got {}", expected, got.type_name()),
    }
}

fn string_arg(args: &[Value], index: usize, function: &str) -> ScriptResult<String> {
    match arg(args, index) {
        Value::String(s) => Ok(s.clone()),
        other => Err(bad_argument(function, index, "string", other)),
    }
}

fn function_arg(args: &[Value], index: usize, function: &str) -> ScriptResult<NativeFunction> {
    match arg(args, index) {
        Value::Function(f) => Ok(f.clone()),
        other => Err(bad_argument(function, index, "function", other)),
    }
}

fn table_arg(args: &[Value], index: usize, function: &str) -> ScriptResult<Table> {
    match arg(args, index) {
        Value::Table(t) => Ok(t.clone()),
        other => Err(bad_argument(function, index, "table", other)),
    }
}

/// Упаковать дескриптор отмены в функцию скрипта.
///
/// Повторный вызов функции ничего не делает и возвращает `false`.
fn revocation_value(revocation: Revocation) -> Value {
    let name = format!("revoke:{}", revocation.name());
    let slot = Mutex::new(Some(revocation));
    Value::Function(NativeFunction::new(name, move |_| {
        let revocation = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(Value::Bool(revocation.is_some_and(Revocation::revoke)))
    }))
}

/// Представление мода для скрипта.
pub fn mod_value(m: &Mod, registry: &Arc<ModRegistry>) -> Value {
    let table = Table::new();
    table.set("name", m.name());
    table.set("author", m.author());
    table.set("version", m.version());
    table.set("requires_restart", m.requires_restart());
    table.set("description", m.description());
    table.set("detailed_description", m.detailed_description());
    table.set(
        "dependencies",
        m.dependencies()
            .iter()
            .map(|d| Value::from(d.as_str()))
            .collect::<Vec<_>>(),
    );

    // Состояние читается из реестра при каждом вызове
    let name = m.name().to_string();
    let reg = Arc::clone(registry);
    table.set(
        "enabled",
        NativeFunction::new("mod.enabled", move |_| {
            Ok(Value::Bool(reg.get(&name).is_some_and(|m| m.enabled())))
        }),
    );

    for (field, enabled) in [("enable", true), ("disable", false)] {
        let name = m.name().to_string();
        let reg = Arc::clone(registry);
        table.set(
            field,
            NativeFunction::new(format!("mod.{}", field), move |_| {
                reg.set_enabled(&name, enabled)
                    .map_err(|e| ScriptError::Runtime(e.to_string()))?;
                Ok(Value::Nil)
            }),
        );
    }

    Value::Table(table)
}

fn mods_list(mods: Vec<Mod>, registry: &Arc<ModRegistry>) -> Value {
    Value::Array(mods.iter().map(|m| mod_value(m, registry)).collect())
}

fn install_mods(api: &Table, registry: &Arc<ModRegistry>) {
    let mods = api.create_named("mods");

    let reg = Arc::clone(registry);
    mods.set(
        "all",
        NativeFunction::new("mods.all", move |_| Ok(mods_list(reg.all(), &reg))),
    );

    let reg = Arc::clone(registry);
    mods.set(
        "enabled",
        NativeFunction::new("mods.enabled", move |_| Ok(mods_list(reg.enabled(), &reg))),
    );

    let reg = Arc::clone(registry);
    mods.set(
        "loaded",
        NativeFunction::new("mods.loaded", move |_| Ok(mods_list(reg.loaded(), &reg))),
    );
}

fn install_hooks(api: &Table, mediator: &Arc<ImportMediator>) {
    let hooks = api.create_named("hooks");

    let med = Arc::clone(mediator);
    let intercept = NativeFunction::new("hooks.intercept", move |args| {
        let name = string_arg(args, 0, "hooks.intercept")?;
        let callback = function_arg(args, 1, "hooks.intercept")?;
        let revocation = med.intercept(name, move |value| {
            callback.call(std::slice::from_ref(value)).map(|_| ())
        });
        Ok(revocation_value(revocation))
    });

    let med = Arc::clone(mediator);
    let mock = NativeFunction::new("hooks.mock", move |args| {
        let name = string_arg(args, 0, "hooks.mock")?;
        let callback = function_arg(args, 1, "hooks.mock")?;
        let revocation = med.mock(name, move || callback.call(&[]));
        Ok(revocation_value(revocation))
    });

    let med = Arc::clone(mediator);
    let detour = NativeFunction::new("hooks.detour", move |args| {
        let table = table_arg(args, 0, "hooks.detour")?;
        let field = string_arg(args, 1, "hooks.detour")?;
        let wrapper = function_arg(args, 2, "hooks.detour")?;
        Ok(revocation_value(med.detour(&table, &field, wrapper)?))
    });

    hooks.set("intercept", intercept.clone());
    hooks.set("intercept_require", intercept);
    hooks.set("mock", mock.clone());
    hooks.set("mock_require", mock);
    hooks.set("detour", detour);
}

/// Строковое представление аргумента через `tostring` движка.
fn to_display(engine: &Weak<dyn ScriptEngine>, value: &Value) -> String {
    engine
        .upgrade()
        .and_then(|engine| engine.call_global("tostring", std::slice::from_ref(value)).ok())
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| value.format_display())
}

fn install_logger(api: &Table, engine: &Arc<dyn ScriptEngine>, logs: &LogBuffer) {
    let logger = api.create_named("logger");

    for (field, level) in [
        ("debug", Level::Debug),
        ("info", Level::Info),
        ("warn", Level::Warn),
        ("error", Level::Error),
    ] {
        let engine = Arc::downgrade(engine);
        logger.set(
            field,
            NativeFunction::new(format!("logger.{}", field), move |args| {
                let parts: Vec<String> = args.iter().map(|v| to_display(&engine, v)).collect();
                log::log!(level, "[script] {}", parts.join(" "));
                Ok(Value::Nil)
            }),
        );
    }

    let logs = logs.clone();
    logger.set(
        "logs",
        NativeFunction::new("logger.logs", move |_| {
            let entries = logs
                .entries()
                .into_iter()
                .map(|entry| {
                    let table = Table::new();
                    table.set("level", entry.level.as_str().to_lowercase());
                    table.set("message", entry.message);
                    Value::Table(table)
                })
                .collect();
            Ok(Value::Array(entries))
        }),
    );
}

/// Установить API модов и перехват импорта в движок.
pub fn install(
    engine: &Arc<dyn ScriptEngine>,
    config: &LoaderConfig,
    registry: &Arc<ModRegistry>,
    mediator: &Arc<ImportMediator>,
    logs: &LogBuffer,
) -> ScriptResult<Table> {
    let api = Table::new();
    install_mods(&api, registry);
    install_hooks(&api, mediator);
    install_logger(&api, engine, logs);
    engine.set_global(&config.api_global, Value::Table(api.clone()))?;

    let med = Arc::clone(mediator);
    let require = NativeFunction::new(config.resolver_global.clone(), move |args| {
        let name = string_arg(args, 0, "require")?;
        med.resolve(&name)
    });
    engine.register_native(&config.resolver_global, require)?;

    Ok(api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::TestEngine;

    struct Fixture {
        engine: Arc<TestEngine>,
        registry: Arc<ModRegistry>,
        mediator: Arc<ImportMediator>,
        logs: LogBuffer,
        api: Table,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(
            TestEngine::new()
                .with_module("game.ui", 1i64)
                .with_module("game.net", 2i64),
        );
        let registry = Arc::new(ModRegistry::new());
        registry.ingest(vec![
            Some(Mod::new("core").with_author("alice").with_version("1.0")),
            Some(
                Mod::new("extras")
                    .with_dependencies(["core"])
                    .with_enabled(false),
            ),
        ]);

        let base_engine = Arc::clone(&engine);
        let mediator = Arc::new(ImportMediator::new(move |name| base_engine.base_resolve(name)));
        let logs = LogBuffer::new(16);

        let dyn_engine: Arc<dyn ScriptEngine> = engine.clone();
        let api = install(
            &dyn_engine,
            &LoaderConfig::default(),
            &registry,
            &mediator,
            &logs,
        )
        .unwrap();

        Fixture {
            engine,
            registry,
            mediator,
            logs,
            api,
        }
    }

    fn call(table: &Table, path: &str, args: &[Value]) -> ScriptResult<Value> {
        let (head, field) = path.split_once('.').unwrap();
        let sub = table.get(head);
        let function = sub.as_table().unwrap().get(field);
        function.as_function().unwrap().call(args)
    }

    #[test]
    fn test_api_installed_as_global() {
        let fx = fixture();
        let global = fx.engine.global("mod_api");
        assert!(global.as_table().unwrap().ptr_eq(&fx.api));
        assert!(fx.engine.global("require").as_function().is_some());
    }

    #[test]
    fn test_mods_all_and_enabled() {
        let fx = fixture();

        let all = call(&fx.api, "mods.all", &[]).unwrap();
        let Value::Array(all) = all else { panic!("expected array") };
        assert_eq!(all.len(), 2);

        let enabled = call(&fx.api, "mods.enabled", &[]).unwrap();
        let Value::Array(enabled) = enabled else { panic!("expected array") };
        assert_eq!(enabled.len(), 1);

        let core = enabled[0].as_table().unwrap();
        assert_eq!(core.get("name"), Value::from("core"));
        assert_eq!(core.get("author"), Value::from("alice"));
        assert_eq!(core.get("requires_restart"), Value::Bool(false));
    }

    #[test]
    fn test_mod_enable_toggle() {
        let fx = fixture();
        let Value::Array(all) = call(&fx.api, "mods.all", &[]).unwrap() else {
            panic!("expected array")
        };
        let extras = all[1].as_table().unwrap().clone();
        assert_eq!(
            extras.get("dependencies"),
            Value::Array(vec![Value::from("core")])
        );

        let enabled = extras.get("enabled");
        let enabled = enabled.as_function().unwrap();
        assert_eq!(enabled.call(&[]), Ok(Value::Bool(false)));

        extras.get("enable").as_function().unwrap().call(&[]).unwrap();
        assert_eq!(enabled.call(&[]), Ok(Value::Bool(true)));
        assert!(fx.registry.get("extras").unwrap().enabled());
    }

    #[test]
    fn test_require_goes_through_mediator() {
        let fx = fixture();
        let _mock = fx.mediator.mock("game.net", || Ok(Value::from("offline")));

        assert_eq!(
            fx.engine.evaluate("require game.net", "t").unwrap(),
            Value::from("offline")
        );
        assert_eq!(fx.engine.evaluate("require game.ui", "t").unwrap(), Value::Int(1));
        assert_eq!(fx.engine.resolved(), vec!["game.ui"]);
    }

    #[test]
    fn test_script_hooks_and_revoke() {
        let fx = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let observer = NativeFunction::new("observer", move |args| {
            log.lock().unwrap().push(args[0].clone());
            Ok(Value::Nil)
        });

        let revoke = call(
            &fx.api,
            "hooks.intercept",
            &[Value::from("game.ui"), Value::Function(observer)],
        )
        .unwrap();
        fx.engine.evaluate("require game.ui", "t").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Value::Int(1)]);

        let revoke = revoke.as_function().unwrap();
        assert_eq!(revoke.call(&[]), Ok(Value::Bool(true)));
        assert_eq!(revoke.call(&[]), Ok(Value::Bool(false)));

        fx.engine.evaluate("require game.ui", "t").unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_script_mock_alias() {
        let fx = fixture();
        let producer = NativeFunction::new("producer", |_| Ok(Value::Int(99)));
        let _revoke = call(
            &fx.api,
            "hooks.mock_require",
            &[Value::from("game.ui"), Value::Function(producer)],
        )
        .unwrap();

        assert!(fx.mediator.is_mocked("game.ui"));
        assert_eq!(fx.engine.evaluate("require game.ui", "t").unwrap(), Value::Int(99));
    }

    #[test]
    fn test_script_detour() {
        let fx = fixture();
        let target = Table::new();
        target.set("greet", NativeFunction::new("greet", |_| Ok(Value::from("hi"))));
        let wrapper = NativeFunction::new("loud", |args| {
            let original = args[0].as_function().unwrap().call(&args[1..])?;
            Ok(Value::from(format!("{}!", original)))
        });

        let revoke = call(
            &fx.api,
            "hooks.detour",
            &[
                Value::Table(target.clone()),
                Value::from("greet"),
                Value::Function(wrapper),
            ],
        )
        .unwrap();
        let greet = target.get("greet");
        assert_eq!(greet.as_function().unwrap().call(&[]), Ok(Value::from("hi!")));

        revoke.as_function().unwrap().call(&[]).unwrap();
        let greet = target.get("greet");
        assert_eq!(greet.as_function().unwrap().call(&[]), Ok(Value::from("hi")));
    }

    #[test]
    fn test_bad_arguments() {
        let fx = fixture();
        let err = call(&fx.api, "hooks.intercept", &[Value::from("x")]).unwrap_err();
        assert_eq!(
            err,
            ScriptError::BadArgument {
                function: "hooks.intercept".to_string(),
                index: 2,
                message: "expected function, got nil".to_string(),
            }
        );
        assert!(call(&fx.api, "hooks.detour", &[Value::Int(1)]).is_err());
    }

    #[test]
    fn test_logger_logs() {
        let fx = fixture();
        fx.logs.push(Level::Warn, "careful");

        let Value::Array(entries) = call(&fx.api, "logger.logs", &[]).unwrap() else {
            panic!("expected array")
        };
        let entry = entries[0].as_table().unwrap();
        assert_eq!(entry.get("level"), Value::from("warn"));
        assert_eq!(entry.get("message"), Value::from("careful"));

        assert_eq!(
            call(&fx.api, "logger.info", &[Value::from("a"), Value::Int(1)]),
            Ok(Value::Nil)
        );
    }
}
