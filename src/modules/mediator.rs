//! Перехват импорта модулей.
//!
//! Каждый вызов «загрузить модуль по имени» из движка проходит через
//! [`ImportMediator::resolve`]:
//!
//! 1. Имя с префиксом обхода (`!name`) сразу уходит в исходный механизм.
//! 2. Если для имени есть мок, возвращается его результат.
//! 3. Иначе модуль загружается обычным образом, после чего по порядку
//!    вызываются все хуки для этого имени.
//!
//! Каждая регистрация возвращает [`Revocation`], который отменяет ровно её.
//!
//! Колбэки вызываются без удержания блокировки, но перед каждым вызовом
//! регистрация проверяется под блокировкой: отменённый мок или хук больше
//! не вызывается, даже если `resolve` нашёл его до отмены.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, warn};

use crate::config::LoaderConfig;
use crate::error::{ScriptError, ScriptResult};
use crate::value::{NativeFunction, Table, Value};

/// Исходный механизм импорта, который оборачивает посредник.
pub type BaseResolve = Arc<dyn Fn(&str) -> ScriptResult<Value> + Send + Sync>;

/// Мок: производит модуль вместо настоящего.
pub type Producer = Arc<dyn Fn() -> ScriptResult<Value> + Send + Sync>;

/// Хук: наблюдает за уже загруженным модулем.
pub type Observer = Arc<dyn Fn(&Value) -> ScriptResult<()> + Send + Sync>;

/// Сигнал готовности. `true`, если сигнал принят.
type ReadySignal = Arc<dyn Fn() -> bool + Send + Sync>;

/// Уникальный номер регистрации внутри посредника.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

struct MockEntry {
    id: RegistrationId,
    producer: Producer,
}

struct HookEntry {
    id: RegistrationId,
    observer: Observer,
}

#[derive(Default)]
struct Registrations {
    mocks: HashMap<String, MockEntry>,
    hooks: HashMap<String, Vec<HookEntry>>,
    next_id: u64,
}

impl Registrations {
    fn next_id(&mut self) -> RegistrationId {
        self.next_id += 1;
        RegistrationId(self.next_id)
    }

    fn mock_is_live(&self, name: &str, id: RegistrationId) -> bool {
        self.mocks.get(name).is_some_and(|entry| entry.id == id)
    }

    fn hook_is_live(&self, name: &str, id: RegistrationId) -> bool {
        self.hooks
            .get(name)
            .is_some_and(|entries| entries.iter().any(|e| e.id == id))
    }

    fn remove_mock(&mut self, name: &str, id: RegistrationId) -> bool {
        match self.mocks.get(name) {
            Some(entry) if entry.id == id => {
                self.mocks.remove(name);
                true
            }
            _ => false,
        }
    }

    fn remove_hook(&mut self, name: &str, id: RegistrationId) -> bool {
        let Some(entries) = self.hooks.get_mut(name) else {
            return false;
        };
        let Some(position) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        entries.remove(position);
        if entries.is_empty() {
            self.hooks.remove(name);
        }
        true
    }
}

type SharedRegistrations = Arc<Mutex<Registrations>>;

fn lock(registrations: &Mutex<Registrations>) -> MutexGuard<'_, Registrations> {
    registrations.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Target {
    Mock {
        registrations: Weak<Mutex<Registrations>>,
        name: String,
        id: RegistrationId,
    },
    Hook {
        registrations: Weak<Mutex<Registrations>>,
        name: String,
        id: RegistrationId,
    },
    Detour {
        table: Table,
        field: String,
        original: Value,
        wrapper: NativeFunction,
    },
}

/// Дескриптор отмены регистрации.
///
/// Не клонируется; [`Revocation::revoke`] поглощает дескриптор, поэтому
/// отмена выполняется не более одного раза. Сброс без вызова `revoke`
/// оставляет регистрацию активной.
#[must_use = "dropping a Revocation keeps the registration alive forever"]
pub struct Revocation {
    target: Target,
}

impl Revocation {
    /// Имя модуля (или поля для detour), к которому относится регистрация.
    pub fn name(&self) -> &str {
        match &self.target {
            Target::Mock { name, .. } | Target::Hook { name, .. } => name,
            Target::Detour { field, .. } => field,
        }
    }

    /// Отменить регистрацию.
    ///
    /// Возвращает `false`, если отменять уже нечего: посредник уничтожен,
    /// мок заменён более новым или поле переписано.
    pub fn revoke(self) -> bool {
        match self.target {
            Target::Mock {
                registrations,
                name,
                id,
            } => {
                let Some(registrations) = registrations.upgrade() else {
                    return false;
                };
                let removed = lock(&registrations).remove_mock(&name, id);
                if removed {
                    debug!("removed mock for \"{}\"", name);
                } else {
                    debug!("mock for \"{}\" was already replaced", name);
                }
                removed
            }
            Target::Hook {
                registrations,
                name,
                id,
            } => {
                let Some(registrations) = registrations.upgrade() else {
                    return false;
                };
                let removed = lock(&registrations).remove_hook(&name, id);
                if removed {
                    debug!("removed hook for \"{}\"", name);
                }
                removed
            }
            Target::Detour {
                table,
                field,
                original,
                wrapper,
            } => {
                let current = table.get(&field);
                let intact = current.as_function().is_some_and(|f| f.ptr_eq(&wrapper));
                if !intact {
                    warn!(
                        "detour of \"{}\" was overwritten since it was installed, restoring anyway",
                        field
                    );
                }
                table.set(field, original);
                intact
            }
        }
    }

    fn registrations(&self) -> Option<&Weak<Mutex<Registrations>>> {
        match &self.target {
            Target::Mock { registrations, .. } | Target::Hook { registrations, .. } => {
                Some(registrations)
            }
            Target::Detour { .. } => None,
        }
    }
}

impl fmt::Debug for Revocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.target {
            Target::Mock { .. } => "mock",
            Target::Hook { .. } => "hook",
            Target::Detour { .. } => "detour",
        };
        f.debug_struct("Revocation")
            .field("kind", &kind)
            .field("name", &self.name())
            .finish()
    }
}

/// Посредник импорта.
pub struct ImportMediator {
    base: BaseResolve,
    registrations: SharedRegistrations,
    escape_prefix: String,
    ready_sentinel: Option<String>,
    ready_signal: Option<ReadySignal>,
    sentinel_seen: AtomicBool,
}

impl ImportMediator {
    /// Создать посредник поверх исходного механизма импорта.
    pub fn new<F>(base: F) -> Self
    where
        F: Fn(&str) -> ScriptResult<Value> + Send + Sync + 'static,
    {
        Self {
            base: Arc::new(base),
            registrations: Arc::default(),
            escape_prefix: crate::config::DEFAULT_ESCAPE_PREFIX.to_string(),
            ready_sentinel: None,
            ready_signal: None,
            sentinel_seen: AtomicBool::new(false),
        }
    }

    /// Префикс обхода перехвата. Пустая строка отключает обход.
    pub fn with_escape_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.escape_prefix = prefix.into();
        self
    }

    /// Модуль-маркер готовности и действие при его импорте.
    ///
    /// Сигнал повторяется при каждом импорте маркера, пока не вернёт `true`.
    pub fn with_ready_sentinel<F>(mut self, sentinel: impl Into<String>, signal: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let sentinel = sentinel.into();
        self.ready_sentinel = (!sentinel.is_empty()).then_some(sentinel);
        self.ready_signal = Some(Arc::new(signal));
        self
    }

    /// Применить префикс и маркер из конфигурации.
    pub fn configured<F>(self, config: &LoaderConfig, signal: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let mediator = self.with_escape_prefix(config.escape_prefix.clone());
        match &config.ready_sentinel {
            Some(sentinel) => mediator.with_ready_sentinel(sentinel.clone(), signal),
            None => mediator,
        }
    }

    /// Загрузить модуль с учётом моков и хуков.
    pub fn resolve(&self, name: &str) -> ScriptResult<Value> {
        self.check_sentinel(name);

        if !self.escape_prefix.is_empty() {
            if let Some(unescaped) = name.strip_prefix(self.escape_prefix.as_str()) {
                return (self.base)(unescaped);
            }
        }

        self.resolve_intercepted(name)
    }

    fn resolve_intercepted(&self, name: &str) -> ScriptResult<Value> {
        // Колбэки копируются под блокировкой и вызываются после неё:
        // мок или хук может сам импортировать модули и регистрировать новые хуки.
        let (mock, observers) = {
            let registrations = lock(&self.registrations);
            let mock = registrations
                .mocks
                .get(name)
                .map(|m| (m.id, Arc::clone(&m.producer)));
            let observers: Vec<(RegistrationId, Observer)> =
                match (&mock, registrations.hooks.get(name)) {
                    (None, Some(entries)) => entries
                        .iter()
                        .map(|e| (e.id, Arc::clone(&e.observer)))
                        .collect(),
                    _ => Vec::new(),
                };
            (mock, observers)
        };

        if let Some((id, producer)) = mock {
            if !lock(&self.registrations).mock_is_live(name, id) {
                debug!("mock for \"{}\" was revoked before use", name);
                return self.resolve_intercepted(name);
            }
            return producer();
        }

        if observers.is_empty() {
            return (self.base)(name);
        }

        debug!("intercepting \"{}\"", name);
        let value = (self.base)(name)?;
        for (id, observer) in &observers {
            // Хук мог быть отменён после поиска: другим потоком или предыдущим хуком
            if !lock(&self.registrations).hook_is_live(name, *id) {
                continue;
            }
            observer(&value)?;
        }
        Ok(value)
    }

    fn check_sentinel(&self, name: &str) {
        if self.ready_sentinel.as_deref() != Some(name) {
            return;
        }
        if self.sentinel_seen.load(Ordering::SeqCst) {
            return;
        }
        debug!("readiness sentinel \"{}\" requested", name);
        let accepted = self.ready_signal.as_ref().map_or(true, |signal| signal());
        if accepted {
            self.sentinel_seen.store(true, Ordering::SeqCst);
        }
    }

    /// Был ли принят сигнал готовности от маркера.
    pub fn sentinel_seen(&self) -> bool {
        self.sentinel_seen.load(Ordering::SeqCst)
    }

    /// Зарегистрировать хук на модуль.
    pub fn intercept<F>(&self, name: impl Into<String>, observer: F) -> Revocation
    where
        F: Fn(&Value) -> ScriptResult<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut registrations = lock(&self.registrations);
        let id = registrations.next_id();

        let entries = registrations.hooks.entry(name.clone()).or_default();
        if entries.is_empty() {
            debug!("registering hook for \"{}\"", name);
        }
        entries.push(HookEntry {
            id,
            observer: Arc::new(observer),
        });

        Revocation {
            target: Target::Hook {
                registrations: Arc::downgrade(&self.registrations),
                name,
                id,
            },
        }
    }

    /// Зарегистрировать мок на модуль, заменив предыдущий.
    pub fn mock<F>(&self, name: impl Into<String>, producer: F) -> Revocation
    where
        F: Fn() -> ScriptResult<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut registrations = lock(&self.registrations);
        let id = registrations.next_id();

        debug!("registering mock for \"{}\"", name);
        let previous = registrations.mocks.insert(
            name.clone(),
            MockEntry {
                id,
                producer: Arc::new(producer),
            },
        );
        if previous.is_some() {
            warn!("mock for \"{}\" already registered, overwriting", name);
        }

        Revocation {
            target: Target::Mock {
                registrations: Arc::downgrade(&self.registrations),
                name,
                id,
            },
        }
    }

    /// Подменить функцию `field` в таблице обёрткой.
    ///
    /// Обёртка вызывается как `wrapper(original, ...args)` и сама решает,
    /// вызывать ли оригинал. Отмена возвращает исходную функцию.
    pub fn detour(
        &self,
        table: &Table,
        field: &str,
        wrapper: NativeFunction,
    ) -> ScriptResult<Revocation> {
        let original = table.get(field);
        if original.as_function().is_none() {
            return Err(ScriptError::TypeError(
                "function",
                format!("{} (field '{}')", original.type_name(), field),
            ));
        }

        let passed = original.clone();
        let installed = NativeFunction::new(format!("detour:{}", field), move |args| {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(passed.clone());
            full.extend_from_slice(args);
            wrapper.call(&full)
        });
        table.set(field, installed.clone());
        debug!("detoured \"{}\"", field);

        Ok(Revocation {
            target: Target::Detour {
                table: table.clone(),
                field: field.to_string(),
                original,
                wrapper: installed,
            },
        })
    }

    /// Отменить регистрацию, выданную этим посредником.
    ///
    /// Дескриптор чужого посредника не трогается, возвращается `false`.
    pub fn revoke(&self, revocation: Revocation) -> bool {
        let foreign = revocation
            .registrations()
            .is_some_and(|weak| !std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&self.registrations)));
        if foreign {
            warn!(
                "refusing to revoke \"{}\": handle belongs to another mediator",
                revocation.name()
            );
            return false;
        }
        revocation.revoke()
    }

    /// Есть ли активный мок для имени.
    pub fn is_mocked(&self, name: &str) -> bool {
        lock(&self.registrations).mocks.contains_key(name)
    }

    /// Число активных хуков для имени.
    pub fn hook_count(&self, name: &str) -> usize {
        lock(&self.registrations)
            .hooks
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Имена с активными моками или хуками, отсортированные.
    pub fn intercepted_names(&self) -> Vec<String> {
        let registrations = lock(&self.registrations);
        let mut names: Vec<String> = registrations
            .mocks
            .keys()
            .chain(registrations.hooks.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl fmt::Debug for ImportMediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportMediator")
            .field("escape_prefix", &self.escape_prefix)
            .field("ready_sentinel", &self.ready_sentinel)
            .field("intercepted", &self.intercepted_names())
            .finish()
    }
}
