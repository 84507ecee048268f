//! Загрузчик модов.
//!
//! Последовательность: обнаружение → дедупликация → граф зависимостей из
//! включённых модов → порядок загрузки → выполнение точек входа по порядку.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info};

use super::discovery;
use super::graph::{DependencyGraph, MissingDependency, Resolution};
use super::mediator::ImportMediator;
use super::registry::{DuplicateMod, Mod, ModRegistry};
use crate::api;
use crate::config::LoaderConfig;
use crate::diagnostics::LogBuffer;
use crate::engine::ScriptEngine;
use crate::error::{panic_message, LoaderError, LoaderResult, ScriptError};

/// Состояние жизненного цикла загрузчика.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Инициализация ещё не начиналась
    Uninitialized,
    /// Идёт загрузка модов
    Initializing,
    /// Основные сервисы готовы (моды могут ещё догружаться)
    Ready,
}

/// Жизненный цикл: `Uninitialized -> Initializing -> Ready`.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LoadState>,
    changed: Condvar,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Mutex::new(LoadState::Uninitialized),
            changed: Condvar::new(),
        }
    }
}

impl Lifecycle {
    /// Создать жизненный цикл в состоянии `Uninitialized`.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Текущее состояние.
    pub fn state(&self) -> LoadState {
        *self.lock()
    }

    /// Достигнуто ли состояние `Ready`.
    pub fn is_ready(&self) -> bool {
        self.state() == LoadState::Ready
    }

    /// Занять инициализацию. `false`, если она уже началась.
    fn begin(&self) -> bool {
        let mut state = self.lock();
        if *state != LoadState::Uninitialized {
            return false;
        }
        *state = LoadState::Initializing;
        true
    }

    /// Досрочный переход в `Ready` во время инициализации.
    ///
    /// Вне `Initializing` ничего не делает и возвращает `false`.
    pub fn mark_ready(&self) -> bool {
        let mut state = self.lock();
        match *state {
            LoadState::Initializing => {
                *state = LoadState::Ready;
                self.changed.notify_all();
                info!("core services are ready");
                true
            }
            LoadState::Uninitialized => {
                debug!("readiness signalled before initialization, ignoring");
                false
            }
            LoadState::Ready => false,
        }
    }

    fn finish(&self) {
        let mut state = self.lock();
        *state = LoadState::Ready;
        self.changed.notify_all();
    }

    /// Дождаться `Ready`.
    pub fn wait_ready(&self) {
        let guard = self.lock();
        let _guard = self
            .changed
            .wait_while(guard, |state| *state != LoadState::Ready)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Дождаться `Ready` не дольше `timeout`. `true`, если дождались.
    pub fn wait_ready_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| *state != LoadState::Ready)
            .unwrap_or_else(PoisonError::into_inner);
        *guard == LoadState::Ready
    }
}

/// Мод, который не удалось загрузить.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedMod {
    pub name: String,
    pub error: String,
}

/// Итог инициализации.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Вычисленный порядок загрузки
    pub order: Vec<String>,
    /// Успешно загруженные моды, по порядку
    pub loaded: Vec<String>,
    /// Моды с ошибкой загрузки
    pub failed: Vec<FailedMod>,
    /// Отклонённые дубликаты
    pub duplicates: Vec<DuplicateMod>,
    /// Циклы зависимостей
    pub cycles: Vec<Vec<String>>,
    /// Зависимости на отсутствующие или выключенные моды
    pub missing: Vec<MissingDependency>,
}

/// План загрузки без выполнения скриптов.
#[derive(Debug)]
pub struct LoadPlan {
    pub registry: ModRegistry,
    pub duplicates: Vec<DuplicateMod>,
    pub resolution: Resolution,
}

/// Построить граф зависимостей по списку модов.
pub fn build_graph(mods: &[Mod]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for m in mods {
        graph.add_node(m.name());
    }
    for m in mods {
        for dependency in m.dependencies() {
            graph.add_edge(m.name(), dependency);
        }
    }
    graph
}

/// Обнаружить моды и вычислить порядок загрузки, ничего не выполняя.
pub fn plan(config: &LoaderConfig) -> LoaderResult<LoadPlan> {
    let candidates = discovery::discover(config)?;
    let registry = ModRegistry::new();
    let duplicates = registry.ingest(candidates);
    let resolution = build_graph(&registry.enabled()).resolve();

    Ok(LoadPlan {
        registry,
        duplicates,
        resolution,
    })
}

/// Оркестратор загрузки модов.
///
/// Создаётся явно и передаётся туда, где нужен; глобального экземпляра нет.
pub struct LoadOrchestrator {
    config: LoaderConfig,
    engine: Arc<dyn ScriptEngine>,
    registry: Arc<ModRegistry>,
    mediator: Arc<ImportMediator>,
    lifecycle: Arc<Lifecycle>,
    logs: LogBuffer,
    report: Mutex<Option<LoadReport>>,
}

impl LoadOrchestrator {
    /// Создать оркестратор поверх движка хоста. Скрипты не выполняются до `initialize`.
    pub fn new(config: LoaderConfig, engine: Arc<dyn ScriptEngine>) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());

        // Движок хранит require, который ссылается на посредника: слабая
        // ссылка на движок не даёт образоваться циклу.
        let weak_engine = Arc::downgrade(&engine);
        let signal = Arc::clone(&lifecycle);
        let mediator = ImportMediator::new(move |name: &str| match weak_engine.upgrade() {
            Some(engine) => engine.base_resolve(name),
            None => Err(ScriptError::Runtime("script engine is gone".to_string())),
        })
        .configured(&config, move || signal.mark_ready());

        Self {
            logs: LogBuffer::new(config.log_buffer_capacity),
            config,
            engine,
            registry: Arc::new(ModRegistry::new()),
            mediator: Arc::new(mediator),
            lifecycle,
            report: Mutex::new(None),
        }
    }

    /// Использовать буфер, который заполняет глобальный логгер.
    pub fn with_log_buffer(mut self, logs: LogBuffer) -> Self {
        self.logs = logs;
        self
    }

    /// Конфигурация загрузчика.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Реестр модов.
    pub fn registry(&self) -> &Arc<ModRegistry> {
        &self.registry
    }

    /// Посредник импорта.
    pub fn mediator(&self) -> &Arc<ImportMediator> {
        &self.mediator
    }

    /// Жизненный цикл загрузки.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Текущее состояние загрузки.
    pub fn state(&self) -> LoadState {
        self.lifecycle.state()
    }

    /// Дождаться `Ready`.
    pub fn wait_ready(&self) {
        self.lifecycle.wait_ready();
    }

    /// Дождаться `Ready` не дольше `timeout`.
    pub fn wait_ready_timeout(&self, timeout: Duration) -> bool {
        self.lifecycle.wait_ready_timeout(timeout)
    }

    /// Итог последней инициализации.
    pub fn report(&self) -> Option<LoadReport> {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Найти моды в `mods_dir` и загрузить их.
    ///
    /// Выполняется не более одного раза: повторные и параллельные вызовы
    /// возвращают `Ok(false)` сразу. Ошибка только если директория модов
    /// недоступна или инициализация запаниковала.
    pub fn initialize(&self) -> LoaderResult<bool> {
        self.guarded(|| discovery::discover(&self.config))
    }

    /// То же, что [`initialize`](Self::initialize), но с готовым списком кандидатов.
    pub fn initialize_from(&self, candidates: Vec<Option<Mod>>) -> LoaderResult<bool> {
        self.guarded(move || Ok(candidates))
    }

    fn guarded<F>(&self, discover: F) -> LoaderResult<bool>
    where
        F: FnOnce() -> LoaderResult<Vec<Option<Mod>>>,
    {
        if !self.lifecycle.begin() {
            debug!("mod loader already initialized");
            return Ok(false);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> LoaderResult<LoadReport> {
            api::install(
                &self.engine,
                &self.config,
                &self.registry,
                &self.mediator,
                &self.logs,
            )?;
            let candidates = discover()?;
            Ok(self.load(candidates))
        }));

        // Отчёт сохраняется до пробуждения ожидающих в wait_ready
        let outcome = match outcome {
            Ok(Ok(report)) => {
                *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
                Ok(Ok(()))
            }
            other => other.map(|result| result.map(|_| ())),
        };
        self.lifecycle.finish();

        match outcome {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => {
                error!("mod loader initialization failed: {}", e);
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("critical: panic during mod loader initialization: {}", message);
                Err(LoaderError::Panic(message))
            }
        }
    }

    fn load(&self, candidates: Vec<Option<Mod>>) -> LoadReport {
        let duplicates = self.registry.ingest(candidates);
        let resolution = build_graph(&self.registry.enabled()).resolve();
        info!("load order: {}", resolution.order.join(", "));

        let mut failed = Vec::new();
        for name in &resolution.order {
            let Some(m) = self.registry.get(name) else {
                continue;
            };

            match self.load_mod(&m) {
                Ok(()) => {
                    self.registry.mark_loaded(name);
                    debug!("loaded {}", m.label());
                }
                Err(e) => {
                    error!("{}", e);
                    failed.push(FailedMod {
                        name: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let loaded = self.registry.loaded_names();
        info!(
            "loaded {} of {} mods ({} failed)",
            loaded.len(),
            resolution.order.len(),
            failed.len()
        );

        LoadReport {
            order: resolution.order,
            loaded,
            failed,
            duplicates,
            cycles: resolution.cycles,
            missing: resolution.missing,
        }
    }

    /// Выполнить точку входа мода.
    fn load_mod(&self, m: &Mod) -> LoaderResult<()> {
        let fail = |message: String| LoaderError::EntryPoint(m.name().to_string(), message);

        let path = m
            .entry_path()
            .ok_or_else(|| fail("mod has no entry point".to_string()))?;
        let source = fs::read_to_string(&path)
            .map_err(|e| fail(format!("failed to read {}: {}", path.display(), e)))?;
        let chunk = format!("@{}", path.display());

        debug!("evaluating {}", chunk);
        match panic::catch_unwind(AssertUnwindSafe(|| self.engine.evaluate(&source, &chunk))) {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(fail(e.to_string())),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("critical: panic while loading \"{}\": {}", m.name(), message);
                Err(fail(ScriptError::Panic(message).to_string()))
            }
        }
    }
}

impl std::fmt::Debug for LoadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOrchestrator")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("mediator", &self.mediator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_READY_SENTINEL;
    use crate::engine::testing::TestEngine;
    use crate::modules::discovery::MANIFEST_FILE;
    use crate::value::{NativeFunction, Value};
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    fn write_mod(root: &Path, name: &str, deps: &[&str], script: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let deps: Vec<String> = deps.iter().map(|d| format!("\"{}\"", d)).collect();
        fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                "name = \"{}\"\nauthor = \"tester\"\nversion = \"1.0\"\ndependencies = [{}]\n",
                name,
                deps.join(", ")
            ),
        )
        .unwrap();
        fs::write(dir.join("init.lua"), script).unwrap();
    }

    fn setup(engine: TestEngine) -> (TempDir, Arc<TestEngine>, LoadOrchestrator) {
        let root = tempdir().unwrap();
        let engine = Arc::new(engine);
        let config = LoaderConfig::default().with_mods_dir(root.path().join("mods"));
        let orchestrator = LoadOrchestrator::new(config, engine.clone());
        (root, engine, orchestrator)
    }

    fn evaluated_mods(engine: &TestEngine) -> Vec<String> {
        engine
            .evaluated()
            .iter()
            .map(|chunk| {
                Path::new(chunk)
                    .parent()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.mark_ready());
        assert_eq!(lifecycle.state(), LoadState::Uninitialized);

        assert!(lifecycle.begin());
        assert!(!lifecycle.begin());
        assert_eq!(lifecycle.state(), LoadState::Initializing);
        assert!(!lifecycle.wait_ready_timeout(Duration::from_millis(10)));

        assert!(lifecycle.mark_ready());
        assert!(!lifecycle.mark_ready());
        assert!(lifecycle.is_ready());
        lifecycle.wait_ready();
    }

    #[test]
    fn test_build_graph_from_mods() {
        let mods = vec![
            Mod::new("ui").with_dependencies(["core"]),
            Mod::new("core"),
            Mod::new("net").with_dependencies(["core", "ghost"]),
        ];
        let resolution = build_graph(&mods).resolve();

        assert_eq!(resolution.order, vec!["core", "ui", "net"]);
        assert_eq!(resolution.missing.len(), 1);
    }

    #[test]
    fn test_loads_in_dependency_order() {
        let (root, engine, orchestrator) = setup(TestEngine::new());
        let mods = root.path().join("mods");
        write_mod(&mods, "a_ui", &["c_core"], "");
        write_mod(&mods, "b_net", &["c_core", "a_ui"], "");
        write_mod(&mods, "c_core", &[], "");

        assert_eq!(orchestrator.initialize().unwrap(), true);
        assert_eq!(orchestrator.state(), LoadState::Ready);
        assert_eq!(evaluated_mods(&engine), vec!["c_core", "a_ui", "b_net"]);

        let report = orchestrator.report().unwrap();
        assert_eq!(report.loaded, vec!["c_core", "a_ui", "b_net"]);
        assert!(report.failed.is_empty());
        assert_eq!(orchestrator.registry().loaded_names(), report.loaded);
    }

    #[test]
    fn test_failed_mod_does_not_abort_batch() {
        let (root, engine, orchestrator) = setup(TestEngine::new());
        let mods = root.path().join("mods");
        write_mod(&mods, "a", &[], "fail syntax error near 'end'");
        write_mod(&mods, "b", &[], "panic exploded");
        write_mod(&mods, "c", &["a"], "");

        assert!(orchestrator.initialize().unwrap());

        let report = orchestrator.report().unwrap();
        assert_eq!(report.loaded, vec!["c"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].name, "a");
        assert!(report.failed[0].error.contains("syntax error"));
        assert!(report.failed[1].error.contains("exploded"));
        assert_eq!(evaluated_mods(&engine), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicates_and_disabled_mods() {
        let (root, engine, orchestrator) = setup(TestEngine::new());
        let mods = root.path().join("mods");
        write_mod(&mods, "x1", &[], "");
        write_mod(&mods, "x2", &[], "");
        write_mod(&mods, "off", &[], "");
        // Оба каталога объявляют одно имя
        fs::write(mods.join("x2").join(MANIFEST_FILE), "name = \"x1\"\nversion = \"2\"").unwrap();
        fs::write(mods.join("off").join(crate::modules::DISABLED_MARKER), "").unwrap();

        orchestrator.initialize().unwrap();
        let report = orchestrator.report().unwrap();

        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].rejected.version(), "2");
        assert_eq!(report.loaded, vec!["x1"]);
        assert_eq!(evaluated_mods(&engine), vec!["x1"]);
        assert_eq!(orchestrator.registry().len(), 2);
    }

    #[test]
    fn test_cycle_still_loads_everything() {
        let (root, _engine, orchestrator) = setup(TestEngine::new());
        let mods = root.path().join("mods");
        write_mod(&mods, "a", &["b"], "");
        write_mod(&mods, "b", &["a"], "");

        orchestrator.initialize().unwrap();
        let report = orchestrator.report().unwrap();

        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.cycles, vec![vec!["a", "b", "a"]]);
    }

    #[test]
    fn test_second_initialize_is_noop() {
        let (root, engine, orchestrator) = setup(TestEngine::new());
        write_mod(&root.path().join("mods"), "only", &[], "");

        assert!(orchestrator.initialize().unwrap());
        assert!(!orchestrator.initialize().unwrap());
        assert!(!orchestrator.initialize_from(vec![Some(Mod::new("late"))]).unwrap());
        assert_eq!(engine.evaluated().len(), 1);
    }

    #[test]
    fn test_concurrent_initialize_runs_once() {
        let (root, engine, orchestrator) = setup(TestEngine::new());
        let mods = root.path().join("mods");
        for i in 0..5 {
            write_mod(&mods, &format!("m{}", i), &[], "");
        }
        let orchestrator = Arc::new(orchestrator);

        let threads: Vec<_> = (0..6)
            .map(|_| {
                let orchestrator = Arc::clone(&orchestrator);
                std::thread::spawn(move || {
                    let first = orchestrator.initialize().unwrap();
                    orchestrator.wait_ready();
                    assert!(orchestrator.report().is_some());
                    first
                })
            })
            .collect();
        let firsts = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|first| *first)
            .count();

        assert_eq!(firsts, 1);
        assert_eq!(engine.evaluated().len(), 5);
        assert_eq!(orchestrator.registry().loaded_names().len(), 5);
    }

    #[test]
    fn test_sentinel_marks_ready_during_loading() {
        let engine = TestEngine::new().with_module(DEFAULT_READY_SENTINEL, true);
        let (root, engine, orchestrator) = setup(engine);
        let mods = root.path().join("mods");
        write_mod(&mods, "a", &[], &format!("require {}", DEFAULT_READY_SENTINEL));
        write_mod(&mods, "b", &["a"], "call probe");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let lifecycle = Arc::clone(orchestrator.lifecycle());
        let log = Arc::clone(&seen);
        engine
            .register_native(
                "probe",
                NativeFunction::new("probe", move |_| {
                    log.lock().unwrap().push(lifecycle.state());
                    Ok(Value::Nil)
                }),
            )
            .unwrap();

        orchestrator.initialize().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![LoadState::Ready]);
        assert!(orchestrator.mediator().sentinel_seen());
        assert_eq!(orchestrator.report().unwrap().loaded, vec!["a", "b"]);
    }

    #[test]
    fn test_report_stored_before_waiters_wake() {
        let (root, _engine, orchestrator) = setup(TestEngine::new());
        let mods = root.path().join("mods");
        for i in 0..20 {
            write_mod(&mods, &format!("m{:02}", i), &[], "");
        }
        let orchestrator = Arc::new(orchestrator);

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let orchestrator = Arc::clone(&orchestrator);
                std::thread::spawn(move || {
                    orchestrator.wait_ready();
                    orchestrator.report().map(|r| r.loaded.len())
                })
            })
            .collect();

        orchestrator.initialize().unwrap();
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Some(20));
        }
    }

    #[test]
    fn test_sentinel_before_initialize_still_marks_ready_later() {
        let engine = TestEngine::new().with_module(DEFAULT_READY_SENTINEL, true);
        let (root, engine, orchestrator) = setup(engine);
        let mods = root.path().join("mods");
        write_mod(&mods, "a", &[], &format!("require {}", DEFAULT_READY_SENTINEL));
        write_mod(&mods, "b", &["a"], "call probe");

        // Запрос маркера до инициализации не меняет состояние и не расходует маркер
        assert_eq!(
            orchestrator.mediator().resolve(DEFAULT_READY_SENTINEL),
            Ok(Value::Bool(true))
        );
        assert_eq!(orchestrator.state(), LoadState::Uninitialized);
        assert!(!orchestrator.mediator().sentinel_seen());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let lifecycle = Arc::clone(orchestrator.lifecycle());
        let log = Arc::clone(&seen);
        engine
            .register_native(
                "probe",
                NativeFunction::new("probe", move |_| {
                    log.lock().unwrap().push(lifecycle.state());
                    Ok(Value::Nil)
                }),
            )
            .unwrap();

        orchestrator.initialize().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![LoadState::Ready]);
        assert!(orchestrator.mediator().sentinel_seen());
    }

    #[test]
    fn test_mods_register_hooks_during_load() {
        let engine = TestEngine::new().with_module("game.core", 10i64);
        let (root, engine, orchestrator) = setup(engine);
        write_mod(&root.path().join("mods"), "hooker", &[], "call install_hook");

        // Мод вызывает mod_api.hooks.intercept через глобальную функцию
        let api_engine = Arc::clone(&engine);
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        engine
            .register_native(
                "install_hook",
                NativeFunction::new("install_hook", move |_| {
                    let api = api_engine.global("mod_api");
                    let hooks = api.as_table().unwrap().get("hooks");
                    let intercept = hooks.as_table().unwrap().get("intercept");
                    let counter = Arc::clone(&counter);
                    let observer = NativeFunction::new("observer", move |_| {
                        *counter.lock().unwrap() += 1;
                        Ok(Value::Nil)
                    });
                    intercept
                        .as_function()
                        .unwrap()
                        .call(&[Value::from("game.core"), Value::Function(observer)])
                }),
            )
            .unwrap();

        orchestrator.initialize().unwrap();
        assert_eq!(engine.evaluate("require game.core", "host").unwrap(), Value::Int(10));
        assert_eq!(*hits.lock().unwrap(), 1);
        assert_eq!(orchestrator.mediator().hook_count("game.core"), 1);
    }

    #[test]
    fn test_mods_dir_is_a_file() {
        let root = tempdir().unwrap();
        let file = root.path().join("mods");
        fs::write(&file, "").unwrap();
        let engine: Arc<dyn ScriptEngine> = Arc::new(TestEngine::new());
        let orchestrator =
            LoadOrchestrator::new(LoaderConfig::default().with_mods_dir(&file), engine);

        assert!(matches!(
            orchestrator.initialize(),
            Err(LoaderError::NotADirectory(_))
        ));
        assert_eq!(orchestrator.state(), LoadState::Ready);
        assert!(orchestrator.report().is_none());
    }

    #[test]
    fn test_initialize_from_candidates() {
        let engine: Arc<dyn ScriptEngine> = Arc::new(TestEngine::new());
        let orchestrator = LoadOrchestrator::new(LoaderConfig::default(), engine);

        orchestrator
            .initialize_from(vec![Some(Mod::new("virtual")), None])
            .unwrap();
        let report = orchestrator.report().unwrap();

        assert!(report.loaded.is_empty());
        assert_eq!(report.failed[0].name, "virtual");
        assert!(report.failed[0].error.contains("no entry point"));
    }

    #[test]
    fn test_plan_without_engine() {
        let root = tempdir().unwrap();
        write_mod(root.path(), "b", &["a", "missing"], "");
        write_mod(root.path(), "a", &[], "");

        let plan = plan(&LoaderConfig::default().with_mods_dir(root.path())).unwrap();
        assert_eq!(plan.resolution.order, vec!["a", "b"]);
        assert_eq!(plan.resolution.missing.len(), 1);
        assert!(plan.duplicates.is_empty());
        assert_eq!(plan.registry.len(), 2);
    }
}
