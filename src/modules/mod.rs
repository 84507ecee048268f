//! Система модов.
//!
//! Мод — директория внутри `mods_dir` с манифестом `mod.toml` и точкой входа
//! (по умолчанию `init.lua`).
//!
//! ## Устройство
//!
//! - [`discover`] — поиск модов на диске и чтение манифестов
//! - [`ModRegistry`] — реестр обнаруженных и загруженных модов
//! - [`DependencyGraph`] — порядок загрузки с учётом зависимостей
//! - [`ImportMediator`] — моки и хуки поверх импорта модулей
//! - [`LoadOrchestrator`] — жизненный цикл загрузки
//!
//! ## Пример манифеста
//!
//! ```toml
//! name = "better-ui"
//! author = "alice"
//! version = "1.0.0"
//! description = "UI tweaks"
//! dependencies = ["core-lib"]
//! ```

mod discovery;
mod graph;
mod loader;
mod mediator;
mod registry;

pub use discovery::{discover, read_mod, ModManifest, MANIFEST_FILE};
pub use graph::{DependencyGraph, MissingDependency, Resolution};
pub use loader::{
    build_graph, plan, FailedMod, Lifecycle, LoadOrchestrator, LoadPlan, LoadReport, LoadState,
};
pub use mediator::{BaseResolve, ImportMediator, Observer, Producer, RegistrationId, Revocation};
pub use registry::{DuplicateMod, Mod, ModId, ModRegistry, DISABLED_MARKER};
