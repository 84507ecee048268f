//! # Modloader
//!
//! Загрузчик модов для хоста со встроенным скриптовым движком.
//!
//! ## Основные модули
//!
//! - [`modules`] - Обнаружение, порядок загрузки, перехват импорта, жизненный цикл
//! - [`api`] - Таблица API, которую видят скрипты модов
//! - [`engine`] - Граница со скриптовым движком хоста
//! - [`value`] - Значения, которыми обмениваются ядро и скрипты
//! - [`config`] - Конфигурация загрузчика
//! - [`diagnostics`] - Логирование и буфер последних сообщений
//!
//! ## Пример использования
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use modloader::{LoadOrchestrator, LoaderConfig};
//!
//! let config = LoaderConfig::from_file("modloader.toml")?;
//! let logs = modloader::diagnostics::init_logging(&config)?;
//!
//! let orchestrator = LoadOrchestrator::new(config, Arc::new(host_engine)).with_log_buffer(logs);
//! orchestrator.initialize()?;
//! orchestrator.wait_ready();
//! ```

pub mod api;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod modules;
pub mod value;

// === Re-exports для удобства ===
pub use config::LoaderConfig;
pub use diagnostics::{init_logging, LogBuffer, LogEntry};
pub use engine::ScriptEngine;
pub use error::{LoaderError, LoaderResult, ScriptError, ScriptResult};
pub use modules::{
    DependencyGraph, ImportMediator, LoadOrchestrator, LoadReport, LoadState, Mod, ModRegistry,
    Revocation,
};
pub use value::{NativeFunction, Table, Value};
