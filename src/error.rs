//! Определения ошибок загрузчика модов.

use std::path::PathBuf;

use thiserror::Error;

/// Основной тип `Result` для библиотеки.
pub type LoaderResult<T> = Result<T, LoaderError>;

/// Тип `Result` на границе со скриптовым движком.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Ошибки загрузчика.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid manifest {0}: {1}")]
    Manifest(PathBuf, String),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Mod not found: {0}")]
    ModNotFound(String),

    #[error("Failed to load mod \"{0}\": {1}")]
    EntryPoint(String, String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Logger error: {0}")]
    Logger(String),

    #[error("Panic during initialization: {0}")]
    Panic(String),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Ошибки, которые возвращает скриптовый движок или нативные функции.
///
/// Эти ошибки пробрасываются обратно в скрипт, поэтому тип клонируемый.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Type mismatch: expected {0}, got {1}")]
    TypeError(&'static str, String),

    #[error("Bad argument #{index} to '{function}': {message}")]
    BadArgument {
        function: String,
        index: usize,
        message: String,
    },

    #[error("Panic: {0}")]
    Panic(String),
}

impl From<log::SetLoggerError> for LoaderError {
    fn from(err: log::SetLoggerError) -> Self {
        LoaderError::Logger(err.to_string())
    }
}

impl From<toml::de::Error> for LoaderError {
    fn from(err: toml::de::Error) -> Self {
        LoaderError::Config(err.to_string())
    }
}

/// Достать текст из payload паники.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<no message>".to_string()
    }
}
