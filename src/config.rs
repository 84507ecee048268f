//! Конфигурация загрузчика.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, LoaderResult};

/// Префикс, отключающий перехват импорта (`require "!name"`).
pub const DEFAULT_ESCAPE_PREFIX: &str = "!";

/// Модуль, первый импорт которого означает, что хост прошёл безопасную
/// точку инициализации.
pub const DEFAULT_READY_SENTINEL: &str = "classes.battle.rules.onlineShouldBlockSkill";

/// Конфигурация загрузчика модов.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Директория с модами
    pub mods_dir: PathBuf,
    /// Создавать директорию модов, если её нет
    pub create_mods_dir: bool,
    /// Файл точки входа мода по умолчанию
    pub entry_file: String,
    /// Префикс импорта в обход моков и хуков (пустая строка отключает)
    pub escape_prefix: String,
    /// Имя модуля-маркера готовности
    pub ready_sentinel: Option<String>,
    /// Глобальная таблица API для модов
    pub api_global: String,
    /// Глобальная функция импорта, которую заменяет загрузчик
    pub resolver_global: String,
    /// Сколько последних записей лога хранить для `logger.logs()`
    pub log_buffer_capacity: usize,
    /// Фильтр логов в формате `RUST_LOG`
    pub log_filter: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            mods_dir: PathBuf::from("mods"),
            create_mods_dir: true,
            entry_file: "init.lua".to_string(),
            escape_prefix: DEFAULT_ESCAPE_PREFIX.to_string(),
            ready_sentinel: Some(DEFAULT_READY_SENTINEL.to_string()),
            api_global: "mod_api".to_string(),
            resolver_global: "require".to_string(),
            log_buffer_capacity: 1024,
            log_filter: None,
        }
    }
}

impl LoaderConfig {
    /// Прочитать конфигурацию из TOML-файла. Отсутствующие ключи берутся по умолчанию.
    pub fn from_file(path: impl AsRef<Path>) -> LoaderResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Разобрать конфигурацию из строки TOML.
    pub fn from_toml(content: &str) -> LoaderResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Указать директорию модов.
    pub fn with_mods_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mods_dir = dir.into();
        self
    }

    fn validate(&self) -> LoaderResult<()> {
        if self.entry_file.trim().is_empty() {
            return Err(LoaderError::Config("entry_file must not be empty".to_string()));
        }
        if self.api_global.is_empty() || self.resolver_global.is_empty() {
            return Err(LoaderError::Config(
                "api_global and resolver_global must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
