//! Реестр модов.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};
use serde::Serialize;

use crate::error::{LoaderError, LoaderResult};

/// Файл-маркер выключенного мода.
pub const DISABLED_MARKER: &str = ".disabled";

/// Обнаруженный мод.
///
/// Идентификационные поля не меняются после создания, меняется только `enabled`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mod {
    name: String,
    author: String,
    version: String,
    description: String,
    detailed_description: String,
    requires_restart: bool,
    dependencies: Vec<String>,
    enabled: bool,
    /// Директория мода (если найден на диске)
    #[serde(skip)]
    dir: Option<PathBuf>,
    /// Точка входа относительно директории мода
    #[serde(skip)]
    entry: String,
}

impl Mod {
    /// Создать мод без директории (например, для тестов или встроенных модов).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            author: String::new(),
            version: String::new(),
            description: String::new(),
            detailed_description: String::new(),
            requires_restart: false,
            dependencies: Vec::new(),
            enabled: true,
            dir: None,
            entry: String::new(),
        }
    }

    /// Установить автора.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Установить версию.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Установить краткое и подробное описание.
    pub fn with_description(
        mut self,
        description: impl Into<String>,
        detailed: impl Into<String>,
    ) -> Self {
        self.description = description.into();
        self.detailed_description = detailed.into();
        self
    }

    /// Нужен ли перезапуск хоста после включения.
    pub fn with_requires_restart(mut self, requires_restart: bool) -> Self {
        self.requires_restart = requires_restart;
        self
    }

    /// Зависимости; повторы отбрасываются, порядок сохраняется.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dependency in dependencies {
            let dependency = dependency.into();
            if !self.dependencies.contains(&dependency) {
                self.dependencies.push(dependency);
            }
        }
        self
    }

    /// Установить исходное состояние без записи на диск.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Привязать мод к директории на диске.
    pub fn with_location(mut self, dir: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self.entry = entry.into();
        self
    }

    /// Уникальное имя мода.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn detailed_description(&self) -> &str {
        &self.detailed_description
    }

    pub fn requires_restart(&self) -> bool {
        self.requires_restart
    }

    /// Имена модов, которые должны загрузиться раньше.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Включён ли мод.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Директория мода, если он найден на диске.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Полный путь к точке входа.
    pub fn entry_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(&self.entry))
    }

    /// Включить мод.
    pub fn enable(&mut self) -> io::Result<()> {
        self.set_enabled(true)
    }

    /// Выключить мод.
    pub fn disable(&mut self) -> io::Result<()> {
        self.set_enabled(false)
    }

    /// Изменить состояние и сохранить его маркером в директории мода.
    pub fn set_enabled(&mut self, enabled: bool) -> io::Result<()> {
        if let Some(dir) = &self.dir {
            let marker = dir.join(DISABLED_MARKER);
            if enabled {
                match fs::remove_file(&marker) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                    _ => {}
                }
            } else {
                fs::write(&marker, b"")?;
            }
        }
        self.enabled = enabled;
        Ok(())
    }

    /// Краткое описание для логов: `"name" (by "author", version)`.
    pub fn label(&self) -> String {
        format!("\"{}\" (by \"{}\", {})", self.name, self.author, self.version)
    }
}

/// Стабильный индекс мода в реестре.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModId(usize);

/// Отклонённый дубликат.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMod {
    /// Мод, который остался в реестре
    pub accepted: Mod,
    /// Мод, который не будет загружен
    pub rejected: Mod,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Все принятые моды, в порядке обнаружения
    mods: Vec<Mod>,
    /// Имя -> индекс
    index: HashMap<String, ModId>,
    /// Загруженные моды, в порядке загрузки
    loaded: Vec<ModId>,
}

/// Реестр обнаруженных и загруженных модов.
///
/// Моды лежат в арене; список загруженных хранит только индексы.
#[derive(Debug, Default)]
pub struct ModRegistry {
    state: RwLock<RegistryState>,
}

impl ModRegistry {
    /// Создать пустой реестр.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Принять кандидатов в порядке обнаружения.
    ///
    /// `None` (мод не удалось прочитать) пропускается. Из модов с одинаковым
    /// именем остаётся первый, остальные возвращаются как дубликаты.
    pub fn ingest<I>(&self, candidates: I) -> Vec<DuplicateMod>
    where
        I: IntoIterator<Item = Option<Mod>>,
    {
        candidates
            .into_iter()
            .flatten()
            .filter_map(|candidate| self.insert(candidate).err())
            .collect()
    }

    /// Добавить мод. Если имя занято, вернуть дубликат.
    pub fn insert(&self, candidate: Mod) -> Result<ModId, DuplicateMod> {
        let mut state = self.write();

        if let Some(&ModId(existing)) = state.index.get(candidate.name()) {
            let duplicate = DuplicateMod {
                accepted: state.mods[existing].clone(),
                rejected: candidate,
            };
            warn!(
                "duplicate name: {} and {}, the latter will not be loaded!",
                duplicate.accepted.label(),
                duplicate.rejected.label()
            );
            return Err(duplicate);
        }

        let id = ModId(state.mods.len());
        debug!("discovered mod {}", candidate.label());
        state.index.insert(candidate.name().to_string(), id);
        state.mods.push(candidate);
        Ok(id)
    }

    /// Все моды после дедупликации.
    pub fn all(&self) -> Vec<Mod> {
        self.read().mods.clone()
    }

    /// Только включённые моды.
    pub fn enabled(&self) -> Vec<Mod> {
        self.read()
            .mods
            .iter()
            .filter(|m| m.enabled())
            .cloned()
            .collect()
    }

    /// Копия мода по имени.
    pub fn get(&self, name: &str) -> Option<Mod> {
        let state = self.read();
        state.index.get(name).map(|&ModId(i)| state.mods[i].clone())
    }

    /// Индекс мода в реестре.
    pub fn id_of(&self, name: &str) -> Option<ModId> {
        self.read().index.get(name).copied()
    }

    /// Есть ли мод с таким именем.
    pub fn contains(&self, name: &str) -> bool {
        self.read().index.contains_key(name)
    }

    /// Количество принятых модов.
    pub fn len(&self) -> usize {
        self.read().mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Включить или выключить мод по имени.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> LoaderResult<()> {
        let mut state = self.write();
        let ModId(i) = *state
            .index
            .get(name)
            .ok_or_else(|| LoaderError::ModNotFound(name.to_string()))?;
        state.mods[i].set_enabled(enabled)?;
        debug!(
            "mod \"{}\" {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Отметить мод загруженным.
    ///
    /// Неизвестные имена пропускаются: граф и реестр не связаны жёстко.
    pub fn mark_loaded(&self, name: &str) -> bool {
        let mut state = self.write();
        let Some(&id) = state.index.get(name) else {
            return false;
        };
        if state.loaded.contains(&id) {
            return false;
        }
        state.loaded.push(id);
        true
    }

    /// Загружен ли мод.
    pub fn is_loaded(&self, name: &str) -> bool {
        let state = self.read();
        state
            .index
            .get(name)
            .is_some_and(|id| state.loaded.contains(id))
    }

    /// Загруженные моды в порядке загрузки.
    pub fn loaded(&self) -> Vec<Mod> {
        let state = self.read();
        state
            .loaded
            .iter()
            .map(|&ModId(i)| state.mods[i].clone())
            .collect()
    }

    /// Имена загруженных модов, в порядке загрузки.
    pub fn loaded_names(&self) -> Vec<String> {
        let state = self.read();
        state
            .loaded
            .iter()
            .map(|&ModId(i)| state.mods[i].name().to_string())
            .collect()
    }
}
