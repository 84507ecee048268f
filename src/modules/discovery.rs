//! Поиск модов на диске и чтение манифестов (`mod.toml`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::registry::{Mod, DISABLED_MARKER};
use crate::config::LoaderConfig;
use crate::error::{LoaderError, LoaderResult};

/// Файл манифеста мода.
pub const MANIFEST_FILE: &str = "mod.toml";

/// Манифест мода (mod.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModManifest {
    /// Уникальное имя
    pub name: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub version: String,

    /// Краткое описание
    #[serde(default)]
    pub description: String,

    /// Подробное описание
    #[serde(default)]
    pub detailed_description: String,

    /// Нужен ли перезапуск хоста после включения
    #[serde(default)]
    pub requires_restart: bool,

    /// Имена модов, которые должны загрузиться раньше
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Точка входа (по умолчанию из конфигурации)
    #[serde(default)]
    pub entry: Option<String>,
}

impl ModManifest {
    /// Загрузить манифест из файла.
    pub fn load(path: impl AsRef<Path>) -> LoaderResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let manifest: Self = toml::from_str(&content)
            .map_err(|e| LoaderError::Manifest(path.to_path_buf(), e.to_string()))?;

        if manifest.name.trim().is_empty() {
            return Err(LoaderError::Manifest(
                path.to_path_buf(),
                "mod name must not be empty".to_string(),
            ));
        }

        Ok(manifest)
    }
}

/// Прочитать мод из его директории.
pub fn read_mod(dir: &Path, default_entry: &str) -> LoaderResult<Mod> {
    let manifest = ModManifest::load(dir.join(MANIFEST_FILE))?;
    let enabled = !dir.join(DISABLED_MARKER).exists();
    let entry = manifest.entry.unwrap_or_else(|| default_entry.to_string());

    Ok(Mod::new(manifest.name)
        .with_author(manifest.author)
        .with_version(manifest.version)
        .with_description(manifest.description, manifest.detailed_description)
        .with_requires_restart(manifest.requires_restart)
        .with_dependencies(manifest.dependencies)
        .with_enabled(enabled)
        .with_location(dir, entry))
}

/// Пути записей директории по имени. Нечитаемые записи пропускаются с предупреждением.
fn sorted_entries<I>(root: &Path, entries: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut paths: Vec<PathBuf> = entries
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("failed to read an entry of \"{}\": {}", root.display(), e);
                None
            }
        })
        .collect();
    paths.sort();
    paths
}

/// Найти кандидатов в моды.
///
/// Каждая поддиректория `mods_dir` даёт один кандидат; `None`, если её не
/// удалось прочитать. Порядок — по имени директории.
pub fn discover(config: &LoaderConfig) -> LoaderResult<Vec<Option<Mod>>> {
    let root = &config.mods_dir;
    debug!("loading mods from \"{}\"", root.display());

    if !root.exists() {
        if !config.create_mods_dir {
            debug!("mods directory \"{}\" does not exist", root.display());
            return Ok(Vec::new());
        }
        fs::create_dir_all(root)?;
    }

    if !root.is_dir() {
        return Err(LoaderError::NotADirectory(root.clone()));
    }

    let entries = sorted_entries(root, fs::read_dir(root)?.map(|entry| entry.map(|e| e.path())));

    let mut candidates = Vec::with_capacity(entries.len());
    for path in entries {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !path.is_dir() {
            debug!("skipping \"{}\" as it's not a directory", file_name);
            continue;
        }

        match read_mod(&path, &config.entry_file) {
            Ok(m) => candidates.push(Some(m)),
            Err(e) => {
                warn!("failed to read mod \"{}\": {}", file_name, e);
                candidates.push(None);
            }
        }
    }

    Ok(candidates)
}
