//! Loading, migration and persistence of the settings document.
//!
//! The store owns the in-memory [`Settings`] and the YAML file backing it.
//! A missing file is created with defaults, a corrupt one is replaced with
//! defaults, and a document written by another schema version is migrated
//! forward by copying every field whose key still exists.
//!
//! The store assumes exclusive single-threaded access.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_yaml::{Mapping, Value};

use crate::config::{SETTINGS_VERSION, Settings};
use crate::constants::{APP_DIR_NAME, SETTINGS_FILE_NAME};

/// Errors that can occur when loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file is not valid YAML or does not match the schema
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The settings top level is not a mapping
    #[error("Settings document must be a mapping, found {found}")]
    NotAMapping { found: &'static str },

    /// Folder or file could not be created, read or written
    #[error("Cannot access {path:?}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SettingsError {
    fn file_system(path: &Path, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this error came from a corrupt document rather than the filesystem.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::NotAMapping { .. })
    }
}

/// Owns the settings document and its file on disk.
#[derive(Debug)]
pub struct SettingsStore {
    folder: PathBuf,
    file_path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Default settings folder under the per-user config directory.
    pub fn default_folder() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join(APP_DIR_NAME)
        } else if let Some(home_dir) = dirs::home_dir() {
            home_dir.join(".config").join(APP_DIR_NAME)
        } else {
            PathBuf::from(".").join(APP_DIR_NAME)
        }
    }

    /// Open the store in `folder` (or the default folder) and load it.
    pub fn open(folder: Option<&Path>) -> Result<Self, SettingsError> {
        let folder = folder
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_folder);
        let file_path = folder.join(SETTINGS_FILE_NAME);
        log::debug!("Settings folder path: {:?}", folder);

        let mut store = Self {
            folder,
            file_path,
            settings: Settings::new(),
        };
        store.load()?;
        Ok(store)
    }

    /// Folder holding the settings file.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Full path of the settings file.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Load the document from disk.
    ///
    /// A missing file is created with defaults. A file that cannot be parsed
    /// is logged and overwritten with defaults, so its previous content is
    /// lost once corruption is detected. A migrated document is written back.
    pub fn load(&mut self) -> Result<Settings, SettingsError> {
        fs::create_dir_all(&self.folder)
            .map_err(|e| SettingsError::file_system(&self.folder, e))?;

        if !self.file_path.exists() {
            log::info!("No settings file at {:?}, creating defaults", self.file_path);
            self.settings = Settings::new();
            self.persist()?;
            return Ok(self.settings.clone());
        }

        let contents = fs::read_to_string(&self.file_path)
            .map_err(|e| SettingsError::file_system(&self.file_path, e))?;

        match parse_raw(&contents).and_then(migrate_if_needed) {
            Ok((settings, migrated)) => {
                self.settings = settings;
                if migrated {
                    log::info!(
                        "Migrated settings {:?} to version {}",
                        self.file_path,
                        SETTINGS_VERSION
                    );
                    self.persist()?;
                }
            }
            Err(e) if e.is_parse_error() => {
                log::warn!(
                    "Could not parse {:?}: {}. Falling back to defaults",
                    self.file_path,
                    e
                );
                self.settings = Settings::new();
                self.persist()?;
            }
            Err(e) => return Err(e),
        }

        Ok(self.settings.clone())
    }

    /// The in-memory document, without touching disk.
    pub fn current(&self) -> &Settings {
        &self.settings
    }

    /// Mutable access for in-memory edits. Call [`persist`](Self::persist) to save.
    pub fn current_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Re-read the file, picking up edits made outside the application.
    pub fn refreshed(&mut self) -> Result<&Settings, SettingsError> {
        self.load()?;
        Ok(&self.settings)
    }

    /// Write the in-memory document to disk, replacing the file.
    pub fn persist(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| SettingsError::file_system(parent, e))?;
        }
        let yaml = self.settings.to_yaml()?;
        fs::write(&self.file_path, yaml)
            .map_err(|e| SettingsError::file_system(&self.file_path, e))?;
        log::debug!("Saved settings to {:?}", self.file_path);
        Ok(())
    }

    /// Open the settings file in the platform's default editor.
    pub fn open_in_editor(&self) -> Result<(), SettingsError> {
        let path = self.file_path.as_os_str();
        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]).arg(path);
            c
        } else if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(path);
            c
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(path);
            c
        };

        command
            .spawn()
            .map_err(|e| SettingsError::file_system(&self.file_path, e))?;
        log::info!("Opened {:?} in the default editor", self.file_path);
        Ok(())
    }
}

/// Parse file contents into a raw mapping. An empty file is an empty mapping.
pub fn parse_raw(contents: &str) -> Result<Value, SettingsError> {
    let value: Value = serde_yaml::from_str(contents)?;
    match value {
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        Value::Mapping(_) => Ok(value),
        other => Err(SettingsError::NotAMapping {
            found: value_kind(&other),
        }),
    }
}

/// Bring a raw document up to the current schema.
///
/// Returns the document and whether migration happened. A document at the
/// current version is parsed as is. Otherwise every field whose key path
/// exists in the current schema is copied onto the defaults; unknown fields
/// are dropped and a value the current schema rejects keeps its default.
///
/// Fields are matched by name only, so a field whose meaning changed under
/// the same name is carried over unchanged.
pub fn migrate_if_needed(raw: Value) -> Result<(Settings, bool), SettingsError> {
    let stored_version = raw.get("version").map(version_string);

    if stored_version.as_deref() == Some(SETTINGS_VERSION) {
        let settings: Settings = serde_yaml::from_value(raw)?;
        return Ok((settings, false));
    }

    log::info!(
        "Settings version {} differs from {}, migrating",
        stored_version.as_deref().unwrap_or("<none>"),
        SETTINGS_VERSION
    );

    let mut merged = Settings::new().to_value()?;
    let mut leaves = Vec::new();
    collect_leaf_paths(&merged, &mut Vec::new(), &mut leaves);

    for path in leaves {
        if path.first().map(String::as_str) == Some("version") {
            continue;
        }
        let Some(old) = lookup(&raw, &path) else {
            continue;
        };
        let Some(slot) = lookup_mut(&mut merged, &path) else {
            continue;
        };
        let previous = std::mem::replace(slot, old.clone());
        if serde_yaml::from_value::<Settings>(merged.clone()).is_err() {
            log::warn!(
                "Dropping incompatible value for '{}' during migration",
                path.join(".")
            );
            if let Some(slot) = lookup_mut(&mut merged, &path) {
                *slot = previous;
            }
        }
    }

    let mut settings: Settings = serde_yaml::from_value(merged)?;
    settings.version = SETTINGS_VERSION.to_string();
    Ok((settings, true))
}

fn version_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => value_kind(other).to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn collect_leaf_paths(value: &Value, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                if let Some(key) = key.as_str() {
                    prefix.push(key.to_string());
                    collect_leaf_paths(child, prefix, out);
                    prefix.pop();
                }
            }
        }
        _ => out.push(prefix.clone()),
    }
}

fn lookup<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| node.get(key.as_str()))
}

fn lookup_mut<'a>(value: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    path.iter()
        .try_fold(value, |node, key| node.get_mut(key.as_str()))
}
