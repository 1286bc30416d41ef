//! Settings schema for pitcount.
//!
//! This module defines the persisted settings document, its defaults and the
//! read-only views that components use instead of the full document shape.
//! Loading, migration and persistence live in [`crate::settings_store`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current settings schema version.
/// Bump this whenever a field is added, removed or renamed.
pub const SETTINGS_VERSION: &str = "0.2.0";

/// The persisted settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version the document was written with
    #[serde(default = "default_version")]
    pub version: String,

    /// Prompting behaviour
    #[serde(default)]
    pub automation: AutomationSettings,

    /// Input and output locations
    #[serde(default)]
    pub files: FileSettings,

    /// Segmentation model parameters
    #[serde(default)]
    pub model: ModelSettings,

    /// Debugging and verbosity
    #[serde(default)]
    pub debug: DebugSettings,
}

fn default_version() -> String {
    SETTINGS_VERSION.to_string()
}

/// Automation section of the settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSettings {
    /// Ask for an input folder every time images are loaded
    #[serde(default = "default_true")]
    pub prompt_for_input_folder: bool,

    /// Ask for an output folder every time results are exported
    #[serde(default = "default_true")]
    pub prompt_for_output_folder: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            prompt_for_input_folder: true,
            prompt_for_output_folder: true,
        }
    }
}

/// File locations section of the settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSettings {
    /// Folder images are loaded from
    #[serde(default)]
    pub input_folder: String,

    /// Folder result files are written to
    #[serde(default = "default_output_folder")]
    pub output_folder: String,
}

/// Default output folder under the per-user data directory.
pub fn default_output_folder() -> String {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(crate::constants::APP_DIR_NAME)
        .join("output")
        .to_string_lossy()
        .into_owned()
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            input_folder: String::new(),
            output_folder: default_output_folder(),
        }
    }
}

/// Segmentation model section of the settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model variant name
    #[serde(default = "default_model_type")]
    pub model_type: String,

    /// Estimated object diameter in pixels, 0 lets the model decide
    #[serde(default)]
    pub diameter: f32,

    /// Run inference on the GPU
    #[serde(default)]
    pub gpu: bool,

    /// Drop regions touching the image border
    #[serde(default)]
    pub exclude_on_edges: bool,

    /// Smoothing radius applied before segmentation, in pixels
    #[serde(default)]
    pub smoothing_radius: f32,

    /// Upper bound on concurrent segmentation workers, 0 means one per CPU
    #[serde(default)]
    pub max_workers: usize,
}

fn default_model_type() -> String {
    crate::constants::DEFAULT_MODEL_TYPE.to_string()
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_type: default_model_type(),
            diameter: 0.0,
            gpu: false,
            exclude_on_edges: false,
            smoothing_radius: 0.0,
            max_workers: 0,
        }
    }
}

/// Debug section of the settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DebugSettings {
    /// Enable debug output
    #[serde(default)]
    pub enabled: bool,

    /// Log verbosity level
    #[serde(default)]
    pub level: LogLevel,
}

/// What the file-handling components see of the settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FileView {
    pub input_folder: Option<PathBuf>,
    pub output_folder: Option<PathBuf>,
    pub prompt_for_input_folder: bool,
    pub prompt_for_output_folder: bool,
    pub debug: bool,
}

/// Model parameters handed to a segmentation model for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_type: String,
    pub diameter: f32,
    pub gpu: bool,
    pub exclude_on_edges: bool,
    pub smoothing_radius: f32,
    pub debug: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Settings::default().model_config()
    }
}

impl Settings {
    /// Create a settings document with schema defaults.
    pub fn new() -> Self {
        Self {
            version: default_version(),
            automation: AutomationSettings::default(),
            files: FileSettings::default(),
            model: ModelSettings::default(),
            debug: DebugSettings::default(),
        }
    }

    /// Whether this document was written with the current schema.
    pub fn is_current(&self) -> bool {
        self.version == SETTINGS_VERSION
    }

    /// File locations plus the debug flag.
    pub fn file_view(&self) -> FileView {
        FileView {
            input_folder: non_empty_path(&self.files.input_folder),
            output_folder: non_empty_path(&self.files.output_folder),
            prompt_for_input_folder: self.automation.prompt_for_input_folder,
            prompt_for_output_folder: self.automation.prompt_for_output_folder,
            debug: self.debug.enabled,
        }
    }

    /// Model parameters plus the debug flag.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_type: self.model.model_type.clone(),
            diameter: self.model.diameter,
            gpu: self.model.gpu,
            exclude_on_edges: self.model.exclude_on_edges,
            smoothing_radius: self.model.smoothing_radius,
            debug: self.debug.enabled,
        }
    }

    /// Log filter implied by the debug section.
    ///
    /// Levels more verbose than `Info` only take effect while debugging is enabled.
    pub fn log_filter(&self) -> log::LevelFilter {
        let level = self.debug.level.to_level_filter();
        if self.debug.enabled {
            level
        } else {
            level.min(log::LevelFilter::Info)
        }
    }

    /// Serialize to the on-disk YAML representation.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Serialize to a generic YAML value tree.
    pub fn to_value(&self) -> Result<serde_yaml::Value, serde_yaml::Error> {
        serde_yaml::to_value(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_current_version() {
        let settings = Settings::new();
        assert_eq!(settings.version, SETTINGS_VERSION);
        assert!(settings.is_current());
        assert_eq!(settings.model.model_type, "cyto3");
        assert!(settings.automation.prompt_for_output_folder);
    }

    #[test]
    fn test_views_follow_debug_flag() {
        let mut settings = Settings::new();
        settings.debug.enabled = true;
        assert!(settings.file_view().debug);
        assert!(settings.model_config().debug);

        settings.debug.enabled = false;
        assert!(!settings.file_view().debug);
        assert!(!settings.model_config().debug);
    }

    #[test]
    fn test_views_are_not_serialized() {
        let mut settings = Settings::new();
        settings.debug.enabled = true;
        let yaml = settings.to_yaml().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let files = value.get("files").unwrap();
        assert!(files.get("debug").is_none());
        let model = value.get("model").unwrap();
        assert!(model.get("debug").is_none());
    }

    #[test]
    fn test_empty_folders_map_to_none() {
        let mut settings = Settings::new();
        settings.files.input_folder = "  ".to_string();
        settings.files.output_folder = "/tmp/out".to_string();
        let view = settings.file_view();
        assert_eq!(view.input_folder, None);
        assert_eq!(view.output_folder, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn test_log_filter_capped_without_debug() {
        let mut settings = Settings::new();
        settings.debug.level = LogLevel::Trace;
        assert_eq!(settings.log_filter(), log::LevelFilter::Info);

        settings.debug.enabled = true;
        assert_eq!(settings.log_filter(), log::LevelFilter::Trace);

        settings.debug.enabled = false;
        settings.debug.level = LogLevel::Warn;
        assert_eq!(settings.log_filter(), log::LevelFilter::Warn);
    }
}
