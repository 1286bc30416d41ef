//! Global constants for pitcount

/// Directory name used under the per-user config and data folders
pub const APP_DIR_NAME: &str = "pitcount";

/// File name of the persisted settings document
pub const SETTINGS_FILE_NAME: &str = "pitcount_settings.yaml";

/// Model variant used when the settings do not name one
pub const DEFAULT_MODEL_TYPE: &str = "cyto3";

/// File extension of exported result files
pub const RESULT_FILE_EXTENSION: &str = "txt";

/// Physical pixel scale used when a layer carries none
pub const DEFAULT_PIXEL_SCALE: [f64; 2] = [1.0, 1.0];
