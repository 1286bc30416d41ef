//! pitcount - cell and pit counting for microscopy images
//!
//! Loads a folder of grayscale images, segments each one on a bounded pool
//! of worker threads and writes a per-image region summary. Settings live in
//! a versioned YAML file that is migrated forward when the schema changes.

pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod results;
pub mod segmentation;
pub mod session;
pub mod settings_store;
pub mod viewer;

pub use config::{FileView, ModelConfig, Settings};
pub use error::{Error, Result};
pub use session::Session;
pub use settings_store::{SettingsError, SettingsStore};
pub use viewer::{LayerStack, ViewerHost};
