//! Image layers and the loaders that produce them.
//!
//! This module provides:
//! - `ImageLayer`: a named grayscale pixel array with its physical pixel scale
//! - `LoaderRegistry`: extensible system for decoding image files
//! - Built-in loaders for raster images (PNG, JPEG, TIFF, ...) and NumPy (.npy) files
//!
//! ## Adding New Formats
//!
//! Microscope vendor formats are not built in. A host that can read them
//! implements `ImageLoader` and registers it:
//!
//! ```rust,ignore
//! use pitcount::data::{ImageLoader, LoaderError, LoaderRegistry};
//! use ndarray::Array2;
//!
//! pub struct CziLoader;
//!
//! impl ImageLoader for CziLoader {
//!     fn id(&self) -> &'static str { "czi" }
//!     fn display_name(&self) -> &'static str { "Zeiss CZI" }
//!     fn extensions(&self) -> &'static [&'static str] { &["czi"] }
//!     fn can_load(&self, data: &[u8]) -> bool { data.starts_with(b"ZISRAWFILE") }
//!     fn load(&self, data: &[u8]) -> Result<Array2<f32>, LoaderError> { /* ... */ }
//! }
//!
//! let mut registry = LoaderRegistry::new();
//! registry.register(Box::new(CziLoader));
//! ```

mod image_layer;
mod loader;
pub mod loaders;

pub use image_layer::ImageLayer;
pub use loader::{ImageLoader, LoaderError, LoaderRegistry, load_folder};
