//! Trait-based image loading.
//!
//! New formats can be added by implementing the `ImageLoader` trait and
//! registering the loader with a `LoaderRegistry`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use ndarray::Array2;

use crate::data::ImageLayer;

/// Error type for loader operations.
#[derive(Debug, Clone)]
pub struct LoaderError {
    /// Human-readable error message.
    pub message: String,
    /// The loader that produced this error (if known).
    pub loader_id: Option<&'static str>,
}

impl LoaderError {
    /// Create a new loader error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            loader_id: None,
        }
    }

    /// Create an error with loader context.
    pub fn with_loader(mut self, loader_id: &'static str) -> Self {
        self.loader_id = Some(loader_id);
        self
    }
}

impl std::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(loader) = self.loader_id {
            write!(f, "[{}] {}", loader, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for LoaderError {}

impl From<String> for LoaderError {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for LoaderError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Trait for image format loaders.
///
/// Each format decodes raw file bytes into a grayscale `(height, width)`
/// array normalized to 0.0-1.0.
pub trait ImageLoader: Send + Sync {
    /// Unique identifier for this loader (e.g., "raster", "npy").
    fn id(&self) -> &'static str;

    /// Human-readable name for UI display.
    fn display_name(&self) -> &'static str;

    /// File extensions this loader handles (lowercase, without dots).
    fn extensions(&self) -> &'static [&'static str];

    /// Check magic bytes to see whether this loader can likely handle the data.
    fn can_load(&self, data: &[u8]) -> bool;

    /// Decode raw file bytes.
    fn load(&self, data: &[u8]) -> Result<Array2<f32>, LoaderError>;

    /// Priority for format detection (higher = checked first).
    fn priority(&self) -> i32 {
        0
    }
}

/// Registry of available image loaders.
///
/// Provides format detection and a unified loading interface.
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn ImageLoader>>,
}

impl LoaderRegistry {
    /// Create a new registry with all built-in loaders.
    pub fn new() -> Self {
        let mut registry = Self {
            loaders: Vec::new(),
        };

        registry.register(Box::new(super::loaders::RasterLoader));
        registry.register(Box::new(super::loaders::NpyLoader));

        registry
    }

    /// Register a new loader.
    pub fn register(&mut self, loader: Box<dyn ImageLoader>) {
        self.loaders.push(loader);
        self.loaders.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Get all supported file extensions (for file filtering).
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = self
            .loaders
            .iter()
            .flat_map(|l| l.extensions().iter().copied())
            .collect();
        extensions.sort();
        extensions.dedup();
        extensions
    }

    fn loaders_for_extension(&self, ext: &str) -> Vec<&dyn ImageLoader> {
        let ext_lower = ext.to_lowercase();
        self.loaders
            .iter()
            .filter(|l| l.extensions().iter().any(|e| *e == ext_lower))
            .map(|l| l.as_ref())
            .collect()
    }

    fn detect_loader(&self, data: &[u8]) -> Option<&dyn ImageLoader> {
        self.loaders
            .iter()
            .find(|l| l.can_load(data))
            .map(|l| l.as_ref())
    }

    /// Load data, auto-detecting the format.
    ///
    /// Tries loaders matching the file extension first, then magic byte
    /// detection.
    pub fn load(&self, data: &[u8], filename: Option<&str>) -> Result<Array2<f32>, LoaderError> {
        let extension = filename
            .and_then(|f| Path::new(f).extension())
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        let mut last_error = None;

        if let Some(ref ext) = extension {
            for loader in self.loaders_for_extension(ext) {
                match loader.load(data) {
                    Ok(result) => {
                        log::debug!("Loaded with {} loader (by extension)", loader.id());
                        return Ok(result);
                    }
                    Err(e) => {
                        log::trace!("Loader {} failed: {}", loader.id(), e);
                        last_error = Some(e.with_loader(loader.id()));
                    }
                }
            }
        }

        if let Some(loader) = self.detect_loader(data) {
            match loader.load(data) {
                Ok(result) => {
                    log::debug!("Loaded with {} loader (by detection)", loader.id());
                    return Ok(result);
                }
                Err(e) => {
                    log::trace!("Detected loader {} failed: {}", loader.id(), e);
                    last_error = Some(e.with_loader(loader.id()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LoaderError::new(format!(
                "No loader could handle the data{}",
                filename
                    .map(|f| format!(" (file: {})", f))
                    .unwrap_or_default()
            ))
        }))
    }

    /// Check if a filename has a supported extension.
    pub fn is_supported_file(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| !self.loaders_for_extension(ext).is_empty())
    }

    /// Get all registered loaders.
    pub fn loaders(&self) -> &[Box<dyn ImageLoader>] {
        &self.loaders
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Load every supported image in `folder`, sorted by file name.
///
/// Layers are named after the file stem. When two files share a stem the
/// later one keeps its full file name instead, so every returned layer has a
/// distinct name. Files that fail to decode are logged and skipped; only an
/// unreadable folder is an error.
pub fn load_folder(registry: &LoaderRegistry, folder: &Path) -> Result<Vec<ImageLayer>, LoaderError> {
    let entries = fs::read_dir(folder)
        .map_err(|e| LoaderError::new(format!("Cannot read folder {:?}: {}", folder, e)))?;

    let mut paths: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| registry.is_supported_file(n))
        })
        .collect();
    paths.sort();

    let mut layers = Vec::with_capacity(paths.len());
    let mut taken = HashSet::new();
    for path in paths {
        let file_name = path.file_name().and_then(|n| n.to_str());

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Skipping {:?}: {}", path, e);
                continue;
            }
        };

        match registry.load(&bytes, file_name) {
            Ok(data) => {
                let name = unique_layer_name(&path, &mut taken);
                log::info!(
                    "Loaded {:?} as '{}' ({}x{})",
                    path,
                    name,
                    data.ncols(),
                    data.nrows()
                );
                layers.push(ImageLayer::new(name, data));
            }
            Err(e) => log::warn!("Skipping {:?}: {}", path, e),
        }
    }

    Ok(layers)
}

/// File stem, or the full file name when the stem is taken, with a numeric
/// suffix as a last resort.
fn unique_layer_name(path: &Path, taken: &mut HashSet<String>) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let full = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name = if taken.contains(&stem) {
        log::warn!("Layer name '{}' already used, naming {:?} '{}'", stem, path, full);
        full
    } else {
        stem
    };
    if taken.contains(&name) {
        let base = name.clone();
        let mut n = 2;
        while taken.contains(&name) {
            name = format!("{}-{}", base, n);
            n += 1;
        }
    }
    taken.insert(name.clone());
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_registry_has_loaders() {
        let registry = LoaderRegistry::new();
        assert!(!registry.loaders().is_empty());
        // npy outranks generic raster images
        assert_eq!(registry.loaders()[0].id(), "npy");
    }

    #[test]
    fn test_supported_extensions() {
        let registry = LoaderRegistry::new();
        let extensions = registry.supported_extensions();

        assert!(extensions.contains(&"png"));
        assert!(extensions.contains(&"tif"));
        assert!(extensions.contains(&"npy"));
    }

    #[test]
    fn test_is_supported_file() {
        let registry = LoaderRegistry::new();

        assert!(registry.is_supported_file("image.png"));
        assert!(registry.is_supported_file("data.npy"));
        assert!(registry.is_supported_file("IMAGE.TIFF"));
        assert!(!registry.is_supported_file("document.pdf"));
        assert!(!registry.is_supported_file("no_extension"));
    }

    #[test]
    fn test_load_unknown_data_fails() {
        let registry = LoaderRegistry::new();
        let err = registry.load(&[0, 1, 2, 3], Some("mystery.bin")).unwrap_err();
        assert!(err.message.contains("mystery.bin"));
    }

    #[test]
    fn test_load_folder_sorts_and_skips() {
        let dir = tempdir().unwrap();

        let mut b = image::GrayImage::new(4, 3);
        b.put_pixel(1, 1, image::Luma([255]));
        b.save(dir.path().join("b.png")).unwrap();
        image::GrayImage::new(2, 2)
            .save(dir.path().join("a.png"))
            .unwrap();
        fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let layers = load_folder(&LoaderRegistry::new(), dir.path()).unwrap();

        let names: Vec<_> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(layers[1].width(), 4);
        assert_eq!(layers[1].height(), 3);
        assert!((layers[1].data[[1, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_folder_names_are_unique() {
        let dir = tempdir().unwrap();
        image::GrayImage::new(2, 2)
            .save(dir.path().join("well.png"))
            .unwrap();
        image::GrayImage::new(3, 3)
            .save(dir.path().join("well.tif"))
            .unwrap();
        image::GrayImage::new(4, 4)
            .save(dir.path().join("well.tif.png"))
            .unwrap();

        let layers = load_folder(&LoaderRegistry::new(), dir.path()).unwrap();

        let names: Vec<_> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["well", "well.tif", "well.tif.png"]);
        assert_eq!(layers[1].width(), 3);
    }

    #[test]
    fn test_load_missing_folder_fails() {
        let dir = tempdir().unwrap();
        assert!(load_folder(&LoaderRegistry::new(), &dir.path().join("missing")).is_err());
    }
}
