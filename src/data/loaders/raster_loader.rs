//! Loader for standard raster formats (PNG, JPEG, BMP, TIFF, WebP).
//!
//! Multi-channel images are reduced to luminance.

use ndarray::Array2;

use crate::data::loader::{ImageLoader, LoaderError};

/// Loader for standard raster image formats.
pub struct RasterLoader;

impl ImageLoader for RasterLoader {
    fn id(&self) -> &'static str {
        "raster"
    }

    fn display_name(&self) -> &'static str {
        "Raster Image"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "webp"]
    }

    fn can_load(&self, data: &[u8]) -> bool {
        if data.len() < 8 {
            return false;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return true;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return true;
        }

        // BMP: 42 4D (BM)
        if data.starts_with(&[0x42, 0x4D]) {
            return true;
        }

        // TIFF: 49 49 2A 00 (little endian) or 4D 4D 00 2A (big endian)
        if data.starts_with(&[0x49, 0x49, 0x2A, 0x00])
            || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
        {
            return true;
        }

        // WebP: RIFF....WEBP
        data.len() >= 12 && data.starts_with(&[0x52, 0x49, 0x46, 0x46]) && &data[8..12] == b"WEBP"
    }

    fn load(&self, data: &[u8]) -> Result<Array2<f32>, LoaderError> {
        let img = image::load_from_memory(data)
            .map_err(|e| LoaderError::new(format!("Failed to decode image: {}", e)))?
            .to_luma32f();

        let width = img.width() as usize;
        let height = img.height() as usize;

        log::trace!("RasterLoader: loaded {}x{} image", width, height);

        Array2::from_shape_vec((height, width), img.into_raw())
            .map_err(|e| LoaderError::new(format!("Unexpected pixel buffer size: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_metadata() {
        let loader = RasterLoader;
        assert_eq!(loader.id(), "raster");
        assert!(loader.extensions().contains(&"tif"));
        assert_eq!(loader.priority(), 0);
    }

    #[test]
    fn test_magic_detection() {
        let loader = RasterLoader;
        let png_magic = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let tiff_magic = [0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        let random_data = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        assert!(loader.can_load(&png_magic));
        assert!(loader.can_load(&tiff_magic));
        assert!(!loader.can_load(&random_data));
    }

    #[test]
    fn test_load_png_shape() {
        let mut img = image::GrayImage::new(5, 2);
        img.put_pixel(4, 1, image::Luma([255]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();

        let array = RasterLoader.load(&bytes).unwrap();

        assert_eq!(array.dim(), (2, 5));
        assert!((array[[1, 4]] - 1.0).abs() < 1e-6);
        assert_eq!(array[[0, 0]], 0.0);
    }
}
