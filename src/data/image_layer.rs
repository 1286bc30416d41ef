//! A loaded image as the viewer holds it.

use ndarray::Array2;

use crate::constants::DEFAULT_PIXEL_SCALE;

/// A named grayscale image.
///
/// Pixels are stored row-major as `(height, width)` and normalized to 0.0-1.0.
#[derive(Debug, Clone)]
pub struct ImageLayer {
    /// Layer name, used to key segmentation results
    pub name: String,
    /// Pixel intensities
    pub data: Array2<f32>,
    /// Physical size of one pixel as `[row, column]`, e.g. micrometres
    pub scale: [f64; 2],
}

impl ImageLayer {
    /// Create a layer with the default unit pixel scale.
    pub fn new(name: impl Into<String>, data: Array2<f32>) -> Self {
        Self {
            name: name.into(),
            data,
            scale: DEFAULT_PIXEL_SCALE,
        }
    }

    /// Set the physical pixel scale.
    pub fn with_scale(mut self, scale: [f64; 2]) -> Self {
        self.scale = scale;
        self
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}
