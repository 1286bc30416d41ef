//! The segmentation model boundary.

use ndarray::{Array2, ArrayView2};

use crate::config::ModelConfig;

/// Labeled region mask: 0 is background, regions are numbered from 1.
pub type LabelMask = Array2<u32>;

/// Errors raised by a model while segmenting one image.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// The image has no pixels
    #[error("Image is empty")]
    EmptyImage,

    /// The requested execution device is not available
    #[error("GPU inference is not supported by the {0} model")]
    GpuUnavailable(&'static str),

    /// The model returned a mask whose shape differs from the image
    #[error("Mask shape {mask:?} does not match image shape {image:?}")]
    ShapeMismatch {
        image: (usize, usize),
        mask: (usize, usize),
    },

    /// The model panicked
    #[error("Model panicked: {0}")]
    Panicked(String),

    /// Any other failure reported by the model backend
    #[error("{0}")]
    Backend(String),
}

/// A pretrained model that maps an image to a labeled region mask.
///
/// Implementations are shared between worker threads and must not rely on
/// being called from any particular thread.
pub trait SegmentationModel: Send + Sync {
    /// Short model name for logs.
    fn name(&self) -> &str;

    /// Segment one `(height, width)` image.
    fn predict(
        &self,
        image: ArrayView2<'_, f32>,
        config: &ModelConfig,
    ) -> Result<LabelMask, InferenceError>;
}

/// Number of distinct regions in a mask with contiguous labels.
pub fn region_count(mask: &LabelMask) -> u32 {
    mask.iter().copied().max().unwrap_or(0)
}
