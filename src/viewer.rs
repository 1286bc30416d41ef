//! The host viewer boundary.
//!
//! The segmentation pipeline only needs a handful of things from whatever
//! displays the images: the loaded image layers, a place to put label
//! layers, and a progress indicator plus run-button state. `ViewerHost`
//! captures exactly that; `LayerStack` is the in-memory host used by the
//! command line front end and the tests.

use crate::data::ImageLayer;
use crate::segmentation::{Progress, SegmentationResult};

/// Capabilities consumed from the host viewer.
pub trait ViewerHost {
    /// Image layers currently loaded.
    fn image_layers(&self) -> &[ImageLayer];

    /// Add a loaded image layer.
    fn add_image(&mut self, layer: ImageLayer);

    /// Label layers produced so far.
    fn label_layers(&self) -> &[SegmentationResult];

    /// Add a labeled-region layer for a segmentation result.
    fn add_labels(&mut self, result: SegmentationResult);

    /// Update the progress indicator.
    fn set_progress(&mut self, progress: Progress);

    /// Disable (`true`) or re-enable the action that started a run.
    fn set_busy(&mut self, busy: bool);

    /// Show a non-fatal notice to the user.
    fn notify(&mut self, message: &str);
}

/// In-memory viewer state.
#[derive(Debug, Default)]
pub struct LayerStack {
    images: Vec<ImageLayer>,
    labels: Vec<SegmentationResult>,
    progress: Progress,
    busy: bool,
    notices: Vec<String>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label layer for an image, if one was produced.
    pub fn labels_for(&self, image_name: &str) -> Option<&SegmentationResult> {
        self.labels.iter().find(|r| r.name == image_name)
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Notices shown so far, oldest first.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }
}

impl ViewerHost for LayerStack {
    fn image_layers(&self) -> &[ImageLayer] {
        &self.images
    }

    fn add_image(&mut self, layer: ImageLayer) {
        if let Some(existing) = self.images.iter_mut().find(|l| l.name == layer.name) {
            log::debug!("Replacing image layer '{}'", layer.name);
            *existing = layer;
        } else {
            self.images.push(layer);
        }
    }

    fn label_layers(&self) -> &[SegmentationResult] {
        &self.labels
    }

    /// A rerun replaces the earlier labels for the same image.
    fn add_labels(&mut self, result: SegmentationResult) {
        if let Some(existing) = self.labels.iter_mut().find(|r| r.name == result.name) {
            *existing = result;
        } else {
            self.labels.push(result);
        }
    }

    fn set_progress(&mut self, progress: Progress) {
        log::trace!(
            "Progress {}/{} ({:.0}%)",
            progress.completed,
            progress.total,
            progress.fraction() * 100.0
        );
        self.progress = progress;
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    fn notify(&mut self, message: &str) {
        log::info!("{}", message);
        self.notices.push(message.to_string());
    }
}
