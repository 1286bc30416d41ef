//! Segmentation of loaded images.
//!
//! - `SegmentationModel`: the black-box inference boundary
//! - `ThresholdSegmenter`: built-in reference model (Otsu threshold + connected components)
//! - `Dispatcher`: bounded worker pool that runs one job per image and reports
//!   results over a channel to the coordinating thread

mod dispatcher;
mod job;
mod model;
mod threshold;

pub use dispatcher::{DispatchError, DispatchRun, Dispatcher, RunSummary};
pub use job::{DispatchEvent, JobState, Progress, SegmentationJob, SegmentationResult};
pub use model::{InferenceError, LabelMask, SegmentationModel, region_count};
pub use threshold::ThresholdSegmenter;
