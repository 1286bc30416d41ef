//! Export of per-image results.
//!
//! - `ResultHandler`: writes one text file per image into the output folder
//! - `FolderPicker`: how the output folder is chosen when prompting is on
//! - `summarize`: turns a segmentation result into a serializable summary

mod handler;
mod picker;
mod summary;

pub use handler::{OutputOutcome, ResultError, ResultHandler};
pub use picker::{DialogPicker, FolderPicker, NoPicker};
pub use summary::{ImageSummary, RegionSummary, summarize};
