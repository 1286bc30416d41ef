//! Units of segmentation work and the events they produce.

use ndarray::Array2;

use super::model::{LabelMask, region_count};
use crate::config::ModelConfig;

/// One image waiting to be segmented.
#[derive(Debug, Clone)]
pub struct SegmentationJob {
    /// Position of the job within its run
    pub id: usize,
    /// Name of the source image layer
    pub name: String,
    /// Pixel intensities, `(height, width)`
    pub pixels: Array2<f32>,
    /// Model parameters for this job
    pub config: ModelConfig,
    /// Physical pixel scale carried over to the result
    pub scale: [f64; 2],
}

/// The labeled mask produced by a successful job.
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub job_id: usize,
    /// Name of the source image layer
    pub name: String,
    /// Region labels with the same shape as the source image
    pub mask: LabelMask,
    /// Physical pixel scale of the source image
    pub scale: [f64; 2],
}

impl SegmentationResult {
    /// Number of labeled regions.
    pub fn region_count(&self) -> u32 {
        region_count(&self.mask)
    }
}

/// Lifecycle of a job: `Pending -> Running -> {Delivered, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Delivered,
    Failed,
}

impl JobState {
    /// Delivered and Failed are final; jobs are never retried.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Delivered | JobState::Failed)
    }
}

/// Message sent from a worker to the coordinating thread.
#[derive(Debug)]
pub enum DispatchEvent {
    /// A worker picked up the job
    Started { job_id: usize, name: String },
    /// The job produced a mask
    Delivered(SegmentationResult),
    /// The model failed on this job
    Failed {
        job_id: usize,
        name: String,
        error: String,
    },
}

impl DispatchEvent {
    /// Job the event belongs to.
    pub fn job_id(&self) -> usize {
        match self {
            DispatchEvent::Started { job_id, .. } | DispatchEvent::Failed { job_id, .. } => *job_id,
            DispatchEvent::Delivered(result) => result.job_id,
        }
    }
}

/// Finished jobs out of the total, bounded by `[0, total]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
        }
    }

    /// Count one more finished job, saturating at `total`.
    pub fn advance(&mut self) {
        self.completed = (self.completed + 1).min(self.total);
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Completion as a fraction in `0.0..=1.0`. An empty run is complete.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f32 / self.total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_saturates() {
        let mut progress = Progress::new(2);
        assert_eq!(progress.fraction(), 0.0);
        progress.advance();
        progress.advance();
        progress.advance();
        assert_eq!(progress.completed, 2);
        assert!(progress.is_complete());
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Delivered.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }
}
