//! Bounded worker pool for segmenting many images.
//!
//! Jobs go out on a shared job channel, workers pull from it until it is
//! drained, and every job comes back as exactly one `Delivered` or `Failed`
//! event on a fan-in event channel. All bookkeeping (job states, progress,
//! the live worker set) happens on the thread that owns the `DispatchRun`,
//! so no locking is needed.
//!
//! Running jobs cannot be cancelled and inference calls have no timeout.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use ndarray::Array2;

use super::job::{DispatchEvent, JobState, Progress, SegmentationJob, SegmentationResult};
use super::model::{InferenceError, SegmentationModel};
use crate::config::ModelConfig;
use crate::data::ImageLayer;
use crate::viewer::ViewerHost;

/// Errors that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Not a single worker thread could be spawned
    #[error("Failed to spawn segmentation worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Number of jobs in the run
    pub total: usize,
    /// Names of images that produced a mask, in completion order
    pub delivered: Vec<String>,
    /// Names of images that failed, with the error message
    pub failed: Vec<(String, String)>,
}

/// Spawns segmentation runs on a bounded pool of worker threads.
pub struct Dispatcher {
    model: Arc<dyn SegmentationModel>,
    max_workers: usize,
}

impl Dispatcher {
    /// Create a dispatcher. `max_workers == 0` uses one worker per available CPU.
    pub fn new(model: Arc<dyn SegmentationModel>, max_workers: usize) -> Self {
        Self { model, max_workers }
    }

    /// Change the worker bound for subsequent runs.
    pub fn set_max_workers(&mut self, max_workers: usize) {
        self.max_workers = max_workers;
    }

    /// Name of the model jobs are sent to.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Number of workers a run with `jobs` jobs will use.
    pub fn worker_count(&self, jobs: usize) -> usize {
        let bound = if self.max_workers == 0 {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.max_workers
        };
        bound.min(jobs).max(1)
    }

    /// Start a run. Workers begin immediately; poll or drain the returned run.
    ///
    /// Job ids are reassigned to each job's position in `jobs`, so events and
    /// results carry ids in `0..jobs.len()`.
    pub fn spawn(&self, mut jobs: Vec<SegmentationJob>) -> Result<DispatchRun, DispatchError> {
        for (index, job) in jobs.iter_mut().enumerate() {
            if job.id != index {
                log::debug!("Renumbering job '{}' from {} to {}", job.name, job.id, index);
                job.id = index;
            }
        }
        let total = jobs.len();
        let worker_count = self.worker_count(total);
        let names: Vec<String> = jobs.iter().map(|job| job.name.clone()).collect();

        let (job_tx, job_rx) = unbounded::<SegmentationJob>();
        let (event_tx, event_rx) = unbounded::<DispatchEvent>();

        for job in jobs {
            // The receiver is alive, so this cannot fail
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let model = Arc::clone(&self.model);
            let jobs = job_rx.clone();
            let events = event_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("segment-{}", index))
                .spawn(move || worker_loop(model, jobs, events));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) if workers.is_empty() => return Err(DispatchError::Spawn(e)),
                Err(e) => {
                    log::warn!("Could only spawn {} of {} workers: {}", index, worker_count, e);
                    break;
                }
            }
        }

        log::info!(
            "Dispatched {} segmentation jobs to {} workers using model '{}'",
            total,
            workers.len(),
            self.model.name()
        );

        Ok(DispatchRun {
            event_rx,
            workers,
            states: vec![JobState::Pending; total],
            names,
            progress: Progress::new(total),
            orphaned: VecDeque::new(),
        })
    }

    /// Segment `images` with one shared config and pixel scale, reporting to `host`.
    pub fn run_all<H: ViewerHost + ?Sized>(
        &self,
        images: Vec<(String, Array2<f32>)>,
        config: &ModelConfig,
        scale: [f64; 2],
        host: &mut H,
    ) -> Result<RunSummary, DispatchError> {
        let jobs = images
            .into_iter()
            .enumerate()
            .map(|(id, (name, pixels))| SegmentationJob {
                id,
                name,
                pixels,
                config: config.clone(),
                scale,
            })
            .collect();
        self.run_jobs(jobs, host)
    }

    /// Segment image layers, each keeping its own pixel scale.
    pub fn run_layers<H: ViewerHost + ?Sized>(
        &self,
        layers: &[ImageLayer],
        config: &ModelConfig,
        host: &mut H,
    ) -> Result<RunSummary, DispatchError> {
        let jobs = layers
            .iter()
            .enumerate()
            .map(|(id, layer)| SegmentationJob {
                id,
                name: layer.name.clone(),
                pixels: layer.data.clone(),
                config: config.clone(),
                scale: layer.scale,
            })
            .collect();
        self.run_jobs(jobs, host)
    }

    /// Run jobs to completion, delivering results to `host` on this thread.
    ///
    /// An empty job list only notifies the host. Otherwise the host is marked
    /// busy until every job has been delivered or has failed.
    pub fn run_jobs<H: ViewerHost + ?Sized>(
        &self,
        jobs: Vec<SegmentationJob>,
        host: &mut H,
    ) -> Result<RunSummary, DispatchError> {
        if jobs.is_empty() {
            host.notify("No images loaded, nothing to segment");
            return Ok(RunSummary::default());
        }

        let total = jobs.len();
        host.set_busy(true);
        host.set_progress(Progress::new(total));

        let mut run = match self.spawn(jobs) {
            Ok(run) => run,
            Err(e) => {
                host.set_busy(false);
                return Err(e);
            }
        };

        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };

        while let Some(event) = run.next_event() {
            match event {
                DispatchEvent::Started { name, .. } => {
                    log::debug!("Segmentation of '{}' started", name);
                }
                DispatchEvent::Delivered(result) => {
                    summary.delivered.push(result.name.clone());
                    host.add_labels(result);
                    host.set_progress(run.progress());
                }
                DispatchEvent::Failed { name, error, .. } => {
                    summary.failed.push((name, error));
                    host.set_progress(run.progress());
                }
            }
        }

        host.set_busy(false);
        log::info!(
            "Segmentation finished: {} delivered, {} failed",
            summary.delivered.len(),
            summary.failed.len()
        );
        Ok(summary)
    }
}

/// Worker body: pull jobs until the job channel is drained.
fn worker_loop(
    model: Arc<dyn SegmentationModel>,
    jobs: Receiver<SegmentationJob>,
    events: Sender<DispatchEvent>,
) {
    let thread_name = thread::current().name().unwrap_or("segment").to_string();
    log::debug!("Thread {}: started", thread_name);

    for job in jobs.iter() {
        let started = DispatchEvent::Started {
            job_id: job.id,
            name: job.name.clone(),
        };
        if events.send(started).is_err() {
            break;
        }

        log::debug!("Thread {}: segmenting '{}'", thread_name, job.name);
        let event = match run_job(model.as_ref(), &job) {
            Ok(result) => {
                log::debug!(
                    "Thread {}: '{}' done, {} regions",
                    thread_name,
                    job.name,
                    result.region_count()
                );
                DispatchEvent::Delivered(result)
            }
            Err(e) => {
                log::error!("Thread {}: segmentation of '{}' failed: {}", thread_name, job.name, e);
                DispatchEvent::Failed {
                    job_id: job.id,
                    name: job.name,
                    error: e.to_string(),
                }
            }
        };

        if events.send(event).is_err() {
            log::warn!("Thread {}: event channel closed, exiting", thread_name);
            break;
        }
    }

    log::debug!("Thread {}: exiting", thread_name);
}

/// Call the model once, turning panics and shape errors into `InferenceError`.
fn run_job(
    model: &dyn SegmentationModel,
    job: &SegmentationJob,
) -> Result<SegmentationResult, InferenceError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        model.predict(job.pixels.view(), &job.config)
    }));

    let mask = match outcome {
        Ok(result) => result?,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            return Err(InferenceError::Panicked(message));
        }
    };

    if mask.dim() != job.pixels.dim() {
        return Err(InferenceError::ShapeMismatch {
            image: job.pixels.dim(),
            mask: mask.dim(),
        });
    }

    Ok(SegmentationResult {
        job_id: job.id,
        name: job.name.clone(),
        mask,
        scale: job.scale,
    })
}

/// A run in flight.
///
/// Owned by the coordinating thread. Events are pulled either without
/// blocking ([`try_next`](Self::try_next), for UI loops) or blocking
/// ([`next_event`](Self::next_event)). The run is done once every job has
/// reached a terminal state.
pub struct DispatchRun {
    event_rx: Receiver<DispatchEvent>,
    /// Live workers; finished ones are joined and removed as events arrive
    workers: Vec<JoinHandle<()>>,
    states: Vec<JobState>,
    names: Vec<String>,
    progress: Progress,
    /// Failure events for jobs whose worker vanished without reporting
    orphaned: VecDeque<DispatchEvent>,
}

impl DispatchRun {
    /// Take one event if available. Never blocks.
    pub fn try_next(&mut self) -> Option<DispatchEvent> {
        if let Some(event) = self.take_orphaned() {
            return Some(event);
        }
        if self.is_done() {
            return None;
        }
        match self.event_rx.try_recv() {
            Ok(event) => Some(self.record(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.orphan_unfinished();
                self.take_orphaned()
            }
        }
    }

    /// Wait for the next event. Returns `None` once the run is done.
    pub fn next_event(&mut self) -> Option<DispatchEvent> {
        if let Some(event) = self.take_orphaned() {
            return Some(event);
        }
        if self.is_done() {
            self.reap_workers(true);
            return None;
        }
        match self.event_rx.recv() {
            Ok(event) => Some(self.record(event)),
            Err(_) => {
                self.orphan_unfinished();
                self.take_orphaned()
            }
        }
    }

    /// Drain the run and return the delivered results. Failures are logged.
    pub fn collect_results(mut self) -> Vec<SegmentationResult> {
        let mut results = Vec::new();
        while let Some(event) = self.next_event() {
            if let DispatchEvent::Delivered(result) = event {
                results.push(result);
            }
        }
        results
    }

    /// Current progress.
    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Whether every job has been delivered or has failed.
    pub fn is_done(&self) -> bool {
        self.progress.is_complete() && self.orphaned.is_empty()
    }

    /// States of all jobs, indexed by job id.
    pub fn states(&self) -> &[JobState] {
        &self.states
    }

    /// Number of worker threads not yet released.
    pub fn live_workers(&self) -> usize {
        self.workers.len()
    }

    fn take_orphaned(&mut self) -> Option<DispatchEvent> {
        let event = self.orphaned.pop_front()?;
        Some(self.record(event))
    }

    fn record(&mut self, event: DispatchEvent) -> DispatchEvent {
        let id = event.job_id();
        let next_state = match &event {
            DispatchEvent::Started { .. } => JobState::Running,
            DispatchEvent::Delivered(_) => JobState::Delivered,
            DispatchEvent::Failed { .. } => JobState::Failed,
        };
        if let Some(state) = self.states.get_mut(id) {
            if !state.is_terminal() {
                *state = next_state;
                if next_state.is_terminal() {
                    self.progress.advance();
                }
            }
        } else {
            log::warn!("Event for unknown job {}", id);
        }
        // Once every job is terminal the job channel is drained and the
        // remaining workers are only exiting.
        self.reap_workers(self.is_done());
        event
    }

    /// Join finished workers. With `all`, wait for every worker.
    fn reap_workers(&mut self, all: bool) {
        let mut live = Vec::with_capacity(self.workers.len());
        for handle in self.workers.drain(..) {
            if all || handle.is_finished() {
                if let Err(e) = handle.join() {
                    log::warn!("Segmentation worker panicked: {:?}", e);
                }
            } else {
                live.push(handle);
            }
        }
        self.workers = live;
    }

    fn orphan_unfinished(&mut self) {
        for (id, state) in self.states.iter().enumerate() {
            if !state.is_terminal() {
                log::error!("Worker exited without reporting on '{}'", self.names[id]);
                self.orphaned.push_back(DispatchEvent::Failed {
                    job_id: id,
                    name: self.names[id].clone(),
                    error: "worker exited without reporting a result".to_string(),
                });
            }
        }
    }
}

impl Drop for DispatchRun {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            log::debug!("Waiting for {} segmentation workers", self.workers.len());
        }
        self.reap_workers(true);
    }
}
