use crate::error::PipelineError;
use crate::request::GenerationRequest;
use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Output of one pipeline submission.
///
/// `all_prompts` and `infotexts` are parallel to `images`.
#[derive(Debug, Clone, Default)]
pub struct Processed {
    pub images: Vec<DynamicImage>,
    pub all_prompts: Vec<String>,
    pub infotexts: Vec<String>,
}

/// Something that turns a generation request into images.
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    async fn process_images(&self, request: &GenerationRequest)
        -> Result<Processed, PipelineError>;
}

/// Snapshot passed to a [`ProgressReporter`] before each job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    /// 1-based index of the job about to run.
    pub job_no: usize,
    pub job_count: usize,
    pub label: String,
    pub iterations_total: u32,
}

/// Receives job-boundary progress from the run driver.
pub trait ProgressReporter: Send + Sync {
    fn run_started(&self, _job_count: usize, _iterations_total: u32) {}

    fn job_started(&self, progress: &RunProgress);
}

/// Writes progress to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn run_started(&self, job_count: usize, iterations_total: u32) {
        log::info!(
            "Will process {} suffixes in {} jobs.",
            job_count,
            iterations_total
        );
    }

    fn job_started(&self, progress: &RunProgress) {
        log::info!(
            "{} out of {}: {}",
            progress.job_no,
            progress.job_count,
            progress.label
        );
    }
}

/// Counters another task can poll while a run is in flight.
#[derive(Debug, Clone, Default)]
pub struct SharedProgress {
    job_no: Arc<AtomicUsize>,
    job_count: Arc<AtomicUsize>,
    iterations_total: Arc<AtomicU32>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(current job, total jobs)`; the current job is 0 before the first one.
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.job_no.load(Ordering::Relaxed),
            self.job_count.load(Ordering::Relaxed),
        )
    }

    /// Iterations the whole run will submit, as announced at run start.
    pub fn iterations_total(&self) -> u32 {
        self.iterations_total.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for SharedProgress {
    fn run_started(&self, job_count: usize, iterations_total: u32) {
        self.job_no.store(0, Ordering::Relaxed);
        self.job_count.store(job_count, Ordering::Relaxed);
        self.iterations_total.store(iterations_total, Ordering::Relaxed);
    }

    fn job_started(&self, progress: &RunProgress) {
        self.job_count.store(progress.job_count, Ordering::Relaxed);
        self.iterations_total
            .store(progress.iterations_total, Ordering::Relaxed);
        self.job_no.store(progress.job_no, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_progress_tracks_job_boundaries() {
        let progress = SharedProgress::new();
        let poller = progress.clone();
        assert_eq!(poller.iterations_total(), 0);
        progress.run_started(3, 6);
        assert_eq!(poller.snapshot(), (0, 3));
        assert_eq!(poller.iterations_total(), 6);

        progress.job_started(&RunProgress {
            job_no: 2,
            job_count: 3,
            label: "joy".to_string(),
            iterations_total: 6,
        });
        assert_eq!(poller.snapshot(), (2, 3));
        assert_eq!(poller.iterations_total(), 6);
    }
}
