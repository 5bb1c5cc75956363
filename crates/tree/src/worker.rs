//! Runs tree jobs off the owning task

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::error;

use crate::job::{ListingJob, ListingOutcome, RenameJob, RenameOutcome, SweepJob, SweepOutcome};

/// Shared stop signal for long-running jobs
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs a listing on the blocking pool
pub async fn run_listing(job: ListingJob) -> ListingOutcome {
    let fallback = job.clone();
    match tokio::task::spawn_blocking(move || job.run()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Listing task for {} failed: {}", fallback.handle(), e);
            fallback.failed(io::Error::other(e))
        }
    }
}

/// Runs a rename on the blocking pool
pub async fn run_rename(job: RenameJob) -> RenameOutcome {
    let fallback = job.clone();
    match tokio::task::spawn_blocking(move || job.run()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Rename task for {} failed: {}", fallback.target(), e);
            fallback.failed(io::Error::other(e))
        }
    }
}

/// Runs a sweep on the blocking pool. A failed task finds nothing missing.
pub async fn run_sweep(job: SweepJob) -> SweepOutcome {
    match tokio::task::spawn_blocking(move || job.run()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Sweep task failed: {}", e);
            SweepOutcome::default()
        }
    }
}
