//! Fetch worker pool.
//!
//! - Fixed set of long-lived worker threads (2 by default, at most 4)
//! - Fire-and-forget submission, no per-job handles
//! - Uses flume as the job queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender};
use tracing::{debug, error, trace};

use crate::config::MAX_WORKERS;

/// How long an idle worker waits before re-checking the shutdown flag.
const IDLE_POLL_MS: u64 = 100;

/// A unit of blocking work run on a pool thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    /// Sender for new jobs. `None` once shut down.
    job_tx: Option<Sender<Job>>,
    /// Worker thread handles.
    workers: Vec<JoinHandle<()>>,
    /// Flag to signal workers to stop.
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Create a pool with `workers` threads, clamped to `1..=MAX_WORKERS`.
    pub fn new(workers: usize) -> Self {
        let num_workers = workers.clamp(1, MAX_WORKERS);

        let (job_tx, job_rx) = flume::unbounded::<Job>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut worker_handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let rx = job_rx.clone();
            let shutdown = Arc::clone(&shutdown);

            match thread::Builder::new()
                .name(format!("imgpeek-fetch-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, shutdown))
            {
                Ok(handle) => worker_handles.push(handle),
                Err(e) => error!(worker_id, error = ?e, "Failed to spawn fetch worker"),
            }
        }

        debug!(num_workers = worker_handles.len(), "Started fetch worker pool");

        Self {
            job_tx: Some(job_tx),
            workers: worker_handles,
            shutdown,
        }
    }

    /// Queue a job. Returns false if the pool is shut down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(tx) = self.job_tx.as_ref() else {
            return false;
        };
        match tx.send(Box::new(job)) {
            Ok(()) => true,
            Err(_) => {
                error!("Fetch queue disconnected");
                false
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs and wait for idle workers to exit.
    ///
    /// Jobs still queued are dropped. Workers blocked inside a transfer are
    /// detached rather than joined; they exit once their transfer ends.
    pub fn shutdown(&mut self) {
        debug!("Shutting down fetch worker pool");

        self.shutdown.store(true, Ordering::SeqCst);
        self.job_tx = None;

        for handle in self.workers.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.shutdown.load(Ordering::Relaxed) {
            self.shutdown();
        }
    }
}

/// Worker thread loop.
fn worker_loop(worker_id: usize, rx: Receiver<Job>, shutdown: Arc<AtomicBool>) {
    debug!(worker_id, "Fetch worker started");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match rx.recv_timeout(Duration::from_millis(IDLE_POLL_MS)) {
            Ok(job) => {
                trace!(worker_id, "Running fetch job");
                job();
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker_id, "Fetch worker stopped");
}
