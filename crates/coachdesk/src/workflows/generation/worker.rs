use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::queue::GenerationQueue;
use super::store::JobStore;

/// Fixed-size set of tokio tasks pulling jobs from a shared queue.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<S>(queue: Arc<GenerationQueue<S>>, size: usize, poll_interval: Duration) -> Self
    where
        S: JobStore + 'static,
    {
        let (shutdown, signal) = watch::channel(false);
        let size = size.max(1);
        let handles = (0..size)
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let signal = signal.clone();
                tokio::spawn(run_worker(worker, queue, poll_interval, signal))
            })
            .collect();

        info!(workers = size, "generation worker pool started");
        Self { shutdown, handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stop taking new jobs and wait for in-progress ones to finish.
    pub async fn shutdown(self) {
        // Receivers live in the worker tasks, so a send error only means they already exited.
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "generation worker panicked");
            }
        }
        info!("generation worker pool stopped");
    }
}

async fn run_worker<S>(
    worker: usize,
    queue: Arc<GenerationQueue<S>>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: JobStore + 'static,
{
    debug!(worker, "generation worker started");
    while !*shutdown.borrow() {
        // A panic outside the attempt itself must not cost the pool a worker.
        match AssertUnwindSafe(queue.run_next()).catch_unwind().await {
            Ok(Ok(Some(outcome))) => {
                debug!(worker, ?outcome, "generation job handled");
                continue;
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => {
                error!(worker, error = %err, "generation worker could not reach the job store")
            }
            Err(_) => error!(worker, "generation worker recovered from a panic"),
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = queue.wait_for_work() => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    debug!(worker, "generation worker stopped");
}
