//! Single-worker FIFO queue for background cache writes.

use std::sync::mpsc::{self, SendError, Sender};
use std::sync::Mutex;
use std::thread;

use tracing::{error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO job queue drained by exactly one background thread.
///
/// The host creates one queue and hands the same handle to every cache
/// manager, so writes from all managers complete in submission order and
/// "last write wins" reasoning about the index stays valid under concurrent
/// async saves. The worker thread is spawned lazily on the first submission
/// and lives for the queue's lifetime.
///
/// Jobs are never cancelled or timed out: a submitted write always runs, on
/// the worker when possible, inline on the submitting thread if the worker
/// cannot be spawned or has died.
pub struct WriteQueue {
    tx: Mutex<Option<Sender<Job>>>,
}

impl WriteQueue {
    /// Creates a queue with no worker thread yet.
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
        }
    }

    /// Submits a job to run after every previously submitted job.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut guard = self.tx.lock().unwrap();
        if guard.is_none() {
            *guard = spawn_worker();
        }

        let job: Job = Box::new(job);
        let job = match guard.take() {
            Some(tx) => match tx.send(job) {
                Ok(()) => {
                    *guard = Some(tx);
                    return;
                }
                Err(SendError(job)) => {
                    warn!("cache write worker is gone, running job inline");
                    job
                }
            },
            None => job,
        };

        // Degraded path: run on the caller's thread, outside the lock.
        drop(guard);
        job();
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_worker() -> Option<Sender<Job>> {
    let (tx, rx) = mpsc::channel::<Job>();
    let spawned = thread::Builder::new()
        .name("bytec-cache-writer".to_string())
        .spawn(move || {
            for job in rx {
                job();
            }
        });
    match spawned {
        Ok(_) => Some(tx),
        Err(source) => {
            error!(%source, "failed to spawn cache write worker");
            None
        }
    }
}
