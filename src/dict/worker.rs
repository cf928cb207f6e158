//! Bounded worker pool for lookups and index builds.
//!
//! Jobs go through a bounded crossbeam channel to a fixed set of threads.
//! Each job gets its own one-slot result channel, returned to the caller
//! as a [`Ticket`], and a [`CancelToken`] it is expected to check between
//! records. Cancellation is cooperative: a job that never checks its token
//! runs to completion.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use log::{debug, error, trace};

use crate::dict::types::error::{DictError, Result};

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DictError::Cancelled)
        } else {
            Ok(())
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct LookupPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl LookupPool {
    /// Starts `workers` threads sharing a queue of `queue_capacity` jobs.
    /// `submit` blocks while the queue is full.
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = bounded::<Job>(queue_capacity.max(1));
        let workers = (0..workers.max(1))
            .map(|id| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("lexivol-worker-{}", id))
                    .spawn(move || run_worker(id, receiver))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!("Could not spawn worker thread: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!("Worker pool started with {} threads", workers.len());
        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Queues `job`. The job is skipped, yielding `Err(Cancelled)`, if the
    /// token is already cancelled when a worker picks it up.
    pub fn submit<T, F>(&self, cancel: CancelToken, job: F) -> Result<Ticket<T>>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(DictError::PoolClosed)?;
        if self.workers.is_empty() {
            return Err(DictError::PoolClosed);
        }
        let (result_tx, result_rx) = bounded(1);
        let token = cancel.clone();
        let wrapped: Job = Box::new(move || {
            let result = match token.check() {
                Ok(()) => job(&token),
                Err(e) => Err(e),
            };
            // The ticket may already be gone.
            let _ = result_tx.send(result);
        });
        sender.send(wrapped).map_err(|_| DictError::PoolClosed)?;
        Ok(Ticket {
            receiver: result_rx,
            cancel,
        })
    }

    /// Stops accepting jobs and waits for queued ones to finish.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread panicked during shutdown");
            }
        }
        debug!("Worker pool shut down");
    }
}

impl Drop for LookupPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(id: usize, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        trace!("worker {} picked up a job", id);
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("worker {}: job panicked", id);
        }
    }
    trace!("worker {} exiting", id);
}

/// Pending result of a submitted job.
pub struct Ticket<T> {
    receiver: Receiver<Result<T>>,
    cancel: CancelToken,
}

impl<T> Ticket<T> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Blocks until the job finishes.
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|_| DictError::PoolClosed)?
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(DictError::PoolClosed)),
        }
    }

    /// The result if the job is done, without blocking.
    pub fn try_result(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(DictError::PoolClosed)),
        }
    }
}
