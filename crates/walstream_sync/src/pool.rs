//! Fixed-size worker pool.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool errors.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool has been freed.
    #[error("worker pool closed")]
    Closed,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Runs submitted jobs on a fixed number of named threads.
///
/// The queue is unbounded; `submit` never blocks. A panicking job is
/// logged and does not take its worker down. Jobs run in submission
/// order per worker but complete in no particular order across workers.
pub struct WorkerPool {
    name: String,
    size: usize,
    sender: Mutex<Option<Sender<Job>>>,
    queue: Receiver<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `size` workers named `{name}-{index}`.
    ///
    /// A `size` of zero is raised to one.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if the OS refuses a thread. Workers
    /// already started are shut down before returning.
    pub fn new(name: impl Into<String>, size: usize) -> Result<Self, PoolError> {
        let name = name.into();
        let size = size.max(1);
        let (tx, rx) = channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);

        for i in 0..size {
            let queue = rx.clone();
            let pool = name.clone();
            let spawned = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    for job in queue.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            warn!(pool = %pool, worker = i, "job panicked; worker continues");
                        }
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    drop(tx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        debug!(pool = %name, size, "worker pool started");
        Ok(Self {
            name,
            size,
            sender: Mutex::new(Some(tx)),
            queue: rx,
            workers: Mutex::new(workers),
        })
    }

    /// Queues a job.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] after [`WorkerPool::free`].
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(Box::new(job)).map_err(|_| PoolError::Closed),
            None => Err(PoolError::Closed),
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs queued but not yet picked up by a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns true once the pool refuses new jobs.
    #[must_use]
    pub fn is_freed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stops accepting jobs, lets queued jobs finish, and joins the workers.
    ///
    /// Idempotent. When called from one of the pool's own workers, that
    /// worker is left to exit on its own.
    pub fn free(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(pool = %self.name, "worker thread panicked");
            }
        }
        debug!(pool = %self.name, "worker pool freed");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.free();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn runs_every_job_before_free_returns() {
        let pool = WorkerPool::new("test", 4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let c = Arc::clone(&counter);
            pool.submit(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.free();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn submit_after_free_is_refused() {
        let pool = WorkerPool::new("test", 1).unwrap();
        pool.free();
        assert!(pool.is_freed());
        assert!(matches!(pool.submit(|| {}), Err(PoolError::Closed)));
    }

    #[test]
    fn concurrency_is_bounded_by_size() {
        let pool = WorkerPool::new("bounded", 2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.free();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn zero_size_is_raised_to_one() {
        let pool = WorkerPool::new("tiny", 0).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn workers_are_named() {
        let pool = WorkerPool::new("named", 1).unwrap();
        let (tx, rx) = channel::bounded(1);
        pool.submit(move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        })
        .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("named-0"));
    }

    #[test]
    fn panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new("sturdy", 1).unwrap();
        let (tx, rx) = channel::bounded(1);
        pool.submit(|| panic!("job failure")).unwrap();
        pool.submit(move || {
            let _ = tx.send(());
        })
        .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        pool.free();
    }
}
