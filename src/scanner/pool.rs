//! Fixed-size pool of named worker threads.

use crate::core::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Workers compete for jobs on one shared channel.
pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers named `{name}-{i}`.
    pub fn new(name: &str, size: usize) -> Result<Self> {
        let size = size.max(1);
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for idx in 0..size {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, idx))
                .spawn(move || worker_loop(rx))
                .map_err(|e| Error::Internal(format!("Failed to spawn worker thread: {}", e)))?;
            workers.push(handle);
        }

        log::debug!("Started worker pool '{}' with {} threads", name, size);

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(tx)),
            workers,
        })
    }

    /// Queue a job. Fails once the pool has been shut down.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let shutdown = || Error::PoolShutdown {
            context: self.name.clone(),
        };
        match sender.as_ref() {
            Some(tx) => tx.send(Box::new(job)).map_err(|_| shutdown()),
            None => Err(shutdown()),
        }
    }

    /// Stop accepting jobs. Queued jobs still run.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(rx: Receiver<Job>) {
    for job in rx.iter() {
        job();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("Worker in pool '{}' panicked", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_runs_all_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new("test-pool", 3).unwrap();
            for _ in 0..100 {
                let c = Arc::clone(&counter);
                pool.execute(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_workers_take_jobs_concurrently() {
        let pool = WorkerPool::new("test-pool", 3).unwrap();
        let barrier = Arc::new(Barrier::new(4));
        for _ in 0..3 {
            let b = Arc::clone(&barrier);
            pool.execute(move || {
                b.wait();
            })
            .unwrap();
        }
        // Returns only if all three jobs are running at the same time.
        barrier.wait();
    }

    #[test]
    fn test_queued_jobs_drain_after_close() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new("test-pool", 2).unwrap();
            for _ in 0..20 {
                let c = Arc::clone(&counter);
                pool.execute(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
            pool.close();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_execute_after_close_fails() {
        let pool = WorkerPool::new("test-pool", 1).unwrap();
        pool.close();
        let err = pool.execute(|| {}).unwrap_err();
        assert!(matches!(err, Error::PoolShutdown { .. }));
    }

    #[test]
    fn test_zero_size_gets_one_worker() {
        let pool = WorkerPool::new("test-pool", 0).unwrap();
        assert_eq!(pool.size(), 1);
    }
}
