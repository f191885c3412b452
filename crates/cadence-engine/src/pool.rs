//! Background worker pool for spawned tasks.
//!
//! A fixed set of named threads pulls jobs from a shared unbounded
//! crossbeam channel. Dropping the sender closes the channel; each worker
//! finishes its current job and exits when the queue is empty.

use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};

use cadence_core::ContextError;

/// A unit of background work. Task jobs catch their own panics.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of named worker threads.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    thread_ids: Vec<ThreadId>,
}

impl WorkerPool {
    /// Spawn `count` workers named `{prefix}-{i}`.
    pub fn new(count: usize, prefix: &str) -> Result<Self, ContextError> {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{prefix}-{i}"))
                .spawn(move || worker_loop(rx))
                .map_err(|e| ContextError::ThreadSpawnFailed {
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }
        let thread_ids = workers.iter().map(|h| h.thread().id()).collect();
        log::debug!("worker pool started with {count} threads ({prefix}-*)");
        Ok(Self {
            tx: Some(tx),
            workers,
            thread_ids,
        })
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.thread_ids.len()
    }

    /// Ids of the worker threads, in spawn order.
    pub fn thread_ids(&self) -> &[ThreadId] {
        &self.thread_ids
    }

    /// Whether the pool still accepts jobs.
    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue a job. Gives the job back if the pool is shut down.
    pub(crate) fn execute(&self, job: Job) -> Result<(), Job> {
        match &self.tx {
            Some(tx) => tx.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    /// Close the queue and join every worker. Jobs already queued still
    /// run. Returns the number of workers joined cleanly.
    pub fn shutdown(&mut self) -> usize {
        self.tx.take();
        let mut joined = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        joined
    }

    /// Close the queue without waiting. Workers exit on their own once the
    /// queue is empty.
    pub fn detach(&mut self) {
        self.tx.take();
        self.workers.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

fn worker_loop(rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        job();
    }
}
