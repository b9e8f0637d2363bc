// Units of concurrency for accepted sessions

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crate::common::error::{Error, Result};

/// A session, ready to run to completion
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where the acceptor hands off each accepted connection.
///
/// `spawn` must not wait for the job to finish.
pub trait SessionSpawner: Send {
    fn spawn(&self, job: Job) -> Result<()>;
}

/// One detached OS thread per session
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPerConnection;

impl SessionSpawner for ThreadPerConnection {
    fn spawn(&self, job: Job) -> Result<()> {
        thread::Builder::new()
            .name("ftpx-session".to_string())
            .spawn(job)?;
        Ok(())
    }
}

/// Fixed set of worker threads fed from a shared queue.
///
/// At most `size` sessions run at once; further connections wait in the
/// queue. Dropping the pool closes the queue and leaves queued and running
/// sessions to finish on their own.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::ConfigError("worker pool size must be at least 1".to_string()));
        }

        // unbounded so the acceptor never waits on a busy pool
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("ftpx-worker-{}", id))
                .spawn(move || worker_loop(id, receiver))?;
            workers.push(handle);
        }

        log::info!("Worker pool started with {} threads", size);
        Ok(Self { sender: Some(sender), workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and wait for every worker to drain it
    pub fn join(mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(id: usize, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!("Worker {}: session panicked", id);
        }
    }
    log::debug!("Worker {} exiting", id);
}

impl SessionSpawner for WorkerPool {
    fn spawn(&self, job: Job) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::ConfigError("worker pool is shut down".to_string()))?;
        sender
            .send(job)
            .map_err(|_| Error::ConfigError("worker pool is shut down".to_string()))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
    }
}
