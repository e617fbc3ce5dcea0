//! Fixed-size pool of decode threads fed through a bounded channel.
use crossbeam_channel::{Sender, TrySendError, bounded};
use std::thread;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct DecodePool {
    tx: Sender<Job>,
    workers: usize,
}

impl DecodePool {
    /// Spawn `workers` threads. Threads exit once the pool is dropped and the
    /// queue drains.
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let (tx, rx) = bounded::<Job>(queue_depth.max(1));
        let mut spawned = 0;
        for index in 0..workers.max(1) {
            let rx = rx.clone();
            let builder = thread::Builder::new().name(format!("decode-{index}"));
            match builder.spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
                debug!("decode worker exiting");
            }) {
                Ok(_) => spawned += 1,
                Err(err) => warn!("failed to spawn decode worker {index}: {err}"),
            }
        }
        Self {
            tx,
            workers: spawned,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue `job` without blocking. Returns false when the queue is full or no
    /// worker is alive.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        if self.workers == 0 {
            return false;
        }
        match self.tx.try_send(Box::new(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("decode queue full; dropping job");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
