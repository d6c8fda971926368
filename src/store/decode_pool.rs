//! REMNANT - Background Decode Pool
//! Fans decode work for one scan out to a fixed set of worker threads,
//! with a single blocking join point.
//!
//! ## Model
//! - Workers are spawned lazily, one per deferred submit, up to `max_workers`.
//!   A scan that only ever runs work inline starts no threads at all.
//! - `drain()` blocks until every submitted job has finished, or until the
//!   scan's [`Interrupter`] fires.
//! - The first failing job wins. Jobs still queued after a failure or an
//!   interrupt are dropped without running.
//! - Dropping the pool closes the queue and joins every worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{RemnantError, Result};

/// A unit of decode work.
pub type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// How often a blocked `drain()` re-checks its interrupter.
const INTERRUPT_POLL: Duration = Duration::from_millis(5);

/// Cloneable cancellation handle for one scan.
#[derive(Clone, Default)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the scan to stop. A blocked `drain()` returns `Interrupted` shortly after.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct DrainState {
    outstanding: usize,
    failure: Option<RemnantError>,
}

struct Shared {
    state: Mutex<DrainState>,
    idle: Condvar,
    interrupter: Interrupter,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DrainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_skip(&self) -> bool {
        self.interrupter.is_interrupted() || self.lock().failure.is_some()
    }

    /// Run a job, turning a panic into an error.
    fn execute(&self, job: Job) -> Result<()> {
        if self.should_skip() {
            return Ok(());
        }
        panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
            Err(RemnantError::Interrupted("decode task panicked".to_string()))
        })
    }

    fn record(&self, state: &mut DrainState, outcome: Result<()>) {
        if let Err(e) = outcome {
            if state.failure.is_none() {
                state.failure = Some(e);
            }
        }
    }

    fn finish_queued(&self, outcome: Result<()>) {
        let mut state = self.lock();
        self.record(&mut state, outcome);
        state.outstanding -= 1;
        if state.outstanding == 0 {
            self.idle.notify_all();
        }
    }
}

/// Bounded worker pool scoped to a single scan.
pub struct DecodePool {
    max_workers: usize,
    sender: Option<Sender<Job>>,
    receiver: Arc<Mutex<Receiver<Job>>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl DecodePool {
    /// Create a pool that will use at most `max_workers` threads.
    pub fn new(max_workers: usize) -> Self {
        Self::with_interrupter(max_workers, Interrupter::new())
    }

    /// Create a pool whose `drain()` reacts to `interrupter`.
    pub fn with_interrupter(max_workers: usize, interrupter: Interrupter) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            max_workers: max_workers.max(1),
            sender: Some(sender),
            receiver: Arc::new(Mutex::new(receiver)),
            workers: Vec::new(),
            shared: Arc::new(Shared {
                state: Mutex::new(DrainState::default()),
                idle: Condvar::new(),
                interrupter,
            }),
        }
    }

    /// Number of worker threads started so far.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job` for a worker thread.
    pub fn submit(&mut self, job: Job) {
        if self.workers.len() < self.max_workers
            && !self.spawn_worker()
            && self.workers.is_empty()
        {
            // No thread to hand it to.
            self.run_inline(job);
            return;
        }

        let Some(sender) = self.sender.as_ref() else {
            self.run_inline(job);
            return;
        };
        self.shared.lock().outstanding += 1;
        if let Err(mpsc::SendError(job)) = sender.send(job) {
            // Every worker is gone; undo the count and do it here.
            self.shared.lock().outstanding -= 1;
            self.run_inline(job);
        }
    }

    /// Run `job` on the calling thread. Its outcome is reported by `drain()`.
    pub fn run_inline(&self, job: Job) {
        let outcome = self.shared.execute(job);
        let mut state = self.shared.lock();
        self.shared.record(&mut state, outcome);
    }

    /// Block until all submitted work has completed.
    ///
    /// Returns the first job failure, or `Interrupted` if the interrupter fired
    /// while waiting.
    pub fn drain(&self) -> Result<()> {
        let mut state = self.shared.lock();
        while state.outstanding > 0 && !self.shared.interrupter.is_interrupted() {
            state = self
                .shared
                .idle
                .wait_timeout(state, INTERRUPT_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if self.shared.interrupter.is_interrupted() {
            return Err(RemnantError::Interrupted(format!(
                "interrupted while decoding ({} tasks outstanding)",
                state.outstanding
            )));
        }
        match state.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn spawn_worker(&mut self) -> bool {
        let id = self.workers.len();
        let receiver = Arc::clone(&self.receiver);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("remnant-decode-{}", id))
            .spawn(move || loop {
                let message = receiver.lock().unwrap_or_else(PoisonError::into_inner).recv();
                match message {
                    Ok(job) => {
                        let outcome = shared.execute(job);
                        shared.finish_queued(outcome);
                    }
                    Err(_) => break,
                }
            });
        match spawned {
            Ok(handle) => {
                self.workers.push(handle);
                true
            }
            Err(e) => {
                log::warn!("Could not start decode worker {}: {}", id, e);
                // Stop trying to grow this pool.
                self.max_workers = self.workers.len();
                false
            }
        }
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        // Closing the channel ends each worker loop once the queue is empty.
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Decode worker exited by panic");
            }
        }
    }
}
