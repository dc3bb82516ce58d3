//! # Worker Task Trait
//!
//! A `WorkerTask` is the state machine a [`Worker`](super::Worker) drives on its
//! thread. The task owns everything it touches (archive, generator, channel
//! endpoints), so nothing inside it is shared with the owning thread except through
//! those channels.
//!
//! ## Task Lifecycle
//! 1. The task is moved onto a new thread by `Worker::dispatch()`
//! 2. `do_work()` is called in a loop until a halt is requested
//! 3. `on_stop()` runs once on the same thread, after the last `do_work()`
//! 4. The task is handed back to whoever calls `Worker::wait()`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A unit of long-running background work.
pub trait WorkerTask: Send + 'static {
    /// Performs one iteration of work.
    ///
    /// Blocking steps inside an iteration (for example retrying a full queue)
    /// should give up once `halt` is requested.
    ///
    /// # Returns
    /// `true` if anything was done. An idle iteration makes the worker sleep for
    /// its poll interval before calling again.
    fn do_work(&mut self, halt: &HaltFlag) -> bool;

    /// Runs once after the last iteration, before the thread exits. Pending state
    /// that must not be lost is persisted here.
    fn on_stop(&mut self) {}
}

/// Cooperative cancellation flag shared between a worker and its owner.
#[derive(Clone, Debug, Default)]
pub struct HaltFlag(Arc<AtomicBool>);

impl HaltFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleeps for `duration`, waking early if a halt is requested meanwhile.
    ///
    /// # Returns
    /// `false` if the halt was requested
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(5);
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_requested() {
                return false;
            }
            let step = remaining.min(SLICE);
            thread::sleep(step);
            remaining -= step;
        }
        !self.is_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_returns_early_once_halted() {
        let halt = HaltFlag::new();
        assert!(halt.sleep(Duration::from_millis(1)));

        let shared = halt.clone();
        shared.request();
        let start = std::time::Instant::now();
        assert!(!halt.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
