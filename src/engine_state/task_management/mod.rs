//! # Task Management System
//!
//! This module runs the engine's background work: each streaming component owns one
//! [`Worker`] which drives a [`WorkerTask`] on a dedicated `std::thread`.
//!
//! ## Architecture Overview
//!
//! - `WorkerTask`: The state machine executed on the worker thread
//! - `Worker`: Owner-side handle that spawns, halts and joins the thread
//! - `HaltFlag`: Cooperative cancellation flag polled at loop boundaries
//!
//! Communication with the task goes exclusively through channels created by the
//! component that owns the worker. Threads are never detached: dropping a `Worker`
//! halts and joins it.
//!
//! ## Worker Lifecycle
//! 1. `Worker::dispatch()` moves the task onto a new thread
//! 2. The thread calls `do_work()` until a halt is requested, sleeping for the poll
//!    interval after idle iterations
//! 3. `Worker::request_termination()` sets the halt flag without blocking
//! 4. `Worker::wait()` sets the flag, joins the thread after `on_stop()` ran, and
//!    returns the task so the owner can reuse what it held
//!
//! ## Example Usage
//! ```rust
//! use std::time::Duration;
//! use voxel_stream::engine_state::task_management::{task::{HaltFlag, WorkerTask}, Worker};
//!
//! #[derive(Default)]
//! struct Counter {
//!     iterations: u32,
//!     stopped: bool,
//! }
//!
//! impl WorkerTask for Counter {
//!     fn do_work(&mut self, _halt: &HaltFlag) -> bool {
//!         self.iterations += 1;
//!         self.iterations < 10
//!     }
//!
//!     fn on_stop(&mut self) {
//!         self.stopped = true;
//!     }
//! }
//!
//! let mut worker = Worker::new("counter");
//! worker.dispatch(Counter::default(), Duration::from_millis(1)).unwrap();
//! let counter = worker.wait().unwrap();
//! assert!(counter.stopped);
//! ```

pub mod task;

use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};

use crate::error::{Result, StreamError};
use task::{HaltFlag, WorkerTask};

/// Handle to a background thread running a [`WorkerTask`].
pub struct Worker<T: WorkerTask> {
    name: &'static str,
    halt: HaltFlag,
    handle: Option<JoinHandle<T>>,
}

impl<T: WorkerTask> Worker<T> {
    /// Creates an idle worker. Nothing runs until `dispatch` is called.
    pub fn new(name: &'static str) -> Self {
        Worker {
            name,
            halt: HaltFlag::new(),
            handle: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Starts running `task` on a new thread.
    ///
    /// # Arguments
    /// * `task` - The task to drive
    /// * `poll_interval` - Sleep after an iteration in which the task did nothing
    ///
    /// # Returns
    /// An error if the thread could not be spawned. Dispatching while a previous
    /// task is still attached first waits for it.
    pub fn dispatch(&mut self, mut task: T, poll_interval: Duration) -> Result<()> {
        if self.handle.is_some() {
            self.wait();
        }
        self.halt = HaltFlag::new();
        let halt = self.halt.clone();
        let name = self.name;

        let handle = thread::Builder::new()
            .name(format!("{}-worker", name))
            .spawn(move || {
                debug!("{} worker started", name);
                while !halt.is_requested() {
                    if !task.do_work(&halt) {
                        halt.sleep(poll_interval);
                    }
                }
                task.on_stop();
                debug!("{} worker stopped", name);
                task
            })
            .map_err(|source| StreamError::Spawn { name, source })?;

        self.handle = Some(handle);
        info!("Dispatched {} worker", name);
        Ok(())
    }

    /// Asks the task to stop after its current iteration. Does not block.
    pub fn request_termination(&self) {
        self.halt.request();
    }

    /// Whether a thread is attached and has not exited yet.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Whether the thread exited (normally or by panicking) although no halt was
    /// requested.
    pub fn stopped_unexpectedly(&self) -> bool {
        !self.halt.is_requested()
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| handle.is_finished())
    }

    /// Halts the worker and blocks until its thread has finished `on_stop`.
    ///
    /// # Returns
    /// The task, or `None` if nothing was dispatched or the thread panicked
    pub fn wait(&mut self) -> Option<T> {
        self.halt.request();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(task) => Some(task),
            Err(_) => {
                error!("{} worker panicked", self.name);
                None
            }
        }
    }
}

impl<T: WorkerTask> Drop for Worker<T> {
    fn drop(&mut self) {
        self.wait();
    }
}
