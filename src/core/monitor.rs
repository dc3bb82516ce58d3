use std::hint;
use std::sync::atomic::{fence, AtomicU64, Ordering};

/// A sequence lock guarding a small group of atomic values.
///
/// Writers make the sequence odd for the duration of a write. Readers never block:
/// they remember the sequence before reading and check afterwards that it is even and
/// unchanged. A failed check means a write overlapped the read and the values read
/// may be torn, so the reader either retries or gives up for now.
///
/// The guarded values must themselves be atomics (read and written with
/// `Ordering::Relaxed`); the monitor only makes a group of them consistent.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use voxel_stream::core::Monitor;
///
/// let monitor = Monitor::new();
/// let value = AtomicI32::new(0);
///
/// monitor.write(|| value.store(5, Ordering::Relaxed));
///
/// let handle = monitor.start_read();
/// let read = value.load(Ordering::Relaxed);
/// assert!(monitor.finish_read(handle));
/// assert_eq!(read, 5);
/// ```
#[derive(Debug, Default)]
pub struct Monitor {
    sequence: AtomicU64,
}

impl Monitor {
    pub fn new() -> Self {
        Monitor {
            sequence: AtomicU64::new(0),
        }
    }

    /// Begins an optimistic read and returns the handle to validate it with.
    pub fn start_read(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Returns `true` if no write overlapped the read started with `handle`.
    pub fn finish_read(&self, handle: u64) -> bool {
        fence(Ordering::Acquire);
        handle % 2 == 0 && self.sequence.load(Ordering::Relaxed) == handle
    }

    /// Enters the write section, waiting for a concurrent writer to leave it.
    pub fn start_write(&self) {
        loop {
            let current = self.sequence.load(Ordering::Relaxed);
            if current % 2 == 0
                && self
                    .sequence
                    .compare_exchange_weak(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                break;
            }
            hint::spin_loop();
        }
        fence(Ordering::Release);
    }

    /// Leaves the write section.
    pub fn finish_write(&self) {
        self.sequence.fetch_add(1, Ordering::Release);
    }

    /// Runs `f` inside a write section.
    pub fn write<R>(&self, f: impl FnOnce() -> R) -> R {
        self.start_write();
        let result = f();
        self.finish_write();
        result
    }

    /// Runs `read` until it completes without an overlapping write.
    ///
    /// With `wait == false` a single attempt is made and `None` is returned on
    /// conflict.
    pub fn read<R>(&self, wait: bool, mut read: impl FnMut() -> R) -> Option<R> {
        loop {
            let handle = self.start_read();
            let value = read();
            if self.finish_read(handle) {
                return Some(value);
            }
            if !wait {
                return None;
            }
            hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_overlapping_a_write_fails() {
        let monitor = Monitor::new();
        let handle = monitor.start_read();
        monitor.start_write();
        assert!(!monitor.finish_read(handle));

        // a read started during the write is invalid too
        let during = monitor.start_read();
        assert!(!monitor.finish_read(during));
        assert_eq!(monitor.read(false, || ()), None);

        monitor.finish_write();
        assert_eq!(monitor.read(false, || 3), Some(3));
    }
}
