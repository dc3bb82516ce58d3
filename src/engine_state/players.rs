//! # Player Slots
//!
//! Tracked player positions, written by the simulation thread and read by the chunk
//! loader's worker. Each slot is guarded by a [`Monitor`] so the worker can take a
//! consistent snapshot without ever blocking the simulation, and can skip a player
//! for one pass when a write is in progress.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cgmath::Point3;

use crate::core::Monitor;
use crate::engine_state::voxels::chunk::chunk_coord_of;

/// Maximum number of tracked players.
pub const MAX_CLIENTS: usize = 4;

/// A consistent view of one player slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub valid: bool,
    pub position: Point3<f64>,
}

impl PlayerSnapshot {
    /// The chunk containing the player.
    pub fn chunk(&self) -> Point3<i32> {
        chunk_coord_of(self.position)
    }
}

#[derive(Default)]
struct PlayerSlot {
    monitor: Monitor,
    valid: AtomicBool,
    // f64 bit patterns
    x: AtomicU64,
    y: AtomicU64,
    z: AtomicU64,
}

/// Shared handle to all player slots. Clones refer to the same slots.
#[derive(Clone)]
pub struct PlayerSlots {
    slots: Arc<[PlayerSlot; MAX_CLIENTS]>,
}

impl Default for PlayerSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerSlots {
    /// Creates `MAX_CLIENTS` slots, all invalid.
    pub fn new() -> Self {
        PlayerSlots {
            slots: Arc::new(std::array::from_fn(|_| PlayerSlot::default())),
        }
    }

    pub fn len(&self) -> usize {
        MAX_CLIENTS
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Publishes a player's position; `None` marks the slot invalid.
    ///
    /// # Panics
    /// Panics if `player >= MAX_CLIENTS`.
    pub fn set_position(&self, player: usize, position: Option<Point3<f64>>) {
        let slot = &self.slots[player];
        slot.monitor.write(|| match position {
            Some(position) => {
                slot.x.store(position.x.to_bits(), Ordering::Relaxed);
                slot.y.store(position.y.to_bits(), Ordering::Relaxed);
                slot.z.store(position.z.to_bits(), Ordering::Relaxed);
                slot.valid.store(true, Ordering::Relaxed);
            }
            None => slot.valid.store(false, Ordering::Relaxed),
        });
    }

    /// Reads a consistent snapshot of a slot.
    ///
    /// # Arguments
    /// * `player` - Slot index
    /// * `wait` - Retry until no write overlaps the read. With `false`, a
    ///   conflicting write makes this return `None` immediately.
    pub fn snapshot(&self, player: usize, wait: bool) -> Option<PlayerSnapshot> {
        let slot = &self.slots[player];
        slot.monitor.read(wait, || PlayerSnapshot {
            valid: slot.valid.load(Ordering::Relaxed),
            position: Point3::new(
                f64::from_bits(slot.x.load(Ordering::Relaxed)),
                f64::from_bits(slot.y.load(Ordering::Relaxed)),
                f64::from_bits(slot.z.load(Ordering::Relaxed)),
            ),
        })
    }

    /// Holds slot `player` in its write section until the guard is dropped.
    #[cfg(test)]
    pub(crate) fn block_writes(&self, player: usize) -> WriteGuard<'_> {
        let monitor = &self.slots[player].monitor;
        monitor.start_write();
        WriteGuard(monitor)
    }
}

#[cfg(test)]
pub(crate) struct WriteGuard<'a>(&'a Monitor);

#[cfg(test)]
impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_write();
    }
}
