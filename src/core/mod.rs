//! # Core Module
//!
//! This module provides the concurrency primitives shared by the streaming engine's
//! threads.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking
//! - `Monitor`: Sequence lock for optimistic, non-blocking reads of small shared state
//!
//! ## Usage
//! ```rust
//! use voxel_stream::core::{Monitor, MtResource};
//!
//! let counter = MtResource::new(0);
//! *counter.get_mut() += 1;
//! assert_eq!(*counter.get(), 1);
//!
//! let monitor = Monitor::new();
//! assert_eq!(monitor.read(false, || *counter.get()), Some(1));
//! ```

pub mod monitor;
pub mod mt_resource;

pub use monitor::Monitor;
pub use mt_resource::MtResource;
