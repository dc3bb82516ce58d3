//! # Errors
//!
//! Only conditions a caller can act on are errors. A chunk missing from the
//! archive, a neighbor that has not loaded yet, a stale edit, or a full queue are
//! part of normal operation and are handled (and logged) where they occur.

use std::path::PathBuf;

use cgmath::Point3;
use thiserror::Error;

/// Failures while reading or writing persisted chunk records.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt chunk record for {coord:?}: {reason}")]
    Corrupt {
        coord: Point3<i32>,
        reason: &'static str,
    },

    #[error("chunk record failed to decompress: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
}

/// Failures while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level error of the streaming engine.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not spawn {name} worker: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// A background worker exited without being asked to. Chunks it owned at
    /// that moment are lost to the pool, so the owner should shut down.
    #[error("{0} worker stopped unexpectedly")]
    WorkerStopped(&'static str),
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
