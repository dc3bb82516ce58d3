//! # Streaming Configuration
//!
//! Every tunable of the streaming engine in one serde struct. A config file is a
//! JSON object; missing fields fall back to their defaults, so
//! `{ "load_radius": 4, "unload_radius": 6 }` is a complete file.
//!
//! The archive location is part of the configuration and is passed explicitly to
//! the archive at construction time.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::engine_state::voxels::generator::GenerationMethod;
use crate::error::ConfigError;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Directory holding the chunk archive.
    pub archive_path: PathBuf,
    /// Seed of the terrain generator.
    pub seed: u64,
    /// Chebyshev distance, in chunks, within which chunks around a player are loaded.
    pub load_radius: i32,
    /// Chebyshev distance, in chunks, beyond which loaded chunks are unloaded.
    pub unload_radius: i32,
    /// Chunks the loader produces per outer pass before it sweeps for unloads.
    pub max_loads_per_pass: usize,
    /// Capacity of the loader's event queue (finished chunks and unload queries).
    pub output_queue_capacity: usize,
    /// Capacity of each of the chunk manager's worker queues, and of the queue
    /// of chunks handed back to the loader.
    pub worker_queue_capacity: usize,
    /// Number of chunks the chunk manager preallocates and never exceeds.
    pub pool_capacity: usize,
    /// Sleep of an idle worker iteration.
    pub poll_interval_ms: u64,
    /// Sleep between attempts to push into a full queue.
    pub queue_retry_backoff_ms: u64,
    /// Maintain face sets for loaded and edited chunks.
    pub update_faces: bool,
    pub generation_method: GenerationMethod,
    /// Records kept in memory by the region archive; zero disables the cache.
    pub region_cache_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            archive_path: PathBuf::from("world"),
            seed: 0,
            load_radius: 4,
            unload_radius: 6,
            max_loads_per_pass: 64,
            output_queue_capacity: 64,
            worker_queue_capacity: 1024,
            pool_capacity: 1024,
            poll_interval_ms: 100,
            queue_retry_backoff_ms: 100,
            update_faces: true,
            generation_method: GenerationMethod::default(),
            region_cache_size: 256,
        }
    }
}

impl StreamingConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: StreamingConfig = serde_json::from_str(&text)?;
        config.validate()?;
        info!("Loaded streaming config from {:?}", path);
        Ok(config)
    }

    /// Checks the relations between fields that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_radius < 0 {
            return Err(ConfigError::Invalid(format!(
                "load_radius must not be negative, got {}",
                self.load_radius
            )));
        }
        if self.unload_radius < self.load_radius {
            return Err(ConfigError::Invalid(format!(
                "unload_radius ({}) must be at least load_radius ({})",
                self.unload_radius, self.load_radius
            )));
        }
        let capacities = [
            ("max_loads_per_pass", self.max_loads_per_pass),
            ("output_queue_capacity", self.output_queue_capacity),
            ("worker_queue_capacity", self.worker_queue_capacity),
            ("pool_capacity", self.pool_capacity),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn queue_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.queue_retry_backoff_ms)
    }
}
