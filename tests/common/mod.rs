#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use voxel_stream::config::StreamingConfig;
use voxel_stream::engine_state::voxels::chunk_manager::ChunkManager;
use voxel_stream::engine_state::EngineState;

const TIMEOUT: Duration = Duration::from_secs(20);

/// A fast-paced configuration for tests.
pub fn test_config() -> StreamingConfig {
    StreamingConfig {
        load_radius: 1,
        unload_radius: 1,
        pool_capacity: 16,
        worker_queue_capacity: 8,
        output_queue_capacity: 8,
        poll_interval_ms: 1,
        queue_retry_backoff_ms: 1,
        update_faces: false,
        ..Default::default()
    }
}

pub fn tick_until(manager: &mut ChunkManager, mut done: impl FnMut(&ChunkManager) -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !done(manager) {
        assert!(Instant::now() < deadline, "chunk manager did not settle in time");
        manager.tick().unwrap();
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn receive_until(engine: &mut EngineState, mut done: impl FnMut(&EngineState) -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !done(engine) {
        assert!(Instant::now() < deadline, "streaming did not settle in time");
        engine.receive();
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}
