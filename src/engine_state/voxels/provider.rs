//! # Chunk Providers
//!
//! A provider fills chunks the archive has no record of. The chunk manager hands it
//! pooled chunks (already carrying their coordinate) and collects them once they are
//! populated, without going through the archive worker again.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::error;

use crate::config::StreamingConfig;
use crate::engine_state::task_management::task::{HaltFlag, WorkerTask};
use crate::engine_state::task_management::Worker;
use crate::engine_state::voxels::chunk::{Chunk, NoNeighbors};
use crate::engine_state::voxels::generator::TerrainGenerator;
use crate::error::Result;

/// Asynchronous source of chunk contents.
pub trait ChunkProvider: Send {
    /// Submits a chunk to be filled for `chunk.coord()`. Never blocks.
    ///
    /// # Returns
    /// The chunk back if the provider cannot take more work right now
    fn request_chunk(&mut self, chunk: Chunk) -> std::result::Result<(), Chunk>;

    /// Takes the next populated chunk, if any. Populated chunks are initialized
    /// and, if the provider maintains them, carry their face set.
    fn next_chunk(&mut self) -> Option<Chunk>;
}

struct GenerationTask {
    generator: Arc<dyn TerrainGenerator>,
    update_faces: bool,
    retry_backoff: Duration,
    requests: Receiver<Chunk>,
    results: Sender<Chunk>,
}

impl WorkerTask for GenerationTask {
    fn do_work(&mut self, halt: &HaltFlag) -> bool {
        let Ok(mut chunk) = self.requests.try_recv() else {
            return false;
        };
        self.generator.generate(&mut chunk);
        if self.update_faces {
            chunk.init_faces(&mut NoNeighbors);
        }
        loop {
            match self.results.try_send(chunk) {
                Ok(()) => return true,
                Err(TrySendError::Full(returned)) => {
                    chunk = returned;
                    if !halt.sleep(self.retry_backoff) {
                        return true;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return true,
            }
        }
    }
}

/// A provider running a [`TerrainGenerator`] on its own worker thread.
pub struct GeneratorProvider {
    worker: Worker<GenerationTask>,
    requests: Sender<Chunk>,
    results: Receiver<Chunk>,
}

impl GeneratorProvider {
    /// Creates the provider and starts its worker.
    pub fn new(config: &StreamingConfig, generator: Arc<dyn TerrainGenerator>) -> Result<Self> {
        config.validate()?;
        let (requests, request_receiver) = bounded(config.worker_queue_capacity);
        let (result_sender, results) = bounded(config.worker_queue_capacity);
        let mut worker = Worker::new("chunk generation");
        worker.dispatch(
            GenerationTask {
                generator,
                update_faces: config.update_faces,
                retry_backoff: config.queue_retry_backoff(),
                requests: request_receiver,
                results: result_sender,
            },
            config.poll_interval(),
        )?;
        Ok(GeneratorProvider {
            worker,
            requests,
            results,
        })
    }
}

impl ChunkProvider for GeneratorProvider {
    fn request_chunk(&mut self, chunk: Chunk) -> std::result::Result<(), Chunk> {
        match self.requests.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(chunk)) => Err(chunk),
            Err(TrySendError::Disconnected(chunk)) => {
                if !self.worker.is_running() {
                    error!("{} worker is not running", self.worker.name());
                }
                Err(chunk)
            }
        }
    }

    fn next_chunk(&mut self) -> Option<Chunk> {
        self.results.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::generator::{GenerationMethod, NoiseGenerator};
    use cgmath::Point3;

    #[test]
    fn generated_chunks_come_back_with_faces() {
        let config = StreamingConfig {
            poll_interval_ms: 1,
            ..Default::default()
        };
        let generator = Arc::new(NoiseGenerator::new(3, GenerationMethod::Solid));
        let mut provider = GeneratorProvider::new(&config, generator).unwrap();

        let mut chunk = Chunk::pooled();
        chunk.init_coord(Point3::new(2, -1, 0));
        assert!(provider.request_chunk(chunk).is_ok());

        let chunk = loop {
            if let Some(chunk) = provider.next_chunk() {
                break chunk;
            }
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(chunk.coord(), Point3::new(2, -1, 0));
        assert!(chunk.is_initialized());
        // no interior faces, and boundary sides wait for neighbors
        assert!(chunk.faces().is_empty());
        assert_eq!(chunk.count_solid(), crate::engine_state::voxels::chunk::CHUNK_SIZE);
    }
}
