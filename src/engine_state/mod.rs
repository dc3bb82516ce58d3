//! # Engine State Module
//!
//! The local streaming session: a resident world kept in step with tracked players
//! by a background chunk loader.
//!
//! ## Key Components
//!
//! * `EngineState` - Owns the world, the player slots and the loader
//! * `players` - Player positions shared with the loader's worker
//! * `task_management` - Background workers with cooperative shutdown
//! * `voxels` - Chunks, world, archives, generation, loader and manager
//!
//! ## Architecture
//!
//! The simulation thread publishes player positions and calls
//! [`EngineState::receive`] once per update. Everything slow (archive reads,
//! generation, face building, persistence) happens on the loader's worker; the
//! owning thread only moves finished chunks into the world and removed chunks back
//! out.

use std::sync::Arc;

use cgmath::Point3;
use log::{debug, info, warn};

use crate::config::StreamingConfig;
use crate::error::Result;
use players::PlayerSlots;
use voxels::{
    archive::ChunkArchive,
    block::Block,
    chunk_loader::{ChunkLoader, LoaderEvent},
    generator::TerrainGenerator,
    world::World,
};

pub mod players;
pub mod task_management;
pub mod voxels;

/// Counts of what one call to [`EngineState::receive`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    /// Chunks that became resident.
    pub inserted: usize,
    /// Chunks removed from the world and handed back for persistence.
    pub unloaded: usize,
}

/// A streaming session around up to [`players::MAX_CLIENTS`] players.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cgmath::Point3;
/// use voxel_stream::config::StreamingConfig;
/// use voxel_stream::engine_state::EngineState;
/// use voxel_stream::engine_state::voxels::archive::MemoryArchive;
/// use voxel_stream::engine_state::voxels::generator::{GenerationMethod, NoiseGenerator};
///
/// let config = StreamingConfig { load_radius: 0, unload_radius: 0, ..Default::default() };
/// let generator = Arc::new(NoiseGenerator::new(5, GenerationMethod::Empty));
/// let mut engine = EngineState::new(&config, generator, Box::new(MemoryArchive::new())).unwrap();
///
/// engine.set_player_position(0, Some(Point3::new(1.0, 1.0, 1.0)));
/// while engine.world().is_empty() {
///     engine.receive();
///     std::thread::yield_now();
/// }
/// engine.stop();
/// ```
pub struct EngineState {
    world: World,
    players: PlayerSlots,
    loader: ChunkLoader,
}

impl EngineState {
    /// Creates the session and starts streaming.
    ///
    /// # Arguments
    /// * `config` - Streaming configuration
    /// * `generator` - Terrain for chunks the archive has no record of
    /// * `archive` - Where chunks are read from and persisted to
    ///
    /// # Returns
    /// An error if `config` does not validate or the loader thread cannot start
    pub fn new(
        config: &StreamingConfig,
        generator: Arc<dyn TerrainGenerator>,
        archive: Box<dyn ChunkArchive>,
    ) -> Result<Self> {
        let players = PlayerSlots::new();
        let mut loader = ChunkLoader::new(config, players.clone(), generator, archive)?;
        loader.dispatch()?;
        info!(
            "Streaming session started, load radius {} unload radius {}",
            config.load_radius, config.unload_radius
        );
        Ok(EngineState {
            world: World::new(config.update_faces),
            players,
            loader,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn players(&self) -> &PlayerSlots {
        &self.players
    }

    /// Publishes a player's position, or marks the slot unused with `None`.
    pub fn set_player_position(&self, player: usize, position: Option<Point3<f64>>) {
        self.players.set_position(player, position);
    }

    /// Moves finished chunks into the world and carries out unload queries, in
    /// the order the loader produced them.
    pub fn receive(&mut self) -> ReceiveSummary {
        let mut summary = ReceiveSummary::default();

        while let Some(event) = self.loader.next() {
            match event {
                LoaderEvent::Chunk(chunk) => {
                    if let Some(replaced) = self.world.insert_chunk(chunk) {
                        warn!("Chunk {:?} was delivered twice", replaced.coord());
                        self.loader.release(replaced);
                    }
                    summary.inserted += 1;
                }
                LoaderEvent::Unload(coord) => match self.world.remove_chunk(coord) {
                    Some(chunk) => {
                        self.loader.release(chunk);
                        summary.unloaded += 1;
                    }
                    None => {
                        warn!("Unload query for chunk {:?} which is not resident", coord);
                        self.loader.release_absent(coord);
                    }
                },
            }
        }

        if summary != ReceiveSummary::default() {
            debug!(
                "Received {} chunks, unloaded {}, {} resident",
                summary.inserted,
                summary.unloaded,
                self.world.len()
            );
        }
        summary
    }

    /// Changes a block in a resident chunk.
    ///
    /// # Returns
    /// `true` if the chunk is resident and the block changed
    pub fn edit(&mut self, block_coord: Point3<i64>, block: Block) -> bool {
        self.world.set_block(block_coord, block)
    }

    /// Stops streaming and persists every changed chunk, including the resident
    /// ones. The world is empty afterwards.
    pub fn stop(&mut self) {
        self.loader.wait();
        // events already queued still apply
        self.receive();
        let resident = self.world.drain();
        info!("Stopping streaming session with {} resident chunks", resident.len());
        for chunk in resident {
            self.loader.release(chunk);
        }
    }
}

impl Drop for EngineState {
    fn drop(&mut self) {
        self.stop();
    }
}
