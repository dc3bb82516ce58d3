#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Stream
//!
//! Streaming of voxel chunks between an archive, a procedural generator and the
//! resident world of a voxel engine.
//!
//! ## Key Modules
//!
//! * `core` - Concurrency primitives shared by the engine's threads
//! * `engine_state` - The local streaming session and all voxel components
//! * `config` - The `StreamingConfig` loaded from JSON
//! * `error` - Error types of the crate
//!
//! ## Architecture
//!
//! Two independent front ends drive the same chunk data model:
//! * The chunk loader follows tracked players and streams the chunks around them
//!   into a world, unloading what they leave behind
//! * The chunk manager serves explicit, reference-counted chunk requests from a
//!   fixed pool, with archive I/O on a background worker
//!
//! Both keep chunk face sets (the exposed solid/air boundaries) current through
//! edits and across chunk boundaries, and persist only chunks that changed.
//!
//! ## Usage
//!
//! ```no_run
//! fn main() {
//!     if let Err(err) = voxel_stream::run() {
//!         eprintln!("{}", err);
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cgmath::Point3;
use clap::Parser;
use log::info;
use web_time::Instant;

pub mod config;
pub mod core;
pub mod engine_state;
pub mod error;

use config::StreamingConfig;
use engine_state::voxels::{
    archive::{ChunkArchive, MemoryArchive, RegionArchive},
    block::{block_type::BlockType, Block},
    chunk::{block_index, CHUNK_DIMENSION},
    chunk_manager::ChunkManager,
    generator::NoiseGenerator,
};
use engine_state::EngineState;
use error::Result;

/// Number of simulated updates in the demo session.
const DEMO_FRAMES: u32 = 300;
const FRAME_TIME: Duration = Duration::from_millis(16);
/// Blocks the demo player walks per update.
const PLAYER_SPEED: f64 = 0.5;

/// Command line of the demo session.
#[derive(Parser, Debug)]
#[command(name = "voxel-stream", about = "Streams a generated voxel world around a walking player")]
struct Args {
    /// JSON streaming config; defaults are used when omitted
    config: Option<PathBuf>,

    /// Keep the archive in memory instead of on disk
    #[arg(short = 'm', long = "memory")]
    memory: bool,
}

/// Runs a demo session: a player walking through a generated world, edits on the
/// way, and a chunk manager serving a fixed set of chunks next to it.
///
/// See `--help` for the command line.
pub fn run() -> Result<()> {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
    info!("Logger initialized");

    let args = Args::parse();
    let in_memory = args.memory;
    let config = match &args.config {
        Some(path) => StreamingConfig::load(path)?,
        None => {
            let config = StreamingConfig::default();
            config.validate()?;
            config
        }
    };

    let generator = Arc::new(NoiseGenerator::new(config.seed, config.generation_method));
    info!("Generating terrain with {:?}, seed {}", generator.method(), config.seed);

    let started = Instant::now();
    let archive = open_archive(&config.archive_path, &config, in_memory)?;
    let mut engine = EngineState::new(&config, generator.clone(), archive)?;
    let archive = open_archive(&config.archive_path.join("manager"), &config, in_memory)?;
    let mut manager = ChunkManager::new(&config, archive, generator)?;

    // the manager keeps a small block of chunks below the spawn resident
    let served: Vec<Point3<i32>> = (-1..=1)
        .flat_map(|x| (-1..=1).map(move |z| Point3::new(x, -1, z)))
        .collect();
    for coord in &served {
        manager.request_chunk(*coord);
    }

    let mut position = Point3::new(0.5, 0.5, 0.5);
    let mut edits = 0;
    for frame in 0..DEMO_FRAMES {
        position.x += PLAYER_SPEED;
        engine.set_player_position(0, Some(position));
        engine.receive();
        manager.tick()?;

        if frame % 30 == 0 {
            let below = Point3::new(position.x.floor() as i64, -1, 0);
            if engine.edit(below, BlockType::WOOD.into()) {
                edits += 1;
            }
            let target = manager
                .get_chunk(served[frame as usize % served.len()])
                .map(|chunk| (chunk.coord(), chunk.revision()));
            if let Some((coord, revision)) = target {
                let index = block_index(Point3::new(0, (CHUNK_DIMENSION - 1) as u8, 0));
                if manager.place_block(coord, index, Block::new(BlockType::WHITE), revision) {
                    edits += 1;
                }
            }
        }
        std::thread::sleep(FRAME_TIME);
    }

    info!(
        "Session: {} resident chunks, {} edits, {} faces in the served block",
        engine.world().len(),
        edits,
        served
            .iter()
            .filter_map(|coord| manager.world().get_chunk(*coord))
            .map(|chunk| chunk.faces().len())
            .sum::<usize>()
    );
    info!("Chunk manager: {:?}", manager.stats());

    for coord in &served {
        manager.release_chunk(*coord);
    }
    manager.store_chunks()?;
    engine.stop();
    info!("Demo finished after {:?}", started.elapsed());
    Ok(())
}

fn open_archive(path: &Path, config: &StreamingConfig, in_memory: bool) -> Result<Box<dyn ChunkArchive>> {
    if in_memory {
        return Ok(Box::new(MemoryArchive::new()));
    }
    let archive = RegionArchive::open(path, config.region_cache_size)?;
    info!("Chunk archive at {:?}", archive.root());
    Ok(Box::new(archive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_takes_a_config_and_the_memory_flag() {
        let args = Args::try_parse_from(["voxel-stream", "--memory", "world.json"]).unwrap();
        assert!(args.memory);
        assert_eq!(args.config, Some(PathBuf::from("world.json")));

        let args = Args::try_parse_from(["voxel-stream"]).unwrap();
        assert!(!args.memory);
        assert_eq!(args.config, None);
    }

    #[test]
    fn flags_are_never_taken_for_a_config_path() {
        let help = Args::try_parse_from(["voxel-stream", "--help"]).unwrap_err();
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(Args::try_parse_from(["voxel-stream", "--fast"]).is_err());
    }
}
