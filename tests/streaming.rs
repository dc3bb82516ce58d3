mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cgmath::{Point3, Vector3};
use common::{receive_until, test_config, wait_for};
use voxel_stream::config::StreamingConfig;
use voxel_stream::engine_state::voxels::archive::{MemoryArchive, RegionArchive};
use voxel_stream::engine_state::voxels::block::{block_type::BlockType, Block};
use voxel_stream::engine_state::voxels::chunk::CHUNK_DIMENSION;
use voxel_stream::engine_state::voxels::chunk_loader::spiral_order;
use voxel_stream::engine_state::voxels::generator::{GenerationMethod, NoiseGenerator};
use voxel_stream::engine_state::EngineState;

fn start(config: &StreamingConfig, archive: MemoryArchive) -> EngineState {
    let generator = Arc::new(NoiseGenerator::new(21, GenerationMethod::Empty));
    EngineState::new(config, generator, Box::new(archive)).unwrap()
}

/// Center of the given chunk in world space.
fn inside(chunk: Point3<i32>) -> Point3<f64> {
    let half = CHUNK_DIMENSION as f64 / 2.0;
    Point3::new(
        chunk.x as f64 * CHUNK_DIMENSION as f64 + half,
        chunk.y as f64 * CHUNK_DIMENSION as f64 + half,
        chunk.z as f64 * CHUNK_DIMENSION as f64 + half,
    )
}

fn surrounds(engine: &EngineState, center: Point3<i32>, radius: i32) -> bool {
    spiral_order(radius)
        .into_iter()
        .all(|offset| engine.world().contains(center + offset))
}

#[test]
fn chunks_follow_the_player() {
    let config = test_config();
    let mut engine = start(&config, MemoryArchive::new());
    let origin = Point3::new(0, 0, 0);
    engine.set_player_position(0, Some(inside(origin)));
    receive_until(&mut engine, |e| surrounds(e, origin, 1));
    assert_eq!(engine.world().len(), 27);

    let far = Point3::new(10, 0, 0);
    engine.set_player_position(0, Some(inside(far)));
    receive_until(&mut engine, |e| surrounds(e, far, 1) && e.world().len() == 27);
    assert!(!engine.world().contains(origin));
}

#[test]
fn a_second_player_keeps_its_chunks() {
    let config = StreamingConfig {
        unload_radius: 2,
        ..test_config()
    };
    let mut engine = start(&config, MemoryArchive::new());
    let (a, b) = (Point3::new(0, 0, 0), Point3::new(0, 0, 8));
    engine.set_player_position(0, Some(inside(a)));
    engine.set_player_position(1, Some(inside(b)));
    receive_until(&mut engine, |e| surrounds(e, a, 1) && surrounds(e, b, 1));

    // moving within the unload radius unloads nothing
    engine.set_player_position(0, Some(inside(a + Vector3::new(1, 0, 0))));
    receive_until(&mut engine, |e| e.world().len() == 27 + 27 + 9);
    assert!(surrounds(&engine, a, 1));

    engine.set_player_position(0, None);
    receive_until(&mut engine, |e| e.world().len() == 27);
    assert!(surrounds(&engine, b, 1));
}

#[test]
fn only_edited_chunks_are_persisted_on_unload() {
    let config = test_config();
    let archive = MemoryArchive::new();
    let mut engine = start(&config, archive.clone());
    let origin = Point3::new(0, 0, 0);
    engine.set_player_position(0, Some(inside(origin)));
    receive_until(&mut engine, |e| surrounds(e, origin, 1));

    let block = Point3::new(3, 4, 5);
    assert!(engine.edit(block, Block::new(BlockType::GRASS)));
    assert!(!engine.edit(block, Block::new(BlockType::GRASS)));
    assert!(!engine.edit(Point3::new(1000, 0, 0), Block::new(BlockType::GRASS)));

    engine.set_player_position(0, Some(inside(Point3::new(20, 0, 0))));
    wait_for(|| {
        engine.receive();
        archive.record(origin).is_some()
    });
    assert_eq!(archive.stores(), 1);
    assert_eq!(archive.record(origin).unwrap().revision, 1);

    // coming back reads the edit from the archive
    engine.set_player_position(0, Some(inside(origin)));
    receive_until(&mut engine, |e| e.world().contains(origin));
    assert_eq!(engine.world().get_block(block), Some(Block::new(BlockType::GRASS)));
}

#[test]
fn stopping_persists_resident_edits() {
    let config = test_config();
    let archive = MemoryArchive::new();
    let mut engine = start(&config, archive.clone());
    let origin = Point3::new(0, 0, 0);
    engine.set_player_position(0, Some(inside(origin)));
    receive_until(&mut engine, |e| surrounds(e, origin, 1));

    let corner = Point3::new(-1, -1, -1);
    assert!(engine.edit(corner, Block::new(BlockType::STONE)));
    engine.stop();

    assert!(engine.world().is_empty());
    let record = archive.record(Point3::new(-1, -1, -1)).unwrap();
    assert_eq!(record.blocks[record.blocks.len() - 1], Block::new(BlockType::STONE));
    assert_eq!(archive.stores(), 1);
}

#[test]
fn region_archive_survives_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let config = StreamingConfig {
        archive_path: dir.path().to_path_buf(),
        region_cache_size: 8,
        ..test_config()
    };
    let generator = Arc::new(NoiseGenerator::new(4, GenerationMethod::Checkerboard));
    let block = Point3::new(40, -3, 7);
    let edited = Block::new(BlockType::WHITE);

    {
        let archive = RegionArchive::open(&config.archive_path, config.region_cache_size).unwrap();
        let mut engine = EngineState::new(&config, generator.clone(), Box::new(archive)).unwrap();
        engine.set_player_position(0, Some(Point3::new(40.0, -3.0, 7.0)));
        receive_until(&mut engine, |e| e.world().get_block(block).is_some());
        assert!(engine.edit(block, edited));
    }

    let archive = RegionArchive::open(&config.archive_path, config.region_cache_size).unwrap();
    let mut engine = EngineState::new(&config, generator, Box::new(archive)).unwrap();
    engine.set_player_position(0, Some(Point3::new(40.0, -3.0, 7.0)));
    receive_until(&mut engine, |e| e.world().get_block(block).is_some());
    assert_eq!(engine.world().get_block(block), Some(edited));
    // untouched neighbors are still generated terrain
    assert_eq!(
        engine.world().get_block(Point3::new(42, -3, 7)),
        Some(Block::new(BlockType::DIRT))
    );
}

#[test]
fn returning_before_receive_keeps_the_edited_chunk() {
    let config = StreamingConfig {
        load_radius: 0,
        unload_radius: 0,
        ..test_config()
    };
    let archive = MemoryArchive::new();
    let mut engine = start(&config, archive.clone());
    let origin = Point3::new(0, 0, 0);
    engine.set_player_position(0, Some(inside(origin)));
    receive_until(&mut engine, |e| e.world().contains(origin));
    let block = Point3::new(2, 2, 2);
    assert!(engine.edit(block, Block::new(BlockType::WOOD)));

    // leave and come back without receiving in between
    engine.set_player_position(0, Some(inside(Point3::new(10, 0, 0))));
    thread::sleep(Duration::from_millis(300));
    engine.set_player_position(0, Some(inside(origin)));
    thread::sleep(Duration::from_millis(300));

    // the far chunk arrives and both chunks leave again, in that order
    let summary = engine.receive();
    assert!(summary.inserted >= 1);
    assert_eq!(summary.unloaded, 2);
    receive_until(&mut engine, |e| e.world().contains(origin));
    for _ in 0..200 {
        engine.receive();
        thread::sleep(Duration::from_millis(1));
    }
    assert!(engine.world().contains(origin));
    assert_eq!(engine.world().len(), 1);
    assert_eq!(engine.world().get_block(block), Some(Block::new(BlockType::WOOD)));
    assert_eq!(archive.record(origin).unwrap().revision, 1);
}
