use std::collections::HashSet;

use cgmath::{Point3, Vector3};
use voxel_stream::engine_state::voxels::block::{block_side::BlockSide, block_type::BlockType, Block};
use voxel_stream::engine_state::voxels::chunk::{local_from_index, Chunk, NoNeighbors, CHUNK_DIMENSION, CHUNK_SIZE};
use voxel_stream::engine_state::voxels::chunk::Face;
use voxel_stream::engine_state::voxels::generator::{GenerationMethod, NoiseGenerator, TerrainGenerator};
use voxel_stream::engine_state::voxels::world::World;

/// Faces of `coord` implied by the resident blocks, ignoring sides whose
/// neighboring chunk is absent.
fn expected_faces(world: &World, coord: Point3<i32>) -> HashSet<Face> {
    let width = CHUNK_DIMENSION as i64;
    let origin = Point3::new(
        coord.x as i64 * width,
        coord.y as i64 * width,
        coord.z as i64 * width,
    );
    let mut faces = HashSet::new();
    for index in 0..CHUNK_SIZE {
        let local = local_from_index(index);
        let block = origin + Vector3::new(local.x as i64, local.y as i64, local.z as i64);
        if world.get_block(block).is_some_and(|b| !b.is_solid()) {
            continue;
        }
        for side in BlockSide::all() {
            let offset = side.offset();
            let next = block + Vector3::new(offset.x as i64, offset.y as i64, offset.z as i64);
            if world.get_block(next).is_some_and(|b| !b.is_solid()) {
                faces.insert(Face::new(local, side));
            }
        }
    }
    faces
}

fn assert_consistent(world: &World, coords: &[Point3<i32>]) {
    for coord in coords {
        let actual = world.get_chunk(*coord).unwrap().faces();
        assert_eq!(actual, &expected_faces(world, *coord), "chunk {:?}", coord);
    }
}

fn grid() -> Vec<Point3<i32>> {
    let mut coords = Vec::new();
    for x in 0..2 {
        for z in 0..2 {
            coords.push(Point3::new(x, 0, z));
        }
    }
    coords
}

fn worker_built(generator: &NoiseGenerator, coord: Point3<i32>) -> Chunk {
    let mut chunk = Chunk::new(coord);
    generator.generate(&mut chunk);
    chunk.init_faces(&mut NoNeighbors);
    chunk
}

#[test]
fn boundaries_resolve_in_any_insertion_order() {
    let generator = NoiseGenerator::new(99, GenerationMethod::Random);
    let coords = grid();
    let mut rng = fastrand::Rng::with_seed(5);

    for _ in 0..3 {
        let mut order = coords.clone();
        rng.shuffle(&mut order);
        let mut world = World::new(true);
        for coord in order {
            world.insert_chunk(worker_built(&generator, coord));
        }
        assert_consistent(&world, &coords);
    }
}

#[test]
fn edits_across_boundaries_keep_faces_consistent() {
    let generator = NoiseGenerator::new(17, GenerationMethod::Random);
    let coords = grid();
    let mut world = World::new(true);
    for coord in &coords {
        world.insert_chunk(worker_built(&generator, *coord));
    }
    world.pop_dirty_chunks();

    let mut rng = fastrand::Rng::with_seed(8);
    for _ in 0..500 {
        // bias towards the shared boundary planes x = 31/32 and z = 31/32
        let x = if rng.bool() { rng.i64(30..34) } else { rng.i64(0..64) };
        let z = if rng.bool() { rng.i64(30..34) } else { rng.i64(0..64) };
        let y = rng.i64(0..32);
        let block = if rng.bool() {
            Block::new(BlockType::STONE)
        } else {
            Block::AIR
        };
        world.set_block(Point3::new(x, y, z), block);
    }
    assert_consistent(&world, &coords);

    // removing and re-inserting a chunk restores its shared boundaries
    let chunk = world.remove_chunk(coords[0]).unwrap();
    world.insert_chunk(chunk);
    assert_consistent(&world, &coords);
}

#[test]
fn boundary_edits_mark_the_neighbor_dirty() {
    let generator = NoiseGenerator::new(0, GenerationMethod::Solid);
    let mut world = World::new(true);
    for coord in [Point3::new(0, 0, 0), Point3::new(1, 0, 0)] {
        world.insert_chunk(worker_built(&generator, coord));
    }
    world.pop_dirty_chunks();

    // carving the last block of chunk 0 exposes the first block of chunk 1
    assert!(world.set_block(Point3::new(31, 5, 5), Block::AIR));
    let dirty: HashSet<Point3<i32>> = world.pop_dirty_chunks().into_iter().collect();
    assert_eq!(dirty, HashSet::from([Point3::new(0, 0, 0), Point3::new(1, 0, 0)]));
    assert!(world
        .get_chunk(Point3::new(1, 0, 0))
        .unwrap()
        .faces()
        .contains(&Face::new(Point3::new(0, 5, 5), BlockSide::LEFT)));
}
