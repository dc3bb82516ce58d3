//! # World Module
//!
//! This module provides the `World` struct which holds the chunks currently resident
//! in memory, keyed by chunk coordinate.
//!
//! ## Boundary Resolution
//!
//! Chunks arrive one at a time from workers, and a chunk's faces toward a missing
//! neighbor cannot be known. `insert_chunk` is therefore the one place where a chunk
//! becomes resident, and it re-resolves the shared boundary with every neighbor that
//! is already present. Face sets stay consistent no matter in which order chunks
//! load.

use std::collections::HashMap;

use cgmath::Point3;
use log::debug;

use crate::engine_state::voxels::block::{block_side::BlockSide, Block};
use crate::engine_state::voxels::chunk::{
    block_index, local_from_index, split_block_coord, Chunk, ChunkNeighbors, NoNeighbors,
};

/// The set of resident chunks.
///
/// Only chunks that were explicitly inserted are kept, which allows effectively
/// infinite worlds with memory bounded by whatever drives insertion and removal.
pub struct World {
    /// A mapping from chunk coordinates to chunk data.
    chunks: HashMap<Point3<i32>, Chunk>,
    /// Whether face sets are maintained across chunk boundaries.
    update_faces: bool,
}

impl World {
    /// Creates a new, empty world.
    ///
    /// # Arguments
    /// * `update_faces` - Keep face sets current on insertion and edits. Headless
    ///   consumers that never render can turn this off.
    pub fn new(update_faces: bool) -> Self {
        World {
            chunks: HashMap::new(),
            update_faces,
        }
    }

    /// Makes a chunk resident, resolving its boundaries against resident neighbors.
    ///
    /// # Returns
    /// The chunk previously stored at the same coordinate, if any
    pub fn insert_chunk(&mut self, mut chunk: Chunk) -> Option<Chunk> {
        let coord = chunk.coord();
        let replaced = self.chunks.remove(&coord);
        if self.update_faces {
            let mut resolved = 0;
            for side in BlockSide::all() {
                if let Some(neighbor) = self.chunks.get_mut(&(coord + side.offset())) {
                    chunk.resolve_boundary(side, neighbor);
                    resolved += 1;
                }
            }
            debug!("Chunk {:?} resident, {} boundaries resolved", coord, resolved);
        }
        self.chunks.insert(coord, chunk);
        replaced
    }

    /// Removes a chunk from the world.
    ///
    /// Faces in neighboring chunks are left as they are; they are corrected when
    /// the chunk becomes resident again.
    pub fn remove_chunk(&mut self, coord: Point3<i32>) -> Option<Chunk> {
        self.chunks.remove(&coord)
    }

    /// Retrieves the chunk at the specified chunk coordinates.
    pub fn get_chunk(&self, coord: Point3<i32>) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    pub fn get_chunk_mut(&mut self, coord: Point3<i32>) -> Option<&mut Chunk> {
        self.chunks.get_mut(&coord)
    }

    pub fn contains(&self, coord: Point3<i32>) -> bool {
        self.chunks.contains_key(&coord)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Iterates over all resident chunks in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Point3<i32>, &Chunk)> {
        self.chunks.iter()
    }

    /// Removes every chunk and returns them.
    pub fn drain(&mut self) -> Vec<Chunk> {
        self.chunks.drain().map(|(_, chunk)| chunk).collect()
    }

    /// Sets a block addressed by world-space block coordinates.
    ///
    /// # Returns
    /// `true` if the containing chunk is resident and the block changed
    pub fn set_block(&mut self, block_coord: Point3<i64>, block: Block) -> bool {
        let (coord, local) = split_block_coord(block_coord);
        self.set_block_in_chunk(coord, block_index(local), block)
    }

    /// Sets a block addressed by chunk coordinate and flat index.
    pub fn set_block_in_chunk(&mut self, coord: Point3<i32>, index: usize, block: Block) -> bool {
        if !self.update_faces {
            return self
                .chunks
                .get_mut(&coord)
                .map(|chunk| chunk.set_block_without_faces(local_from_index(index), block))
                .unwrap_or(false);
        }
        // take the chunk out so the rest of the map can serve as its neighbors
        let Some(mut chunk) = self.chunks.remove(&coord) else {
            return false;
        };
        let changed = chunk.set_block_at_index(index, block, &mut self.chunks);
        self.chunks.insert(coord, chunk);
        changed
    }

    /// Gets a block addressed by world-space block coordinates.
    pub fn get_block(&self, block_coord: Point3<i64>) -> Option<Block> {
        let (coord, local) = split_block_coord(block_coord);
        self.chunks.get(&coord).map(|chunk| chunk.get_block(local))
    }

    /// Rebuilds the face set of a resident chunk from scratch.
    pub fn init_faces(&mut self, coord: Point3<i32>) {
        if let Some(mut chunk) = self.chunks.remove(&coord) {
            if self.update_faces {
                chunk.init_faces(&mut self.chunks);
            } else {
                chunk.init_faces(&mut NoNeighbors);
            }
            self.chunks.insert(coord, chunk);
        }
    }

    /// Collects the coordinates of chunks whose dirty flag was set, clearing it.
    pub fn pop_dirty_chunks(&mut self) -> Vec<Point3<i32>> {
        self.chunks
            .iter_mut()
            .filter_map(|(coord, chunk)| chunk.poll_dirty().then_some(*coord))
            .collect()
    }
}

impl ChunkNeighbors for World {
    fn neighbor_mut(&mut self, coord: Point3<i32>) -> Option<&mut Chunk> {
        self.chunks.get_mut(&coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;
    use crate::engine_state::voxels::chunk::Face;

    fn solid_chunk(coord: Point3<i32>) -> Chunk {
        let mut chunk = Chunk::new(coord);
        chunk.init(&vec![Block::new(BlockType::STONE); crate::engine_state::voxels::chunk::CHUNK_SIZE], 0);
        chunk.init_faces(&mut NoNeighbors);
        chunk
    }

    #[test]
    fn late_neighbor_insertion_resolves_the_shared_boundary() {
        let mut world = World::new(true);
        let a = Point3::new(0, 0, 0);
        let b = Point3::new(1, 0, 0);
        world.insert_chunk(solid_chunk(a));
        world.insert_chunk(solid_chunk(b));

        // a solid cube surrounded by nothing has no faces
        assert!(world.get_chunk(a).unwrap().faces().is_empty());

        // carving the boundary voxel of b exposes a's face
        world.set_block(Point3::new(32, 5, 5), Block::AIR);
        let exposed = Face::new(Point3::new(31, 5, 5), BlockSide::RIGHT);
        assert!(world.get_chunk(a).unwrap().faces().contains(&exposed));

        // unload and reload b: the face must disappear again once b is solid
        let mut reloaded = world.remove_chunk(b).unwrap();
        reloaded.init(&vec![Block::new(BlockType::STONE); crate::engine_state::voxels::chunk::CHUNK_SIZE], 0);
        reloaded.init_faces(&mut NoNeighbors);
        world.insert_chunk(reloaded);
        assert!(!world.get_chunk(a).unwrap().faces().contains(&exposed));
    }

    #[test]
    fn edits_to_absent_chunks_are_ignored() {
        let mut world = World::new(true);
        assert!(!world.set_block(Point3::new(0, 0, 0), BlockType::DIRT.into()));
        assert_eq!(world.get_block(Point3::new(0, 0, 0)), None);
    }

    #[test]
    fn dirty_chunks_are_reported_once() {
        let mut world = World::new(false);
        world.insert_chunk(solid_chunk(Point3::new(0, 0, 0)));
        assert_eq!(world.pop_dirty_chunks(), vec![Point3::new(0, 0, 0)]);
        assert!(world.pop_dirty_chunks().is_empty());

        world.set_block(Point3::new(1, 1, 1), Block::AIR);
        assert_eq!(world.pop_dirty_chunks(), vec![Point3::new(0, 0, 0)]);
    }
}
