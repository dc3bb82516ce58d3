//! # Chunk Module
//!
//! This module provides the `Chunk` struct, a fixed 32x32x32 cube of voxel data and
//! the unit of loading, streaming and persistence.
//!
//! ## Storage
//!
//! Blocks are kept in a flat array indexed `z * W² + y * W + x`. Next to the blocks
//! each chunk maintains an index of exposed faces (see [`faces`]), a revision counter
//! that grows with every mutation, and a dirty flag for dependent systems such as a
//! mesher.
//!
//! ## Lifecycle
//!
//! 1. Created empty, usually as part of a fixed pool
//! 2. Initialized with a coordinate and block data from an archive or a generator
//! 3. Mutated zero or more times through `set_block`
//! 4. Reset and handed back to its pool once nothing references it
//!
//! Chunks never hold references to each other. Neighbor lookups go through the
//! [`ChunkNeighbors`] trait, keyed by chunk coordinate.

use std::collections::{HashMap, HashSet};

use cgmath::Point3;

use super::block::Block;

mod chunk_creation;
pub mod chunk_iteration;
pub mod faces;

pub use chunk_creation::ChunkBuilder;
pub use faces::Face;

/// The dimension (width, height, depth) of a chunk in blocks.
pub const CHUNK_DIMENSION: i32 = 32;
/// The number of blocks in a single 2D plane of a chunk (CHUNK_DIMENSION²).
pub const CHUNK_PLANE_SIZE: usize = (CHUNK_DIMENSION * CHUNK_DIMENSION) as usize;
/// The total number of blocks in a chunk (CHUNK_DIMENSION³).
pub const CHUNK_SIZE: usize = CHUNK_PLANE_SIZE * CHUNK_DIMENSION as usize;

/// Access to the chunks surrounding the one being edited.
///
/// Face maintenance needs to read and update the chunk on the other side of a
/// boundary. Implementors hand out chunks by coordinate; `None` means the
/// neighbor is not resident and the boundary stays unresolved until it is.
pub trait ChunkNeighbors {
    /// Returns the resident chunk at `coord`, if any.
    fn neighbor_mut(&mut self, coord: Point3<i32>) -> Option<&mut Chunk>;
}

impl ChunkNeighbors for HashMap<Point3<i32>, Chunk> {
    fn neighbor_mut(&mut self, coord: Point3<i32>) -> Option<&mut Chunk> {
        self.get_mut(&coord)
    }
}

/// Neighbor access for a chunk that is not part of any world yet, e.g. a chunk
/// being prepared on a worker thread.
pub struct NoNeighbors;

impl ChunkNeighbors for NoNeighbors {
    fn neighbor_mut(&mut self, _coord: Point3<i32>) -> Option<&mut Chunk> {
        None
    }
}

/// Represents a 32x32x32 collection of voxel blocks in the world.
///
/// Chunks are the fundamental unit of world data. Each chunk maintains its
/// position in the chunk grid, its blocks, and the set of visible faces.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The position of this chunk in chunk coordinates (not block coordinates).
    coord: Point3<i32>,

    /// Block data, `CHUNK_SIZE` entries.
    blocks: Vec<Block>,

    /// Exposed faces whose solid block lies inside this chunk.
    faces: HashSet<Face>,

    /// Incremented on every mutation.
    revision: u32,

    /// Set on mutation and on face changes, cleared by `poll_dirty`.
    dirty: bool,

    /// Whether the block data came from an archive or a generator.
    initialized: bool,
}

impl Chunk {
    /// Creates a new, uninitialized chunk at `coord` with every block set to air.
    pub fn new(coord: Point3<i32>) -> Self {
        Chunk {
            coord,
            blocks: vec![Block::AIR; CHUNK_SIZE],
            faces: HashSet::new(),
            revision: 0,
            dirty: false,
            initialized: false,
        }
    }

    /// Creates a chunk for a pool. The coordinate is meaningless until
    /// `init_coord` is called.
    pub fn pooled() -> Self {
        Self::new(Point3::new(0, 0, 0))
    }

    /// Returns the chunk to its pooled state: all air, no faces, revision zero.
    ///
    /// The block buffer is reused so pooled chunks never reallocate.
    pub fn reset(&mut self) {
        self.blocks.fill(Block::AIR);
        self.faces.clear();
        self.revision = 0;
        self.dirty = false;
        self.initialized = false;
    }

    /// Resets the chunk and assigns it a new coordinate.
    pub fn init_coord(&mut self, coord: Point3<i32>) {
        self.reset();
        self.coord = coord;
    }

    /// Writes a block during initialization without touching faces or revision.
    pub fn init_block(&mut self, index: usize, block: Block) {
        self.blocks[index] = block;
    }

    /// Copies a full block array into the chunk and marks it initialized.
    ///
    /// # Arguments
    /// * `blocks` - Exactly `CHUNK_SIZE` blocks in index order
    /// * `revision` - The revision the data was persisted with
    pub fn init(&mut self, blocks: &[Block], revision: u32) {
        debug_assert_eq!(blocks.len(), CHUNK_SIZE);
        self.blocks.copy_from_slice(blocks);
        self.faces.clear();
        self.revision = revision;
        self.finish_init();
    }

    /// Marks the chunk as populated after a sequence of `init_block` calls.
    pub fn finish_init(&mut self) {
        self.initialized = true;
        self.dirty = true;
    }

    pub fn coord(&self) -> Point3<i32> {
        self.coord
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the dirty flag and clears it.
    pub fn poll_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Gets the block at the specified chunk-relative coordinates.
    pub fn get_block(&self, local: Point3<u8>) -> Block {
        self.blocks[block_index(local)]
    }

    /// Gets the block at a flat index.
    pub fn get_block_at_index(&self, index: usize) -> Block {
        self.blocks[index]
    }

    /// Changes one block and updates the face set around it.
    ///
    /// Setting a block to the type it already has is a no-op and does not bump
    /// the revision.
    ///
    /// # Returns
    /// `true` if the block changed
    pub fn set_block<N: ChunkNeighbors>(
        &mut self,
        local: Point3<u8>,
        block: Block,
        neighbors: &mut N,
    ) -> bool {
        let index = block_index(local);
        if self.blocks[index] == block {
            return false;
        }
        self.blocks[index] = block;
        self.update_block_faces(local, neighbors);
        self.revision = self.revision.wrapping_add(1);
        self.dirty = true;
        true
    }

    /// Changes one block without maintaining the face set, for worlds that do
    /// not track visibility (e.g. a headless server).
    pub fn set_block_without_faces(&mut self, local: Point3<u8>, block: Block) -> bool {
        let index = block_index(local);
        if self.blocks[index] == block {
            return false;
        }
        self.blocks[index] = block;
        self.revision = self.revision.wrapping_add(1);
        self.dirty = true;
        true
    }

    /// Same as `set_block`, addressed by flat index.
    ///
    /// # Panics
    /// Panics if `index >= CHUNK_SIZE`.
    pub fn set_block_at_index<N: ChunkNeighbors>(
        &mut self,
        index: usize,
        block: Block,
        neighbors: &mut N,
    ) -> bool {
        self.set_block(local_from_index(index), block, neighbors)
    }

    /// Number of solid blocks in the chunk.
    pub fn count_solid(&self) -> usize {
        chunk_iteration::ChunkBlockIterator::new(self).count()
    }
}

/// Flat index of a chunk-relative coordinate.
#[inline]
pub fn block_index(local: Point3<u8>) -> usize {
    local.z as usize * CHUNK_PLANE_SIZE + local.y as usize * CHUNK_DIMENSION as usize + local.x as usize
}

/// Chunk-relative coordinate of a flat index.
#[inline]
pub fn local_from_index(index: usize) -> Point3<u8> {
    let width = CHUNK_DIMENSION as usize;
    Point3::new(
        (index % width) as u8,
        ((index / width) % width) as u8,
        (index / CHUNK_PLANE_SIZE) as u8,
    )
}

/// Splits a world-space block coordinate into its chunk coordinate and the
/// chunk-relative coordinate inside that chunk.
pub fn split_block_coord(block: Point3<i64>) -> (Point3<i32>, Point3<u8>) {
    let width = CHUNK_DIMENSION as i64;
    (
        Point3::new(
            block.x.div_euclid(width) as i32,
            block.y.div_euclid(width) as i32,
            block.z.div_euclid(width) as i32,
        ),
        Point3::new(
            block.x.rem_euclid(width) as u8,
            block.y.rem_euclid(width) as u8,
            block.z.rem_euclid(width) as u8,
        ),
    )
}

/// Converts a world-space position to the coordinate of the chunk containing it.
pub fn chunk_coord_of(position: Point3<f64>) -> Point3<i32> {
    let width = CHUNK_DIMENSION as f64;
    Point3::new(
        (position.x / width).floor() as i32,
        (position.y / width).floor() as i32,
        (position.z / width).floor() as i32,
    )
}

/// Chebyshev distance between two chunk coordinates.
pub fn chebyshev_distance(a: Point3<i32>, b: Point3<i32>) -> i32 {
    (a.x - b.x)
        .abs()
        .max((a.y - b.y).abs())
        .max((a.z - b.z).abs())
}
