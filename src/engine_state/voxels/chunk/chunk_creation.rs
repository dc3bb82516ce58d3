//! # Chunk Creation Module
//!
//! This module provides a builder that populates a chunk block by block in index
//! order. Generators use it to write into pooled chunks without allocating and
//! without paying for face maintenance on every block.

use crate::engine_state::voxels::block::Block;

use super::{Chunk, CHUNK_SIZE};

/// Writes blocks into a chunk sequentially, starting at index 0.
///
/// The chunk is reset when the builder is created, so whatever it held before
/// (for example a previous coordinate's data in a pool) is discarded. Faces are
/// not touched; callers run `init_faces` once the chunk is complete.
pub struct ChunkBuilder<'a> {
    /// The chunk being populated
    chunk: &'a mut Chunk,
    /// Index of the next block to write
    index: usize,
    /// Number of solid blocks written so far
    solid_blocks: usize,
}

impl<'a> ChunkBuilder<'a> {
    /// Starts populating `chunk`, keeping its coordinate.
    pub fn new(chunk: &'a mut Chunk) -> Self {
        let coord = chunk.coord();
        chunk.init_coord(coord);
        ChunkBuilder {
            chunk,
            index: 0,
            solid_blocks: 0,
        }
    }

    /// Adds a block at the current position and advances the position.
    ///
    /// Blocks beyond `CHUNK_SIZE` are ignored.
    pub fn push_block(&mut self, block: Block) {
        if self.index >= CHUNK_SIZE {
            return;
        }
        if block.is_solid() {
            self.chunk.init_block(self.index, block);
            self.solid_blocks += 1;
        }
        self.index += 1;
    }

    /// Number of blocks pushed so far.
    pub fn len(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index == 0
    }

    /// Finalizes the chunk and marks it initialized.
    ///
    /// Positions that were never pushed stay air.
    ///
    /// # Returns
    /// The number of solid blocks written
    pub fn finish(self) -> usize {
        self.chunk.finish_init();
        self.solid_blocks
    }
}
