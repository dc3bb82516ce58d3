//! # Chunk Iteration Module
//!
//! This module provides an iterator over the solid blocks of a chunk together with
//! their chunk-relative positions.

use cgmath::Point3;

use crate::engine_state::voxels::block::Block;

use super::{local_from_index, Chunk};

/// An iterator over all non-air blocks in a chunk, in index order.
pub struct ChunkBlockIterator<'a> {
    /// Reference to the chunk being iterated over
    chunk_ref: &'a Chunk,
    /// Index of the next block to inspect
    current_index: usize,
}

impl<'a> ChunkBlockIterator<'a> {
    /// Creates a new `ChunkBlockIterator` for the given chunk.
    pub fn new(chunk_ref: &'a Chunk) -> Self {
        ChunkBlockIterator {
            chunk_ref,
            current_index: 0,
        }
    }
}

impl<'a> Iterator for ChunkBlockIterator<'a> {
    type Item = (Point3<u8>, Block);

    fn next(&mut self) -> Option<Self::Item> {
        let blocks = self.chunk_ref.blocks();
        while self.current_index < blocks.len() {
            let index = self.current_index;
            self.current_index += 1;
            if blocks[index].is_solid() {
                return Some((local_from_index(index), blocks[index]));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;
    use crate::engine_state::voxels::chunk::block_index;

    #[test]
    fn yields_only_solid_blocks_with_positions() {
        let mut chunk = Chunk::new(Point3::new(0, 0, 0));
        let a = Point3::new(3, 0, 0);
        let b = Point3::new(0, 7, 31);
        chunk.init_block(block_index(b), BlockType::GRASS.into());
        chunk.init_block(block_index(a), BlockType::DIRT.into());

        let solid: Vec<_> = ChunkBlockIterator::new(&chunk).collect();
        assert_eq!(
            solid,
            vec![
                (a, Block::new(BlockType::DIRT)),
                (b, Block::new(BlockType::GRASS))
            ]
        );
    }
}
