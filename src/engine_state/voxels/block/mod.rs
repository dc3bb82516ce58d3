//! # Block Module
//!
//! This module provides the core block-related functionality for the streaming engine.
//! It includes block type definitions, the six face directions, and the compact
//! block representation stored inside chunks and archive records.

use block_type::BlockType;

pub mod block_side;
pub mod block_type;

/// The underlying integer type used to represent block types in memory.
/// This is used for efficient storage and serialization of block data.
pub type BlockTypeSize = u8;

/// Represents a single voxel block in the world.
///
/// This is a lightweight structure that stores only the essential block data.
/// The block type is stored as a compact `BlockTypeSize`, and the `Pod` layout lets
/// a whole chunk be viewed as a byte slice when it is written to an archive.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, Default, PartialEq, Eq, Hash)]
pub struct Block {
    /// The type of this block, encoded as a `BlockTypeSize` for compact storage.
    pub block_type: BlockTypeSize,
}

impl Block {
    /// The empty block. Chunks are reset to this value when they return to a pool.
    pub const AIR: Block = Block { block_type: 0 };

    /// Creates a new block of the specified type.
    ///
    /// # Arguments
    /// * `block_type` - The type of block to create
    ///
    /// # Returns
    /// A new `Block` instance with the specified type.
    pub fn new(block_type: BlockType) -> Self {
        Block {
            block_type: block_type as BlockTypeSize,
        }
    }

    /// Returns `true` for every block that is not air.
    #[inline]
    pub fn is_solid(self) -> bool {
        self.block_type != 0
    }
}

impl From<BlockType> for Block {
    fn from(block_type: BlockType) -> Self {
        Block::new(block_type)
    }
}
