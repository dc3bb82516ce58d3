//! # Block Type Module
//!
//! This module defines the different types of blocks in the voxel world.
//! It provides functionality for block type identification and conversion.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use super::BlockTypeSize;

/// Enumerates all possible block types in the voxel world.
///
/// Identifier `0` is reserved for air; every other type is solid for the purpose
/// of face visibility. The `FromPrimitive` derive allows conversion from the raw
/// identifiers stored in chunks and archive records.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
pub enum BlockType {
    /// An air block, which is non-solid and transparent.
    AIR = 0,

    /// A basic dirt block found just below the surface.
    DIRT = 1,

    /// The topmost solid layer of generated terrain.
    GRASS = 2,

    /// Deep terrain, five or more blocks below the surface.
    STONE = 3,

    /// A wooden block, only produced by edits.
    WOOD = 4,

    /// A plain white block, often used for testing.
    WHITE = 5,
}

impl BlockType {
    /// Converts a raw identifier to a `BlockType`.
    ///
    /// # Returns
    /// `None` when the identifier does not name a known block type, which can
    /// happen for records written by a newer version of the engine.
    pub fn from_int(btype: BlockTypeSize) -> Option<Self> {
        FromPrimitive::from_u8(btype)
    }

    /// Picks one of the natural solid types (dirt, grass, stone) from `rng`.
    ///
    /// Used by the `Random` generation method, which seeds `rng` per chunk.
    pub fn random_solid(rng: &mut fastrand::Rng) -> Self {
        Self::from_int(rng.u8(1..=3)).unwrap_or(BlockType::DIRT)
    }

    /// Returns `true` for every type other than `AIR`.
    pub fn is_solid(self) -> bool {
        self != BlockType::AIR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_identifiers_round_trip() {
        for raw in 0..=5 {
            let block_type = BlockType::from_int(raw).unwrap();
            assert_eq!(block_type as BlockTypeSize, raw);
        }
        assert_eq!(BlockType::from_int(200), None);
    }

    #[test]
    fn only_air_is_empty() {
        assert!(!BlockType::AIR.is_solid());
        assert!(BlockType::GRASS.is_solid());
        let mut rng = fastrand::Rng::with_seed(1);
        assert!((0..32).all(|_| BlockType::random_solid(&mut rng).is_solid()));
    }
}
