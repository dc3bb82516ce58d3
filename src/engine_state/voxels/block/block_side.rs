//! # Block Side Module
//!
//! This module defines the six faces/sides of a voxel block and the unit offsets
//! they point along. Face visibility tracking walks these directions to find the
//! neighbor of a voxel, possibly inside an adjacent chunk.

use cgmath::Vector3;

/// Represents the six possible faces of a voxel block.
///
/// The discriminants are ordered so that the opposite of side `d` is always
/// `(d + 3) % 6`: the first three sides point along the positive axes and the
/// last three along the negative ones.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, PartialOrd, Ord)]
pub enum BlockSide {
    /// The right face (facing positive X)
    RIGHT = 0,

    /// The top face (facing positive Y)
    TOP = 1,

    /// The front face (facing positive Z)
    FRONT = 2,

    /// The left face (facing negative X)
    LEFT = 3,

    /// The bottom face (facing negative Y)
    BOTTOM = 4,

    /// The back face (facing negative Z)
    BACK = 5,
}

impl BlockSide {
    /// Returns an array containing all six block faces in discriminant order.
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::RIGHT,
            BlockSide::TOP,
            BlockSide::FRONT,
            BlockSide::LEFT,
            BlockSide::BOTTOM,
            BlockSide::BACK,
        ]
    }

    /// Looks a side up by its discriminant, wrapping modulo 6.
    pub fn from_index(index: usize) -> BlockSide {
        Self::all()[index % 6]
    }

    /// The side facing the opposite way.
    pub fn opposite(self) -> BlockSide {
        Self::from_index(self as usize + 3)
    }

    /// The unit offset from a voxel to its neighbor across this face.
    pub fn offset(self) -> Vector3<i32> {
        match self {
            BlockSide::RIGHT => Vector3::new(1, 0, 0),
            BlockSide::TOP => Vector3::new(0, 1, 0),
            BlockSide::FRONT => Vector3::new(0, 0, 1),
            BlockSide::LEFT => Vector3::new(-1, 0, 0),
            BlockSide::BOTTOM => Vector3::new(0, -1, 0),
            BlockSide::BACK => Vector3::new(0, 0, -1),
        }
    }

    /// The axis (0 = x, 1 = y, 2 = z) this side is perpendicular to.
    pub fn axis(self) -> usize {
        self as usize % 3
    }

    /// `true` for the three sides pointing along a positive axis.
    pub fn is_positive(self) -> bool {
        (self as usize) < 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_sides_cancel_out() {
        for side in BlockSide::all() {
            assert_eq!(side.opposite().opposite(), side);
            assert_eq!(side.offset() + side.opposite().offset(), Vector3::new(0, 0, 0));
            assert_eq!(side.axis(), side.opposite().axis());
            assert_ne!(side.is_positive(), side.opposite().is_positive());
        }
    }
}
