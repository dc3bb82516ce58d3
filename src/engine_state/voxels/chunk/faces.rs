//! # Face Set Maintenance
//!
//! Every chunk keeps an index of its exposed faces: pairs of (solid voxel, side)
//! where the voxel across that side is air. The index is built once with
//! `init_faces` and then kept current incrementally, touching only the six voxel
//! pairs around an edited block.
//!
//! ## Chunk boundaries
//!
//! A face between two chunks is stored in the chunk that owns the solid voxel.
//! Resolving it requires both chunks to be resident. When the neighbor is missing
//! the direction is skipped, and the face stays unresolved until the neighbor
//! arrives and `resolve_boundary` runs for the shared side. The world performs
//! that step on every insertion.

use cgmath::Point3;

use super::{block_index, Chunk, ChunkNeighbors, CHUNK_DIMENSION};
use crate::engine_state::voxels::block::block_side::BlockSide;

/// An exposed face of a solid voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Face {
    /// Chunk-relative coordinate of the solid voxel.
    pub block: Point3<u8>,
    /// The side of the voxel that is exposed.
    pub side: BlockSide,
}

impl Face {
    pub fn new(block: Point3<u8>, side: BlockSide) -> Self {
        Face { block, side }
    }
}

/// Result of stepping from a voxel across one side.
enum Step {
    Inside(Point3<u8>),
    Outside(Point3<u8>),
}

fn step(local: Point3<u8>, side: BlockSide) -> Step {
    let offset = side.offset();
    let target = Point3::new(
        local.x as i32 + offset.x,
        local.y as i32 + offset.y,
        local.z as i32 + offset.z,
    );
    let wrap = |value: i32| value.rem_euclid(CHUNK_DIMENSION) as u8;
    let wrapped = Point3::new(wrap(target.x), wrap(target.y), wrap(target.z));
    let inside = (0..CHUNK_DIMENSION).contains(&target.x)
        && (0..CHUNK_DIMENSION).contains(&target.y)
        && (0..CHUNK_DIMENSION).contains(&target.z);
    if inside {
        Step::Inside(wrapped)
    } else {
        Step::Outside(wrapped)
    }
}

impl Chunk {
    /// The set of exposed faces owned by this chunk.
    pub fn faces(&self) -> &std::collections::HashSet<Face> {
        &self.faces
    }

    /// Builds the face index from scratch for every voxel in the chunk.
    ///
    /// Run once after a chunk is populated. Directions that cross into a
    /// non-resident neighbor are left unresolved.
    pub fn init_faces<N: ChunkNeighbors>(&mut self, neighbors: &mut N) {
        let width = CHUNK_DIMENSION as u8;
        for z in 0..width {
            for y in 0..width {
                for x in 0..width {
                    self.update_block_faces(Point3::new(x, y, z), neighbors);
                }
            }
        }
    }

    /// Re-resolves the six voxel pairs around `local`.
    ///
    /// For each side the pair (this voxel, neighbor voxel) gets exactly the face
    /// its solidity implies: a face on this voxel if it is solid and the neighbor
    /// is air, a face on the neighbor voxel if it is solid and this one is air,
    /// and no face otherwise. Neighbor voxels in another chunk are updated in
    /// that chunk's face set.
    pub fn update_block_faces<N: ChunkNeighbors>(&mut self, local: Point3<u8>, neighbors: &mut N) {
        for side in BlockSide::all() {
            match step(local, side) {
                Step::Inside(neighbor_local) => {
                    let this_solid = self.get_block(local).is_solid();
                    let neighbor_solid = self.get_block(neighbor_local).is_solid();
                    let own = Face::new(local, side);
                    let theirs = Face::new(neighbor_local, side.opposite());
                    set_face(&mut self.faces, own, this_solid && !neighbor_solid);
                    set_face(&mut self.faces, theirs, neighbor_solid && !this_solid);
                }
                Step::Outside(neighbor_local) => {
                    let neighbor_coord = self.coord + side.offset();
                    let Some(neighbor) = neighbors.neighbor_mut(neighbor_coord) else {
                        continue;
                    };
                    self.resolve_across(local, side, neighbor_local, neighbor);
                }
            }
        }
    }

    /// Resolves every voxel pair on the shared boundary with a neighbor that
    /// just became resident.
    ///
    /// `side` is the side of this chunk that touches `neighbor`. Both face sets
    /// end up consistent for the boundary layer regardless of what either
    /// chunk assumed while the other was absent.
    pub fn resolve_boundary(&mut self, side: BlockSide, neighbor: &mut Chunk) {
        debug_assert_eq!(neighbor.coord, self.coord + side.offset());
        let last = (CHUNK_DIMENSION - 1) as u8;
        let layer = if side.is_positive() { last } else { 0 };
        for a in 0..=last {
            for b in 0..=last {
                let local = match side.axis() {
                    0 => Point3::new(layer, a, b),
                    1 => Point3::new(a, layer, b),
                    _ => Point3::new(a, b, layer),
                };
                if let Step::Outside(neighbor_local) = step(local, side) {
                    self.resolve_across(local, side, neighbor_local, neighbor);
                }
            }
        }
    }

    fn resolve_across(
        &mut self,
        local: Point3<u8>,
        side: BlockSide,
        neighbor_local: Point3<u8>,
        neighbor: &mut Chunk,
    ) {
        let this_solid = self.get_block(local).is_solid();
        let neighbor_solid = neighbor.blocks[block_index(neighbor_local)].is_solid();

        set_face(
            &mut self.faces,
            Face::new(local, side),
            this_solid && !neighbor_solid,
        );
        let neighbor_face = Face::new(neighbor_local, side.opposite());
        if set_face(&mut neighbor.faces, neighbor_face, neighbor_solid && !this_solid) {
            neighbor.dirty = true;
        }
    }
}

/// Inserts or removes `face`; returns `true` if the set changed.
fn set_face(faces: &mut std::collections::HashSet<Face>, face: Face, present: bool) -> bool {
    if present {
        faces.insert(face)
    } else {
        faces.remove(&face)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::engine_state::voxels::block::{block_type::BlockType, Block};
    use crate::engine_state::voxels::chunk::{local_from_index, NoNeighbors, CHUNK_SIZE};

    fn random_chunk(coord: Point3<i32>, rng: &mut fastrand::Rng, fill: f64) -> Chunk {
        let mut chunk = Chunk::new(coord);
        for index in 0..CHUNK_SIZE {
            if rng.f64() < fill {
                chunk.init_block(index, BlockType::DIRT.into());
            }
        }
        chunk.finish_init();
        chunk
    }

    /// Faces of `center` computed by brute force against the surrounding map.
    fn oracle(center: &Chunk, neighbors: &HashMap<Point3<i32>, Chunk>) -> HashSet<Face> {
        let mut expected = HashSet::new();
        for index in 0..CHUNK_SIZE {
            let local = local_from_index(index);
            if !center.get_block(local).is_solid() {
                continue;
            }
            for side in BlockSide::all() {
                let other_solid = match step(local, side) {
                    Step::Inside(n) => center.get_block(n).is_solid(),
                    Step::Outside(n) => neighbors[&(center.coord() + side.offset())]
                        .get_block(n)
                        .is_solid(),
                };
                if !other_solid {
                    expected.insert(Face::new(local, side));
                }
            }
        }
        expected
    }

    fn surrounded(rng: &mut fastrand::Rng) -> (Chunk, HashMap<Point3<i32>, Chunk>) {
        let origin = Point3::new(0, 0, 0);
        let center = random_chunk(origin, rng, 0.5);
        let neighbors = BlockSide::all()
            .into_iter()
            .map(|side| {
                let coord = origin + side.offset();
                (coord, random_chunk(coord, rng, 0.5))
            })
            .collect();
        (center, neighbors)
    }

    #[test]
    fn init_faces_matches_brute_force_with_all_neighbors_resident() {
        let mut rng = fastrand::Rng::with_seed(7);
        let (mut center, mut neighbors) = surrounded(&mut rng);

        center.init_faces(&mut neighbors);

        assert_eq!(center.faces(), &oracle(&center, &neighbors));
    }

    #[test]
    fn incremental_edits_match_rebuild() {
        let mut rng = fastrand::Rng::with_seed(42);
        let (mut center, mut neighbors) = surrounded(&mut rng);
        center.init_faces(&mut neighbors);

        for _ in 0..2_000 {
            let index = rng.usize(0..CHUNK_SIZE);
            let block = if rng.bool() { Block::new(BlockType::STONE) } else { Block::AIR };
            center.set_block_at_index(index, block, &mut neighbors);
        }

        let mut rebuilt = Chunk::new(center.coord());
        rebuilt.init(center.blocks(), center.revision());
        rebuilt.init_faces(&mut neighbors);

        assert_eq!(center.faces(), rebuilt.faces());
        assert_eq!(center.faces(), &oracle(&center, &neighbors));
    }

    #[test]
    fn missing_neighbor_leaves_boundary_unresolved() {
        let mut chunk = Chunk::new(Point3::new(0, 0, 0));
        let corner = Point3::new(0, 0, 0);
        chunk.set_block(corner, BlockType::DIRT.into(), &mut NoNeighbors);

        // only the three sides facing into the chunk are known
        let sides: HashSet<BlockSide> = chunk.faces().iter().map(|face| face.side).collect();
        assert_eq!(
            sides,
            HashSet::from([BlockSide::RIGHT, BlockSide::TOP, BlockSide::FRONT])
        );
    }

    #[test]
    fn edits_at_the_boundary_update_the_neighbor() {
        let mut neighbors = HashMap::new();
        let mut left = Chunk::new(Point3::new(-1, 0, 0));
        left.init_block(block_index(Point3::new(31, 4, 4)), BlockType::STONE.into());
        left.finish_init();
        left.init_faces(&mut NoNeighbors);
        neighbors.insert(left.coord(), left);

        let mut chunk = Chunk::new(Point3::new(0, 0, 0));
        chunk.finish_init();
        chunk.update_block_faces(Point3::new(0, 4, 4), &mut neighbors);
        let exposed = Face::new(Point3::new(31, 4, 4), BlockSide::RIGHT);
        assert!(neighbors[&Point3::new(-1, 0, 0)].faces().contains(&exposed));

        chunk.set_block(Point3::new(0, 4, 4), BlockType::DIRT.into(), &mut neighbors);
        assert!(!neighbors[&Point3::new(-1, 0, 0)].faces().contains(&exposed));
        assert!(!chunk
            .faces()
            .contains(&Face::new(Point3::new(0, 4, 4), BlockSide::LEFT)));
    }

    #[test]
    fn resolve_boundary_clears_faces_assumed_while_neighbor_was_absent() {
        let mut rng = fastrand::Rng::with_seed(3);
        let mut a = random_chunk(Point3::new(0, 0, 0), &mut rng, 0.6);
        let mut b = random_chunk(Point3::new(0, 1, 0), &mut rng, 0.6);
        a.init_faces(&mut NoNeighbors);
        b.init_faces(&mut NoNeighbors);

        a.resolve_boundary(BlockSide::TOP, &mut b);

        let mut map = HashMap::from([(b.coord(), b.clone())]);
        let mut expected_a = Chunk::new(a.coord());
        expected_a.init(a.blocks(), 0);
        expected_a.init_faces(&mut map);
        assert_eq!(a.faces(), expected_a.faces());
        assert_eq!(b.faces(), map[&b.coord()].faces());
    }
}
