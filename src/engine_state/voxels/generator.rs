//! # Terrain Generation
//!
//! This module defines the contract between the streaming engine and procedural
//! terrain, plus the noise-based generator used by default.
//!
//! A generator is a pure function of the chunk coordinate and the seed: calling it
//! twice for the same chunk must produce the same blocks. It runs on worker threads
//! whenever an archive has no record for a chunk.
//!
//! Multiple terrain generation strategies are supported:
//! - Perlin noise for natural-looking terrain with mountains and caves
//! - Checkerboard pattern for testing
//! - Solid chunks (all blocks filled)
//! - Empty chunks (all blocks air)
//! - Random scattered blocks, seeded per chunk

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::engine_state::voxels::block::{block_type::BlockType, Block};
use crate::engine_state::voxels::chunk::{Chunk, ChunkBuilder, CHUNK_DIMENSION, CHUNK_PLANE_SIZE};

/// Produces the initial contents of a chunk.
pub trait TerrainGenerator: Send + Sync {
    /// Fills every block of `chunk` for its current coordinate and marks it
    /// initialized. Faces are not built.
    fn generate(&self, chunk: &mut Chunk);
}

/// The method used to generate new chunks.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Height map with mountains, flatlands and caves
    #[default]
    Perlin,
    /// Alternates between solid and air blocks in all three dimensions
    Checkerboard,
    /// Completely solid chunks
    Solid,
    /// Completely empty chunks
    Empty,
    /// About one block in ten is solid
    Random,
}

/// Scale of the noise deciding between mountains and flatland.
const AREA_XZ_SCALE: f64 = 1.0 / 1024.0;
/// How sharply the area noise switches between the two landscapes.
const AREA_SHARPNESS: f64 = 6.0;
const AREA_MOUNTAIN_THRESHOLD: f64 = 0.3;

const MOUNTAIN_XZ_SCALE: f64 = 1.0 / 512.0;
const MOUNTAIN_OCTAVES: usize = 6;
const MOUNTAIN_MAX_HEIGHT: f64 = 160.0;

const FLATLAND_XZ_SCALE: f64 = 1.0 / 256.0;
const FLATLAND_OCTAVES: usize = 3;
const FLATLAND_MAX_HEIGHT: f64 = 24.0;

const CAVE_SCALE: f64 = 1.0 / 48.0;
const CAVE_OCTAVES: usize = 4;

/// Blocks at this depth or deeper below the surface turn to stone.
const STONE_DEPTH: usize = 5;
/// Extra blocks sampled above the chunk so surface layering is continuous
/// across vertical chunk borders.
const LOOKAHEAD: usize = STONE_DEPTH - 1;

/// Noise-based terrain generator.
///
/// # Examples
///
/// ```
/// use voxel_stream::engine_state::voxels::generator::{GenerationMethod, NoiseGenerator, TerrainGenerator};
/// use voxel_stream::engine_state::voxels::chunk::Chunk;
/// use cgmath::Point3;
///
/// let generator = NoiseGenerator::new(42, GenerationMethod::Perlin);
/// let mut chunk = Chunk::new(Point3::new(0, -1, 0));
/// generator.generate(&mut chunk);
/// assert!(chunk.is_initialized());
/// ```
pub struct NoiseGenerator {
    seed: u64,
    method: GenerationMethod,
    area: Perlin,
    mountains: Fbm<Perlin>,
    flatland: Fbm<Perlin>,
    caves: Fbm<Perlin>,
}

impl NoiseGenerator {
    /// Creates a generator for `seed` using the given method.
    pub fn new(seed: u64, method: GenerationMethod) -> Self {
        let seed32 = (seed ^ (seed >> 32)) as u32;
        NoiseGenerator {
            seed,
            method,
            area: Perlin::new(seed32),
            mountains: Fbm::<Perlin>::new(seed32.wrapping_add(1))
                .set_octaves(MOUNTAIN_OCTAVES)
                .set_persistence(0.45),
            flatland: Fbm::<Perlin>::new(seed32.wrapping_add(2))
                .set_octaves(FLATLAND_OCTAVES)
                .set_persistence(0.5),
            caves: Fbm::<Perlin>::new(seed32.wrapping_add(3))
                .set_octaves(CAVE_OCTAVES)
                .set_persistence(0.5),
        }
    }

    pub fn method(&self) -> GenerationMethod {
        self.method
    }

    /// Surface height of the column at world-space (x, z).
    fn surface_height(&self, x: f64, z: f64) -> f64 {
        let area = self.area.get([x * AREA_XZ_SCALE, z * AREA_XZ_SCALE]);
        let mountain_factor = (1.0 + ((area - AREA_MOUNTAIN_THRESHOLD) * AREA_SHARPNESS).tanh()) / 2.0;
        let flatland_factor = 1.0 - mountain_factor;

        let mountain_height = self
            .mountains
            .get([x * MOUNTAIN_XZ_SCALE, z * MOUNTAIN_XZ_SCALE])
            .abs()
            * MOUNTAIN_MAX_HEIGHT;
        let flatland_height = self
            .flatland
            .get([x * FLATLAND_XZ_SCALE, z * FLATLAND_XZ_SCALE])
            * FLATLAND_MAX_HEIGHT;

        flatland_height * flatland_factor + mountain_height * mountain_factor
    }

    /// Whether the voxel at world-space (x, y, z) is solid, given the column height.
    fn is_solid(&self, x: f64, y: f64, z: f64, height: f64) -> bool {
        let depth = height - y;
        if depth < 0.0 {
            return false;
        }
        // caves get wider with depth
        let threshold = 0.12 * (3.0 - 1.0 / (depth.floor() / 10.0 + 1.0));
        let cave = (self.caves.get([x * CAVE_SCALE, y * CAVE_SCALE, z * CAVE_SCALE]) + 1.0) / 2.0;
        cave > threshold
    }

    fn generate_perlin(&self, chunk: &mut Chunk) {
        let width = CHUNK_DIMENSION as usize;
        let origin = chunk.coord() * CHUNK_DIMENSION;
        let mut columns = vec![[Block::AIR; CHUNK_DIMENSION as usize]; CHUNK_PLANE_SIZE];

        for z in 0..width {
            for x in 0..width {
                let wx = (origin.x + x as i32) as f64;
                let wz = (origin.z + z as i32) as f64;
                let height = self.surface_height(wx, wz);
                let column = &mut columns[z * width + x];

                let mut solid_run = 0;
                for y in (0..width + LOOKAHEAD).rev() {
                    let wy = (origin.y as i64 + y as i64) as f64;
                    if self.is_solid(wx, wy, wz, height) {
                        solid_run += 1;
                    } else {
                        solid_run = 0;
                    }
                    if y >= width {
                        continue;
                    }
                    column[y] = match solid_run {
                        0 => Block::AIR,
                        1 => BlockType::GRASS.into(),
                        n if n >= STONE_DEPTH => BlockType::STONE.into(),
                        _ => BlockType::DIRT.into(),
                    };
                }
            }
        }

        let mut builder = ChunkBuilder::new(chunk);
        for z in 0..width {
            for y in 0..width {
                for x in 0..width {
                    builder.push_block(columns[z * width + x][y]);
                }
            }
        }
        builder.finish();
    }

    fn generate_with<F: FnMut(i64, i64, i64) -> Block>(chunk: &mut Chunk, mut block_at: F) {
        let width = CHUNK_DIMENSION as i64;
        let coord = chunk.coord();
        let origin = (
            coord.x as i64 * width,
            coord.y as i64 * width,
            coord.z as i64 * width,
        );
        let mut builder = ChunkBuilder::new(chunk);
        for z in 0..width {
            for y in 0..width {
                for x in 0..width {
                    builder.push_block(block_at(origin.0 + x, origin.1 + y, origin.2 + z));
                }
            }
        }
        builder.finish();
    }
}

impl TerrainGenerator for NoiseGenerator {
    fn generate(&self, chunk: &mut Chunk) {
        match self.method {
            GenerationMethod::Perlin => self.generate_perlin(chunk),
            GenerationMethod::Checkerboard => Self::generate_with(chunk, |x, y, z| {
                if (x + y + z).rem_euclid(2) == 0 {
                    BlockType::DIRT.into()
                } else {
                    Block::AIR
                }
            }),
            GenerationMethod::Solid => Self::generate_with(chunk, |_, _, _| BlockType::DIRT.into()),
            GenerationMethod::Empty => Self::generate_with(chunk, |_, _, _| Block::AIR),
            GenerationMethod::Random => {
                let coord = chunk.coord();
                let mut rng = fastrand::Rng::with_seed(
                    self.seed
                        ^ (coord.x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                        ^ (coord.y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
                        ^ (coord.z as u64).wrapping_mul(0x1656_67B1_9E37_79F9),
                );
                Self::generate_with(chunk, |_, _, _| {
                    if rng.f64() < 0.9 {
                        Block::AIR
                    } else {
                        BlockType::random_solid(&mut rng).into()
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::engine_state::voxels::chunk::CHUNK_SIZE;

    #[test]
    fn generation_is_deterministic_per_seed() {
        for method in [GenerationMethod::Perlin, GenerationMethod::Random] {
            let generator = NoiseGenerator::new(1234, method);
            let mut a = Chunk::new(Point3::new(2, -1, 5));
            let mut b = Chunk::new(Point3::new(2, -1, 5));
            generator.generate(&mut a);
            generator.generate(&mut b);
            assert_eq!(a.blocks(), b.blocks());
            assert!(a.is_initialized());
        }
    }

    #[test]
    fn deep_chunks_are_mostly_solid_and_sky_is_empty() {
        let generator = NoiseGenerator::new(7, GenerationMethod::Perlin);
        let mut deep = Chunk::new(Point3::new(0, -20, 0));
        let mut sky = Chunk::new(Point3::new(0, 20, 0));
        generator.generate(&mut deep);
        generator.generate(&mut sky);

        assert!(deep.count_solid() > CHUNK_SIZE / 2);
        assert_eq!(sky.count_solid(), 0);
    }

    #[test]
    fn simple_methods_fill_as_described() {
        let mut chunk = Chunk::new(Point3::new(0, 0, 0));
        NoiseGenerator::new(0, GenerationMethod::Solid).generate(&mut chunk);
        assert_eq!(chunk.count_solid(), CHUNK_SIZE);
        NoiseGenerator::new(0, GenerationMethod::Empty).generate(&mut chunk);
        assert_eq!(chunk.count_solid(), 0);
        NoiseGenerator::new(0, GenerationMethod::Checkerboard).generate(&mut chunk);
        assert_eq!(chunk.count_solid(), CHUNK_SIZE / 2);
    }
}
