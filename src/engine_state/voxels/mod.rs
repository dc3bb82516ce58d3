//! # Voxel Streaming Core
//!
//! This module contains the voxel data model and everything that moves chunks
//! between storage, generation and the resident world.
//!
//! ## Architecture
//!
//! * **Block**: Voxel types and the six face directions
//! * **Chunk**: Fixed-size 3D arrays of blocks with an incrementally maintained face set
//! * **World**: The resident chunks, keeping face sets consistent across chunk boundaries
//! * **Generator**: Deterministic procedural terrain for chunks never stored before
//! * **Archive**: Persistent chunk records, on disk or in memory
//! * **Chunk Loader**: Background streaming of chunks around tracked players
//! * **Chunk Manager**: Pooled, reference-counted chunks with asynchronous archive I/O
//! * **Provider**: Direct generation path for chunks the archive does not know
//!
//! ## Data Flow
//!
//! 1. A consumer asks for a chunk (by player movement or by an explicit request)
//! 2. A worker reads it from the archive or generates it, and builds its faces
//! 3. The chunk moves through a queue to the owning thread and into a `World`
//! 4. Edits bump the chunk's revision; on release only changed chunks are stored
//!
//! ## Thread Safety
//!
//! Chunks are never shared. They are owned values moved through channels between
//! the owning thread and exactly one worker at a time.

pub mod archive;
pub mod block;
pub mod chunk;
pub mod chunk_loader;
pub mod chunk_manager;
pub mod generator;
pub mod provider;
pub mod world;
