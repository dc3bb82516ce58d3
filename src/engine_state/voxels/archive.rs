//! # Chunk Archive
//!
//! Persistent storage of chunks, keyed by chunk coordinate. Archives are only ever
//! used from worker threads, so implementations may block on disk I/O.
//!
//! ## Record Format
//!
//! Each chunk is one record:
//!
//! | bytes | content                                   |
//! |-------|-------------------------------------------|
//! | 4     | magic `VXCK`                              |
//! | 1     | format version                            |
//! | 12    | chunk coordinate, three `i32` LE          |
//! | 4     | revision, `u32` LE                        |
//! | 4     | payload length, `u32` LE                  |
//! | n     | LZ4 block array (size prepended)          |
//!
//! The revision lets the owner of a live chunk tell whether the persisted copy is
//! already current.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cgmath::Point3;
use log::{debug, info};
use lru::LruCache;

use crate::core::MtResource;
use crate::engine_state::voxels::block::Block;
use crate::engine_state::voxels::chunk::{Chunk, CHUNK_SIZE};
use crate::error::ArchiveError;

/// Persistent key-value store of chunks.
pub trait ChunkArchive: Send {
    /// Fills `chunk` with the record stored for `chunk.coord()`.
    ///
    /// # Returns
    /// - `Ok(true)` if a record was found; the chunk is initialized with its
    ///   blocks and revision
    /// - `Ok(false)` if there is no record; the chunk is left untouched
    fn load(&mut self, chunk: &mut Chunk) -> Result<bool, ArchiveError>;

    /// Writes the current blocks and revision of `chunk`, replacing any
    /// previous record.
    fn store(&mut self, chunk: &Chunk) -> Result<(), ArchiveError>;
}

impl<T: ChunkArchive + ?Sized> ChunkArchive for Box<T> {
    fn load(&mut self, chunk: &mut Chunk) -> Result<bool, ArchiveError> {
        (**self).load(chunk)
    }

    fn store(&mut self, chunk: &Chunk) -> Result<(), ArchiveError> {
        (**self).store(chunk)
    }
}

const MAGIC: &[u8; 4] = b"VXCK";
const FORMAT_VERSION: u8 = 1;
const HEADER_SIZE: usize = 4 + 1 + 12 + 4 + 4;

/// A decoded chunk record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub coord: Point3<i32>,
    pub revision: u32,
    pub blocks: Vec<Block>,
}

impl ChunkRecord {
    /// Captures the persisted state of a chunk.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        ChunkRecord {
            coord: chunk.coord(),
            revision: chunk.revision(),
            blocks: chunk.blocks().to_vec(),
        }
    }

    /// Copies the record into `chunk`.
    pub fn apply(&self, chunk: &mut Chunk) {
        chunk.init(&self.blocks, self.revision);
    }

    /// Serializes the record.
    pub fn encode(&self) -> Vec<u8> {
        let payload = lz4_flex::compress_prepend_size(bytemuck::cast_slice(&self.blocks));
        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&self.coord.x.to_le_bytes());
        bytes.extend_from_slice(&self.coord.y.to_le_bytes());
        bytes.extend_from_slice(&self.coord.z.to_le_bytes());
        bytes.extend_from_slice(&self.revision.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        bytes
    }

    /// Parses a record that is expected to belong to `coord`.
    pub fn decode(coord: Point3<i32>, bytes: &[u8]) -> Result<Self, ArchiveError> {
        let corrupt = |reason| ArchiveError::Corrupt { coord, reason };
        if bytes.len() < HEADER_SIZE {
            return Err(corrupt("truncated header"));
        }
        if &bytes[0..4] != MAGIC {
            return Err(corrupt("bad magic"));
        }
        if bytes[4] != FORMAT_VERSION {
            return Err(corrupt("unsupported format version"));
        }
        let word = |offset: usize| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[offset..offset + 4]);
            buf
        };
        let stored = Point3::new(
            i32::from_le_bytes(word(5)),
            i32::from_le_bytes(word(9)),
            i32::from_le_bytes(word(13)),
        );
        if stored != coord {
            return Err(corrupt("record belongs to another chunk"));
        }
        let revision = u32::from_le_bytes(word(17));
        let payload_len = u32::from_le_bytes(word(21)) as usize;
        let payload = bytes
            .get(HEADER_SIZE..HEADER_SIZE + payload_len)
            .ok_or_else(|| corrupt("truncated payload"))?;

        let raw = lz4_flex::decompress_size_prepended(payload)?;
        if raw.len() != CHUNK_SIZE {
            return Err(corrupt("wrong block count"));
        }
        Ok(ChunkRecord {
            coord,
            revision,
            blocks: bytemuck::cast_slice::<u8, Block>(&raw).to_vec(),
        })
    }
}

/// An archive keeping one file per chunk below a root directory.
///
/// Recently loaded or stored records are kept in an LRU cache, so a chunk that is
/// released and requested again shortly after does not hit the disk.
pub struct RegionArchive {
    root: PathBuf,
    cache: Option<LruCache<Point3<i32>, ChunkRecord>>,
}

impl RegionArchive {
    /// Opens (creating if needed) an archive rooted at `root`.
    ///
    /// # Arguments
    /// * `root` - Directory holding the chunk files
    /// * `cache_size` - Number of records kept in memory; zero disables the cache
    pub fn open(root: impl Into<PathBuf>, cache_size: usize) -> Result<Self, ArchiveError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!("Chunk archive opened at {:?}", root);
        Ok(RegionArchive {
            root,
            cache: NonZeroUsize::new(cache_size).map(LruCache::new),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chunk_path(&self, coord: Point3<i32>) -> PathBuf {
        self.root
            .join(format!("{}_{}_{}.chunk", coord.x, coord.y, coord.z))
    }
}

impl ChunkArchive for RegionArchive {
    fn load(&mut self, chunk: &mut Chunk) -> Result<bool, ArchiveError> {
        let coord = chunk.coord();
        if let Some(record) = self.cache.as_mut().and_then(|cache| cache.get(&coord)) {
            record.apply(chunk);
            return Ok(true);
        }
        let bytes = match fs::read(self.chunk_path(coord)) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(error.into()),
        };
        let record = ChunkRecord::decode(coord, &bytes)?;
        record.apply(chunk);
        debug!("Loaded chunk {:?} revision {}", coord, record.revision);
        if let Some(cache) = self.cache.as_mut() {
            cache.put(coord, record);
        }
        Ok(true)
    }

    fn store(&mut self, chunk: &Chunk) -> Result<(), ArchiveError> {
        let record = ChunkRecord::from_chunk(chunk);
        let path = self.chunk_path(record.coord);
        let temp = path.with_extension("chunk.tmp");
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&record.encode())?;
            file.sync_data()?;
        }
        fs::rename(&temp, &path)?;
        debug!("Stored chunk {:?} revision {}", record.coord, record.revision);
        if let Some(cache) = self.cache.as_mut() {
            cache.put(record.coord, record);
        }
        Ok(())
    }
}

/// An archive held entirely in memory.
///
/// Clones share the same records, which lets a test or a caller keep a handle to
/// the archive after moving it into a worker. Loads and stores are counted.
#[derive(Clone, Default)]
pub struct MemoryArchive {
    records: MtResource<HashMap<Point3<i32>, ChunkRecord>>,
    loads: Arc<AtomicUsize>,
    stores: Arc<AtomicUsize>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record stored for `coord`, if any.
    pub fn record(&self, coord: Point3<i32>) -> Option<ChunkRecord> {
        self.records.get().get(&coord).cloned()
    }

    /// Adds or replaces a record directly, bypassing the store counter.
    pub fn insert_record(&self, record: ChunkRecord) {
        self.records.get_mut().insert(record.coord, record);
    }

    pub fn len(&self) -> usize {
        self.records.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.get().is_empty()
    }

    /// Number of `load` calls so far, hits and misses.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of `store` calls so far.
    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

impl ChunkArchive for MemoryArchive {
    fn load(&mut self, chunk: &mut Chunk) -> Result<bool, ArchiveError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match self.records.get().get(&chunk.coord()) {
            Some(record) => {
                record.apply(chunk);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn store(&mut self, chunk: &Chunk) -> Result<(), ArchiveError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.records
            .get_mut()
            .insert(chunk.coord(), ChunkRecord::from_chunk(chunk));
        Ok(())
    }
}
