//! # Chunk Manager
//!
//! Turns consumer interest in chunk coordinates into resident chunks, without ever
//! allocating more than a fixed pool of them, and keeps the archive in sync with the
//! edits made to them.
//!
//! ## Ownership
//!
//! Every chunk the manager allocated is in exactly one place at any time:
//!
//! * the pool of unused chunks,
//! * the live [`World`],
//! * one of the manager's queues (`pre_store`, `not_in_cache`),
//! * the archive worker or the provider, having been moved there through a channel.
//!
//! A chunk handed to a worker is not touched on the owning thread until it comes
//! back as a completion, so no chunk is ever mutated by two threads.
//!
//! ## Tick
//!
//! The owner calls [`ChunkManager::tick`] once per update. A tick
//!
//! 1. admits finished loads into the live world if they are still needed and
//!    recycles the rest,
//! 2. resubmits stores that did not fit into the worker queue earlier,
//! 3. passes archive misses to the provider and admits what it produced,
//! 4. dispatches new loads while pooled chunks and queue space are available.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cgmath::Point3;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::config::StreamingConfig;
use crate::engine_state::task_management::task::{HaltFlag, WorkerTask};
use crate::engine_state::task_management::Worker;
use crate::engine_state::voxels::archive::ChunkArchive;
use crate::engine_state::voxels::block::Block;
use crate::engine_state::voxels::chunk::{Chunk, NoNeighbors};
use crate::engine_state::voxels::generator::TerrainGenerator;
use crate::engine_state::voxels::provider::ChunkProvider;
use crate::engine_state::voxels::world::World;
use crate::error::{ArchiveError, Result, StreamError};

const WORKER_NAME: &str = "chunk manager";

enum ArchiveOperation {
    Load(Chunk),
    Store(Chunk),
}

impl ArchiveOperation {
    fn into_chunk(self) -> Chunk {
        match self {
            ArchiveOperation::Load(chunk) | ArchiveOperation::Store(chunk) => chunk,
        }
    }
}

enum Completion {
    /// Read from the archive.
    Loaded(Chunk),
    /// Not in the archive, filled by the worker's generator.
    Generated(Chunk),
    /// Not in the archive and the worker has no generator.
    Missing(Chunk),
    Stored {
        chunk: Chunk,
        result: std::result::Result<(), ArchiveError>,
    },
}

struct ArchiveTask {
    archive: Box<dyn ChunkArchive>,
    generator: Option<Arc<dyn TerrainGenerator>>,
    update_faces: bool,
    retry_backoff: Duration,
    operations: Receiver<ArchiveOperation>,
    completed: Sender<Completion>,
    /// A completion the owner had no room for when the halt came.
    undelivered: Option<Completion>,
    /// Stores that failed after the last completion was delivered.
    failed: Vec<ArchiveError>,
}

impl ArchiveTask {
    fn load(&mut self, mut chunk: Chunk) -> Completion {
        let coord = chunk.coord();
        let found = match self.archive.load(&mut chunk) {
            Ok(found) => found,
            Err(err) => {
                warn!("Chunk {:?} unreadable, treating as missing: {}", coord, err);
                chunk.init_coord(coord);
                false
            }
        };
        if !found {
            let Some(generator) = &self.generator else {
                return Completion::Missing(chunk);
            };
            generator.generate(&mut chunk);
        }
        if self.update_faces {
            chunk.init_faces(&mut NoNeighbors);
        }
        if found {
            Completion::Loaded(chunk)
        } else {
            Completion::Generated(chunk)
        }
    }

    fn store(&mut self, chunk: Chunk) -> Completion {
        let result = self.archive.store(&chunk);
        Completion::Stored { chunk, result }
    }
}

impl WorkerTask for ArchiveTask {
    fn do_work(&mut self, halt: &HaltFlag) -> bool {
        let Ok(operation) = self.operations.try_recv() else {
            return false;
        };
        let mut completion = match operation {
            ArchiveOperation::Load(chunk) => self.load(chunk),
            ArchiveOperation::Store(chunk) => self.store(chunk),
        };
        loop {
            match self.completed.try_send(completion) {
                Ok(()) => return true,
                Err(TrySendError::Full(returned)) => {
                    completion = returned;
                    if !halt.sleep(self.retry_backoff) {
                        // handed to the owner through `wait`
                        self.undelivered = Some(completion);
                        return true;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return true,
            }
        }
    }

    fn on_stop(&mut self) {
        // loads still queued are moot, stores are not
        let mut stored = 0;
        while let Ok(operation) = self.operations.try_recv() {
            if let ArchiveOperation::Store(chunk) = operation {
                match self.archive.store(&chunk) {
                    Ok(()) => stored += 1,
                    Err(err) => {
                        error!("Failed to persist chunk {:?}: {}", chunk.coord(), err);
                        self.failed.push(err);
                    }
                }
            }
        }
        if stored > 0 {
            info!("Persisted {} queued chunks while stopping", stored);
        }
    }
}

/// Snapshot of the manager's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Coordinates with at least one outstanding request.
    pub needed_chunks: usize,
    /// Pooled chunks currently in use anywhere.
    pub allocated_chunks: usize,
    /// Chunks in the live world.
    pub loaded_chunks: usize,
    pub requested_queue_size: usize,
    pub not_in_cache_queue_size: usize,
    /// Chunks waiting to be submitted for storage.
    pub pre_store_queue_size: usize,
    /// Chunks read from the archive this session.
    pub archive_loads: usize,
    /// Chunks generated this session, by the worker or the provider.
    pub generated: usize,
    /// Successful archive stores this session.
    pub stores: usize,
}

/// Pooled, reference-counted set of live chunks backed by an archive.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cgmath::Point3;
/// use voxel_stream::config::StreamingConfig;
/// use voxel_stream::engine_state::voxels::archive::MemoryArchive;
/// use voxel_stream::engine_state::voxels::chunk_manager::ChunkManager;
/// use voxel_stream::engine_state::voxels::generator::{GenerationMethod, NoiseGenerator};
///
/// let config = StreamingConfig { pool_capacity: 8, poll_interval_ms: 1, ..Default::default() };
/// let generator = Arc::new(NoiseGenerator::new(0, GenerationMethod::Checkerboard));
/// let mut manager = ChunkManager::new(&config, Box::new(MemoryArchive::new()), generator).unwrap();
///
/// let coord = Point3::new(0, 0, 0);
/// manager.request_chunk(coord);
/// while manager.get_chunk(coord).is_none() {
///     manager.tick().unwrap();
///     std::thread::sleep(std::time::Duration::from_millis(1));
/// }
/// manager.release_chunk(coord);
/// manager.store_chunks().unwrap();
/// ```
pub struct ChunkManager {
    live: World,
    /// Unused chunks. Never grows beyond `capacity`.
    pool: Vec<Chunk>,
    capacity: usize,
    need_counter: HashMap<Point3<i32>, usize>,
    /// Revision each live chunk had when it was last read from or written to the
    /// archive. Generated chunks have no entry until they are stored.
    old_revisions: HashMap<Point3<i32>, u32>,
    /// Coordinates queued in `requested` or with a load in flight.
    pending_loads: HashSet<Point3<i32>>,
    requested: VecDeque<Point3<i32>>,
    pre_store: VecDeque<Chunk>,
    not_in_cache: VecDeque<Chunk>,
    provider: Option<Box<dyn ChunkProvider>>,
    to_worker: Sender<ArchiveOperation>,
    completed: Receiver<Completion>,
    worker: Worker<ArchiveTask>,
    shut_down: bool,
    stats: ManagerStats,
}

impl ChunkManager {
    /// Creates a manager whose worker generates chunks missing from the archive.
    ///
    /// # Arguments
    /// * `config` - Pool and queue capacities, pacing and face maintenance
    /// * `archive` - Persistent chunk store, used only by the worker thread
    /// * `generator` - Fills chunks the archive has no record of
    ///
    /// # Returns
    /// An error if `config` does not validate or the worker cannot start
    pub fn new(
        config: &StreamingConfig,
        archive: Box<dyn ChunkArchive>,
        generator: Arc<dyn TerrainGenerator>,
    ) -> Result<Self> {
        Self::build(config, archive, Some(generator), None)
    }

    /// Creates a manager that passes archive misses to `provider`.
    pub fn with_provider(
        config: &StreamingConfig,
        archive: Box<dyn ChunkArchive>,
        provider: Box<dyn ChunkProvider>,
    ) -> Result<Self> {
        Self::build(config, archive, None, Some(provider))
    }

    fn build(
        config: &StreamingConfig,
        archive: Box<dyn ChunkArchive>,
        generator: Option<Arc<dyn TerrainGenerator>>,
        provider: Option<Box<dyn ChunkProvider>>,
    ) -> Result<Self> {
        config.validate()?;
        let (to_worker, operations) = bounded(config.worker_queue_capacity);
        let (completion_sender, completed) = bounded(config.worker_queue_capacity);

        let mut worker = Worker::new(WORKER_NAME);
        worker.dispatch(
            ArchiveTask {
                archive,
                generator,
                update_faces: config.update_faces,
                retry_backoff: config.queue_retry_backoff(),
                operations,
                completed: completion_sender,
                undelivered: None,
                failed: Vec::new(),
            },
            config.poll_interval(),
        )?;

        let pool = (0..config.pool_capacity).map(|_| Chunk::pooled()).collect();
        info!("Chunk manager started with a pool of {} chunks", config.pool_capacity);

        Ok(ChunkManager {
            live: World::new(config.update_faces),
            pool,
            capacity: config.pool_capacity,
            need_counter: HashMap::new(),
            old_revisions: HashMap::new(),
            pending_loads: HashSet::new(),
            requested: VecDeque::new(),
            pre_store: VecDeque::new(),
            not_in_cache: VecDeque::new(),
            provider,
            to_worker,
            completed,
            worker,
            shut_down: false,
            stats: ManagerStats::default(),
        })
    }

    /// Registers interest in a chunk. The first request for a coordinate queues
    /// its load.
    pub fn request_chunk(&mut self, coord: Point3<i32>) {
        let count = self.need_counter.entry(coord).or_insert(0);
        *count += 1;
        if *count == 1 && !self.live.contains(coord) && self.pending_loads.insert(coord) {
            self.requested.push_back(coord);
        }
    }

    /// Drops one unit of interest in a chunk.
    ///
    /// When the last one is gone the chunk leaves the live world. It is stored first
    /// if it changed since the archive last saw it, and recycled directly otherwise.
    pub fn release_chunk(&mut self, coord: Point3<i32>) {
        let Some(count) = self.need_counter.get_mut(&coord) else {
            warn!("Release of chunk {:?} which was not requested", coord);
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        self.need_counter.remove(&coord);

        // a chunk still loading is recycled when its load completes
        let Some(chunk) = self.live.remove_chunk(coord) else {
            return;
        };
        if self.old_revisions.remove(&coord) == Some(chunk.revision()) {
            self.recycle(chunk);
        } else {
            debug!("Chunk {:?} changed, queueing store", coord);
            self.pre_store.push_back(chunk);
        }
    }

    /// The live chunk at `coord`, or `None` while it is not resident.
    pub fn get_chunk(&self, coord: Point3<i32>) -> Option<&Chunk> {
        self.live.get_chunk(coord)
    }

    /// The live world, for reading blocks and faces across chunk boundaries.
    pub fn world(&self) -> &World {
        &self.live
    }

    /// Applies an edit if the chunk is still at the revision the editor saw.
    ///
    /// # Arguments
    /// * `coord` - Chunk coordinate
    /// * `index` - Block index inside the chunk
    /// * `block` - The new block
    /// * `revision` - Revision the edit was made against
    ///
    /// # Returns
    /// `true` if the block changed. Edits to absent chunks and stale edits are
    /// dropped with a warning.
    pub fn place_block(&mut self, coord: Point3<i32>, index: usize, block: Block, revision: u32) -> bool {
        let Some(chunk) = self.live.get_chunk(coord) else {
            warn!("Edit of chunk {:?} which is not loaded", coord);
            return false;
        };
        if chunk.revision() != revision {
            warn!(
                "Stale edit of chunk {:?}: made against revision {}, chunk is at {}",
                coord,
                revision,
                chunk.revision()
            );
            return false;
        }
        self.live.set_block_in_chunk(coord, index, block)
    }

    /// Advances all asynchronous work. Call once per update.
    ///
    /// # Returns
    /// An error if the worker died, or if an archive store failed since the last
    /// tick. All other work of the tick is still done in the latter case.
    pub fn tick(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        if self.worker.stopped_unexpectedly() {
            error!("{} worker died", WORKER_NAME);
            return Err(StreamError::WorkerStopped(WORKER_NAME));
        }

        let store_result = self.process_completions();
        self.submit_stores()?;
        self.exchange_with_provider();
        self.dispatch_loads()?;
        store_result
    }

    fn process_completions(&mut self) -> Result<()> {
        let mut first_error = None;
        let completions: Vec<Completion> = self.completed.try_iter().collect();
        for completion in completions {
            if let Some(err) = self.complete(completion) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Applies one completion of the worker.
    ///
    /// # Returns
    /// The error of a failed store
    fn complete(&mut self, completion: Completion) -> Option<ArchiveError> {
        match completion {
            Completion::Loaded(chunk) => {
                self.stats.archive_loads += 1;
                self.pending_loads.remove(&chunk.coord());
                if self.is_needed(chunk.coord()) {
                    self.old_revisions.insert(chunk.coord(), chunk.revision());
                }
                self.admit(chunk);
            }
            Completion::Generated(chunk) => {
                self.stats.generated += 1;
                self.pending_loads.remove(&chunk.coord());
                self.admit(chunk);
            }
            Completion::Missing(chunk) => self.not_in_cache.push_back(chunk),
            Completion::Stored { chunk, result } => {
                let coord = chunk.coord();
                self.recycle(chunk);
                match result {
                    Ok(()) => self.stats.stores += 1,
                    Err(err) => {
                        error!("Failed to persist chunk {:?}: {}", coord, err);
                        return Some(err);
                    }
                }
            }
        }
        None
    }

    /// Installs a finished chunk, or recycles it if nobody needs it anymore.
    fn admit(&mut self, chunk: Chunk) {
        let coord = chunk.coord();
        if !self.is_needed(coord) {
            debug!("Chunk {:?} arrived after its release, recycling", coord);
            self.recycle(chunk);
            return;
        }
        if let Some(replaced) = self.live.insert_chunk(chunk) {
            warn!("Chunk {:?} was loaded twice", coord);
            self.recycle(replaced);
        }
    }

    fn submit_stores(&mut self) -> Result<()> {
        while let Some(chunk) = self.pre_store.pop_front() {
            if let Err(err) = self.to_worker.try_send(ArchiveOperation::Store(chunk)) {
                let disconnected = err.is_disconnected();
                self.pre_store.push_front(err.into_inner().into_chunk());
                if disconnected {
                    return Err(StreamError::WorkerStopped(WORKER_NAME));
                }
                break;
            }
        }
        Ok(())
    }

    fn exchange_with_provider(&mut self) {
        let Some(provider) = self.provider.as_mut() else {
            return;
        };
        while let Some(chunk) = self.not_in_cache.pop_front() {
            let coord = chunk.coord();
            if !self.need_counter.contains_key(&coord) {
                self.pending_loads.remove(&coord);
                self.pool.push(reset(chunk));
                continue;
            }
            if let Err(chunk) = provider.request_chunk(chunk) {
                self.not_in_cache.push_front(chunk);
                break;
            }
        }

        let mut produced = Vec::new();
        while let Some(chunk) = provider.next_chunk() {
            produced.push(chunk);
        }
        for chunk in produced {
            self.stats.generated += 1;
            self.pending_loads.remove(&chunk.coord());
            self.admit(chunk);
        }
    }

    fn dispatch_loads(&mut self) -> Result<()> {
        let mut deferred = Vec::new();
        while let Some(coord) = self.requested.pop_front() {
            if !self.is_needed(coord) {
                self.pending_loads.remove(&coord);
                continue;
            }
            // the archive must see the store before the load
            if self.pre_store.iter().any(|chunk| chunk.coord() == coord) {
                deferred.push(coord);
                continue;
            }
            let Some(mut chunk) = self.pool.pop() else {
                self.requested.push_front(coord);
                break;
            };
            chunk.init_coord(coord);
            match self.to_worker.try_send(ArchiveOperation::Load(chunk)) {
                Ok(()) => debug!("Dispatched load of chunk {:?}", coord),
                Err(err) => {
                    let disconnected = err.is_disconnected();
                    self.recycle(err.into_inner().into_chunk());
                    self.requested.push_front(coord);
                    if disconnected {
                        self.requeue_deferred(deferred);
                        return Err(StreamError::WorkerStopped(WORKER_NAME));
                    }
                    break;
                }
            }
        }
        self.requeue_deferred(deferred);
        Ok(())
    }

    fn requeue_deferred(&mut self, deferred: Vec<Point3<i32>>) {
        for coord in deferred.into_iter().rev() {
            self.requested.push_front(coord);
        }
    }

    fn is_needed(&self, coord: Point3<i32>) -> bool {
        self.need_counter.contains_key(&coord)
    }

    fn recycle(&mut self, chunk: Chunk) {
        debug_assert!(self.pool.len() < self.capacity);
        self.pool.push(reset(chunk));
    }

    /// Stops the worker and persists every chunk whose contents the archive has
    /// not seen yet: stores still queued, and live chunks edited since they were
    /// loaded or stored. Live chunks stay readable afterwards.
    ///
    /// Runs once; later calls (including the one from `Drop`) do nothing. The
    /// manager does no further asynchronous work afterwards.
    pub fn store_chunks(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        info!("Storing chunks and stopping the {} worker", WORKER_NAME);
        self.worker.request_termination();
        let mut first_error = None;
        // keep the completion queue moving so the worker can reach its halt check
        while self.worker.is_running() {
            if let Err(err) = self.process_completions() {
                first_error.get_or_insert(err);
            }
            thread::sleep(Duration::from_millis(1));
        }
        let Some(mut task) = self.worker.wait() else {
            error!("{} worker died, unsaved chunks are lost", WORKER_NAME);
            return Err(StreamError::WorkerStopped(WORKER_NAME));
        };
        if let Err(err) = self.process_completions() {
            first_error.get_or_insert(err);
        }
        if let Some(completion) = task.undelivered.take() {
            if let Some(err) = self.complete(completion) {
                first_error.get_or_insert(err.into());
            }
        }
        for err in task.failed.drain(..) {
            first_error.get_or_insert(err.into());
        }

        let mut stored = 0;
        for chunk in self.pre_store.drain(..) {
            match task.archive.store(&chunk) {
                Ok(()) => stored += 1,
                Err(err) => {
                    error!("Failed to persist chunk {:?}: {}", chunk.coord(), err);
                    first_error.get_or_insert(err.into());
                }
            }
            self.pool.push(reset(chunk));
        }
        for (coord, chunk) in self.live.iter() {
            if self.old_revisions.get(coord) == Some(&chunk.revision()) {
                continue;
            }
            match task.archive.store(chunk) {
                Ok(()) => {
                    stored += 1;
                    self.old_revisions.insert(*coord, chunk.revision());
                }
                Err(err) => {
                    error!("Failed to persist chunk {:?}: {}", coord, err);
                    first_error.get_or_insert(err.into());
                }
            }
        }
        self.stats.stores += stored;
        info!("Stored {} chunks on shutdown", stored);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn num_needed_chunks(&self) -> usize {
        self.need_counter.len()
    }

    pub fn num_allocated_chunks(&self) -> usize {
        self.capacity - self.pool.len()
    }

    pub fn num_loaded_chunks(&self) -> usize {
        self.live.len()
    }

    pub fn requested_queue_size(&self) -> usize {
        self.requested.len()
    }

    pub fn not_in_cache_queue_size(&self) -> usize {
        self.not_in_cache.len()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            needed_chunks: self.num_needed_chunks(),
            allocated_chunks: self.num_allocated_chunks(),
            loaded_chunks: self.num_loaded_chunks(),
            requested_queue_size: self.requested_queue_size(),
            not_in_cache_queue_size: self.not_in_cache_queue_size(),
            pre_store_queue_size: self.pre_store.len(),
            ..self.stats
        }
    }
}

fn reset(mut chunk: Chunk) -> Chunk {
    chunk.reset();
    chunk
}

impl Drop for ChunkManager {
    fn drop(&mut self) {
        if let Err(err) = self.store_chunks() {
            error!("Chunk manager shut down with errors: {}", err);
        }
    }
}
