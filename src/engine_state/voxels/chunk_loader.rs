//! # Chunk Loader
//!
//! Background streaming of chunks around tracked players.
//!
//! The loader walks a precomputed spiral around each player's chunk and, for every
//! coordinate not loaded yet, reads it from the archive or generates it. Finished
//! chunks and unload queries for coordinates that drifted out of every player's
//! unload radius share one bounded, ordered event queue, so the owner always sees
//! an unload after the chunk it refers to. Chunks the owner hands back are
//! persisted by the same worker.
//!
//! ## Data Flow
//!
//! ```text
//!  PlayerSlots ──snapshot──► LoaderTask ──Chunk / Unload events──► ChunkLoader::next()
//!                                ◄──────released chunks─────────── ChunkLoader::release()
//! ```
//!
//! A coordinate is not loaded again until the owner has handed back the chunk
//! of its previous unload, so a reload always reads what the last release stored.
//!
//! The decisions (what to load next, what to unload) live in [`StreamingState`],
//! which has no threads or I/O and can be driven directly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cgmath::{Point3, Vector3};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use crate::config::StreamingConfig;
use crate::engine_state::players::{PlayerSlots, MAX_CLIENTS};
use crate::engine_state::task_management::task::{HaltFlag, WorkerTask};
use crate::engine_state::task_management::Worker;
use crate::engine_state::voxels::archive::ChunkArchive;
use crate::engine_state::voxels::chunk::{chebyshev_distance, Chunk, NoNeighbors};
use crate::engine_state::voxels::generator::TerrainGenerator;
use crate::error::Result;

/// Streaming progress of one player slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No valid position; nothing is loaded on this player's behalf.
    Invalid,
    Tracking {
        /// The chunk the player is in.
        chunk: Point3<i32>,
        /// Next position in the spiral order.
        cursor: usize,
        /// Chunks marked loaded for this player since it entered `chunk`.
        loaded: usize,
    },
}

/// What the loader tells its owner, in the order it happened.
#[derive(Debug)]
pub enum LoaderEvent {
    /// A finished chunk to make resident.
    Chunk(Chunk),
    /// The chunk at this coordinate left every player's unload radius. The owner
    /// removes it and hands it back with [`ChunkLoader::release`].
    Unload(Point3<i32>),
}

/// Offsets of the cube `[-radius, radius]³` sorted by distance from the center.
///
/// Ties are broken by Chebyshev distance and then lexicographically, so the order
/// is deterministic. A negative radius yields no offsets.
pub fn spiral_order(radius: i32) -> Vec<Vector3<i32>> {
    let side = (2 * radius + 1).max(0) as usize;
    let mut order = Vec::with_capacity(side.pow(3));
    for x in -radius..=radius {
        for y in -radius..=radius {
            for z in -radius..=radius {
                order.push(Vector3::new(x, y, z));
            }
        }
    }
    order.sort_by_key(|offset| {
        let length_squared = offset.x * offset.x + offset.y * offset.y + offset.z * offset.z;
        let chebyshev = offset.x.abs().max(offset.y.abs()).max(offset.z.abs());
        (length_squared, chebyshev, offset.x, offset.y, offset.z)
    });
    order
}

/// The loader's bookkeeping: where players are and which chunks are loaded.
pub struct StreamingState {
    order: Vec<Vector3<i32>>,
    players: [PlayerState; MAX_CLIENTS],
    is_loaded: HashSet<Point3<i32>>,
    /// Unloaded coordinates whose chunk the owner has not handed back yet.
    pending_release: HashSet<Point3<i32>>,
    unload_radius: i32,
}

impl StreamingState {
    /// # Arguments
    /// * `load_radius` - Chebyshev distance within which chunks are loaded
    /// * `unload_radius` - Chebyshev distance beyond which chunks are unloaded; must
    ///   not be smaller than `load_radius`
    pub fn new(load_radius: i32, unload_radius: i32) -> Self {
        debug_assert!(unload_radius >= load_radius);
        StreamingState {
            order: spiral_order(load_radius),
            players: [PlayerState::Invalid; MAX_CLIENTS],
            is_loaded: HashSet::new(),
            pending_release: HashSet::new(),
            unload_radius,
        }
    }

    pub fn player(&self, player: usize) -> PlayerState {
        self.players[player]
    }

    /// Records the chunk a player is in, or `None` for an invalid player.
    ///
    /// Entering a different chunk restarts the player's spiral.
    pub fn update_player(&mut self, player: usize, chunk: Option<Point3<i32>>) {
        let state = &mut self.players[player];
        match (chunk, *state) {
            (None, _) => *state = PlayerState::Invalid,
            (Some(chunk), PlayerState::Tracking { chunk: current, .. }) if chunk == current => {}
            (Some(chunk), _) => {
                *state = PlayerState::Tracking {
                    chunk,
                    cursor: 0,
                    loaded: 0,
                }
            }
        }
    }

    /// Advances a player's spiral to the next coordinate that is not loaded yet,
    /// and marks it loaded.
    ///
    /// The spiral stops in front of a coordinate still waiting for its release
    /// and continues once [`finish_release`](Self::finish_release) was called.
    ///
    /// # Returns
    /// The coordinate to load, or `None` if the player is invalid, everything
    /// within its load radius is loaded, or the next coordinate is being released
    pub fn next_load(&mut self, player: usize) -> Option<Point3<i32>> {
        let PlayerState::Tracking {
            chunk,
            cursor,
            loaded,
        } = &mut self.players[player]
        else {
            return None;
        };
        while let Some(offset) = self.order.get(*cursor) {
            let coord = *chunk + *offset;
            if self.pending_release.contains(&coord) {
                return None;
            }
            *cursor += 1;
            if self.is_loaded.insert(coord) {
                *loaded += 1;
                return Some(coord);
            }
        }
        None
    }

    /// Removes every loaded coordinate that is farther than the unload radius from
    /// all tracked players. Removed coordinates wait for their release.
    ///
    /// # Returns
    /// The removed coordinates
    pub fn sweep_unloads(&mut self) -> Vec<Point3<i32>> {
        let centers: Vec<Point3<i32>> = self
            .players
            .iter()
            .filter_map(|state| match state {
                PlayerState::Tracking { chunk, .. } => Some(*chunk),
                PlayerState::Invalid => None,
            })
            .collect();
        let unload_radius = self.unload_radius;
        let mut unloaded = Vec::new();
        self.is_loaded.retain(|coord| {
            let keep = centers
                .iter()
                .any(|center| chebyshev_distance(*center, *coord) <= unload_radius);
            if !keep {
                unloaded.push(*coord);
            }
            keep
        });
        self.pending_release.extend(unloaded.iter().copied());
        unloaded
    }

    /// Marks the chunk of an earlier unload as handed back, so its coordinate
    /// can be loaded again.
    pub fn finish_release(&mut self, coord: Point3<i32>) {
        self.pending_release.remove(&coord);
    }

    pub fn is_loaded(&self, coord: Point3<i32>) -> bool {
        self.is_loaded.contains(&coord)
    }

    pub fn is_pending_release(&self, coord: Point3<i32>) -> bool {
        self.pending_release.contains(&coord)
    }

    pub fn loaded_count(&self) -> usize {
        self.is_loaded.len()
    }
}

/// A chunk handed back by the owner after an unload or at shutdown. `chunk` is
/// `None` when there is nothing to persist.
struct Released {
    coord: Point3<i32>,
    chunk: Option<Chunk>,
}

/// The loader's worker-side state.
struct LoaderTask {
    state: StreamingState,
    players: PlayerSlots,
    generator: Arc<dyn TerrainGenerator>,
    archive: Box<dyn ChunkArchive>,
    update_faces: bool,
    max_loads_per_pass: usize,
    retry_backoff: Duration,
    output: Sender<LoaderEvent>,
    /// Events not delivered yet, oldest first. Survives a halt.
    backlog: VecDeque<LoaderEvent>,
    released: Receiver<Released>,
}

impl LoaderTask {
    fn refresh_players(&mut self, wait: bool) {
        for player in 0..MAX_CLIENTS {
            // a slot being written is skipped until the next refresh
            if let Some(snapshot) = self.players.snapshot(player, wait) {
                let chunk = snapshot.valid.then(|| snapshot.chunk());
                self.state.update_player(player, chunk);
            }
        }
    }

    /// Loads or generates the chunk at `coord`.
    fn produce(&mut self, coord: Point3<i32>) -> Chunk {
        let mut chunk = Chunk::new(coord);
        match self.archive.load(&mut chunk) {
            Ok(true) => debug!("Chunk {:?} read from archive", coord),
            Ok(false) => self.generator.generate(&mut chunk),
            Err(err) => {
                warn!("Chunk {:?} unreadable, regenerating: {}", coord, err);
                chunk.init_coord(coord);
                self.generator.generate(&mut chunk);
            }
        }
        if self.update_faces {
            chunk.init_faces(&mut NoNeighbors);
        }
        chunk
    }

    /// Pushes the backlog into the event queue, waiting while the queue is full.
    ///
    /// # Returns
    /// `false` if events are still held back because the loader is halting or the
    /// owner is gone
    fn flush(&mut self, halt: &HaltFlag) -> bool {
        while let Some(mut event) = self.backlog.pop_front() {
            loop {
                match self.output.try_send(event) {
                    Ok(()) => break,
                    Err(TrySendError::Full(returned)) => {
                        // the owner may be blocked handing chunks back
                        self.store_released();
                        if !halt.sleep(self.retry_backoff) {
                            self.backlog.push_front(returned);
                            return false;
                        }
                        event = returned;
                    }
                    Err(TrySendError::Disconnected(returned)) => {
                        self.backlog.push_front(returned);
                        return false;
                    }
                }
            }
        }
        true
    }

    fn store_released(&mut self) -> usize {
        let mut received = 0;
        while let Ok(released) = self.released.try_recv() {
            self.finish_release(released);
            received += 1;
        }
        received
    }

    fn finish_release(&mut self, released: Released) {
        if let Some(chunk) = &released.chunk {
            if let Err(err) = self.archive.store(chunk) {
                error!("Failed to persist chunk {:?}: {}", chunk.coord(), err);
            }
        }
        self.state.finish_release(released.coord);
    }
}

impl WorkerTask for LoaderTask {
    fn do_work(&mut self, halt: &HaltFlag) -> bool {
        // events held back by an earlier halt go out first
        if !self.flush(halt) {
            return false;
        }
        self.refresh_players(false);

        let mut loads = 0;
        loop {
            let mut progress = false;
            for player in 0..MAX_CLIENTS {
                let Some(coord) = self.state.next_load(player) else {
                    continue;
                };
                progress = true;
                loads += 1;
                let chunk = self.produce(coord);
                self.backlog.push_back(LoaderEvent::Chunk(chunk));
                if !self.flush(halt) {
                    return true;
                }
            }
            if !progress || loads >= self.max_loads_per_pass {
                break;
            }
        }

        self.refresh_players(true);
        let unloads = self.state.sweep_unloads();
        if !unloads.is_empty() {
            debug!(
                "Queued {} unload queries, {} chunks remain loaded",
                unloads.len(),
                self.state.loaded_count()
            );
        }
        let unloaded = !unloads.is_empty();
        self.backlog.extend(unloads.into_iter().map(LoaderEvent::Unload));
        self.flush(halt);

        let stored = self.store_released();
        loads > 0 || unloaded || stored > 0
    }

    fn on_stop(&mut self) {
        let stored = self.store_released();
        info!(
            "Chunk loader stopped, {} released chunks handed back, {} events held back",
            stored,
            self.backlog.len()
        );
    }
}

/// Owner-side handle of the background chunk loader.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cgmath::Point3;
/// use voxel_stream::config::StreamingConfig;
/// use voxel_stream::engine_state::players::PlayerSlots;
/// use voxel_stream::engine_state::voxels::archive::MemoryArchive;
/// use voxel_stream::engine_state::voxels::chunk_loader::{ChunkLoader, LoaderEvent};
/// use voxel_stream::engine_state::voxels::generator::{GenerationMethod, NoiseGenerator};
///
/// let config = StreamingConfig { load_radius: 0, unload_radius: 1, ..Default::default() };
/// let players = PlayerSlots::new();
/// players.set_position(0, Some(Point3::new(0.5, 0.5, 0.5)));
///
/// let generator = Arc::new(NoiseGenerator::new(1, GenerationMethod::Solid));
/// let mut loader =
///     ChunkLoader::new(&config, players, generator, Box::new(MemoryArchive::new())).unwrap();
/// loader.dispatch().unwrap();
///
/// let chunk = loop {
///     if let Some(LoaderEvent::Chunk(chunk)) = loader.next() {
///         break chunk;
///     }
///     std::thread::yield_now();
/// };
/// assert_eq!(chunk.coord(), Point3::new(0, 0, 0));
/// loader.wait();
/// ```
pub struct ChunkLoader {
    worker: Worker<LoaderTask>,
    /// Present while no thread runs the task.
    task: Option<LoaderTask>,
    poll_interval: Duration,
    retry_backoff: Duration,
    events: Receiver<LoaderEvent>,
    released: Sender<Released>,
    /// Revisions of delivered chunks as they were read or generated.
    loaded_revisions: HashMap<Point3<i32>, u32>,
}

impl ChunkLoader {
    /// Creates a loader. Nothing is streamed until [`dispatch`](Self::dispatch).
    ///
    /// # Arguments
    /// * `config` - Radii, queue capacities, pacing and face maintenance
    /// * `players` - Slots the loader follows
    /// * `generator` - Fills chunks the archive has no record of
    /// * `archive` - Source of persisted chunks and target of released ones
    ///
    /// # Returns
    /// An error if `config` does not validate
    pub fn new(
        config: &StreamingConfig,
        players: PlayerSlots,
        generator: Arc<dyn TerrainGenerator>,
        archive: Box<dyn ChunkArchive>,
    ) -> Result<Self> {
        config.validate()?;
        let (output, events) = bounded(config.output_queue_capacity);
        let (released, released_receiver) = bounded(config.worker_queue_capacity);
        let task = LoaderTask {
            state: StreamingState::new(config.load_radius, config.unload_radius),
            players,
            generator,
            archive,
            update_faces: config.update_faces,
            max_loads_per_pass: config.max_loads_per_pass,
            retry_backoff: config.queue_retry_backoff(),
            output,
            backlog: VecDeque::new(),
            released: released_receiver,
        };
        Ok(ChunkLoader {
            worker: Worker::new("chunk loader"),
            task: Some(task),
            poll_interval: config.poll_interval(),
            retry_backoff: config.queue_retry_backoff(),
            events,
            released,
            loaded_revisions: HashMap::new(),
        })
    }

    /// Starts streaming on a background thread. Does nothing if already running.
    ///
    /// A loader that was stopped with [`wait`](Self::wait) resumes where it left
    /// off, delivering the events it held back first.
    pub fn dispatch(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        self.worker.dispatch(task, self.poll_interval)
    }

    /// Asks the worker to stop without waiting for it.
    pub fn request_termination(&self) {
        self.worker.request_termination();
    }

    /// Stops the worker and blocks until it has persisted every released chunk.
    pub fn wait(&mut self) {
        if let Some(task) = self.worker.wait() {
            self.task = Some(task);
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Takes the next event, if any. Never blocks.
    pub fn next(&mut self) -> Option<LoaderEvent> {
        let event = self.events.try_recv().ok()?;
        if let LoaderEvent::Chunk(chunk) = &event {
            self.loaded_revisions.insert(chunk.coord(), chunk.revision());
        }
        Some(event)
    }

    /// Hands a chunk removed from the world back for persistence.
    ///
    /// Chunks unchanged since they were delivered are not stored, but still
    /// release their coordinate for loading. While the worker is stopped the
    /// chunk is stored on the calling thread. Blocks while the release queue is
    /// full.
    pub fn release(&mut self, chunk: Chunk) {
        let coord = chunk.coord();
        let chunk = if self.loaded_revisions.remove(&coord) == Some(chunk.revision()) {
            debug!("Chunk {:?} unchanged, skipping store", coord);
            None
        } else {
            Some(chunk)
        };
        self.hand_back(Released { coord, chunk });
    }

    /// Answers an unload query for a chunk the owner does not hold, so the
    /// coordinate can be loaded again.
    pub fn release_absent(&mut self, coord: Point3<i32>) {
        self.loaded_revisions.remove(&coord);
        self.hand_back(Released { coord, chunk: None });
    }

    fn hand_back(&mut self, mut released: Released) {
        loop {
            if let Some(task) = self.task.as_mut() {
                task.finish_release(released);
                return;
            }
            match self.released.try_send(released) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    released = returned;
                    if self.worker.is_running() {
                        thread::sleep(self.retry_backoff);
                    } else {
                        self.wait();
                    }
                }
                Err(TrySendError::Disconnected(returned)) => {
                    if returned.chunk.is_some() {
                        error!(
                            "Chunk loader is gone, chunk {:?} was not persisted",
                            returned.coord
                        );
                    }
                    return;
                }
            }
        }
    }
}

impl Drop for ChunkLoader {
    fn drop(&mut self) {
        self.wait();
    }
}
