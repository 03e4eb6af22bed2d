//! Core simulation state for the GridBots workspace.
//!
//! A handful of bots explore a shared occupancy grid from separate OS
//! threads. All access to the grid funnels through a bounded-permit
//! [`AccessGate`]; with the default single permit the simulation behaves as
//! a strict turnstile and every mutation is totally ordered. Each bot keeps
//! its own [`VisitGrid`] and greedily walks toward its least-visited
//! accessible neighbour, which biases it toward unexplored territory
//! without any global coordination.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Delay between participant work units unless configured otherwise.
pub const DEFAULT_THROTTLE_MS: u64 = 50;

/// Shared handle to the grid world.
pub type SharedGrid = Arc<Mutex<GridWorld>>;

/// Shared handle to one bot's observable state.
pub type SharedBotTrace = Arc<Mutex<BotTrace>>;

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors raised by grid operations. All of these are local precondition
/// violations; none is retried anywhere in the workspace.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GridWorldError {
    /// Coordinates fall outside the grid rectangle.
    #[error("coordinates ({x}, {y}) fall outside the {width}x{height} grid")]
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },
    /// A move whose source and destination are the same cell.
    #[error("move source and destination are both ({x}, {y})")]
    NoOpMove { x: u32, y: u32 },
    /// The move target already holds a bot.
    #[error("destination cell ({x}, {y}) is already occupied")]
    DestinationOccupied { x: u32, y: u32 },
    /// The move target is a wall.
    #[error("destination cell ({x}, {y}) is a wall")]
    DestinationWall { x: u32, y: u32 },
    /// Startup placement hit a wall or an occupied cell.
    #[error("cell ({x}, {y}) is not free for placement")]
    CellUnavailable { x: u32, y: u32 },
}

/// Errors raised while parsing a text layout into a [`GridWorld`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("layout must contain at least one row")]
    Empty,
    #[error("row {row} has {actual} columns, expected {expected}")]
    RaggedRow { row: usize, expected: usize, actual: usize },
    #[error("unrecognised glyph {glyph:?} at row {row}, column {column}")]
    UnknownGlyph { glyph: char, row: usize, column: usize },
}

/// Errors surfaced by the supervisor and participant machinery.
#[derive(Debug, Error)]
pub enum SimError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A grid operation failed. Reaching this from a running bot means the
    /// mutual-exclusion discipline was broken and the simulation stops.
    #[error(transparent)]
    Grid(#[from] GridWorldError),
    /// A participant's presentation layer failed (terminal I/O and the
    /// like).
    #[error("participant I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The OS refused to spawn a participant thread.
    #[error("failed to spawn thread for participant {name}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// A participant thread panicked instead of returning.
    #[error("participant {0} panicked")]
    ParticipantPanicked(String),
}

/// Occupancy of a single grid cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CellState {
    Wall,
    Free,
    Occupied,
}

/// Integer cell coordinate, `x` column and `y` row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GridPos {
    pub x: u32,
    pub y: u32,
}

impl GridPos {
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Rectangular occupancy grid shared by every participant.
///
/// Mutation happens only through [`GridWorld::place`] at startup and
/// [`GridWorld::move_occupant`] afterwards, and callers of either are
/// required to hold a gate permit.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GridWorld {
    width: u32,
    height: u32,
    cells: Vec<CellState>,
}

impl GridWorld {
    /// Construct an open grid with every cell `Free`.
    pub fn new(width: u32, height: u32) -> Result<Self, SimError> {
        if width == 0 || height == 0 {
            return Err(SimError::InvalidConfig(
                "grid dimensions must be non-zero",
            ));
        }
        Ok(Self {
            width,
            height,
            cells: vec![CellState::Free; (width as usize) * (height as usize)],
        })
    }

    /// Parse a rectangular text layout.
    ///
    /// `#` is a wall, a space is free, and `R` marks a free cell whose
    /// coordinate is returned as a bot start candidate. Ragged rows and any
    /// other glyph are rejected.
    pub fn from_layout(text: &str) -> Result<(Self, Vec<GridPos>), LayoutError> {
        let mut rows = text.lines();
        let Some(first) = rows.next() else {
            return Err(LayoutError::Empty);
        };

        let width = first.chars().count();
        if width == 0 {
            return Err(LayoutError::Empty);
        }

        let mut cells = Vec::new();
        let mut starts = Vec::new();
        let mut height = 0usize;

        for (row, line) in std::iter::once(first).chain(rows).enumerate() {
            let mut columns = 0usize;
            for (column, glyph) in line.chars().enumerate() {
                let cell = match glyph {
                    '#' => CellState::Wall,
                    ' ' => CellState::Free,
                    'R' => {
                        starts.push(GridPos::new(column as u32, row as u32));
                        CellState::Free
                    }
                    other => {
                        return Err(LayoutError::UnknownGlyph {
                            glyph: other,
                            row,
                            column,
                        });
                    }
                };
                cells.push(cell);
                columns += 1;
            }
            if columns != width {
                return Err(LayoutError::RaggedRow {
                    row,
                    expected: width,
                    actual: columns,
                });
            }
            height += 1;
        }

        Ok((
            Self {
                width: width as u32,
                height: height as u32,
                cells,
            },
            starts,
        ))
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn cells(&self) -> &[CellState] {
        &self.cells
    }

    /// Returns the flat index for `(x, y)` without bounds checks.
    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    fn bounds_checked(&self, x: u32, y: u32) -> Result<usize, GridWorldError> {
        if x < self.width && y < self.height {
            Ok(self.offset(x, y))
        } else {
            Err(GridWorldError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// State of the cell at `(x, y)`.
    pub fn at(&self, x: u32, y: u32) -> Result<CellState, GridWorldError> {
        self.bounds_checked(x, y).map(|idx| self.cells[idx])
    }

    /// Number of cells currently marked `Occupied`. Between any two gate
    /// releases this equals the number of live bots.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|cell| **cell == CellState::Occupied)
            .count()
    }

    /// Coordinates of every `Free` cell, row-major.
    pub fn free_cells(&self) -> impl Iterator<Item = GridPos> + '_ {
        self.cells.iter().enumerate().filter_map(|(idx, cell)| {
            (*cell == CellState::Free).then(|| {
                GridPos::new(
                    (idx % self.width as usize) as u32,
                    (idx / self.width as usize) as u32,
                )
            })
        })
    }

    /// Mark a free cell `Occupied` during startup placement.
    pub fn place(&mut self, pos: GridPos) -> Result<(), GridWorldError> {
        let idx = self.bounds_checked(pos.x, pos.y)?;
        if self.cells[idx] != CellState::Free {
            return Err(GridWorldError::CellUnavailable { x: pos.x, y: pos.y });
        }
        self.cells[idx] = CellState::Occupied;
        Ok(())
    }

    /// Move an occupant one cell. The destination becomes `Occupied` and the
    /// source `Free` as an atomic pair; no partial state is observable
    /// because callers hold a gate permit for the whole call.
    pub fn move_occupant(&mut self, from: GridPos, to: GridPos) -> Result<(), GridWorldError> {
        if from == to {
            return Err(GridWorldError::NoOpMove { x: from.x, y: from.y });
        }
        let from_idx = self.bounds_checked(from.x, from.y)?;
        let to_idx = self.bounds_checked(to.x, to.y)?;
        match self.cells[to_idx] {
            CellState::Wall => {
                return Err(GridWorldError::DestinationWall { x: to.x, y: to.y });
            }
            CellState::Occupied => {
                return Err(GridWorldError::DestinationOccupied { x: to.x, y: to.y });
            }
            CellState::Free => {}
        }
        debug_assert_eq!(
            self.cells[from_idx],
            CellState::Occupied,
            "move source must hold an occupant"
        );
        self.cells[to_idx] = CellState::Occupied;
        self.cells[from_idx] = CellState::Free;
        Ok(())
    }
}

/// Dense per-bot visit counters, same dimensions as the grid.
///
/// Counts are monotonically non-decreasing; each cell gains exactly one
/// every time its bot starts a work unit there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitGrid {
    width: u32,
    height: u32,
    cells: Vec<u32>,
}

impl VisitGrid {
    /// Construct a zeroed counter matrix matching `grid`'s dimensions.
    #[must_use]
    pub fn matching(grid: &GridWorld) -> Self {
        Self {
            width: grid.width(),
            height: grid.height(),
            cells: vec![0; (grid.width() as usize) * (grid.height() as usize)],
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    /// Count for a specific cell.
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.cells[(y as usize) * (self.width as usize) + (x as usize)])
        } else {
            None
        }
    }

    /// Record one visit at `pos`. Saturates rather than wrapping so counts
    /// stay monotonic.
    pub fn record(&mut self, pos: GridPos) {
        if pos.x < self.width && pos.y < self.height {
            let idx = (pos.y as usize) * (self.width as usize) + (pos.x as usize);
            self.cells[idx] = self.cells[idx].saturating_add(1);
        }
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.cells.iter().map(|count| u64::from(*count)).sum()
    }
}

/// Bounded-permit turnstile plus the cooperative running flag.
///
/// This is the sole synchronization primitive shared by every participant.
/// At most `permits` participants are inside their critical section at any
/// moment; fairness among waiters is whatever the condvar provides.
#[derive(Debug)]
pub struct AccessGate {
    available: Mutex<usize>,
    turnstile: Condvar,
    running: AtomicBool,
}

impl AccessGate {
    /// Build a gate with `permits` concurrent slots. One permit yields full
    /// mutual exclusion across all participants.
    pub fn new(permits: usize) -> Result<Self, SimError> {
        if permits == 0 {
            return Err(SimError::InvalidConfig("gate needs at least one permit"));
        }
        Ok(Self {
            available: Mutex::new(permits),
            turnstile: Condvar::new(),
            running: AtomicBool::new(true),
        })
    }

    /// Block until a permit is free. The permit is returned when the guard
    /// drops, on every exit path.
    #[must_use]
    pub fn acquire(&self) -> GatePermit<'_> {
        let mut available = lock_ignoring_poison(&self.available);
        while *available == 0 {
            available = self
                .turnstile
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        GatePermit { gate: self }
    }

    /// Flip the running flag. Never blocks and never touches a permit, so it
    /// is safe to call concurrently with any acquire/release cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Read the running flag. Participants consult this while holding a
    /// permit to decide between working and terminating.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn release(&self) {
        let mut available = lock_ignoring_poison(&self.available);
        *available += 1;
        self.turnstile.notify_one();
    }
}

/// RAII guard for one gate permit.
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a AccessGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// One unit of execution contending for the gate: a bot, a renderer, or a
/// test auditor.
pub trait Participant: Send {
    /// Stable identifier used for thread names and logs.
    fn name(&self) -> &str;

    /// One bounded action performed while the gate permit is held. No I/O
    /// and no sleeping in here; permit hold time is meant to stay minimal.
    fn work(&mut self) -> Result<(), SimError>;

    /// Runs after the permit is released and before the throttle sleep.
    /// Renderers draw and poll input here; bots have nothing to do.
    fn present(&mut self) -> Result<(), SimError> {
        Ok(())
    }

    /// Delay between work units.
    fn throttle(&self) -> Duration {
        Duration::from_millis(DEFAULT_THROTTLE_MS)
    }
}

/// Drive one participant through its lifecycle until the gate stops or the
/// participant fails.
///
/// The cycle is acquire, check the flag, work, release, present, sleep. A
/// participant that is mid-cycle when [`AccessGate::stop`] runs finishes
/// that cycle and observes the flag at its next acquisition, so shutdown
/// latency is bounded by one throttle interval.
pub fn run_participant(
    gate: &AccessGate,
    participant: &mut dyn Participant,
) -> Result<(), SimError> {
    loop {
        let permit = gate.acquire();
        if !gate.is_running() {
            drop(permit);
            break;
        }
        let outcome = participant.work();
        drop(permit);
        outcome?;
        participant.present()?;
        thread::sleep(participant.throttle());
    }
    debug!(participant = participant.name(), "participant terminated");
    Ok(())
}

/// Observable state of one bot: where it stands and where it has been.
///
/// The bot owns this exclusively during its work unit; the renderer clones
/// it for read-only snapshots. Under a single gate permit the inner lock is
/// never contended.
#[derive(Debug, Clone, Serialize)]
pub struct BotTrace {
    pub name: String,
    pub position: GridPos,
    pub visits: VisitGrid,
}

/// An exploring bot bound to the shared grid.
pub struct Bot {
    name: String,
    grid: SharedGrid,
    trace: SharedBotTrace,
    throttle: Duration,
}

/// Neighbour enumeration order: west, east, north, south. Ties on visit
/// counts resolve to the earliest candidate, so bot behaviour stays
/// deterministic.
const NEIGHBOUR_OFFSETS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

impl Bot {
    fn new(name: String, grid: SharedGrid, trace: SharedBotTrace, throttle: Duration) -> Self {
        Self {
            name,
            grid,
            trace,
            throttle,
        }
    }

    /// Pure decision half of the exploration step: pick the in-bounds,
    /// unblocked neighbour of `from` with the smallest own-visit count, or
    /// `None` when the bot is boxed in.
    #[must_use]
    pub fn select_step(grid: &GridWorld, visits: &VisitGrid, from: GridPos) -> Option<GridPos> {
        let mut best: Option<(GridPos, u32)> = None;
        for (dx, dy) in NEIGHBOUR_OFFSETS {
            let x = i64::from(from.x) + dx;
            let y = i64::from(from.y) + dy;
            if x < 0 || y < 0 || x >= i64::from(grid.width()) || y >= i64::from(grid.height()) {
                continue;
            }
            let candidate = GridPos::new(x as u32, y as u32);
            if grid.at(candidate.x, candidate.y) != Ok(CellState::Free) {
                continue;
            }
            let count = visits.get(candidate.x, candidate.y).unwrap_or(u32::MAX);
            match best {
                Some((_, smallest)) if count >= smallest => {}
                _ => best = Some((candidate, count)),
            }
        }
        best.map(|(pos, _)| pos)
    }

    /// One exploration work unit: record the visit, pick a step, apply it.
    ///
    /// Candidates are pre-filtered, so a `DestinationOccupied` or
    /// `DestinationWall` out of `move_occupant` means another participant
    /// mutated the grid between the filter and the move, which cannot
    /// happen while the gate holds. It propagates as fatal rather than
    /// being retried.
    fn explore(&mut self) -> Result<(), SimError> {
        let mut grid = lock_ignoring_poison(&self.grid);
        let mut trace = lock_ignoring_poison(&self.trace);
        let from = trace.position;
        trace.visits.record(from);
        if let Some(next) = Self::select_step(&grid, &trace.visits, from) {
            grid.move_occupant(from, next)?;
            trace.position = next;
        }
        Ok(())
    }
}

impl Participant for Bot {
    fn name(&self) -> &str {
        &self.name
    }

    fn work(&mut self) -> Result<(), SimError> {
        self.explore()
    }

    fn throttle(&self) -> Duration {
        self.throttle
    }
}

/// Static configuration for a GridBots run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridBotsConfig {
    /// Participants allowed inside the gate at once. One (the default)
    /// yields full mutual exclusion; exploration invariants are only
    /// guaranteed at one.
    pub permits: usize,
    /// Delay between participant work units, in milliseconds.
    pub throttle_ms: u64,
    /// Explicit starting cells, one bot each. Must be distinct free cells.
    pub bot_spawns: Vec<GridPos>,
    /// Extra bots placed on random free cells at startup.
    pub scatter_bots: u32,
    /// Optional RNG seed for reproducible scatter placement.
    pub rng_seed: Option<u64>,
}

impl Default for GridBotsConfig {
    fn default() -> Self {
        Self {
            permits: 1,
            throttle_ms: DEFAULT_THROTTLE_MS,
            bot_spawns: Vec::new(),
            scatter_bots: 0,
            rng_seed: None,
        }
    }
}

impl GridBotsConfig {
    fn validate(&self) -> Result<(), SimError> {
        if self.permits == 0 {
            return Err(SimError::InvalidConfig("permits must be at least 1"));
        }
        if self.bot_spawns.is_empty() && self.scatter_bots == 0 {
            return Err(SimError::InvalidConfig(
                "at least one bot spawn or scatter bot is required",
            ));
        }
        Ok(())
    }
}

/// Read-only consumption surface handed to renderers: the shared grid, one
/// trace handle per bot, and the gate they all answer to.
#[derive(Clone)]
pub struct WorldView {
    pub grid: SharedGrid,
    pub traces: Vec<SharedBotTrace>,
    pub gate: Arc<AccessGate>,
}

struct Worker {
    name: String,
    handle: thread::JoinHandle<Result<(), SimError>>,
}

/// Composes the grid, the gate, and the bots; starts every participant and
/// drives cooperative shutdown.
pub struct Supervisor {
    gate: Arc<AccessGate>,
    grid: SharedGrid,
    traces: Vec<SharedBotTrace>,
    pending: Vec<Box<dyn Participant>>,
    workers: Vec<Worker>,
    started: bool,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("traces", &self.traces.len())
            .field("pending", &self.pending.len())
            .field("workers", &self.workers.len())
            .field("started", &self.started)
            .finish()
    }
}

impl Supervisor {
    /// Validate the configuration, place every bot, and wire the gate.
    ///
    /// Placement failures (duplicate spawns, walls, out-of-bounds
    /// coordinates) are fatal startup errors; nothing has been spawned yet
    /// when they surface.
    pub fn new(config: GridBotsConfig, mut grid: GridWorld) -> Result<Self, SimError> {
        config.validate()?;
        let gate = Arc::new(AccessGate::new(config.permits)?);

        let mut spawns = config.bot_spawns.clone();
        if config.scatter_bots > 0 {
            let mut rng = match config.rng_seed {
                Some(seed) => SmallRng::seed_from_u64(seed),
                None => SmallRng::from_entropy(),
            };
            let mut free: Vec<GridPos> = grid
                .free_cells()
                .filter(|pos| !spawns.contains(pos))
                .collect();
            for _ in 0..config.scatter_bots {
                if free.is_empty() {
                    return Err(SimError::InvalidConfig(
                        "not enough free cells to scatter bots",
                    ));
                }
                let idx = rng.gen_range(0..free.len());
                spawns.push(free.swap_remove(idx));
            }
        }

        for pos in &spawns {
            grid.place(*pos)?;
        }

        let throttle = Duration::from_millis(config.throttle_ms);
        let blank_visits = VisitGrid::matching(&grid);
        let grid: SharedGrid = Arc::new(Mutex::new(grid));
        let mut traces = Vec::with_capacity(spawns.len());
        let mut pending: Vec<Box<dyn Participant>> = Vec::with_capacity(spawns.len());

        for (index, pos) in spawns.iter().enumerate() {
            let name = format!("bot-{index}");
            let trace = Arc::new(Mutex::new(BotTrace {
                name: name.clone(),
                position: *pos,
                visits: blank_visits.clone(),
            }));
            traces.push(Arc::clone(&trace));
            pending.push(Box::new(Bot::new(
                name,
                Arc::clone(&grid),
                trace,
                throttle,
            )));
        }

        info!(
            bots = spawns.len(),
            permits = config.permits,
            throttle_ms = config.throttle_ms,
            "supervisor ready"
        );

        Ok(Self {
            gate,
            grid,
            traces,
            pending,
            workers: Vec::new(),
            started: false,
        })
    }

    /// The read-only surface a renderer consumes.
    #[must_use]
    pub fn view(&self) -> WorldView {
        WorldView {
            grid: Arc::clone(&self.grid),
            traces: self.traces.clone(),
            gate: Arc::clone(&self.gate),
        }
    }

    #[must_use]
    pub fn gate(&self) -> Arc<AccessGate> {
        Arc::clone(&self.gate)
    }

    #[must_use]
    pub fn grid(&self) -> SharedGrid {
        Arc::clone(&self.grid)
    }

    #[must_use]
    pub fn bot_count(&self) -> usize {
        self.traces.len()
    }

    /// Register an extra participant (typically the renderer). Spawns
    /// immediately when the supervisor is already running.
    pub fn attach(&mut self, participant: Box<dyn Participant>) -> Result<(), SimError> {
        if self.started {
            self.spawn_worker(participant)
        } else {
            self.pending.push(participant);
            Ok(())
        }
    }

    /// Spawn one named OS thread per registered participant.
    pub fn start(&mut self) -> Result<(), SimError> {
        self.started = true;
        for participant in std::mem::take(&mut self.pending) {
            self.spawn_worker(participant)?;
        }
        Ok(())
    }

    fn spawn_worker(&mut self, mut participant: Box<dyn Participant>) -> Result<(), SimError> {
        let name = participant.name().to_string();
        let gate = Arc::clone(&self.gate);
        let thread_name = format!("gridbots-{name}");
        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let result = run_participant(&gate, participant.as_mut());
                if let Err(err) = &result {
                    error!(participant = %worker_name, %err, "participant failed; stopping simulation");
                    gate.stop();
                }
                result
            })
            .map_err(|source| SimError::Spawn {
                name: name.clone(),
                source,
            })?;
        self.workers.push(Worker { name, handle });
        Ok(())
    }

    /// Flip the cooperative shutdown flag. Participants observe it at their
    /// next acquisition.
    pub fn stop(&self) {
        self.gate.stop();
    }

    /// Wait for every participant to terminate. Returns the first worker
    /// error, mapping a panicked thread to
    /// [`SimError::ParticipantPanicked`].
    pub fn join(&mut self) -> Result<(), SimError> {
        let mut first_error = None;
        for worker in self.workers.drain(..) {
            match worker.handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error = Some(SimError::ParticipantPanicked(worker.name));
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
