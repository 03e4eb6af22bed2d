use gridbots_core::{
    AccessGate, CellState, GridBotsConfig, GridPos, GridWorld, GridWorldError, Participant,
    SharedGrid, SimError, Supervisor, WorldView,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn supervisor_on_open_grid(width: u32, height: u32, spawns: Vec<GridPos>) -> Supervisor {
    let grid = GridWorld::new(width, height).expect("grid");
    let config = GridBotsConfig {
        throttle_ms: 1,
        bot_spawns: spawns,
        ..GridBotsConfig::default()
    };
    Supervisor::new(config, grid).expect("supervisor")
}

/// Read-only participant standing in for the renderer: every activation it
/// audits occupancy conservation and move legality against the bot traces.
struct OccupancyAuditor {
    view: WorldView,
    expected_bots: usize,
    violations: Arc<Mutex<Vec<String>>>,
    audits: Arc<AtomicUsize>,
}

impl Participant for OccupancyAuditor {
    fn name(&self) -> &str {
        "auditor"
    }

    fn work(&mut self) -> Result<(), SimError> {
        self.audits.fetch_add(1, Ordering::Relaxed);
        let mut violations = Vec::new();

        let occupied = {
            let grid = self.view.grid.lock().unwrap();
            for trace in &self.view.traces {
                let trace = trace.lock().unwrap();
                let pos = trace.position;
                if grid.at(pos.x, pos.y) != Ok(CellState::Occupied) {
                    violations.push(format!("{} stands on a non-occupied cell {pos}", trace.name));
                }
            }
            grid.occupied_count()
        };
        if occupied != self.expected_bots {
            violations.push(format!(
                "occupancy conservation broken: {occupied} occupied cells for {} bots",
                self.expected_bots
            ));
        }

        let mut positions: Vec<GridPos> = self
            .view
            .traces
            .iter()
            .map(|trace| trace.lock().unwrap().position)
            .collect();
        positions.sort_by_key(|pos| (pos.y, pos.x));
        positions.dedup();
        if positions.len() != self.expected_bots {
            violations.push("two bots claim the same cell".to_string());
        }

        self.violations.lock().unwrap().extend(violations);
        Ok(())
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(1)
    }
}

#[test]
fn stress_preserves_invariants_under_contention() {
    let spawns = vec![
        GridPos::new(0, 0),
        GridPos::new(9, 0),
        GridPos::new(0, 9),
        GridPos::new(9, 9),
        GridPos::new(4, 4),
    ];
    let bot_count = spawns.len();
    let mut supervisor = supervisor_on_open_grid(10, 10, spawns);

    let violations = Arc::new(Mutex::new(Vec::new()));
    let audits = Arc::new(AtomicUsize::new(0));
    supervisor
        .attach(Box::new(OccupancyAuditor {
            view: supervisor.view(),
            expected_bots: bot_count,
            violations: Arc::clone(&violations),
            audits: Arc::clone(&audits),
        }))
        .expect("attach auditor");

    supervisor.start().expect("start");
    thread::sleep(Duration::from_millis(300));
    supervisor.stop();
    supervisor.join().expect("join");

    let violations = violations.lock().unwrap();
    assert!(violations.is_empty(), "invariant breaches: {violations:?}");
    assert!(
        audits.load(Ordering::Relaxed) > 10,
        "auditor barely ran; stress window too short"
    );
    assert_eq!(
        supervisor.grid().lock().unwrap().occupied_count(),
        bot_count
    );
}

#[test]
fn shutdown_terminates_every_participant_promptly() {
    let mut supervisor = supervisor_on_open_grid(
        8,
        8,
        vec![GridPos::new(0, 0), GridPos::new(7, 7), GridPos::new(3, 4)],
    );
    supervisor.start().expect("start");
    thread::sleep(Duration::from_millis(50));

    supervisor.stop();
    let begin = Instant::now();
    supervisor.join().expect("join");
    assert!(
        begin.elapsed() < Duration::from_secs(1),
        "join took {:?}, participants ignored the stop flag",
        begin.elapsed()
    );

    // Every bot stands on a cell the grid marks occupied, and nothing moves
    // once the last participant has terminated.
    let view = supervisor.view();
    let frozen = view.grid.lock().unwrap().clone();
    for trace in &view.traces {
        let trace = trace.lock().unwrap();
        assert_eq!(
            frozen.at(trace.position.x, trace.position.y),
            Ok(CellState::Occupied)
        );
    }
    thread::sleep(Duration::from_millis(20));
    assert_eq!(*view.grid.lock().unwrap(), frozen);
}

#[test]
fn lone_bot_covers_an_open_corridor() {
    let mut supervisor = supervisor_on_open_grid(4, 1, vec![GridPos::new(0, 0)]);
    let view = supervisor.view();
    supervisor.start().expect("start");

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let covered = {
            let trace = view.traces[0].lock().unwrap();
            (0..4).all(|x| trace.visits.get(x, 0).unwrap_or(0) >= 1)
        };
        if covered {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "bot failed to cover a 4-cell corridor within 2s"
        );
        thread::sleep(Duration::from_millis(5));
    }

    supervisor.stop();
    supervisor.join().expect("join");
}

/// Participant that violates the move contract on purpose, to prove a grid
/// error is fatal and winds the whole simulation down.
struct RogueMover {
    grid: SharedGrid,
}

impl Participant for RogueMover {
    fn name(&self) -> &str {
        "rogue"
    }

    fn work(&mut self) -> Result<(), SimError> {
        let mut grid = self.grid.lock().unwrap();
        grid.move_occupant(GridPos::new(0, 0), GridPos::new(1, 0))?;
        Ok(())
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(1)
    }
}

#[test]
fn grid_errors_are_fatal_and_stop_the_simulation() {
    // Two boxed bots on a 2x1 strip: neither can ever move, so the rogue's
    // attempt to move onto an occupied cell fails deterministically.
    let mut supervisor =
        supervisor_on_open_grid(2, 1, vec![GridPos::new(0, 0), GridPos::new(1, 0)]);
    supervisor
        .attach(Box::new(RogueMover {
            grid: supervisor.grid(),
        }))
        .expect("attach rogue");
    supervisor.start().expect("start");

    let err = supervisor.join().expect_err("rogue move must be fatal");
    assert!(matches!(
        err,
        SimError::Grid(GridWorldError::DestinationOccupied { x: 1, y: 0 })
    ));
}

#[test]
fn gate_never_admits_more_holders_than_permits() {
    let gate = Arc::new(AccessGate::new(1).expect("gate"));
    let holders = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let gate = Arc::clone(&gate);
        let holders = Arc::clone(&holders);
        let peak = Arc::clone(&peak);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let permit = gate.acquire();
                let inside = holders.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(inside, Ordering::SeqCst);
                holders.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("holder thread");
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
}
