//! Terminal renderer for GridBots.
//!
//! The renderer is an ordinary [`Participant`]: it acquires the same gate
//! permit as every bot, clones the grid and the bot traces while the permit
//! is held, and does all drawing and input polling after release. It issues
//! no mutations; its only write to shared state is flipping the gate's stop
//! flag when the user asks to quit.
//!
//! Setting `GRIDBOTS_TERMINAL_HEADLESS` skips the TTY entirely: frames are
//! rendered to an in-memory buffer, the gate is stopped after a frame
//! budget (`GRIDBOTS_HEADLESS_FRAMES`), and a JSON summary is optionally
//! written to `GRIDBOTS_TERMINAL_REPORT`.

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use gridbots_core::{CellState, GridPos, Participant, SimError, VisitGrid, WorldView};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
};
use serde::Serialize;
use tracing::{error, info};

const HEADLESS_ENV: &str = "GRIDBOTS_TERMINAL_HEADLESS";
const HEADLESS_FRAMES_ENV: &str = "GRIDBOTS_HEADLESS_FRAMES";
const REPORT_PATH_ENV: &str = "GRIDBOTS_TERMINAL_REPORT";
const DEFAULT_HEADLESS_FRAMES: usize = 12;
const MAX_HEADLESS_FRAMES: usize = 600;
const DRAW_INTERVAL_MS: u64 = 50;

/// Point-in-time copy of everything the renderer draws. Captured while the
/// gate permit is held; consumed after release.
#[derive(Debug, Clone, Serialize)]
pub struct WorldFrame {
    pub width: u32,
    pub height: u32,
    pub cells: Vec<CellState>,
    pub bots: Vec<BotFrame>,
}

/// Per-bot slice of a [`WorldFrame`].
#[derive(Debug, Clone, Serialize)]
pub struct BotFrame {
    pub name: String,
    pub position: GridPos,
    pub visits: VisitGrid,
}

impl WorldFrame {
    /// Clone the observable state out of `view`. Locks are taken one at a
    /// time, never nested; under a single gate permit none is contended.
    #[must_use]
    pub fn capture(view: &WorldView) -> Self {
        let (width, height, cells) = {
            let grid = view.grid.lock().unwrap_or_else(|poison| poison.into_inner());
            (grid.width(), grid.height(), grid.cells().to_vec())
        };
        let bots = view
            .traces
            .iter()
            .map(|trace| {
                let trace = trace.lock().unwrap_or_else(|poison| poison.into_inner());
                BotFrame {
                    name: trace.name.clone(),
                    position: trace.position,
                    visits: trace.visits.clone(),
                }
            })
            .collect();
        Self {
            width,
            height,
            cells,
            bots,
        }
    }

    /// Per-cell maximum visit count across all bots.
    fn heat(&self) -> Vec<u32> {
        let mut heat = vec![0u32; self.cells.len()];
        for bot in &self.bots {
            for (idx, count) in bot.visits.cells().iter().enumerate() {
                if idx < heat.len() {
                    heat[idx] = heat[idx].max(*count);
                }
            }
        }
        heat
    }

    /// Fraction of non-wall cells some bot has visited at least once.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        let heat = self.heat();
        let mut walkable = 0usize;
        let mut visited = 0usize;
        for (idx, cell) in self.cells.iter().enumerate() {
            if *cell == CellState::Wall {
                continue;
            }
            walkable += 1;
            if heat[idx] > 0 {
                visited += 1;
            }
        }
        if walkable == 0 {
            return 0.0;
        }
        visited as f64 / walkable as f64
    }

    /// Plain-text rendition used by headless runs and snapshot tests:
    /// `#` wall, `R` bot, `.` visited free cell, space untouched free cell.
    #[must_use]
    pub fn to_ascii(&self) -> String {
        let heat = self.heat();
        let width = self.width as usize;
        let mut out = String::with_capacity(self.cells.len() + self.height as usize);
        for (idx, cell) in self.cells.iter().enumerate() {
            if idx > 0 && idx % width == 0 {
                out.push('\n');
            }
            out.push(match cell {
                CellState::Wall => '#',
                CellState::Occupied => 'R',
                CellState::Free if heat[idx] > 0 => '.',
                CellState::Free => ' ',
            });
        }
        out
    }

    fn to_text(&self) -> Text<'static> {
        let heat = self.heat();
        let width = self.width as usize;
        let mut lines = Vec::with_capacity(self.height as usize);
        for y in 0..self.height as usize {
            let mut spans = Vec::with_capacity(width);
            for x in 0..width {
                let idx = y * width + x;
                let span = match self.cells[idx] {
                    CellState::Wall => Span::styled("█", Style::default().fg(Color::DarkGray)),
                    CellState::Occupied => Span::styled("●", Style::default().fg(Color::Blue)),
                    CellState::Free => {
                        Span::styled("█", Style::default().fg(shade(heat[idx])))
                    }
                };
                spans.push(span);
            }
            lines.push(Line::from(spans));
        }
        Text::from(lines)
    }
}

/// Free cells shade darker the more often they have been visited: channel
/// value `255 / (visits + 1)`, white when untouched.
fn shade(visits: u32) -> Color {
    let value = (255 / visits.saturating_add(1)).min(255) as u8;
    Color::Rgb(value, value, value)
}

/// Serialisable summary of a headless run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HeadlessReport {
    pub frames: usize,
    pub coverage: f64,
    pub total_visits: u64,
    pub bot_positions: Vec<GridPos>,
}

impl HeadlessReport {
    fn record(&mut self, frame: &WorldFrame) {
        self.frames += 1;
        self.coverage = frame.coverage();
        self.total_visits = frame.bots.iter().map(|bot| bot.visits.total()).sum();
        self.bot_positions = frame.bots.iter().map(|bot| bot.position).collect();
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &std::path::Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("failed to serialise headless report")?;
        Ok(())
    }
}

struct HeadlessRun {
    budget: usize,
    report: HeadlessReport,
    report_path: Option<PathBuf>,
    last_ascii: String,
}

impl HeadlessRun {
    fn from_env() -> Self {
        let budget = std::env::var(HEADLESS_FRAMES_ENV)
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|frames| *frames > 0)
            .unwrap_or(DEFAULT_HEADLESS_FRAMES)
            .min(MAX_HEADLESS_FRAMES);
        Self {
            budget,
            report: HeadlessReport::default(),
            report_path: std::env::var_os(REPORT_PATH_ENV).map(PathBuf::from),
            last_ascii: String::new(),
        }
    }

    fn with_budget(budget: usize) -> Self {
        Self {
            budget: budget.min(MAX_HEADLESS_FRAMES),
            report: HeadlessReport::default(),
            report_path: None,
            last_ascii: String::new(),
        }
    }
}

/// Raw-mode terminal session restored on drop, so every exit path --
/// including a failing participant -- leaves the shell usable.
struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    fn new() -> Result<Self> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to build terminal backend")?;
        terminal.hide_cursor().ok();
        Ok(Self { terminal })
    }

    fn draw(&mut self, frame: &WorldFrame) -> io::Result<()> {
        self.terminal.draw(|ui| draw_frame(ui, frame))?;
        Ok(())
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.terminal.show_cursor().ok();
        if let Err(err) = disable_raw_mode() {
            error!(?err, "failed to disable raw mode");
        }
        if let Err(err) = execute!(self.terminal.backend_mut(), LeaveAlternateScreen) {
            error!(?err, "failed to leave alternate screen");
        }
    }
}

fn draw_frame(ui: &mut Frame<'_>, frame: &WorldFrame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(ui.area());

    let grid = Paragraph::new(frame.to_text())
        .block(Block::default().borders(Borders::ALL).title("GridBots"));
    ui.render_widget(grid, chunks[0]);

    let status = Line::from(format!(
        " bots: {}  coverage: {:>5.1}%  q quits",
        frame.bots.len(),
        frame.coverage() * 100.0
    ));
    ui.render_widget(Paragraph::new(status), chunks[1]);
}

enum Mode {
    Interactive(TerminalSession),
    Headless(HeadlessRun),
}

/// Read-only renderer participant.
pub struct TerminalRenderer {
    view: WorldView,
    mode: Mode,
    pending: Option<WorldFrame>,
}

impl TerminalRenderer {
    /// Build a renderer over `view`, headless when `GRIDBOTS_TERMINAL_HEADLESS`
    /// is set, interactive otherwise.
    pub fn new(view: WorldView) -> Result<Self> {
        let mode = if std::env::var_os(HEADLESS_ENV).is_some() {
            let run = HeadlessRun::from_env();
            info!(frames = run.budget, "terminal renderer running headless");
            Mode::Headless(run)
        } else {
            Mode::Interactive(TerminalSession::new()?)
        };
        Ok(Self {
            view,
            mode,
            pending: None,
        })
    }

    /// Headless renderer with an explicit frame budget, independent of the
    /// environment. Used by tests and embedders.
    #[must_use]
    pub fn headless(view: WorldView, budget: usize) -> Self {
        Self {
            view,
            mode: Mode::Headless(HeadlessRun::with_budget(budget)),
            pending: None,
        }
    }

    /// Most recent ASCII rendition of a headless frame, empty before the
    /// first frame or in interactive mode.
    #[must_use]
    pub fn last_ascii(&self) -> &str {
        match &self.mode {
            Mode::Headless(run) => &run.last_ascii,
            Mode::Interactive(_) => "",
        }
    }

    /// Summary of the headless run so far.
    #[must_use]
    pub fn report(&self) -> Option<&HeadlessReport> {
        match &self.mode {
            Mode::Headless(run) => Some(&run.report),
            Mode::Interactive(_) => None,
        }
    }

    fn poll_input(&self) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if is_quit_key(&key) {
                    info!("quit requested from terminal");
                    self.view.gate.stop();
                }
            }
        }
        Ok(())
    }
}

fn is_quit_key(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

impl Participant for TerminalRenderer {
    fn name(&self) -> &str {
        "renderer"
    }

    fn work(&mut self) -> Result<(), SimError> {
        self.pending = Some(WorldFrame::capture(&self.view));
        Ok(())
    }

    fn present(&mut self) -> Result<(), SimError> {
        let Some(frame) = self.pending.take() else {
            return Ok(());
        };
        match &mut self.mode {
            Mode::Interactive(session) => {
                session.draw(&frame)?;
            }
            Mode::Headless(run) => {
                run.last_ascii = frame.to_ascii();
                run.report.record(&frame);
                if run.report.frames >= run.budget {
                    info!(
                        frames = run.report.frames,
                        coverage = run.report.coverage,
                        total_visits = run.report.total_visits,
                        "headless frame budget reached; stopping"
                    );
                    if let Some(path) = run.report_path.clone() {
                        run.report
                            .write_json(&path)
                            .map_err(|err| io::Error::other(err.to_string()))?;
                    }
                    self.view.gate.stop();
                }
            }
        }
        if matches!(self.mode, Mode::Interactive(_)) {
            self.poll_input()?;
        }
        Ok(())
    }

    fn throttle(&self) -> Duration {
        match &self.mode {
            Mode::Interactive(_) => Duration::from_millis(DRAW_INTERVAL_MS),
            Mode::Headless(_) => Duration::from_millis(1),
        }
    }
}
