use std::io::Write;

use gridbots_app::{DEFAULT_LAYOUT, bootstrap, load_layout};
use gridbots_core::GridWorld;
use gridbots_render::TerminalRenderer;

#[test]
fn default_layout_parses_and_boots() {
    let (grid, starts) = GridWorld::from_layout(DEFAULT_LAYOUT).expect("built-in layout");
    assert_eq!(grid.width(), 48);
    assert_eq!(grid.height(), 10);
    assert_eq!(starts.len(), 3);

    let supervisor = bootstrap(grid, starts).expect("bootstrap");
    assert_eq!(supervisor.bot_count(), 3);
    assert_eq!(supervisor.grid().lock().unwrap().occupied_count(), 3);
}

#[test]
fn layout_files_load_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("temp layout");
    write!(file, "#####\n#R R#\n#####").expect("write layout");

    let (grid, starts) = load_layout(file.path()).expect("load");
    assert_eq!(grid.width(), 5);
    assert_eq!(starts.len(), 2);
}

#[test]
fn malformed_layout_files_are_rejected_with_path_context() {
    let mut file = tempfile::NamedTempFile::new().expect("temp layout");
    write!(file, "###\n#x#\n###").expect("write layout");

    let err = load_layout(file.path()).expect_err("bad glyph");
    let message = format!("{err:#}");
    assert!(message.contains("invalid layout"));
    assert!(message.contains("unrecognised glyph"));
}

#[test]
fn full_shell_runs_headless_to_completion() {
    let (grid, starts) = GridWorld::from_layout(DEFAULT_LAYOUT).expect("layout");
    let mut supervisor = bootstrap(grid, starts).expect("bootstrap");
    let renderer = TerminalRenderer::headless(supervisor.view(), 25);
    supervisor.attach(Box::new(renderer)).expect("attach");

    supervisor.start().expect("start");
    supervisor.join().expect("join");

    // Occupancy is conserved through the whole run.
    assert_eq!(supervisor.grid().lock().unwrap().occupied_count(), 3);
}
