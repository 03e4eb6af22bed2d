use std::path::PathBuf;

use anyhow::Result;
use gridbots_app::{DEFAULT_LAYOUT, bootstrap, load_layout};
use gridbots_core::GridWorld;
use gridbots_render::TerminalRenderer;
use tracing::info;

fn main() -> Result<()> {
    init_tracing();

    let (grid, starts) = match std::env::args_os().nth(1) {
        Some(path) => load_layout(&PathBuf::from(path))?,
        None => GridWorld::from_layout(DEFAULT_LAYOUT)?,
    };
    info!(
        width = grid.width(),
        height = grid.height(),
        bots = starts.len(),
        "layout loaded"
    );

    let mut supervisor = bootstrap(grid, starts)?;
    let renderer = TerminalRenderer::new(supervisor.view())?;
    supervisor.attach(Box::new(renderer))?;
    supervisor.start()?;

    // The renderer flips the gate's stop flag on quit (or when its headless
    // frame budget runs out); join returns once every participant has
    // terminated.
    supervisor.join()?;
    info!("simulation stopped");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
