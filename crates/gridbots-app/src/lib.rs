//! Application plumbing for the GridBots shell: layout loading and
//! supervisor bootstrap, kept out of `main` so tests can drive them.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use gridbots_core::{GridBotsConfig, GridPos, GridWorld, Supervisor};

/// Built-in floor plan used when no layout file is supplied. `R` marks a
/// bot starting cell, `#` a wall, a space open floor.
pub const DEFAULT_LAYOUT: &str = "\
################################################\n\
#R                                             #\n\
#              #               #               #\n\
#    ######    #   #########   #    ######     #\n\
#                                              #\n\
#   ####   #########    ############    ####   #\n\
#          #                        #          #\n\
#          #        R               #          #\n\
#                        R                     #\n\
################################################";

/// Read and parse a layout file.
pub fn load_layout(path: &Path) -> Result<(GridWorld, Vec<GridPos>)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read layout file {}", path.display()))?;
    let parsed = GridWorld::from_layout(&text)
        .with_context(|| format!("invalid layout in {}", path.display()))?;
    Ok(parsed)
}

/// Build a ready-to-start supervisor from a parsed layout.
pub fn bootstrap(grid: GridWorld, starts: Vec<GridPos>) -> Result<Supervisor> {
    if starts.is_empty() {
        bail!("layout defines no bot start markers");
    }
    let config = GridBotsConfig {
        bot_spawns: starts,
        ..GridBotsConfig::default()
    };
    Ok(Supervisor::new(config, grid)?)
}
