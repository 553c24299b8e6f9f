//! Process-wide logging setup.

use std::sync::OnceLock;
use tracing::Level;

static LOGGING_INITIALIZED: OnceLock<Level> = OnceLock::new();

/// Picks the level for the `--verbose` / `--debug` switches.
pub fn level_for(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Installs the global `tracing` subscriber.
///
/// Lines are timestamped and carry their level. Only the first call in a
/// process has an effect; the level installed by that call is returned.
/// If something else already installed a global subscriber, it is left in
/// place.
pub fn init(level: Level) -> Level {
    *LOGGING_INITIALIZED.get_or_init(|| {
        let result = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .try_init();

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - keeping it");
        }
        level
    })
}
