//! The seam between the engine and whatever owns the run: a timer
//! application, the console host of the `autosplitter` binary, or a test.

use std::path::PathBuf;

/// Phase of the host's run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    NotRunning,
    Running,
    Paused,
    Ended,
}

/// Callbacks and settings the scheduler reads on every tick.
///
/// Implementations must be cheap to query; they are called from the tick task.
pub trait TimerHost: Send + Sync {
    /// The autostart split matched while not running.
    fn on_start(&self);
    /// The current split matched while running.
    fn on_split(&self);

    /// Device to attach to. Empty picks the last one the server lists.
    fn device_name(&self) -> String;
    /// Game configuration file, if one is set.
    fn config_path(&self) -> Option<PathBuf>;
    /// Returns `true` once per reload request (file changed, user asked).
    fn config_reload_requested(&self) -> bool;

    fn current_run_phase(&self) -> RunPhase;
    fn current_split_index(&self) -> usize;

    fn autostart_enabled(&self) -> bool;
    fn debug_enabled(&self) -> bool;
    fn reset_hardware_enabled(&self) -> bool;

    /// Run category, used to pick the category of a legacy game.
    fn category_name(&self) -> Option<String> {
        None
    }

    /// Number of segments the host's run has, when it knows.
    fn segment_count(&self) -> Option<usize> {
        None
    }

    /// Per-split toggle from the settings surface.
    fn split_enabled(&self, _name: &str) -> bool {
        true
    }

    /// Bumped whenever any `split_enabled` answer may have changed.
    fn toggles_revision(&self) -> u64 {
        0
    }

    /// A message the user should see once, e.g. a broken configuration.
    fn show_message(&self, message: &str) {
        log::warn!("{}", message);
    }
}
