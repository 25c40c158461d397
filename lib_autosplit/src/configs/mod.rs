//! # Configs Module
//!
//! Loading of game configuration files.
//!
//! ## Contained Modules:
//! - **`game_config`**: `GameConfigStore` with digest-based change detection.
//! - **`legacy`**: conversion of the categories/definitions layout.

/// Game configuration loading.
pub mod game_config;
/// Legacy layout conversion.
pub mod legacy;

// --- Public API Re-exports ---
pub use game_config::{compile_text, GameConfigStore, LoadedGame, ReloadStatus};
