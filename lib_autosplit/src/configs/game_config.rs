//! # Game Configuration Store
//!
//! Loads the game configuration file and publishes it as an immutable
//! [`LoadedGame`] snapshot behind an `Arc`.
//!
//! ## Key Features:
//! - **Idempotent Reload**: a SHA-256 digest of the path and the file content
//!   is kept with the loaded game. Reloading unchanged content keeps the same
//!   snapshot and generation, so split progress survives.
//! - **Atomic Replacement**: a successful load swaps in a new `Arc` with the
//!   next generation number. Ticks still holding the old one are unaffected.
//! - **Fail Unloaded**: any read, parse or validation failure leaves the store
//!   without a game until the next successful reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::AutosplitError;
use crate::splits::arena::Game;
use crate::splits::model::GameDef;
use crate::splits::validate::validate;

/// A compiled game tagged with where and when it was loaded.
#[derive(Debug)]
pub struct LoadedGame {
    /// Increases with every successful load that changed something.
    pub generation: u64,
    /// Hex SHA-256 of path and content.
    pub digest: String,
    pub path: PathBuf,
    pub game: Game,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStatus {
    Loaded { generation: u64 },
    Unchanged,
}

#[derive(Debug, Default)]
pub struct GameConfigStore {
    path: Option<PathBuf>,
    current: Option<Arc<LoadedGame>>,
    generation: u64,
}

impl GameConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<LoadedGame>> {
        self.current.clone()
    }

    /// Path of the last load attempt, successful or not.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn unload(&mut self) {
        self.current = None;
    }

    /// Reads, validates and compiles `path`.
    pub fn reload(&mut self, path: &Path) -> Result<ReloadStatus, AutosplitError> {
        self.path = Some(path.to_path_buf());

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                self.current = None;
                return Err(e.into());
            }
        };

        let digest = content_digest(path, &text);
        if let Some(current) = &self.current {
            if current.digest == digest {
                log::debug!(
                    "Game configuration {} unchanged ({})",
                    path.display(),
                    &digest[..12]
                );
                return Ok(ReloadStatus::Unchanged);
            }
        }

        match compile_text(&text) {
            Ok(game) => {
                self.generation += 1;
                log::info!(
                    "Loaded game configuration '{}' from {} (generation {}, digest {})",
                    game.name,
                    path.display(),
                    self.generation,
                    &digest[..12]
                );
                self.current = Some(Arc::new(LoadedGame {
                    generation: self.generation,
                    digest,
                    path: path.to_path_buf(),
                    game,
                }));
                Ok(ReloadStatus::Loaded {
                    generation: self.generation,
                })
            }
            Err(e) => {
                self.current = None;
                Err(e)
            }
        }
    }
}

/// Parses either layout, validates and compiles.
pub fn compile_text(text: &str) -> Result<Game, AutosplitError> {
    let def = GameDef::from_json(text).map_err(|e| AutosplitError::ConfigParse(e.to_string()))?;
    validate(&def)?;

    if def.is_legacy() {
        let converted = crate::configs::legacy::convert(&def)?;
        let mut game = Game::compile(&converted)?;
        game.legacy = true;
        Ok(game)
    } else {
        Ok(Game::compile(&def)?)
    }
}

fn content_digest(path: &Path, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use std::io::Write;

    const GAME: &str = r#"{
        "name": "Test Game",
        "settings": { "resetHardware": true },
        "autostart": { "name": "start", "checks": [{ "address": "0x998", "value": "0x1F", "type": "byte", "operator": "==" }] },
        "splits": [
            { "name": "any%", "children": [
                { "name": "a", "repeat": 1, "checks": [{ "address": "0x10", "value": "1", "type": "byte", "operator": "==" }] },
                { "name": "b", "repeat": 1, "checks": [{ "address": "0x11", "value": "1", "type": "byte", "operator": "==" }] }
            ]}
        ]
    }"#;

    fn write_file(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reload_is_idempotent() {
        let file = write_file(GAME);
        let mut store = GameConfigStore::new();

        assert_eq!(
            store.reload(file.path()).unwrap(),
            ReloadStatus::Loaded { generation: 1 }
        );
        let first = store.current().unwrap();
        assert!(first.game.settings.reset_hardware);
        assert_eq!(first.game.runnable(None, &|_| true).len(), 4);
        assert!(first.game.autostart.is_some());

        assert_eq!(store.reload(file.path()).unwrap(), ReloadStatus::Unchanged);
        let second = store.current().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.generation, 1);
    }

    #[test]
    fn test_changed_content_bumps_generation() {
        let file = write_file(GAME);
        let mut store = GameConfigStore::new();
        store.reload(file.path()).unwrap();

        std::fs::write(file.path(), GAME.replace("Test Game", "Other Game")).unwrap();
        assert_eq!(
            store.reload(file.path()).unwrap(),
            ReloadStatus::Loaded { generation: 2 }
        );
        assert_eq!(store.current().unwrap().game.name, "Other Game");
    }

    #[test]
    fn test_failed_load_leaves_store_unloaded() {
        let file = write_file(GAME);
        let mut store = GameConfigStore::new();
        store.reload(file.path()).unwrap();

        std::fs::write(file.path(), "{ not json").unwrap();
        assert!(matches!(
            store.reload(file.path()),
            Err(AutosplitError::ConfigParse(_))
        ));
        assert!(store.current().is_none());

        std::fs::write(file.path(), r#"{ "name": "empty", "splits": [] }"#).unwrap();
        assert!(matches!(
            store.reload(file.path()),
            Err(AutosplitError::ConfigValidation(ValidationError::EmptyConfiguration))
        ));

        let missing = file.path().with_extension("missing");
        assert!(matches!(store.reload(&missing), Err(AutosplitError::Io(_))));
        assert_eq!(store.path(), Some(missing.as_path()));
    }

    #[test]
    fn test_legacy_file_is_flagged() {
        let file = write_file(
            r#"{ "name": "old", "categories": [{ "name": "Any%", "splits": ["x"] }],
                 "definitions": [{ "name": "x", "address": "0x10", "value": "1", "operator": "==" }] }"#,
        );
        let mut store = GameConfigStore::new();
        store.reload(file.path()).unwrap();
        assert!(store.current().unwrap().game.legacy);
    }
}
