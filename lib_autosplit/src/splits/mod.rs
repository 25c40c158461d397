//! # Splits Module
//!
//! The condition tree and everything that walks it.
//!
//! ## Contained Modules:
//! - **`model`**: serde shapes of the game configuration file and the resolved `Check`.
//! - **`arena`**: the compiled tree (`SplitArena`, `SplitId`), the runnable list and `Game`.
//! - **`validate`**: file-level validation and the engine version gate.
//! - **`snapshot`**: per-check previous values for delta predicates.
//! - **`eval`**: predicate evaluation, sequential steps and the `MemoryReader` seam.

/// Configuration file data model.
pub mod model;
/// Compiled condition tree.
pub mod arena;
/// File-level validation.
pub mod validate;
/// Per-check previous values.
pub mod snapshot;
/// The evaluation engine.
pub mod eval;

// --- Public API Re-exports ---
pub use arena::{Game, RunnableList, SplitArena, SplitId, SplitNode};
pub use eval::{compute_read_range, evaluate_check, Evaluator, MemoryReader, ProgressTable};
pub use model::{Check, GameDef, GameSettings, Operator, SplitDef, ValueType};
pub use validate::validate;
