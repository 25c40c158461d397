//! # lib_autosplit
//!
//! The engine behind the USB2SNES auto splitter. It keeps one WebSocket session
//! to a QUsb2Snes-compatible server, attaches to a device, polls console WRAM
//! and evaluates a user-authored condition tree to decide when a run starts or
//! advances to the next split.
//!
//! ## Modules (feature-gated per folder):
//! - **`protocol`**: the request/reply client and its wire messages.
//! - **`splits`**: the condition tree, its validation and the evaluation engine.
//! - **`configs`**: game configuration loading with change detection.
//! - **`driver`**: the connection state machine, the host trait and the poll scheduler.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod error;

#[cfg(feature = "protocol")]
pub mod protocol;

#[cfg(feature = "splits")]
pub mod splits;

#[cfg(feature = "configs")]
pub mod configs;

#[cfg(feature = "driver")]
pub mod driver;

#[cfg(all(test, feature = "full"))]
pub(crate) mod testing;

pub use error::{AutosplitError, ValidationError};

/// Engine version compared against a game configuration's `minVersion`.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Console address where the 128 KiB of work RAM begins on SD2SNES firmware.
pub const WRAM_BASE_ADDRESS: u32 = 0xF5_0000;

/// Size of the addressable work RAM window.
pub const WRAM_SIZE: u32 = 0x2_0000;
