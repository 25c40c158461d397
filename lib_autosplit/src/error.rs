//! # Error Types
//!
//! Every failure in the engine is recoverable: the scheduler degrades to "stay
//! disconnected" or "stay unevaluated" and retries on the next tick. These enums
//! classify failures so the caller can pick the right recovery.

use thiserror::Error;

/// Failures raised while talking to the device or loading a game.
#[derive(Debug, Error)]
pub enum AutosplitError {
    /// The socket never opened, or was closed underneath us.
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// No reply arrived within the call's time budget.
    #[error("No reply to {opcode} within {timeout_ms}ms")]
    ProtocolTimeout { opcode: String, timeout_ms: u64 },

    /// A text reply could not be decoded, or a binary frame arrived where text was expected.
    #[error("Malformed reply to {opcode}: {detail}")]
    MalformedReply { opcode: String, detail: String },

    /// The server reported zero devices.
    #[error("No device available to attach to")]
    NoDevices,

    /// `Attach` was sent but `Info` came back without a firmware version.
    #[error("Attach to '{0}' could not be confirmed")]
    AttachUnconfirmed(String),

    /// A memory read returned nothing at all.
    #[error("Read of {size} bytes at ${address:06X} failed")]
    ReadFailed { address: u32, size: u32 },

    /// A memory read returned the wrong number of bytes.
    #[error("Read at ${address:06X} returned {actual} bytes, expected {expected}")]
    ReadSizeMismatch {
        address: u32,
        expected: u32,
        actual: usize,
    },

    /// The game configuration file is not valid JSON or does not match the schema.
    #[error("Could not parse game configuration: {0}")]
    ConfigParse(String),

    /// The game configuration parsed but is not usable.
    #[error("Invalid game configuration: {0}")]
    ConfigValidation(#[from] ValidationError),

    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
}

impl AutosplitError {
    /// Errors that mean the session can no longer be trusted and must be dropped.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            AutosplitError::ConnectionFailure(_)
                | AutosplitError::ProtocolTimeout { .. }
                | AutosplitError::MalformedReply { .. }
                | AutosplitError::ReadFailed { .. }
                | AutosplitError::ReadSizeMismatch { .. }
        )
    }
}

/// Reasons a parsed game configuration is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("The configuration declares no splits")]
    EmptyConfiguration,

    #[error("Split definition missing: {name} (referenced by {referenced_by})")]
    MissingDefinition { name: String, referenced_by: String },

    #[error("Configuration requires engine {required}, this is {current}")]
    VersionTooOld { required: String, current: String },

    #[error("Invalid number '{literal}' in split '{split}'")]
    InvalidNumber { split: String, literal: String },

    #[error("Address {address:#X} in split '{split}' is outside WRAM")]
    InvalidAddress { split: String, address: u32 },

    #[error("Split '{split}': {reason}")]
    InvalidSplit { split: String, reason: String },
}
