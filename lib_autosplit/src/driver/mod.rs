//! # Driver Module
//!
//! Runtime orchestration: keeps the device attached and polls it on a timer.
//!
//! ## Contained Modules:
//! - **`host`**: the `TimerHost` trait the engine calls into.
//! - **`connection`**: the `None -> Connecting -> Connected -> Attached` state machine.
//! - **`scheduler`**: the adaptive poll loop.

/// Host callbacks.
pub mod host;
/// Connection and attachment state machine.
pub mod connection;
/// Poll scheduler.
pub mod scheduler;

// --- Public API Re-exports ---
pub use connection::{ConnectionStateMachine, Mood, ProtocolState};
pub use host::{RunPhase, TimerHost};
pub use scheduler::{PollScheduler, SchedulerSettings, TickOutcome};
