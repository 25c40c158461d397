//! # Protocol Module
//!
//! Client side of the USB2SNES WebSocket protocol as spoken by QUsb2Snes and
//! compatible servers.
//!
//! ## Contained Modules:
//! - **`messages`**: request/reply wire shapes and the decoded `Info` reply.
//! - **`client`**: the persistent request/reply client with per-call timeouts.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Request and reply wire shapes.
pub mod messages;
/// The WebSocket request/reply client.
pub mod client;

// --- Public API Re-exports ---
pub use client::{ClientTimeouts, Usb2SnesClient, DEFAULT_URL};
pub use messages::{DeviceInfo, Opcode, Reply, Request};
