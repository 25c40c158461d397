//! Wire shapes of the USB2SNES protocol.
//!
//! Requests are JSON text frames. Replies are either JSON text frames carrying a
//! `Results` string list, or raw binary frames for memory reads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commands understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    DeviceList,
    Name,
    GetAddress,
    Reset,
    Attach,
    Info,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A command frame, serialized as `{ "Opcode": .., "Space": "SNES", "Operands": [..] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    pub opcode: Opcode,
    pub space: String,
    pub operands: Vec<String>,
}

impl Request {
    pub fn new(opcode: Opcode, operands: Vec<String>) -> Self {
        Self {
            opcode,
            space: "SNES".to_string(),
            operands,
        }
    }

    /// `GetAddress` with address and size in uppercase hexadecimal.
    pub fn get_address(address: u32, size: u32) -> Self {
        Self::new(
            Opcode::GetAddress,
            vec![format!("{:X}", address), format!("{:X}", size)],
        )
    }

    pub fn to_json(&self) -> String {
        // A struct of strings always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Body of a text reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplyBody {
    #[serde(default)]
    pub results: Vec<String>,
}

/// One decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Results(Vec<String>),
    Binary(Vec<u8>),
}

/// Decoded `Info` reply.
///
/// `Results[0]` is the firmware version (empty means nothing is attached),
/// `Results[2]` the program currently running, `Results[3..]` feature flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub version: String,
    pub rom_playing: String,
    pub flags: Vec<String>,
}

impl DeviceInfo {
    pub fn from_results(results: &[String]) -> Self {
        Self {
            version: results.first().cloned().unwrap_or_default(),
            rom_playing: results.get(2).cloned().unwrap_or_default(),
            flags: results.iter().skip(3).cloned().collect(),
        }
    }

    pub fn is_attached(&self) -> bool {
        !self.version.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = Request::get_address(0xF5_0010, 0x40).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["Opcode"], "GetAddress");
        assert_eq!(value["Space"], "SNES");
        assert_eq!(value["Operands"], serde_json::json!(["F50010", "40"]));
    }

    #[test]
    fn test_info_decoding() {
        let results: Vec<String> = ["1.9.0-usb-v2", "SD2SNES", "/games/sm.sfc", "NO_FILE_CMD"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let info = DeviceInfo::from_results(&results);
        assert!(info.is_attached());
        assert_eq!(info.rom_playing, "/games/sm.sfc");
        assert_eq!(info.flags, vec!["NO_FILE_CMD".to_string()]);

        assert!(!DeviceInfo::from_results(&[]).is_attached());
    }

    #[test]
    fn test_reply_body_tolerates_missing_results() {
        let body: ReplyBody = serde_json::from_str("{}").unwrap();
        assert!(body.results.is_empty());
    }
}
