//! # Game Configuration Data Model
//!
//! Strongly-typed mirror of the JSON game configuration file. These are the
//! *as-written* shapes; the evaluation engine never walks them directly. They
//! are resolved into a [`SplitArena`](crate::splits::arena::SplitArena) whose
//! checks carry parsed numbers.
//!
//! ## Key Features:
//! - **Two Formats, One Struct**: `GameDef` carries the fields of the current
//!   format (`splits`, nested `children`) and of the legacy format
//!   (`categories` referencing `definitions` by name). `is_legacy()` tells them
//!   apart.
//! - **Lenient Literals**: addresses and operands are strings in hexadecimal
//!   (`0x` prefix) or decimal, or plain JSON numbers.
//! - **Closed Enums**: operators and value types are exhaustive enums, so an
//!   unknown operator is a parse error instead of a silent fallthrough.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// # Game Definition
///
/// Root object of a game configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: GameSettings,
    /// Inline split (current format) or a definition name (legacy format).
    #[serde(default)]
    pub autostart: Option<AutostartDef>,
    #[serde(default)]
    pub splits: Vec<SplitDef>,
    /// Lowest engine version able to run this file, e.g. `"1.2.0"`.
    #[serde(default)]
    pub min_version: Option<String>,
    /// Legacy: named groups of definition names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryDef>,
    /// Legacy: flat list of splits referenced by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub definitions: Vec<SplitDef>,
}

impl GameDef {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// `true` for the categories/definitions layout.
    pub fn is_legacy(&self) -> bool {
        !self.categories.is_empty() || !self.definitions.is_empty()
    }

    /// Legacy definition by name, ignoring ASCII case.
    pub fn definition(&self, name: &str) -> Option<&SplitDef> {
        self.definitions
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

/// Per-game switches stored in the configuration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    #[serde(default)]
    pub reset_hardware: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub hide_connection_bar: bool,
}

/// # Autostart Reference
///
/// The current format embeds the autostart split, the legacy format names one
/// of its `definitions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutostartDef {
    Name(String),
    Inline(Box<SplitDef>),
}

/// Legacy category: a run category name and the ordered definition names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub splits: Vec<String>,
}

/// # Split Definition
///
/// One node of the condition tree as written in the file. A node with
/// `children` is a category, a node with `checks` is a leaf. A legacy node
/// carries one check inline through `address`/`value`/`type`/`operator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tooltip: String,
    #[serde(default = "default_active", deserialize_with = "deserialize_flag")]
    pub active: bool,
    #[serde(default)]
    pub repeat: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SplitDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub more: Vec<SplitDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next: Vec<SplitDef>,

    // Legacy inline check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Literal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Literal>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
}

impl Default for SplitDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            tooltip: String::new(),
            active: true,
            repeat: 0,
            children: Vec::new(),
            checks: Vec::new(),
            more: Vec::new(),
            next: Vec::new(),
            address: None,
            value: None,
            value_type: None,
            operator: None,
        }
    }
}

impl SplitDef {
    /// The inline legacy check, when `address` and `operator` are present.
    pub fn inline_check(&self) -> Option<CheckDef> {
        Some(CheckDef {
            address: self.address.clone()?,
            value: self.value.clone(),
            old_value: None,
            value_type: self.value_type.unwrap_or_default(),
            operator: self.operator?,
        })
    }

    /// Inline check first, then `checks`.
    pub fn all_checks(&self) -> Vec<CheckDef> {
        self.inline_check()
            .into_iter()
            .chain(self.checks.iter().cloned())
            .collect()
    }
}

fn default_active() -> bool {
    true
}

/// Accepts `true`/`false` as well as the `"1"`/`"0"`/`"true"` strings older
/// files use.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(u64),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Number(n) => n != 0,
        Flag::Text(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no"),
    })
}

/// # Check Definition
///
/// A single memory predicate as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDef {
    /// Offset into WRAM.
    pub address: Literal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Literal>,
    #[serde(default, alias = "oldValue", skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Literal>,
    #[serde(default, rename = "type")]
    pub value_type: ValueType,
    pub operator: Operator,
}

impl CheckDef {
    /// Parses every literal. `split` names the owning split in errors.
    pub fn resolve(&self, split: &str) -> Result<Check, ValidationError> {
        let number = |literal: &Literal| {
            literal.parse().ok_or_else(|| ValidationError::InvalidNumber {
                split: split.to_string(),
                literal: literal.0.clone(),
            })
        };

        let check = Check {
            address: number(&self.address)?,
            value: self.value.as_ref().map(number).transpose()?,
            old_value: self.old_value.as_ref().map(number).transpose()?,
            value_type: self.value_type,
            operator: self.operator,
        };

        // Delta operands are 16-bit two's complement.
        if matches!(check.operator, Operator::Delta | Operator::OffsetDelta) {
            let literals = [(&self.value, check.value), (&self.old_value, check.old_value)];
            for (literal, operand) in literals {
                if let (Some(literal), Some(operand)) = (literal, operand) {
                    if operand > 0xFFFF {
                        return Err(ValidationError::InvalidNumber {
                            split: split.to_string(),
                            literal: literal.0.clone(),
                        });
                    }
                }
            }
        }

        let end = u64::from(check.address) + u64::from(check.size());
        if end > u64::from(crate::WRAM_SIZE) {
            return Err(ValidationError::InvalidAddress {
                split: split.to_string(),
                address: check.address,
            });
        }
        Ok(check)
    }
}

/// A numeric literal kept in its written form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Literal(pub String);

impl Literal {
    /// `0x`/`0X` prefix means hexadecimal, anything else decimal.
    pub fn parse(&self) -> Option<u32> {
        let text = self.0.trim();
        match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => text.parse().ok(),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal(value.to_string())
    }
}

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Literal(s),
            Raw::Number(n) => Literal(n.to_string()),
        })
    }
}

/// Width of the value a check reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Byte,
    /// Little-endian 16-bit.
    #[default]
    Short,
}

impl ValueType {
    pub fn size(self) -> u32 {
        match self {
            ValueType::Byte => 1,
            ValueType::Short => 2,
        }
    }

    /// Decodes the first `size()` bytes of `bytes`.
    pub fn decode(self, bytes: &[u8]) -> u32 {
        match self {
            ValueType::Byte => u32::from(bytes[0]),
            ValueType::Short => u32::from(bytes[0]) + (u32::from(bytes[1]) << 8),
        }
    }
}

/// Comparison applied between a decoded value and a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Every set bit of the value is also set in the operand.
    #[serde(rename = "&")]
    FlagsWithin,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    /// Signed change since the previous read equals the operand.
    #[serde(rename = "delta")]
    Delta,
    /// Previous value plus the operand, modulo 0x10000, equals the value.
    #[serde(rename = "o-delta", alias = "odelta")]
    OffsetDelta,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::FlagsWithin => "&",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Delta => "delta",
            Operator::OffsetDelta => "o-delta",
        };
        f.write_str(symbol)
    }
}

/// A resolved check with numeric operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Check {
    pub address: u32,
    pub value: Option<u32>,
    pub old_value: Option<u32>,
    pub value_type: ValueType,
    pub operator: Operator,
}

impl Check {
    pub fn size(&self) -> u32 {
        self.value_type.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_parsing() {
        assert_eq!(Literal::from("0x10").parse(), Some(16));
        assert_eq!(Literal::from("0XfF").parse(), Some(255));
        assert_eq!(Literal::from("42").parse(), Some(42));
        assert_eq!(Literal::from("0x").parse(), None);
        assert_eq!(Literal::from("ten").parse(), None);
    }

    #[test]
    fn test_decode_short_is_little_endian() {
        assert_eq!(ValueType::Short.decode(&[0x34, 0x12]), 0x1234);
        assert_eq!(ValueType::Short.decode(&[0xFF, 0xFF]), 0xFFFF);
        assert_eq!(ValueType::Byte.decode(&[0x34, 0x12]), 0x34);
    }

    #[test]
    fn test_split_json_shape() {
        let json = r#"{
            "name": "Kraid",
            "checks": [
                { "address": "0x79B", "value": "0xA59F", "operator": "==" },
                { "address": 4, "oldValue": "1", "type": "byte", "operator": "odelta" }
            ],
            "next": [{ "name": "door", "address": "0x998", "value": "0xB", "type": "byte", "operator": "==" }]
        }"#;
        let split: SplitDef = serde_json::from_str(json).unwrap();
        assert!(split.active);
        assert_eq!(split.checks.len(), 2);
        assert_eq!(split.checks[0].value_type, ValueType::Short);
        assert_eq!(split.checks[1].operator, Operator::OffsetDelta);
        assert_eq!(split.checks[1].old_value, Some(Literal::from("1")));

        let check = split.checks[0].resolve("Kraid").unwrap();
        assert_eq!(check.address, 0x79B);
        assert_eq!(check.value, Some(0xA59F));

        let door = split.next[0].inline_check().unwrap();
        assert_eq!(door.value_type, ValueType::Byte);
    }

    #[test]
    fn test_active_accepts_strings() {
        let off: SplitDef = serde_json::from_str(r#"{ "name": "a", "active": "0" }"#).unwrap();
        let on: SplitDef = serde_json::from_str(r#"{ "name": "b", "active": "1" }"#).unwrap();
        assert!(!off.active);
        assert!(on.active);
    }

    #[test]
    fn test_address_past_wram_is_rejected() {
        let check = CheckDef {
            address: Literal::from("0x1FFFF"),
            value: Some(Literal::from("1")),
            old_value: None,
            value_type: ValueType::Short,
            operator: Operator::Eq,
        };
        assert!(matches!(
            check.resolve("edge"),
            Err(ValidationError::InvalidAddress { address: 0x1FFFF, .. })
        ));
    }

    #[test]
    fn test_wide_delta_operand_is_rejected() {
        let check = |operator, value: &str| CheckDef {
            address: Literal::from("0x10"),
            value: Some(Literal::from(value)),
            old_value: None,
            value_type: ValueType::Short,
            operator,
        };

        assert!(matches!(
            check(Operator::Delta, "0x10001").resolve("wide"),
            Err(ValidationError::InvalidNumber { ref literal, .. }) if literal == "0x10001"
        ));
        assert!(matches!(
            check(Operator::OffsetDelta, "65536").resolve("wide"),
            Err(ValidationError::InvalidNumber { .. })
        ));
        assert_eq!(check(Operator::Delta, "0xFFFF").resolve("minus one").unwrap().value, Some(0xFFFF));
        // Other operators compare full 32-bit values.
        assert!(check(Operator::Eq, "0x10001").resolve("wide").is_ok());
    }

    #[test]
    fn test_unknown_operator_fails_to_parse() {
        let result: Result<CheckDef, _> =
            serde_json::from_str(r#"{ "address": "0x10", "value": "1", "operator": "~=" }"#);
        assert!(result.is_err());
    }
}
