//! Previously observed bytes, kept per check across ticks for `delta`,
//! `o-delta` and `old_value` comparisons.
//!
//! Every check owns its history: two checks on the same address never see
//! each other's reads, and a check that has not been evaluated before has no
//! previous value at all.

use std::collections::HashMap;

use crate::splits::arena::SplitId;

/// Position of a check inside its leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckKey {
    pub split: SplitId,
    pub index: usize,
}

impl CheckKey {
    pub fn new(split: SplitId, index: usize) -> Self {
        Self { split, index }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    previous: HashMap<CheckKey, Vec<u8>>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes the check saw on its last evaluation.
    pub fn previous(&self, key: CheckKey) -> Option<&[u8]> {
        self.previous.get(&key).map(Vec::as_slice)
    }

    pub fn store(&mut self, key: CheckKey, bytes: &[u8]) {
        match self.previous.get_mut(&key) {
            Some(slot) => {
                slot.clear();
                slot.extend_from_slice(bytes);
            }
            None => {
                self.previous.insert(key, bytes.to_vec());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }

    pub fn clear(&mut self) {
        self.previous.clear();
    }
}
