//! # Evaluation Engine
//!
//! Decides, one tick at a time, whether a split's conditions hold in console
//! memory.
//!
//! ## Key Design Principles:
//! - **One Read per Leaf**: the checks of a leaf are covered by a single
//!   batched read spanning `compute_read_range`.
//! - **Stateful Predicates**: a `MemorySnapshot` keeps, per check, the bytes
//!   that check saw on its last evaluation so `delta`, `o-delta` and
//!   `old_value` can compare against them. A check evaluated for the first
//!   time has no previous value and its delta predicates fail.
//! - **Sequential Sub-Steps**: a leaf with `next` alternatives only reports
//!   success once the base leaf and every `next` step succeeded, one tick each.
//!   Progress lives in a `ProgressTable` so the tree itself stays immutable.
//! - **Reads Behind a Trait**: memory comes from a `MemoryReader`, implemented
//!   by the WebSocket client and by in-memory fakes in tests.

use std::collections::HashMap;
use std::future::Future;

use crate::error::AutosplitError;
use crate::splits::arena::{NodeKind, SplitArena, SplitId};
use crate::splits::model::{Check, Operator};
use crate::splits::snapshot::{CheckKey, MemorySnapshot};

/// Source of WRAM bytes. `offset` is relative to the WRAM base.
///
/// Implementations return exactly `size` bytes or an error.
pub trait MemoryReader: Send + Sync {
    fn read_wram(
        &self,
        offset: u32,
        size: u32,
    ) -> impl Future<Output = Result<Vec<u8>, AutosplitError>> + Send;
}

/// Smallest `[min, max)` byte span covering every check, or `None` for no checks.
pub fn compute_read_range(checks: &[Check]) -> Option<(u32, u32)> {
    let min = checks.iter().map(|c| c.address).min()?;
    let max = checks.iter().map(|c| c.address + c.size()).max()?;
    Some((min, max))
}

/// Everything a check observed on one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    pub result: bool,
    pub current: u32,
    pub previous: Option<u32>,
    pub delta: Option<i32>,
}

/// Evaluates `check` against the bytes at its address.
pub fn evaluate_check(check: &Check, current: &[u8], previous: Option<&[u8]>) -> bool {
    check_outcome(check, current, previous).result
}

pub fn check_outcome(check: &Check, current: &[u8], previous: Option<&[u8]>) -> CheckOutcome {
    let value = check.value_type.decode(current);
    let old = previous.map(|bytes| check.value_type.decode(bytes));
    let delta = old.map(|old| value as i32 - old as i32);

    let mut applied = false;
    let mut result = true;
    if let Some(operand) = check.value {
        applied = true;
        result &= compare(check.operator, value, operand, delta, old);
    }
    if let (Some(operand), Some(observed)) = (check.old_value, old) {
        applied = true;
        result &= compare(check.operator, observed, operand, delta, old);
    }

    CheckOutcome {
        // No comparable literal: never true.
        result: applied && result,
        current: value,
        previous: old,
        delta,
    }
}

fn compare(op: Operator, value: u32, operand: u32, delta: Option<i32>, old: Option<u32>) -> bool {
    match op {
        Operator::FlagsWithin => (value & operand) == value,
        Operator::Eq => value == operand,
        Operator::Ne => value != operand,
        Operator::Gt => value > operand,
        Operator::Lt => value < operand,
        Operator::Ge => value >= operand,
        Operator::Le => value <= operand,
        // The operand is a 16-bit two's complement number: 0xFFFF is -1.
        Operator::Delta => delta == Some(i32::from(operand as u16 as i16)),
        Operator::OffsetDelta => old.is_some_and(|old| (old.wrapping_add(operand) & 0xFFFF) == value),
    }
}

/// `next` progress per leaf. Missing entries mean 0 (evaluate the base leaf).
#[derive(Debug, Clone, Default)]
pub struct ProgressTable {
    steps: HashMap<SplitId, usize>,
}

impl ProgressTable {
    pub fn get(&self, id: SplitId) -> usize {
        self.steps.get(&id).copied().unwrap_or(0)
    }

    pub fn set(&mut self, id: SplitId, step: usize) {
        if step == 0 {
            self.steps.remove(&id);
        } else {
            self.steps.insert(id, step);
        }
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

/// # Evaluator
///
/// Owns every piece of mutable evaluation state: the snapshot, the progress
/// table and the generation of the game they belong to.
#[derive(Debug, Default)]
pub struct Evaluator {
    snapshot: MemorySnapshot,
    progress: ProgressTable,
    generation: Option<u64>,
    debug: bool,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Progress belongs to one loaded game; a new generation starts over.
    pub fn sync_generation(&mut self, generation: u64) {
        if self.generation != Some(generation) {
            if self.generation.is_some() {
                log::debug!("Game generation {} loaded, clearing split progress", generation);
            }
            self.progress.clear();
            self.snapshot.clear();
            self.generation = Some(generation);
        }
    }

    pub fn progress(&self) -> &ProgressTable {
        &self.progress
    }

    /// Abandons every partially advanced `next` chain and forgets what each
    /// check saw, so a new run never compares against the previous one.
    pub fn reset_progress(&mut self) {
        self.progress.clear();
        self.snapshot.clear();
    }

    pub fn snapshot(&self) -> &MemorySnapshot {
        &self.snapshot
    }

    /// One batched read, then every check of `id` (all of them, so the debug
    /// log shows each). Each check's previous value is replaced by what it
    /// just saw; a failed read leaves every history untouched.
    pub async fn evaluate_split<R: MemoryReader>(
        &mut self,
        reader: &R,
        arena: &SplitArena,
        id: SplitId,
    ) -> Result<bool, AutosplitError> {
        let checks = arena.checks(id);
        let Some((start, end)) = compute_read_range(checks) else {
            return Ok(false);
        };

        let size = end - start;
        let data = reader.read_wram(start, size).await?;
        if data.len() != size as usize {
            return Err(AutosplitError::ReadSizeMismatch {
                address: crate::WRAM_BASE_ADDRESS + start,
                expected: size,
                actual: data.len(),
            });
        }

        let mut all = true;
        for (index, check) in checks.iter().enumerate() {
            let at = (check.address - start) as usize;
            let current = &data[at..at + check.size() as usize];
            let key = CheckKey::new(id, index);
            let outcome = check_outcome(check, current, self.snapshot.previous(key));
            self.snapshot.store(key, current);
            if self.debug {
                log::info!(
                    "split[{}] {:#06X} = {}/{} {} == {} (delta={:?}, prev={:?})",
                    arena.path(id),
                    check.address,
                    outcome.current,
                    operand_text(check),
                    check.operator,
                    outcome.result,
                    outcome.delta,
                    outcome.previous
                );
            }
            all &= outcome.result;
        }
        Ok(all)
    }

    /// Evaluates the current step of leaf `id` and applies the sequential rule.
    ///
    /// The step is the base leaf while progress is 0, otherwise `next[progress - 1]`.
    /// Its `more` leaves must hold too, checked in order until one fails. When
    /// the step holds and `next` steps remain, progress advances and `false` is
    /// returned; after the last step progress goes back to 0 and the whole split
    /// reports `true`. Failing ticks leave progress untouched.
    pub async fn evaluate_step<R: MemoryReader>(
        &mut self,
        reader: &R,
        arena: &SplitArena,
        id: SplitId,
    ) -> Result<bool, AutosplitError> {
        let NodeKind::Leaf { next, .. } = &arena.get(id).kind else {
            return Ok(false);
        };

        let mut step = self.progress.get(id);
        if step > next.len() {
            step = 0;
            self.progress.set(id, 0);
        }
        let target = if step == 0 { id } else { next[step - 1] };

        let mut ok = self.evaluate_split(reader, arena, target).await?;
        if ok {
            for &more in arena.more(target) {
                if !self.evaluate_split(reader, arena, more).await? {
                    ok = false;
                    break;
                }
            }
        }

        if ok && !next.is_empty() {
            if step < next.len() {
                log::debug!(
                    "split[{}] step {} of {} done",
                    arena.path(id),
                    step + 1,
                    next.len() + 1
                );
                self.progress.set(id, step + 1);
                return Ok(false);
            }
            self.progress.set(id, 0);
        }
        Ok(ok)
    }
}

fn operand_text(check: &Check) -> String {
    match (check.value, check.old_value) {
        (Some(v), Some(o)) => format!("{}|old {}", v, o),
        (Some(v), None) => v.to_string(),
        (None, Some(o)) => format!("old {}", o),
        (None, None) => "-".to_string(),
    }
}
