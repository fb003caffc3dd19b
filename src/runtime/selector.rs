//! Next-operation selection: manual choice, priority filtering, seeded random
//! choice among equals, and playback forcing of external steps.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};

use crate::{Machine, Operation, Playback};

/// Priority given to operations whose event is not defined by the machine.
pub const UNRESOLVED_PRIORITY: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    External,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: OperationKind,
    pub priority: i64,
}

impl Classification {
    pub fn is_external(&self) -> bool {
        self.kind == OperationKind::External
    }
}

pub fn classify(operation: &Operation, machine: &Machine) -> Classification {
    // Unresolved events rank as internal and highest precedence.
    match machine.find_event(&operation.name) {
        Some(event) => Classification {
            kind: if event.is_external() {
                OperationKind::External
            } else {
                OperationKind::Internal
            },
            priority: event.priority(),
        },
        None => Classification {
            kind: OperationKind::Internal,
            priority: UNRESOLVED_PRIORITY,
        },
    }
}

/// The candidates sharing the minimum priority value, in input order.
pub fn prioritise(candidates: &[Operation], machine: &Machine) -> Vec<Operation> {
    let mut filtered = Vec::new();
    let mut current = i64::MAX;
    for op in candidates {
        let priority = classify(op, machine).priority;
        if priority > current {
            continue;
        }
        if priority < current {
            filtered.clear();
            current = priority;
        }
        filtered.push(op.clone());
    }
    filtered
}

#[derive(Debug)]
pub struct OperationSelector {
    seed: u64,
    rng: ChaCha20Rng,
}

impl OperationSelector {
    pub fn new(seed: u64) -> Self {
        let seed_bytes = blake3::hash(&seed.to_le_bytes()).as_bytes().to_owned();
        let mut seed32 = [0u8; 32];
        seed32.copy_from_slice(&seed_bytes[..32]);
        Self {
            seed,
            rng: ChaCha20Rng::from_seed(seed32),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn pick_from(&mut self, ops: &[Operation]) -> Option<Operation> {
        if ops.is_empty() {
            return None;
        }
        let idx = self.uniform_index(ops.len());
        ops.get(idx).cloned()
    }

    /// Uniform draw from `0..len` (len > 0); draws below 2^64 mod len are rejected.
    fn uniform_index(&mut self, len: usize) -> usize {
        let len = len as u64;
        let threshold = len.wrapping_neg() % len;
        loop {
            let v = self.rng.next_u64();
            if v >= threshold {
                return (v % len) as usize;
            }
        }
    }

    /// `playback` should only be passed while it still has steps to match.
    pub fn pick_next(
        &mut self,
        manual: Option<&Operation>,
        enabled: &[Operation],
        machine: &Machine,
        playback: Option<&Playback>,
    ) -> Option<Operation> {
        let chosen = match manual {
            Some(op) if enabled.iter().any(|e| e.signature() == op.signature()) => Some(op.clone()),
            _ => self.pick_from(&prioritise(enabled, machine)),
        }?;

        match playback {
            Some(cursor) if classify(&chosen, machine).is_external() => cursor.next_operation(),
            _ => Some(chosen),
        }
    }
}

pub fn gen_seed() -> u64 {
    let mut seed = [0u8; 8];
    rand_core::OsRng.fill_bytes(&mut seed);
    u64::from_le_bytes(seed)
}
