//! Recorded runs: alternating step and snapshot entries.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use crate::{Operation, ScenarioError, ScenarioResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Run {
    pub name: String,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    Step(Step),
    Snapshot(Snapshot),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub machine: String,
    pub clock: String,
}

/// Values that changed since each identifier was last recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub machine: String,
    pub clock: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Always true for now; reserved for marking failed checks.
    pub result: bool,
}

impl Run {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.entries.iter().filter_map(Entry::as_step)
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter().filter_map(Entry::as_snapshot)
    }

    pub fn step_count(&self) -> usize {
        self.steps().count()
    }

    /// Structural check: (Step, Snapshot) pairs with matching, contiguous clock stamps.
    pub fn validate(&self) -> ScenarioResult<()> {
        if self.entries.len() % 2 != 0 {
            return Err(ScenarioError::Oracle(format!(
                "run {:?} has {} entries; expected step/snapshot pairs",
                self.name,
                self.entries.len()
            )));
        }
        for (idx, pair) in self.entries.chunks(2).enumerate() {
            let (Entry::Step(step), Entry::Snapshot(snapshot)) = (&pair[0], &pair[1]) else {
                return Err(ScenarioError::Oracle(format!(
                    "run {:?} pair {idx} is not a step followed by a snapshot",
                    self.name
                )));
            };
            let expected = idx.to_string();
            if step.clock != expected || snapshot.clock != expected {
                return Err(ScenarioError::Oracle(format!(
                    "run {:?} pair {idx} has clock step={} snapshot={} (expected {expected})",
                    self.name, step.clock, snapshot.clock
                )));
            }
            if step.machine != snapshot.machine {
                return Err(ScenarioError::Oracle(format!(
                    "run {:?} pair {idx} mixes machines {} and {}",
                    self.name, step.machine, snapshot.machine
                )));
            }
        }
        Ok(())
    }
}

impl Entry {
    pub fn as_step(&self) -> Option<&Step> {
        match self {
            Self::Step(step) => Some(step),
            Self::Snapshot(_) => None,
        }
    }

    pub fn as_snapshot(&self) -> Option<&Snapshot> {
        match self {
            Self::Snapshot(snapshot) => Some(snapshot),
            Self::Step(_) => None,
        }
    }
}

impl Step {
    pub fn from_operation(op: &Operation, machine: &str, clock: String) -> Self {
        Self {
            name: op.name.clone(),
            args: op.args.clone(),
            machine: machine.to_string(),
            clock,
        }
    }

    pub fn to_operation(&self) -> Operation {
        Operation::new(self.name.clone(), self.args.clone())
    }
}

impl Snapshot {
    pub fn new(machine: &str, clock: String) -> Self {
        Self {
            machine: machine.to_string(),
            clock,
            values: BTreeMap::new(),
            result: true,
        }
    }
}
