//! Operations, states and animation history as reported by the animator.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier -> value for every observable variable at one point in time.
pub type State = BTreeMap<String, String>;

/// A proposed or executed transition. Equality and hashing go through
/// [`Operation::signature`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// `name` for nullary operations, `name(a,b)` otherwise.
    pub fn signature(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else {
            format!("{}({})", self.name, self.args.join(","))
        }
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.signature() == other.signature()
    }
}

impl Eq for Operation {}

impl Hash for Operation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signature().hash(state);
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryItem {
    pub operation: Option<Operation>,
    #[serde(default)]
    pub state: State,
}

impl HistoryItem {
    pub fn root() -> Self {
        Self {
            operation: None,
            state: State::new(),
        }
    }
}
