//! Machine metadata (event classification, priorities, private identifiers)
//! and the optional scripted behaviour consumed by [`crate::ScriptedAnimator`].

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use crate::{ScenarioError, ScenarioResult, State};

/// Identity of the model a controller is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelHandle(String);

impl ModelHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    #[serde(default)]
    pub events: Vec<EventDef>,
    #[serde(default)]
    pub private: BTreeSet<String>,
    /// Values established by the setup operation.
    #[serde(default)]
    pub constants: BTreeMap<String, String>,
    /// Values established by the initialisation operation.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDef {
    pub name: String,
    #[serde(default)]
    pub external: bool,
    /// Lower value = higher precedence.
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub guards: Vec<Guard>,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// One enabled operation per argument tuple; empty means a single nullary operation.
    #[serde(default)]
    pub args: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Guard {
    Equals { var: String, value: String },
    NotEquals { var: String, value: String },
    Below { var: String, bound: i64 },
    Above { var: String, bound: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Set { var: String, value: String },
    Add { var: String, delta: i64 },
    SetArg { var: String, index: usize },
}

impl Machine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
            private: BTreeSet::new(),
            constants: BTreeMap::new(),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_event(mut self, event: EventDef) -> Self {
        self.events.push(event);
        self
    }

    pub fn load(path: &Path) -> ScenarioResult<Self> {
        let bytes = std::fs::read(path)?;
        let machine: Machine = serde_json::from_slice(&bytes).map_err(|err| {
            ScenarioError::Model(format!(
                "failed to parse model {}: {err}. expected {{name,events:[{{name,external?,priority?,guards?,actions?,args?}}],private?,constants?,variables?}}",
                path.display()
            ))
        })?;
        machine.validate()?;
        Ok(machine)
    }

    pub fn validate(&self) -> ScenarioResult<()> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::Model("machine name must not be empty".to_string()));
        }
        let mut seen = BTreeSet::new();
        for event in &self.events {
            if !seen.insert(event.name.as_str()) {
                return Err(ScenarioError::Model(format!(
                    "duplicate event {:?} in machine {}",
                    event.name, self.name
                )));
            }
        }
        Ok(())
    }

    pub fn find_event(&self, name: &str) -> Option<&EventDef> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn is_private(&self, identifier: &str) -> bool {
        self.private.contains(identifier)
    }
}

impl EventDef {
    pub fn new(name: impl Into<String>, external: bool, priority: i64) -> Self {
        Self {
            name: name.into(),
            external,
            priority,
            guards: Vec::new(),
            actions: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn is_enabled(&self, state: &State) -> bool {
        self.guards.iter().all(|g| g.holds(state))
    }
}

impl Guard {
    pub fn holds(&self, state: &State) -> bool {
        match self {
            Self::Equals { var, value } => state.get(var) == Some(value),
            Self::NotEquals { var, value } => state.get(var) != Some(value),
            Self::Below { var, bound } => numeric(state, var).is_some_and(|v| v < *bound),
            Self::Above { var, bound } => numeric(state, var).is_some_and(|v| v > *bound),
        }
    }
}

impl Action {
    pub fn apply(&self, state: &mut State, args: &[String]) {
        match self {
            Self::Set { var, value } => {
                state.insert(var.clone(), value.clone());
            }
            Self::Add { var, delta } => match numeric(state, var) {
                Some(v) => {
                    state.insert(var.clone(), v.saturating_add(*delta).to_string());
                }
                None => tracing::warn!(var = %var, "add action on non-numeric variable skipped"),
            },
            Self::SetArg { var, index } => match args.get(*index) {
                Some(arg) => {
                    state.insert(var.clone(), arg.clone());
                }
                None => tracing::warn!(var = %var, index, "set_arg action without argument skipped"),
            },
        }
    }
}

fn numeric(state: &State, var: &str) -> Option<i64> {
    state.get(var).and_then(|v| v.trim().parse::<i64>().ok())
}
