//! Execution engine boundary and a scripted in-memory engine.

use crate::{HistoryItem, Machine, ModelHandle, Operation, State};

/// The state-transition engine driven by the scenario checker.
///
/// The checker owns its animator and refreshes its views right after every
/// `execute` and `restart_animation` call, so implementations never call back
/// into the checker themselves.
pub trait Animator {
    fn enabled_operations(&self, model: &ModelHandle) -> Vec<Operation>;

    fn execute(&mut self, model: &ModelHandle, operation: &Operation, silent: bool);

    fn current_state(&self, model: &ModelHandle) -> State;

    fn history(&self, model: &ModelHandle) -> Vec<HistoryItem>;

    fn restart_animation(&mut self, model: &ModelHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Setup,
    Initialisation,
    Running,
}

/// Deterministic engine over the scripted parts of a [`Machine`]: constants
/// come from the setup operation, variables from the initialisation
/// operation, and events fire when all their guards hold.
#[derive(Debug, Clone)]
pub struct ScriptedAnimator {
    handle: ModelHandle,
    machine: Machine,
    setup_operation: String,
    initialisation_operation: String,
    phase: Phase,
    state: State,
    history: Vec<HistoryItem>,
}

impl ScriptedAnimator {
    pub fn new(
        handle: ModelHandle,
        machine: Machine,
        setup_operation: impl Into<String>,
        initialisation_operation: impl Into<String>,
    ) -> Self {
        let mut animator = Self {
            handle,
            machine,
            setup_operation: setup_operation.into(),
            initialisation_operation: initialisation_operation.into(),
            phase: Phase::Setup,
            state: State::new(),
            history: Vec::new(),
        };
        animator.reset();
        animator
    }

    fn reset(&mut self) {
        self.phase = if self.machine.constants.is_empty() {
            Phase::Initialisation
        } else {
            Phase::Setup
        };
        self.state = State::new();
        self.history = vec![HistoryItem::root()];
    }

    fn enabled(&self) -> Vec<Operation> {
        match self.phase {
            Phase::Setup => vec![Operation::named(self.setup_operation.clone())],
            Phase::Initialisation => vec![Operation::named(self.initialisation_operation.clone())],
            Phase::Running => {
                let mut out = Vec::new();
                for event in &self.machine.events {
                    if !event.is_enabled(&self.state) {
                        continue;
                    }
                    if event.args.is_empty() {
                        out.push(Operation::named(event.name.clone()));
                    } else {
                        out.extend(
                            event
                                .args
                                .iter()
                                .map(|args| Operation::new(event.name.clone(), args.clone())),
                        );
                    }
                }
                out
            }
        }
    }
}

impl Animator for ScriptedAnimator {
    fn enabled_operations(&self, model: &ModelHandle) -> Vec<Operation> {
        if model != &self.handle {
            return Vec::new();
        }
        self.enabled()
    }

    fn execute(&mut self, model: &ModelHandle, operation: &Operation, silent: bool) {
        if model != &self.handle {
            return;
        }
        if !self.enabled().contains(operation) {
            tracing::warn!(operation = %operation, "operation is not enabled; state unchanged");
            return;
        }
        match self.phase {
            Phase::Setup => {
                self.state
                    .extend(self.machine.constants.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.phase = Phase::Initialisation;
            }
            Phase::Initialisation => {
                self.state
                    .extend(self.machine.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.phase = Phase::Running;
            }
            Phase::Running => {
                if let Some(event) = self.machine.find_event(&operation.name) {
                    for action in &event.actions {
                        action.apply(&mut self.state, &operation.args);
                    }
                }
            }
        }
        if !silent {
            tracing::trace!(operation = %operation, "animator executed operation");
        }
        self.history.push(HistoryItem {
            operation: Some(operation.clone()),
            state: self.state.clone(),
        });
    }

    fn current_state(&self, model: &ModelHandle) -> State {
        if model != &self.handle {
            return State::new();
        }
        self.state.clone()
    }

    fn history(&self, model: &ModelHandle) -> Vec<HistoryItem> {
        if model != &self.handle {
            return Vec::new();
        }
        self.history.clone()
    }

    fn restart_animation(&mut self, model: &ModelHandle) {
        if model == &self.handle {
            self.reset();
        }
    }
}
