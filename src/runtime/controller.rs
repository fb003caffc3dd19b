//! Scenario checker: drives an animator in recording or playback mode.
//!
//! Recording explores nondeterministically (manual selection, then a seeded
//! random choice among the highest-priority enabled operations). Playback
//! forces every external step to match the recorded run while internal
//! operations keep firing live, and compares live state with the recorded
//! snapshots.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

use crate::{
    Animator, Clock, Config, Machine, Mode, ModelHandle, Operation, OperationSelector, OracleStore,
    Playback, ScenarioError, ScenarioResult, ScenarioView, ValueComparison, ViewId, ViewRegistry,
    classify, gen_seed, make_run,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    InSetup,
    NoProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerMode {
    Uninitialised,
    Recording,
    Playback,
}

/// A recorded value the live state disagreed with at the end of a big step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    pub clock: u64,
    pub identifier: String,
    pub live: Option<String>,
    pub expected: String,
}

#[derive(Debug, Clone)]
pub struct CheckerOptions {
    pub recording_name: String,
    pub setup_operation: String,
    pub initialisation_operation: String,
    pub internal_chain_limit: usize,
    pub idle_big_step_limit: usize,
}

impl From<&Config> for CheckerOptions {
    fn from(config: &Config) -> Self {
        Self {
            recording_name: config.recording_name.clone(),
            setup_operation: config.setup_operation.clone(),
            initialisation_operation: config.initialisation_operation.clone(),
            internal_chain_limit: config.internal_chain_limit.max(1),
            idle_big_step_limit: config.idle_big_step_limit,
        }
    }
}

#[derive(Debug, Clone)]
struct Session {
    handle: ModelHandle,
    machine: Machine,
}

pub struct ScenarioChecker<A, S> {
    options: CheckerOptions,
    animator: A,
    store: S,
    views: ViewRegistry,
    session: Option<Session>,
    clock: Clock,
    selector: OperationSelector,
    manual: Option<Operation>,
    enabled: Vec<Operation>,
    dirty: bool,
    playback: Option<Playback>,
    /// Live state is checked against the cursor's snapshots. Stays set past
    /// the last recorded step until a big step starts outside playback.
    comparing: bool,
    last_comparison: Vec<ValueComparison>,
    divergences: Vec<Divergence>,
}

impl<A: Animator, S: OracleStore> ScenarioChecker<A, S> {
    pub fn new(config: &Config, animator: A, store: S) -> Self {
        let seed = config.seed.unwrap_or_else(gen_seed);
        Self {
            options: CheckerOptions::from(config),
            animator,
            store,
            views: ViewRegistry::default(),
            session: None,
            clock: Clock::default(),
            selector: OperationSelector::new(seed),
            manual: None,
            enabled: Vec::new(),
            dirty: false,
            playback: None,
            comparing: false,
            last_comparison: Vec::new(),
            divergences: Vec::new(),
        }
    }

    pub fn add_view(&mut self, view: Box<dyn ScenarioView>) -> ViewId {
        self.views.add(view)
    }

    pub fn remove_view(&mut self, id: ViewId) -> Option<Box<dyn ScenarioView>> {
        self.views.remove(id)
    }

    /// True when some registered view is ready to show the scenario.
    pub fn is_open(&self) -> bool {
        self.views.any_ready()
    }

    pub fn mode(&self) -> CheckerMode {
        if self.session.is_none() {
            CheckerMode::Uninitialised
        } else if self.is_playback() {
            CheckerMode::Playback
        } else {
            CheckerMode::Recording
        }
    }

    /// A playback cursor exists and still has recorded steps to match.
    pub fn is_playback(&self) -> bool {
        self.playback.as_ref().is_some_and(Playback::is_active)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    pub fn seed(&self) -> u64 {
        self.selector.seed()
    }

    pub fn handle(&self) -> Option<&ModelHandle> {
        self.session.as_ref().map(|s| &s.handle)
    }

    pub fn machine(&self) -> Option<&Machine> {
        self.session.as_ref().map(|s| &s.machine)
    }

    pub fn playback(&self) -> Option<&Playback> {
        self.playback.as_ref()
    }

    pub fn enabled_operations(&self) -> &[Operation] {
        &self.enabled
    }

    pub fn last_comparison(&self) -> &[ValueComparison] {
        &self.last_comparison
    }

    pub fn divergences(&self) -> &[Divergence] {
        &self.divergences
    }

    pub fn animator(&self) -> &A {
        &self.animator
    }

    pub fn animator_mut(&mut self) -> &mut A {
        &mut self.animator
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn initialise(&mut self, handle: ModelHandle, machine: Machine) -> ScenarioResult<()> {
        machine.validate()?;
        self.store.initialise(&self.options.recording_name, &machine)?;
        tracing::info!(model = %handle, machine = %machine.name, seed = self.seed(), "initialising scenario");
        self.session = Some(Session {
            handle: handle.clone(),
            machine,
        });
        self.playback = None;
        self.manual = None;
        self.views.notify(|v| v.start());
        self.restart(&handle);
        self.current_state_changed(&handle);
        Ok(())
    }

    /// Starts the scenario over without changing mode. Only an active playback
    /// is rewound; an exhausted one stays exhausted.
    pub fn restart(&mut self, handle: &ModelHandle) {
        if !self.is_current(handle) {
            tracing::debug!(model = %handle, "ignoring restart for inactive model");
            return;
        }
        if self.is_playback()
            && let Some(cursor) = self.playback.as_mut()
        {
            cursor.reset();
        }
        self.comparing = self.is_playback();
        self.clock.reset();
        self.divergences.clear();
        self.update_mode_indicator();
        self.set_dirty(false);
        if self.in_setup() {
            self.run_setup();
        }
    }

    pub fn stop(&mut self, handle: &ModelHandle) {
        if !self.is_current(handle) {
            tracing::debug!(model = %handle, "ignoring stop for inactive model");
            return;
        }
        self.views.notify(|v| v.stop());
        self.session = None;
        self.clock.reset();
        self.manual = None;
        self.playback = None;
        self.comparing = false;
        self.enabled.clear();
        self.last_comparison.clear();
        self.divergences.clear();
        self.set_dirty(false);
        tracing::info!(model = %handle, "scenario stopped");
    }

    /// Makes `signature` the sticky manual choice if it is currently enabled.
    pub fn select_operation(&mut self, signature: &str, fire_now: bool) -> bool {
        let Some(handle) = self.handle().cloned() else {
            return false;
        };
        let Some(op) = self
            .animator
            .enabled_operations(&handle)
            .into_iter()
            .find(|op| op.signature() == signature)
        else {
            tracing::debug!(signature, "selected operation is not enabled");
            return false;
        };
        self.manual = Some(op);
        if fire_now {
            self.big_step();
        }
        true
    }

    pub fn clear_selection(&mut self) {
        self.manual = None;
    }

    /// Fires one operation, then keeps firing internal operations until an
    /// external one is next or an internal one would repeat.
    pub fn big_step(&mut self) -> bool {
        if self.in_setup() {
            return false;
        }
        self.leave_exhausted_playback();
        let first = self.pick_next_operation();
        let mut progress = self.execute_operation(first, false);

        let mut visited = BTreeSet::new();
        while progress && visited.len() < self.options.internal_chain_limit {
            let Some(op) = self.pick_next_operation() else {
                break;
            };
            if self.is_external(&op) || !visited.insert(op.signature()) {
                break;
            }
            progress = self.execute_operation(Some(op), false);
        }

        self.record_divergences();
        self.update_mode_indicator();
        progress
    }

    pub fn single_step(&mut self) -> bool {
        self.leave_exhausted_playback();
        let op = self.pick_next_operation();
        let progress = self.execute_operation(op, false);
        self.update_mode_indicator();
        progress
    }

    pub fn run_for_ticks(&mut self, ticks: u64) -> RunOutcome {
        if self.in_setup() {
            return RunOutcome::InSetup;
        }
        let end = self.clock.value().saturating_add(ticks);
        let mut idle = 0usize;
        while self.clock.value() < end {
            let before = self.clock.value();
            if !self.big_step() {
                tracing::info!(clock = self.clock.value(), target = end, "run terminated due to lack of progress");
                return RunOutcome::NoProgress;
            }
            if self.clock.value() == before {
                idle += 1;
                if idle > self.options.idle_big_step_limit {
                    tracing::info!(clock = before, idle, "run terminated: big steps no longer advance the clock");
                    return RunOutcome::NoProgress;
                }
            } else {
                idle = 0;
            }
        }
        RunOutcome::Completed
    }

    /// Restarts the animation; an active playback starts again from its first step.
    pub fn restart_pressed(&mut self) {
        if let Some(handle) = self.handle().cloned() {
            self.restart_animation(&handle);
        }
    }

    /// Saves the animation history as the recorded run. A failed save leaves
    /// the scenario dirty.
    pub fn save_pressed(&mut self) -> ScenarioResult<()> {
        let Some(session) = self.session.as_ref() else {
            return Err(ScenarioError::InvalidArgument("no scenario is active".to_string()));
        };
        let history = self.animator.history(&session.handle);
        let run = make_run(
            &self.options.recording_name,
            &history,
            &session.machine,
            &self.options.setup_operation,
        );
        if let Err(err) = self.store.save(&run) {
            tracing::warn!("saving scenario failed: {err}");
            return Err(err);
        }
        self.set_dirty(false);
        Ok(())
    }

    /// Enters playback of the stored run, or rewinds the current playback.
    pub fn replay_pressed(&mut self) -> ScenarioResult<()> {
        let Some(session) = self.session.as_ref() else {
            return Err(ScenarioError::InvalidArgument("no scenario is active".to_string()));
        };
        let handle = session.handle.clone();
        if let Some(cursor) = self.playback.as_mut() {
            cursor.reset();
        } else {
            let run = self
                .store
                .load_existing_run(&self.options.recording_name, &session.machine)?
                .ok_or_else(|| {
                    ScenarioError::Oracle(format!(
                        "no recorded run {:?} for machine {}",
                        self.options.recording_name, session.machine.name
                    ))
                })?;
            tracing::info!(run = %run.name, steps = run.step_count(), "entering playback");
            self.playback = Some(Playback::new(run.entries));
        }
        self.restart_animation(&handle);
        Ok(())
    }

    /// Leaves playback; recording continues from the current state.
    pub fn stop_playback_pressed(&mut self) {
        self.comparing = false;
        if self.playback.take().is_some() {
            tracing::info!(clock = self.clock.value(), "playback stopped; recording");
        }
        self.update_mode_indicator();
    }

    /// Refreshes views from the animator. Called after every transition.
    pub fn current_state_changed(&mut self, handle: &ModelHandle) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if &session.handle != handle {
            tracing::debug!(model = %handle, "ignoring state change for inactive model");
            return;
        }

        let state = self.animator.current_state(handle);
        let expected = self
            .playback
            .as_ref()
            .filter(|_| self.comparing)
            .and_then(Playback::expected_snapshot);
        let rows: Vec<ValueComparison> = match expected {
            Some(snapshot) => snapshot
                .values
                .iter()
                .map(|(id, expected)| ValueComparison {
                    identifier: id.clone(),
                    live: state.get(id).cloned(),
                    expected: Some(expected.clone()),
                })
                .collect(),
            None => state
                .iter()
                .map(|(id, value)| ValueComparison {
                    identifier: id.clone(),
                    live: Some(value.clone()),
                    expected: None,
                })
                .collect(),
        };
        self.views.notify(|v| v.update_state(&rows));

        let enabled = self.animator.enabled_operations(handle);
        let external: Vec<&Operation> = enabled
            .iter()
            .filter(|op| classify(op, &session.machine).is_external())
            .collect();
        let signatures: Vec<String> = external.iter().map(|op| op.signature()).collect();
        let selected = self
            .playback
            .as_ref()
            .and_then(Playback::next_operation)
            .and_then(|next| external.iter().position(|op| **op == next));
        self.views
            .notify(|v| v.update_enabled_operations(&signatures, selected));

        self.last_comparison = rows;
        self.enabled = enabled;
    }

    fn is_current(&self, handle: &ModelHandle) -> bool {
        self.handle().is_some_and(|h| h == handle)
    }

    fn restart_animation(&mut self, handle: &ModelHandle) {
        self.animator.restart_animation(handle);
        self.restart(handle);
        self.current_state_changed(handle);
    }

    fn pick_next_operation(&mut self) -> Option<Operation> {
        let session = self.session.as_ref()?;
        let enabled = self.animator.enabled_operations(&session.handle);
        let playback = self.playback.as_ref().filter(|p| p.is_active());
        self.selector
            .pick_next(self.manual.as_ref(), &enabled, &session.machine, playback)
    }

    fn is_external(&self, op: &Operation) -> bool {
        self.machine()
            .is_some_and(|m| classify(op, m).is_external())
    }

    fn in_setup(&self) -> bool {
        self.handle().is_some_and(|h| {
            self.animator
                .enabled_operations(h)
                .iter()
                .any(|op| op.name == self.options.setup_operation)
        })
    }

    fn run_setup(&mut self) -> bool {
        let Some(handle) = self.handle().cloned() else {
            return false;
        };
        let setup: Vec<Operation> = self
            .animator
            .enabled_operations(&handle)
            .into_iter()
            .filter(|op| op.name == self.options.setup_operation)
            .collect();
        let mut ran = false;
        for op in setup {
            if let Some(cursor) = self.playback.as_mut()
                && cursor
                    .next_step()
                    .is_some_and(|s| s.name == self.options.setup_operation)
            {
                cursor.consume_step();
            }
            self.execute_operation(Some(op), false);
            ran = true;
        }
        ran
    }

    /// Bookkeeping (dirty flag, cursor, clock) happens before the animator
    /// runs the transition so the refresh that follows sees it.
    fn execute_operation(&mut self, operation: Option<Operation>, silent: bool) -> bool {
        let Some(operation) = operation else {
            return false;
        };
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        let handle = session.handle.clone();
        let external = classify(&operation, &session.machine).is_external();
        tracing::debug!(operation = %operation, external, clock = self.clock.value(), "executing operation");

        if !self.is_playback()
            && operation.name != self.options.setup_operation
            && operation.name != self.options.initialisation_operation
        {
            self.set_dirty(true);
        }

        if let Some(cursor) = self.playback.as_mut()
            && cursor.next_operation().as_ref() == Some(&operation)
        {
            cursor.consume_step();
        }

        if external {
            self.clock.increment();
        }

        self.animator.execute(&handle, &operation, silent);
        self.current_state_changed(&handle);
        true
    }

    fn record_divergences(&mut self) {
        if !self.comparing {
            return;
        }
        let clock = self.clock.value();
        for row in self.last_comparison.iter().filter(|r| r.is_divergent()) {
            let Some(expected) = row.expected.clone() else {
                continue;
            };
            if self
                .divergences
                .iter()
                .any(|d| d.clock == clock && d.identifier == row.identifier)
            {
                continue;
            }
            tracing::warn!(
                clock,
                identifier = %row.identifier,
                live = row.live.as_deref().unwrap_or("<missing>"),
                expected = %expected,
                "playback diverged from recorded run"
            );
            self.divergences.push(Divergence {
                clock,
                identifier: row.identifier.clone(),
                live: row.live.clone(),
                expected,
            });
        }
    }

    /// Steps taken after the recorded run is used up are recording again.
    fn leave_exhausted_playback(&mut self) {
        if self.comparing && !self.is_playback() {
            tracing::debug!(
                clock = self.clock.value(),
                "recorded run exhausted; no longer comparing"
            );
            self.comparing = false;
        }
    }

    fn update_mode_indicator(&mut self) {
        let mode = if self.is_playback() {
            Mode::Playback
        } else {
            Mode::Recording
        };
        self.views.notify(|v| v.update_mode_indicator(mode));
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
        self.views.notify(|v| v.update_dirty_status(dirty));
    }
}
