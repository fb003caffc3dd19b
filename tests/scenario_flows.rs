use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use scenario_checker::{
    Action, Animator, CheckerMode, Config, Entry, EventDef, Guard, Machine, MemoryOracleStore,
    Mode, ModelHandle, RunOutcome, ScenarioChecker, ScenarioError, ScenarioView, ScriptedAnimator,
    ValueComparison,
};

type Checker = ScenarioChecker<ScriptedAnimator, MemoryOracleStore>;

fn counter() -> Machine {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("counter.model.json");
    Machine::load(&path).expect("load counter model")
}

fn lamp() -> Machine {
    let mut m = Machine::new("lamp")
        .with_event(
            EventDef::new("press", true, 0)
                .with_guard(Guard::Equals { var: "on".to_string(), value: "FALSE".to_string() })
                .with_action(Action::Set { var: "on".to_string(), value: "TRUE".to_string() }),
        )
        .with_event(
            EventDef::new("release", true, 0)
                .with_guard(Guard::Equals { var: "on".to_string(), value: "TRUE".to_string() })
                .with_action(Action::Set { var: "on".to_string(), value: "FALSE".to_string() }),
        )
        .with_event(EventDef::new("hum", false, 5));
    m.variables.insert("on".to_string(), "FALSE".to_string());
    m
}

fn checker(machine: Machine, store: MemoryOracleStore, seed: u64) -> (Checker, ModelHandle) {
    let config = Config {
        seed: Some(seed),
        ..Config::default()
    };
    let handle = ModelHandle::new(format!("{}.model.json", machine.name));
    let animator = ScriptedAnimator::new(
        handle.clone(),
        machine,
        config.setup_operation.as_str(),
        config.initialisation_operation.as_str(),
    );
    (ScenarioChecker::new(&config, animator, store), handle)
}

fn started(machine: Machine, store: MemoryOracleStore, seed: u64) -> (Checker, ModelHandle) {
    let (mut c, h) = checker(machine.clone(), store, seed);
    c.initialise(h.clone(), machine).expect("initialise");
    (c, h)
}

fn history_names(c: &Checker, h: &ModelHandle) -> Vec<String> {
    c.animator()
        .history(h)
        .into_iter()
        .filter_map(|item| item.operation.map(|op| op.signature()))
        .collect()
}

#[derive(Default)]
struct Seen {
    started: usize,
    stopped: usize,
    rows: Vec<ValueComparison>,
    enabled: Vec<(Vec<String>, Option<usize>)>,
    modes: Vec<Mode>,
    dirty: Vec<bool>,
}

struct RecordingView(Rc<RefCell<Seen>>);

impl ScenarioView for RecordingView {
    fn start(&mut self) {
        self.0.borrow_mut().started += 1;
    }

    fn stop(&mut self) {
        self.0.borrow_mut().stopped += 1;
    }

    fn update_state(&mut self, rows: &[ValueComparison]) {
        self.0.borrow_mut().rows = rows.to_vec();
    }

    fn update_enabled_operations(&mut self, signatures: &[String], selected: Option<usize>) {
        self.0
            .borrow_mut()
            .enabled
            .push((signatures.to_vec(), selected));
    }

    fn update_mode_indicator(&mut self, mode: Mode) {
        self.0.borrow_mut().modes.push(mode);
    }

    fn update_dirty_status(&mut self, dirty: bool) {
        self.0.borrow_mut().dirty.push(dirty);
    }
}

#[test]
fn clock_counts_external_operations_only() {
    let (mut c, h) = started(counter(), MemoryOracleStore::default(), 21);
    assert_eq!(c.clock(), 0);
    assert_eq!(c.run_for_ticks(5), RunOutcome::Completed);
    assert_eq!(c.clock(), 5);

    let externals = history_names(&c, &h)
        .into_iter()
        .filter(|name| name == "inc" || name == "reset")
        .count();
    assert_eq!(externals, 5);
}

#[test]
fn run_stops_when_no_operation_is_enabled() {
    let mut machine = Machine::new("c").with_event(
        EventDef::new("go", true, 0)
            .with_guard(Guard::Below { var: "x".to_string(), bound: 1 })
            .with_action(Action::Add { var: "x".to_string(), delta: 1 }),
    );
    machine.variables.insert("x".to_string(), "0".to_string());
    let (mut c, h) = started(machine, MemoryOracleStore::default(), 1);

    assert_eq!(c.run_for_ticks(3), RunOutcome::NoProgress);
    assert_eq!(c.clock(), 1);
    assert_eq!(c.animator().current_state(&h).get("x").map(String::as_str), Some("1"));
}

#[test]
fn setup_runs_as_part_of_initialise() {
    let (c, h) = started(counter(), MemoryOracleStore::default(), 4);
    assert!(!c.is_dirty());
    assert!(history_names(&c, &h).contains(&"SETUP_CONTEXT".to_string()));
    assert_eq!(c.mode(), CheckerMode::Recording);
}

#[test]
fn dirty_flag_follows_unsaved_recording() {
    let (mut c, _h) = started(counter(), MemoryOracleStore::default(), 8);
    assert!(!c.is_dirty());

    assert!(c.big_step());
    assert!(!c.is_dirty(), "initialisation alone is not a recording");

    assert!(c.select_operation("inc", true));
    assert!(c.is_dirty());

    c.store_mut().set_read_only(true);
    let err = c.save_pressed().expect_err("read-only save fails");
    assert!(matches!(err, ScenarioError::Persistence(_)));
    assert!(c.is_dirty());

    c.store_mut().set_read_only(false);
    c.save_pressed().expect("save");
    assert!(!c.is_dirty());
    let run = c.store().run("counter", "Scenario").expect("saved run");
    assert_eq!(run.step_count(), 2);
    run.validate().expect("valid run");
}

#[test]
fn playback_forces_recorded_external_steps() {
    let (mut rec, h) = started(counter(), MemoryOracleStore::default(), 1);
    assert_eq!(rec.run_for_ticks(8), RunOutcome::Completed);
    rec.save_pressed().expect("save");
    let run = rec.store().run("counter", "Scenario").cloned().expect("run");
    let recorded: Vec<String> = run.steps().map(|s| s.to_operation().signature()).collect();

    let store = MemoryOracleStore::default().with_run("counter", run);
    let (mut c, h2) = started(counter(), store, 999);
    assert_eq!(h, h2);
    c.replay_pressed().expect("replay");
    assert!(c.is_playback());
    let remaining = c.playback().map(|p| p.remaining_steps()).expect("cursor") as u64;
    assert_eq!(c.run_for_ticks(remaining), RunOutcome::Completed);

    assert!(c.divergences().is_empty(), "{:?}", c.divergences());
    assert!(!c.is_playback());
    let replayed: Vec<String> = history_names(&c, &h2)
        .into_iter()
        .filter(|name| ["SETUP_CONTEXT", "inc", "reset"].contains(&name.as_str()))
        .collect();
    assert_eq!(replayed, recorded);
}

#[test]
fn changed_snapshot_is_reported_once() {
    let (mut rec, _h) = started(lamp(), MemoryOracleStore::default(), 3);
    assert_eq!(rec.run_for_ticks(2), RunOutcome::Completed);
    rec.save_pressed().expect("save");
    let mut run = rec.store().run("lamp", "Scenario").cloned().expect("run");
    if let Some(Entry::Snapshot(snapshot)) = run.entries.get_mut(1) {
        snapshot.values.insert("on".to_string(), "BROKEN".to_string());
    }

    let (mut c, _h) = started(lamp(), MemoryOracleStore::default().with_run("lamp", run), 3);
    c.replay_pressed().expect("replay");
    assert!(c.big_step());
    assert!(c.divergences().is_empty());
    assert!(c.big_step());
    assert_eq!(c.divergences().len(), 1);
    let d = &c.divergences()[0];
    assert_eq!(d.clock, 1);
    assert_eq!(d.identifier, "on");
    assert_eq!(d.live.as_deref(), Some("TRUE"));
    assert_eq!(d.expected, "BROKEN");
    assert!(c.last_comparison().iter().any(ValueComparison::is_divergent));

    assert!(c.big_step());
    assert_eq!(c.divergences().len(), 1);
    assert_eq!(c.clock(), 2);
}

#[test]
fn stopping_playback_then_replaying_starts_over() {
    let (mut rec, _h) = started(lamp(), MemoryOracleStore::default(), 3);
    rec.run_for_ticks(3);
    rec.save_pressed().expect("save");
    let run = rec.store().run("lamp", "Scenario").cloned().expect("run");

    let (mut c, h) = started(lamp(), MemoryOracleStore::default().with_run("lamp", run), 3);
    c.replay_pressed().expect("replay");
    c.run_for_ticks(2);
    assert_eq!(c.playback().map(|p| p.position()), Some(4));

    c.stop_playback_pressed();
    assert!(c.playback().is_none());
    assert_eq!(c.mode(), CheckerMode::Recording);
    assert_eq!(c.clock(), 2);

    c.replay_pressed().expect("replay again");
    assert_eq!(c.playback().map(|p| p.position()), Some(0));
    assert_eq!(c.clock(), 0);
    assert_eq!(c.mode(), CheckerMode::Playback);
    assert!(c.animator().current_state(&h).is_empty());

    c.run_for_ticks(1);
    c.replay_pressed().expect("rewind");
    assert_eq!(c.playback().map(|p| p.position()), Some(0));
}

#[test]
fn replay_without_recording_fails() {
    let (mut c, _h) = started(lamp(), MemoryOracleStore::default(), 3);
    let err = c.replay_pressed().expect_err("nothing recorded");
    assert!(matches!(err, ScenarioError::Oracle(_)));
    assert!(c.playback().is_none());
}

#[test]
fn commands_for_another_model_are_ignored() {
    let (mut c, h) = started(lamp(), MemoryOracleStore::default(), 3);
    c.run_for_ticks(2);
    let other = ModelHandle::new("other.model.json");

    c.restart(&other);
    assert_eq!(c.clock(), 2);
    c.stop(&other);
    assert_eq!(c.handle(), Some(&h));

    c.stop(&h);
    assert_eq!(c.mode(), CheckerMode::Uninitialised);
    assert_eq!(c.clock(), 0);
    assert!(!c.big_step());
    assert!(c.save_pressed().is_err());
}

#[test]
fn restart_pressed_clears_clock_and_dirty_flag() {
    let (mut c, h) = started(counter(), MemoryOracleStore::default(), 6);
    c.run_for_ticks(3);
    assert!(c.is_dirty());

    c.restart_pressed();
    assert_eq!(c.clock(), 0);
    assert!(!c.is_dirty());
    let state = c.animator().current_state(&h);
    assert_eq!(state.get("limit").map(String::as_str), Some("3"));
    assert!(state.get("count").is_none());
}

#[test]
fn views_see_external_operations_and_playback_selection() {
    let seen = Rc::new(RefCell::new(Seen::default()));
    let machine = lamp();
    let (mut c, h) = checker(machine.clone(), MemoryOracleStore::default(), 2);
    c.add_view(Box::new(RecordingView(Rc::clone(&seen))));
    assert!(c.is_open());
    c.initialise(h.clone(), machine).expect("initialise");
    assert_eq!(seen.borrow().started, 1);
    assert_eq!(seen.borrow().enabled.last(), Some(&(Vec::new(), None)));

    c.big_step();
    assert_eq!(
        seen.borrow().enabled.last(),
        Some(&(vec!["press".to_string()], None))
    );
    assert_eq!(seen.borrow().modes.last(), Some(&Mode::Recording));

    c.big_step();
    assert_eq!(seen.borrow().dirty.last(), Some(&true));
    let rows = seen.borrow().rows.clone();
    assert_eq!(
        rows,
        vec![ValueComparison {
            identifier: "on".to_string(),
            live: Some("TRUE".to_string()),
            expected: None,
        }]
    );

    c.save_pressed().expect("save");
    assert_eq!(seen.borrow().dirty.last(), Some(&false));

    c.replay_pressed().expect("replay");
    assert_eq!(seen.borrow().modes.last(), Some(&Mode::Playback));
    c.big_step();
    assert_eq!(
        seen.borrow().enabled.last(),
        Some(&(vec!["press".to_string()], Some(0)))
    );

    c.stop(&h);
    assert_eq!(seen.borrow().stopped, 1);
}

#[test]
fn single_step_fires_exactly_one_operation() {
    let (mut c, h) = started(lamp(), MemoryOracleStore::default(), 3);
    assert!(c.single_step());
    assert!(c.single_step());
    assert_eq!(history_names(&c, &h), vec!["INITIALISATION", "press"]);
    assert_eq!(c.clock(), 1);
}

fn ping_pong() -> Machine {
    let mut m = Machine::new("pingpong")
        .with_event(
            EventDef::new("ping", false, 0)
                .with_guard(Guard::Equals { var: "flag".to_string(), value: "A".to_string() })
                .with_action(Action::Set { var: "flag".to_string(), value: "B".to_string() }),
        )
        .with_event(
            EventDef::new("pong", false, 0)
                .with_guard(Guard::Equals { var: "flag".to_string(), value: "B".to_string() })
                .with_action(Action::Set { var: "flag".to_string(), value: "A".to_string() }),
        )
        .with_event(EventDef::new("go", true, 1));
    m.variables.insert("flag".to_string(), "A".to_string());
    m
}

#[test]
fn big_step_stops_when_an_internal_operation_repeats() {
    let (mut c, h) = started(ping_pong(), MemoryOracleStore::default(), 5);
    assert!(c.big_step());
    assert_eq!(history_names(&c, &h), vec!["INITIALISATION", "ping", "pong"]);
    assert_eq!(c.clock(), 0);
}

#[test]
fn run_gives_up_on_internal_only_cycles() {
    let machine = ping_pong();
    let config = Config {
        seed: Some(5),
        idle_big_step_limit: 2,
        ..Config::default()
    };
    let handle = ModelHandle::new("pingpong.model.json");
    let animator = ScriptedAnimator::new(
        handle.clone(),
        machine.clone(),
        config.setup_operation.as_str(),
        config.initialisation_operation.as_str(),
    );
    let mut c = ScenarioChecker::new(&config, animator, MemoryOracleStore::default());
    c.initialise(handle.clone(), machine).expect("initialise");

    assert_eq!(c.run_for_ticks(1), RunOutcome::NoProgress);
    assert_eq!(c.clock(), 0);
    assert!(!history_names(&c, &handle).contains(&"go".to_string()));
}

fn replayed_lamp(tweak: impl FnOnce(&mut scenario_checker::Run)) -> (Checker, ModelHandle) {
    let (mut rec, _h) = started(lamp(), MemoryOracleStore::default(), 3);
    assert_eq!(rec.run_for_ticks(2), RunOutcome::Completed);
    rec.save_pressed().expect("save");
    let mut run = rec.store().run("lamp", "Scenario").cloned().expect("run");
    tweak(&mut run);

    let (mut c, h) = started(lamp(), MemoryOracleStore::default().with_run("lamp", run), 3);
    c.replay_pressed().expect("replay");
    assert_eq!(c.run_for_ticks(2), RunOutcome::Completed);
    assert!(!c.is_playback());
    (c, h)
}

#[test]
fn final_recorded_step_is_still_checked() {
    let (c, _h) = replayed_lamp(|run| {
        if let Some(Entry::Snapshot(snapshot)) = run.entries.get_mut(3) {
            snapshot.values.insert("on".to_string(), "BROKEN".to_string());
        }
    });
    assert_eq!(c.divergences().len(), 1);
    assert_eq!(c.divergences()[0].clock, 2);
}

#[test]
fn steps_after_exhausted_playback_are_not_compared() {
    let (mut c, _h) = replayed_lamp(|run| {
        if let Some(Entry::Snapshot(snapshot)) = run.entries.get_mut(3) {
            snapshot.values.insert("on".to_string(), "BROKEN".to_string());
        }
    });
    assert_eq!(c.run_for_ticks(2), RunOutcome::Completed);
    assert_eq!(c.clock(), 4);
    assert_eq!(c.mode(), CheckerMode::Recording);
    assert_eq!(c.divergences().len(), 1);
    assert!(c.last_comparison().iter().all(|row| row.expected.is_none()));
    assert!(c.is_dirty());
}

#[test]
fn restart_keeps_exhausted_playback_in_recording() {
    let (mut c, _h) = replayed_lamp(|_| {});
    assert_eq!(c.mode(), CheckerMode::Recording);

    c.restart_pressed();
    assert_eq!(c.mode(), CheckerMode::Recording);
    assert_eq!(c.playback().map(|p| p.position()), Some(4));
    assert_eq!(c.clock(), 0);
    assert!(c.last_comparison().iter().all(|row| row.expected.is_none()));

    c.replay_pressed().expect("rewind");
    assert_eq!(c.mode(), CheckerMode::Playback);
    assert_eq!(c.playback().map(|p| p.position()), Some(0));
}

#[test]
fn restart_rewinds_active_playback() {
    let (mut rec, _h) = started(lamp(), MemoryOracleStore::default(), 3);
    rec.run_for_ticks(3);
    rec.save_pressed().expect("save");
    let run = rec.store().run("lamp", "Scenario").cloned().expect("run");

    let (mut c, _h) = started(lamp(), MemoryOracleStore::default().with_run("lamp", run), 3);
    c.replay_pressed().expect("replay");
    c.run_for_ticks(1);
    assert_eq!(c.playback().map(|p| p.position()), Some(2));

    c.restart_pressed();
    assert_eq!(c.mode(), CheckerMode::Playback);
    assert_eq!(c.playback().map(|p| p.position()), Some(0));
    assert_eq!(c.clock(), 0);
}
