//! scenario-checker CLI entrypoint.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use scenario_checker::{
    Config, Entry, FileOracleStore, Machine, Mode, ModelHandle, OracleFile, RecordCollisionPolicy,
    Reporter, RunOutcome, ScenarioChecker, ScriptedAnimator, SessionReport, SessionStatus, TracingView, verify_oracle_file,
};

#[derive(Debug, Parser)]
#[command(name = "scenario-checker")]
#[command(about = "record and replay steppable scenarios over a scripted model")]
struct Cli {
    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, global = true, default_value = "scenario.toml")]
    config: PathBuf,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Machine-readable output to stdout (JSON).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Explore a model and optionally save the run as its reference oracle
    Record {
        model: PathBuf,

        /// Logical clock ticks (external operations) to run.
        #[arg(long, default_value_t = 10)]
        ticks: u64,

        #[arg(long)]
        seed: Option<u64>,

        /// Fire these operation signatures first, in order.
        #[arg(long = "select")]
        select: Vec<String>,

        /// Save the recorded run.
        #[arg(long)]
        save: bool,

        /// Override `record_collision` from the config.
        #[arg(long)]
        record_collision: Option<RecordCollisionPolicy>,

        /// Reporter format.
        #[arg(long, default_value = "pretty")]
        reporter: Reporter,
    },

    /// Replay the saved oracle against the model and report divergences
    Replay {
        model: PathBuf,

        /// Ticks to replay (default: every recorded step).
        #[arg(long)]
        ticks: Option<u64>,

        #[arg(long)]
        seed: Option<u64>,

        /// Reporter format.
        #[arg(long, default_value = "pretty")]
        reporter: Reporter,
    },

    /// Print a saved oracle run
    Show { oracle: PathBuf },

    /// Verify an oracle file's checksum and structure
    Verify { oracle: PathBuf },
}

type Checker = ScenarioChecker<ScriptedAnimator, FileOracleStore>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log) {
        // Tracing is best-effort; if it fails, we still continue.
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    let config = Config::load_optional(&cli.config);

    match run_command(&cli, &config) {
        Ok(code) => code,
        Err(err) => print_error_and_exit(&cli, err),
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Record {
            model,
            ticks,
            seed,
            select,
            save,
            record_collision,
            reporter,
        } => {
            let mut config = config.clone();
            if let Some(policy) = record_collision {
                config.record_collision = *policy;
            }
            let (mut checker, handle) = open_checker(&config, model, *seed)?;
            settle_initialisation(&mut checker, &config);
            for signature in select {
                if !checker.select_operation(signature, true) {
                    anyhow::bail!("operation {signature:?} is not enabled");
                }
            }
            checker.clear_selection();
            let outcome = checker.run_for_ticks(*ticks);
            let saved_to = if *save {
                checker.save_pressed()?;
                checker.store().last_saved().map(|p| p.display().to_string())
            } else {
                None
            };
            let report = session_report(&checker, &handle, outcome, saved_to);
            print_report(effective_reporter(cli, *reporter), &report)?;
            Ok(exit_code_for_status(report.status))
        }

        Command::Replay {
            model,
            ticks,
            seed,
            reporter,
        } => {
            let (mut checker, handle) = open_checker(config, model, *seed)?;
            checker.replay_pressed()?;
            let ticks = ticks.unwrap_or_else(|| {
                checker
                    .playback()
                    .map(|p| p.remaining_steps() as u64)
                    .unwrap_or(0)
            });
            let outcome = checker.run_for_ticks(ticks);
            let report = session_report(&checker, &handle, outcome, None);
            print_report(effective_reporter(cli, *reporter), &report)?;
            Ok(exit_code_for_status(report.status))
        }

        Command::Show { oracle } => {
            let file = OracleFile::read_json(oracle)?;
            match effective_reporter(cli, Reporter::Pretty) {
                Reporter::Json => println!("{}", serde_json::to_string_pretty(&file.run)?),
                Reporter::Pretty => {
                    println!(
                        "run {} ({} step(s), machine {})",
                        file.run.name,
                        file.run.step_count(),
                        file.machine
                    );
                    for entry in &file.run.entries {
                        match entry {
                            Entry::Step(step) => {
                                let op = step.to_operation();
                                println!("@{} {op}", step.clock);
                            }
                            Entry::Snapshot(snapshot) => {
                                for (id, value) in &snapshot.values {
                                    println!("    {id} = {value}");
                                }
                            }
                        }
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify { oracle } => {
            let report = verify_oracle_file(oracle)?;
            match effective_reporter(cli, Reporter::Pretty) {
                Reporter::Json => println!("{}", serde_json::to_string(&report)?),
                Reporter::Pretty => {
                    println!(
                        "ok: {} (v{}, machine {}, {} step(s))",
                        report.path, report.version, report.machine, report.steps
                    );
                    for w in &report.warnings {
                        println!("warning: {w}");
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_checker(config: &Config, model: &Path, seed: Option<u64>) -> anyhow::Result<(Checker, ModelHandle)> {
    let machine = Machine::load(model)?;
    let mut config = config.clone();
    if seed.is_some() {
        config.seed = seed;
    }
    let handle = ModelHandle::new(model.display().to_string());
    let animator = ScriptedAnimator::new(
        handle.clone(),
        machine.clone(),
        config.setup_operation.as_str(),
        config.initialisation_operation.as_str(),
    );
    let mut checker = ScenarioChecker::new(&config, animator, FileOracleStore::from_config(&config));
    checker.add_view(Box::new(TracingView));
    checker.initialise(handle.clone(), machine)?;
    Ok((checker, handle))
}

/// Fires the initialisation operation so selections see the model's own events.
fn settle_initialisation(checker: &mut Checker, config: &Config) {
    if checker
        .enabled_operations()
        .iter()
        .any(|op| op.name == config.initialisation_operation)
    {
        checker.big_step();
    }
}

fn session_report(
    checker: &Checker,
    handle: &ModelHandle,
    outcome: RunOutcome,
    saved_to: Option<String>,
) -> SessionReport {
    let divergences = checker.divergences().to_vec();
    SessionReport {
        model: handle.to_string(),
        mode: if checker.playback().is_some() {
            Mode::Playback
        } else {
            Mode::Recording
        },
        seed: checker.seed(),
        clock: checker.clock(),
        dirty: checker.is_dirty(),
        outcome,
        status: SessionReport::status_for(outcome, &divergences),
        remaining_steps: checker.playback().map(|p| p.remaining_steps()),
        divergences,
        saved_to,
    }
}

/// `--json` wins over a per-command `--reporter`.
fn effective_reporter(cli: &Cli, reporter: Reporter) -> Reporter {
    if cli.json { Reporter::Json } else { reporter }
}

fn print_report(reporter: Reporter, report: &SessionReport) -> anyhow::Result<()> {
    match reporter {
        Reporter::Json => println!("{}", serde_json::to_string(report)?),
        Reporter::Pretty => println!("{}", report.render_pretty()),
    }
    Ok(())
}

fn print_error_and_exit(cli: &Cli, err: anyhow::Error) -> ExitCode {
    let msg = format!("{err:#}");
    if cli.json {
        let out = serde_json::json!({
            "status": "error",
            "code": "error",
            "message": msg,
        });
        println!("{out}");
    } else {
        eprintln!("{msg}");
    }
    ExitCode::from(2)
}

fn exit_code_for_status(status: SessionStatus) -> ExitCode {
    match status {
        SessionStatus::Pass => ExitCode::SUCCESS,
        SessionStatus::Diverged | SessionStatus::Stalled => ExitCode::from(1),
    }
}
