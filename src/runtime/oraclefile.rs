//! Oracle file format (.oracle.json) and the stores that persist recorded runs.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{Config, Machine, Run, ScenarioError, ScenarioResult, VersionInfo, wall_time_iso_utc};

pub const ORACLE_FORMAT: &str = "scenario-oracle";
pub const CURRENT_ORACLE_VERSION: u32 = 1;

const ORACLE_EXT: &str = "oracle.json";

/// Persistence collaborator for recorded runs.
pub trait OracleStore {
    /// Points the store at `machine`; later saves and loads refer to it.
    fn initialise(&mut self, recording_name: &str, machine: &Machine) -> ScenarioResult<()>;

    fn load_existing_run(&self, name: &str, machine: &Machine) -> ScenarioResult<Option<Run>>;

    fn save(&mut self, run: &Run) -> ScenarioResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCollisionPolicy {
    Error,
    Overwrite,
    Append,
}

impl clap::ValueEnum for RecordCollisionPolicy {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Error, Self::Overwrite, Self::Append]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Error => clap::builder::PossibleValue::new("error"),
            Self::Overwrite => clap::builder::PossibleValue::new("overwrite"),
            Self::Append => clap::builder::PossibleValue::new("append"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleFile {
    pub format: String,
    pub version: u32,
    pub engine: VersionInfo,
    pub saved_at: String,
    pub machine: String,
    pub run: Run,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl OracleFile {
    pub fn new(machine: impl Into<String>, run: Run) -> Self {
        Self {
            format: ORACLE_FORMAT.to_string(),
            version: CURRENT_ORACLE_VERSION,
            engine: crate::version_info(),
            saved_at: wall_time_iso_utc(),
            machine: machine.into(),
            run,
            checksum: None,
        }
    }

    pub fn write_json(&self, path: &Path, pretty: bool) -> ScenarioResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut with_checksum = self.clone();
        with_checksum.checksum = None;
        let canonical = serde_json::to_vec(&with_checksum)?;
        with_checksum.checksum = Some(blake3::hash(&canonical).to_hex().to_string());

        let bytes = if pretty {
            serde_json::to_vec_pretty(&with_checksum)?
        } else {
            serde_json::to_vec(&with_checksum)?
        };
        // Atomic replace so readers never observe a half-written oracle.
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("run.oracle.json");
        let tmp_name = format!(
            ".{file_name}.{}.{}.tmp",
            std::process::id(),
            uuid::Uuid::new_v4()
        );
        let tmp_path = parent.join(tmp_name);
        std::fs::write(&tmp_path, bytes)?;
        if let Err(err) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }

    pub fn read_json(path: &Path) -> ScenarioResult<Self> {
        let bytes = std::fs::read(path)?;
        let file: OracleFile = serde_json::from_slice(&bytes).map_err(|e| {
            ScenarioError::Oracle(format!("failed to parse oracle {}: {e}", path.display()))
        })?;
        if file.format != ORACLE_FORMAT {
            return Err(ScenarioError::Oracle(format!(
                "{} is not an oracle file (format {:?})",
                path.display(),
                file.format
            )));
        }
        if file.version > CURRENT_ORACLE_VERSION {
            return Err(ScenarioError::Oracle(format!(
                "oracle {} uses schema v{} (newest supported is v{CURRENT_ORACLE_VERSION})",
                path.display(),
                file.version
            )));
        }
        verify_checksum(&file, path)?;
        file.run.validate()?;
        Ok(file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleVerifyReport {
    pub ok: bool,
    pub path: String,
    pub version: u32,
    pub machine: String,
    pub steps: usize,
    #[serde(rename = "checksumPresent")]
    pub checksum_present: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub fn oracle_schema_warnings(version: u32) -> Vec<String> {
    if version < CURRENT_ORACLE_VERSION {
        vec![format!(
            "oracle schema v{version} is stale; current schema is v{CURRENT_ORACLE_VERSION}"
        )]
    } else {
        Vec::new()
    }
}

pub fn verify_oracle_file(path: &Path) -> ScenarioResult<OracleVerifyReport> {
    let file = OracleFile::read_json(path)?;
    let mut warnings = oracle_schema_warnings(file.version);
    if file.checksum.is_none() {
        warnings.push("oracle has no checksum; integrity not verified".to_string());
    }
    Ok(OracleVerifyReport {
        ok: true,
        path: path.display().to_string(),
        version: file.version,
        machine: file.machine,
        steps: file.run.step_count(),
        checksum_present: file.checksum.is_some(),
        warnings,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OracleKey {
    machine: String,
    name: String,
}

/// One oracle file per (machine, recording name) under a directory.
#[derive(Debug, Clone)]
pub struct FileOracleStore {
    dir: PathBuf,
    policy: RecordCollisionPolicy,
    pretty: bool,
    current: Option<OracleKey>,
    last_saved: Option<PathBuf>,
}

impl FileOracleStore {
    pub fn new(dir: PathBuf, policy: RecordCollisionPolicy, pretty: bool) -> Self {
        Self {
            dir,
            policy,
            pretty,
            current: None,
            last_saved: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.oracle_dir(), config.record_collision, config.pretty_oracle)
    }

    pub fn oracle_path(&self, machine: &str, name: &str) -> PathBuf {
        self.dir.join(format!("{machine}.{name}.{ORACLE_EXT}"))
    }

    pub fn last_saved(&self) -> Option<&Path> {
        self.last_saved.as_deref()
    }

    fn numbered_path(&self, machine: &str, name: &str, n: usize) -> PathBuf {
        self.dir.join(format!("{machine}.{name}.{n}.{ORACLE_EXT}"))
    }

    /// Newest file for the key: the highest contiguous numbered copy, else the base file.
    fn latest_path(&self, machine: &str, name: &str) -> Option<PathBuf> {
        let base = self.oracle_path(machine, name);
        if !base.exists() {
            return None;
        }
        let mut latest = base;
        for n in 1.. {
            let candidate = self.numbered_path(machine, name, n);
            if !candidate.exists() {
                break;
            }
            latest = candidate;
        }
        Some(latest)
    }

    fn resolve_save_target(&self, key: &OracleKey) -> ScenarioResult<PathBuf> {
        let path = self.oracle_path(&key.machine, &key.name);
        match self.policy {
            RecordCollisionPolicy::Overwrite => Ok(path),
            RecordCollisionPolicy::Error => {
                if path.exists() {
                    Err(ScenarioError::Persistence(format!(
                        "record collision: {} already exists (record_collision=error)",
                        path.display()
                    )))
                } else {
                    Ok(path)
                }
            }
            RecordCollisionPolicy::Append => {
                if !path.exists() {
                    return Ok(path);
                }
                for n in 1..=100_000 {
                    let candidate = self.numbered_path(&key.machine, &key.name, n);
                    if !candidate.exists() {
                        return Ok(candidate);
                    }
                }
                Err(ScenarioError::Persistence(format!(
                    "unable to find append target for {}",
                    path.display()
                )))
            }
        }
    }
}

impl OracleStore for FileOracleStore {
    fn initialise(&mut self, recording_name: &str, machine: &Machine) -> ScenarioResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        self.current = Some(OracleKey {
            machine: machine.name.clone(),
            name: recording_name.to_string(),
        });
        self.last_saved = None;
        Ok(())
    }

    fn load_existing_run(&self, name: &str, machine: &Machine) -> ScenarioResult<Option<Run>> {
        let Some(path) = self.latest_path(&machine.name, name) else {
            return Ok(None);
        };
        let file = OracleFile::read_json(&path)?;
        if file.machine != machine.name {
            return Err(ScenarioError::Oracle(format!(
                "oracle {} belongs to machine {}, not {}",
                path.display(),
                file.machine,
                machine.name
            )));
        }
        tracing::debug!(path = %path.display(), steps = file.run.step_count(), "loaded recorded run");
        Ok(Some(file.run))
    }

    fn save(&mut self, run: &Run) -> ScenarioResult<()> {
        let Some(current) = self.current.as_ref() else {
            return Err(ScenarioError::Persistence(
                "oracle store has not been initialised for a machine".to_string(),
            ));
        };
        let key = OracleKey {
            machine: current.machine.clone(),
            name: run.name.clone(),
        };
        let target = self.resolve_save_target(&key)?;
        let _lock = acquire_save_lock(&target)?;
        OracleFile::new(key.machine.clone(), run.clone())
            .write_json(&target, self.pretty)
            .map_err(|e| {
                ScenarioError::Persistence(format!("failed to save {}: {e}", target.display()))
            })?;
        tracing::info!(path = %target.display(), steps = run.step_count(), "saved recorded run");
        self.last_saved = Some(target);
        Ok(())
    }
}

struct SaveLockGuard {
    lock_path: PathBuf,
}

impl Drop for SaveLockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

fn acquire_save_lock(target: &Path) -> ScenarioResult<SaveLockGuard> {
    let lock_path = PathBuf::from(format!("{}.lock", target.to_string_lossy()));
    match std::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&lock_path)
    {
        Ok(_) => Ok(SaveLockGuard { lock_path }),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(ScenarioError::Persistence(format!(
            "record collision: active writer holds lock for {}",
            target.display()
        ))),
        Err(e) => Err(ScenarioError::Persistence(format!(
            "failed to lock {}: {e}",
            target.display()
        ))),
    }
}

fn verify_checksum(file: &OracleFile, path: &Path) -> ScenarioResult<()> {
    let Some(expected) = file.checksum.as_ref() else {
        return Ok(());
    };
    let mut canonical = file.clone();
    canonical.checksum = None;
    let bytes = serde_json::to_vec(&canonical)?;
    let got = blake3::hash(&bytes).to_hex().to_string();
    if &got != expected {
        return Err(ScenarioError::Oracle(format!(
            "oracle checksum mismatch for {} (expected {}, got {})",
            path.display(),
            expected,
            got
        )));
    }
    Ok(())
}

/// In-memory store keyed by (machine, recording name).
#[derive(Debug, Clone, Default)]
pub struct MemoryOracleStore {
    runs: BTreeMap<(String, String), Run>,
    current: Option<String>,
    read_only: bool,
}

impl MemoryOracleStore {
    pub fn with_run(mut self, machine: &str, run: Run) -> Self {
        self.runs.insert((machine.to_string(), run.name.clone()), run);
        self
    }

    /// A read-only store rejects every save.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn run(&self, machine: &str, name: &str) -> Option<&Run> {
        self.runs.get(&(machine.to_string(), name.to_string()))
    }
}

impl OracleStore for MemoryOracleStore {
    fn initialise(&mut self, _recording_name: &str, machine: &Machine) -> ScenarioResult<()> {
        self.current = Some(machine.name.clone());
        Ok(())
    }

    fn load_existing_run(&self, name: &str, machine: &Machine) -> ScenarioResult<Option<Run>> {
        Ok(self.run(&machine.name, name).cloned())
    }

    fn save(&mut self, run: &Run) -> ScenarioResult<()> {
        if self.read_only {
            return Err(ScenarioError::Persistence("oracle store is read-only".to_string()));
        }
        let Some(machine) = self.current.clone() else {
            return Err(ScenarioError::Persistence(
                "oracle store has not been initialised for a machine".to_string(),
            ));
        };
        self.runs.insert((machine, run.name.clone()), run.clone());
        Ok(())
    }
}
