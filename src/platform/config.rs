//! `scenario.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory holding saved oracle files.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Name given to recorded runs.
    #[serde(default = "default_recording_name")]
    pub recording_name: String,

    /// Operation that establishes the model context; always recorded, never dirties.
    #[serde(default = "default_setup_operation")]
    pub setup_operation: String,

    /// Operation that initialises the model variables; never dirties.
    #[serde(default = "default_initialisation_operation")]
    pub initialisation_operation: String,

    /// Seed for choosing among equal-priority operations. Absent = OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Distinct internal operations one big step may chain.
    #[serde(default = "default_internal_chain_limit")]
    pub internal_chain_limit: usize,

    /// Consecutive clock-neutral big steps tolerated while running for ticks.
    #[serde(default = "default_idle_big_step_limit")]
    pub idle_big_step_limit: usize,

    /// What saving does when an oracle file already exists.
    #[serde(default = "default_record_collision")]
    pub record_collision: crate::RecordCollisionPolicy,

    /// Pretty-print saved oracle files.
    #[serde(default)]
    pub pretty_oracle: bool,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".scenario")
}

fn default_recording_name() -> String {
    "Scenario".to_string()
}

fn default_setup_operation() -> String {
    "SETUP_CONTEXT".to_string()
}

fn default_initialisation_operation() -> String {
    "INITIALISATION".to_string()
}

fn default_internal_chain_limit() -> usize {
    1024
}

fn default_idle_big_step_limit() -> usize {
    64
}

fn default_record_collision() -> crate::RecordCollisionPolicy {
    crate::RecordCollisionPolicy::Overwrite
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            recording_name: default_recording_name(),
            setup_operation: default_setup_operation(),
            initialisation_operation: default_initialisation_operation(),
            seed: None,
            internal_chain_limit: default_internal_chain_limit(),
            idle_big_step_limit: default_idle_big_step_limit(),
            record_collision: default_record_collision(),
            pretty_oracle: false,
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn oracle_dir(&self) -> PathBuf {
        self.base_dir.join("oracles")
    }
}
