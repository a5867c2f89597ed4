//! Session configuration.
//!
//! Every field has a default, so a JSON file only needs the keys it changes.
//! `TermConfig::from_env` layers `AGTERM_CONFIG` (a JSON file) and the
//! `AGTERM_COMMAND` / `AGTERM_TIMEOUT_MS` overrides on top of the defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TermError};

pub const DEFAULT_COMMAND: &str = "/bin/bash";
pub const DEFAULT_MAX_HISTORY_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// Prompts of common shells and debuggers.
pub const DEFAULT_READY_MARKERS: [&str; 4] = ["$ ", "# ", "pwndbg> ", "(gdb) "];

pub const CONFIG_PATH_ENV: &str = "AGTERM_CONFIG";
pub const COMMAND_ENV: &str = "AGTERM_COMMAND";
pub const TIMEOUT_ENV: &str = "AGTERM_TIMEOUT_MS";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermConfig {
    /// Shell command line to spawn, run as `/bin/sh -c <command>`.
    pub command: String,
    /// Cap of the rolling diagnostic history.
    pub max_history_bytes: usize,
    /// Substrings signalling the program is idle. Checked in order.
    pub ready_markers: Vec<String>,
    pub default_timeout_ms: u64,
    pub read_chunk_size: usize,
    /// Working directory of the program; the caller's when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Applied after the fixed session environment, so these win.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Default for TermConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            max_history_bytes: DEFAULT_MAX_HISTORY_BYTES,
            ready_markers: DEFAULT_READY_MARKERS.iter().map(|m| m.to_string()).collect(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            cwd: None,
            env: BTreeMap::new(),
        }
    }
}

impl TermConfig {
    /// Default configuration running `command`.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TermError::Config(format!("malformed JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            TermError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::from_json_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(command) = lookup(COMMAND_ENV) {
            config.command = command;
        }
        if let Some(timeout) = lookup(TIMEOUT_ENV) {
            config.default_timeout_ms = timeout.trim().parse().map_err(|_| {
                TermError::Config(format!("{TIMEOUT_ENV} is not a number: {timeout:?}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(TermError::Config("command is empty".into()));
        }
        if self.ready_markers.is_empty() {
            return Err(TermError::Config("at least one ready marker is required".into()));
        }
        // An empty marker would match any output, including none.
        if self.ready_markers.iter().any(|m| m.is_empty()) {
            return Err(TermError::Config("ready markers must not be empty".into()));
        }
        if self.read_chunk_size == 0 {
            return Err(TermError::Config("read_chunk_size must be positive".into()));
        }
        Ok(())
    }
}
