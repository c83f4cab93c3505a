//! Runtime configuration
//!
//! Roots, control address and shim tuning knobs. Deserializable from TOML so
//! an embedder can ship a config file; every field has a default matching
//! a stock host install.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_root() -> PathBuf {
    PathBuf::from("/var/lib/keel")
}

fn default_state() -> PathBuf {
    PathBuf::from("/run/keel")
}

fn default_control_address() -> String {
    "/run/keel/keel.sock".to_string()
}

fn default_dial_timeout_secs() -> u64 {
    100
}

fn default_shim_worker_threads() -> usize {
    2
}

/// Runtime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Persistent root: bundles live under `<root>/<namespace>/<id>`
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Transient state root: shim scratch space under `<state>/<namespace>/<id>`
    #[serde(default = "default_state")]
    pub state: PathBuf,

    /// Control endpoint address handed to every shim at spawn
    #[serde(default = "default_control_address")]
    pub control_address: String,

    /// Upper bound on the RPC dial after a shim is spawned, in seconds
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,

    /// Worker-thread hint exported to the shim's async runtime
    #[serde(default = "default_shim_worker_threads")]
    pub shim_worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            state: default_state(),
            control_address: default_control_address(),
            dial_timeout_secs: default_dial_timeout_secs(),
            shim_worker_threads: default_shim_worker_threads(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Load from a TOML file on disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Dial timeout as a `Duration`
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}
