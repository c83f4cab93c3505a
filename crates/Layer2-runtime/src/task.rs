//! Task handle and creation types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_foundation::Result;
use serde::{Deserialize, Serialize};

/// Final exit information for a deleted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Process exit status code
    pub status: u32,

    /// When the task exited
    pub exited_at: DateTime<Utc>,
}

/// Stdio wiring for a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StdioConfig {
    /// Stdin path or fifo
    pub stdin: String,

    /// Stdout path or fifo
    pub stdout: String,

    /// Stderr path or fifo
    pub stderr: String,

    /// Whether the task gets a terminal
    pub terminal: bool,
}

/// A rootfs mount forwarded to the shim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    /// Mount type (bind, overlay, ...)
    pub kind: String,

    /// Mount source
    pub source: String,

    /// Mount options
    pub options: Vec<String>,
}

/// Everything needed to create a task
#[derive(Debug, Clone)]
pub struct CreateOpts {
    /// Raw execution spec, written verbatim into the bundle (opaque here)
    pub spec: Vec<u8>,

    /// Supervisor selector, e.g. "io.keel.runc.v1"; its last dot-delimited
    /// component picks the shim binary
    pub runtime: String,

    /// Stdio wiring
    pub io: StdioConfig,

    /// Checkpoint reference to restore from, if any (carried opaquely)
    pub checkpoint: Option<String>,

    /// Rootfs mounts
    pub rootfs: Vec<Mount>,

    /// Runtime-specific options, opaque to the manager
    pub options: serde_json::Value,
}

impl CreateOpts {
    /// Options with a spec and runtime selector, everything else default
    pub fn new(spec: impl Into<Vec<u8>>, runtime: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            runtime: runtime.into(),
            io: StdioConfig::default(),
            checkpoint: None,
            rootfs: Vec::new(),
            options: serde_json::Value::Null,
        }
    }

    /// Set stdio wiring
    pub fn with_io(mut self, io: StdioConfig) -> Self {
        self.io = io;
        self
    }

    /// Add a rootfs mount
    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.rootfs.push(mount);
        self
    }
}

/// Handle to a created task
///
/// Produced by the shim at task creation and held by the registry; the
/// minimal capability set is identity, deletion, and exit-status retrieval.
#[async_trait]
pub trait TaskHandle: Send + Sync + std::fmt::Debug {
    /// Task identifier
    fn id(&self) -> &str;

    /// Pid of the task process, if creation has completed
    fn pid(&self) -> Option<u32>;

    /// Delete the task remotely and return its final exit status
    async fn delete(&self) -> Result<ExitStatus>;
}
