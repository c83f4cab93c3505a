//! # keel-runtime
//!
//! Task runtime core for keel. Prepares per-task bundles on disk, launches
//! and attaches to per-task shim supervisors over private sockets, and
//! sequences task create/get/list/delete with reverse-order rollback.
//!
//! ## Components
//!
//! - Bundle: on-disk working area with atomic creation and deletion
//! - Shim: supervisor process + RPC session, launch protocol included
//! - TaskRegistry: concurrency-safe id to handle map
//! - TaskManager: orchestration with best-effort multi-resource rollback

pub mod bundle;
pub mod manager;
pub mod monitor;
pub mod registry;
pub mod shim;
pub mod task;

// Runtime core
pub use bundle::Bundle;
pub use manager::TaskManager;
pub use monitor::{NoopMonitor, TaskMonitor};
pub use registry::TaskRegistry;
pub use shim::{shim_socket_address, Shim, OOM_SCORE_MAX_KILLABLE};
pub use task::{CreateOpts, ExitStatus, Mount, StdioConfig, TaskHandle};
