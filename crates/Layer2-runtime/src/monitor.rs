//! Monitor seam - asynchronous task exit watching
//!
//! The concrete policy engine lives outside this crate; the manager only
//! needs attach/detach. Attach failures fail the whole create; detach
//! failures abort a delete before any remote call is made.

use crate::task::TaskHandle;
use async_trait::async_trait;
use keel_foundation::Result;
use std::sync::Arc;

/// Watches tasks for asynchronous exit and feeds the event bus
#[async_trait]
pub trait TaskMonitor: Send + Sync {
    /// Start watching a task
    async fn attach(&self, task: &Arc<dyn TaskHandle>) -> Result<()>;

    /// Stop watching a task
    async fn detach(&self, task: &Arc<dyn TaskHandle>) -> Result<()>;
}

/// Monitor that watches nothing
#[derive(Debug, Default)]
pub struct NoopMonitor;

#[async_trait]
impl TaskMonitor for NoopMonitor {
    async fn attach(&self, _task: &Arc<dyn TaskHandle>) -> Result<()> {
        Ok(())
    }

    async fn detach(&self, _task: &Arc<dyn TaskHandle>) -> Result<()> {
        Ok(())
    }
}
