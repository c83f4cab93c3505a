//! Task Manager - sequences bundle, shim and registry per task
//!
//! Create acquires bundle -> shim -> remote task -> registry entry ->
//! monitor, and on failure releases in strictly reverse order. Every release
//! step tolerates its own failure (logged) so it never hides the error that
//! triggered the rollback.

use crate::bundle::Bundle;
use crate::monitor::TaskMonitor;
use crate::registry::TaskRegistry;
use crate::shim::Shim;
use crate::task::{CreateOpts, ExitStatus, TaskHandle};
use keel_foundation::event::{EventCategory, RuntimeEvent};
use keel_foundation::{Context, EventBus, Result, RuntimeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Static identity of this runtime implementation
const RUNTIME_ID: &str = "io.keel.task.v1";

/// Orchestrates the task lifecycle
pub struct TaskManager {
    /// Persistent root for bundles
    root: PathBuf,

    /// Transient state root for shim scratch space
    state: PathBuf,

    /// Launch tuning handed to every shim
    config: RuntimeConfig,

    /// Exit watcher
    monitor: Arc<dyn TaskMonitor>,

    /// Live tasks by identifier
    tasks: TaskRegistry,

    /// Lifecycle notification sink
    events: Arc<EventBus>,
}

impl TaskManager {
    /// Create a manager, building both storage roots
    pub async fn new(
        config: RuntimeConfig,
        monitor: Arc<dyn TaskMonitor>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o711);
        for dir in [&config.root, &config.state] {
            builder.create(dir).await?;
        }
        Ok(Self {
            root: config.root.clone(),
            state: config.state.clone(),
            config,
            monitor,
            tasks: TaskRegistry::new(),
            events,
        })
    }

    /// Runtime identity
    pub fn id(&self) -> &'static str {
        RUNTIME_ID
    }

    /// Create a task end to end
    ///
    /// Either the task comes back registered and monitored, or the call
    /// fails with no registry entry and best-effort-cleaned filesystem and
    /// process state.
    pub async fn create(
        &self,
        ctx: &Context,
        id: &str,
        opts: CreateOpts,
    ) -> Result<Arc<dyn TaskHandle>> {
        let ns = ctx.namespace_required()?.to_string();
        let bundle = Bundle::new(ctx, &self.root, &self.state, id, &opts.spec).await?;

        match self.create_in_bundle(ctx, bundle.clone(), &opts).await {
            Ok(task) => {
                self.events.publish(
                    RuntimeEvent::new("task.created", EventCategory::Task, ns)
                        .with_data(serde_json::json!({ "id": id })),
                );
                Ok(task)
            }
            Err(err) => {
                if let Err(cleanup) = bundle.delete().await {
                    warn!(id, error = %cleanup, "bundle cleanup after failed create");
                }
                Err(err)
            }
        }
    }

    /// Everything past the bundle; the caller owns bundle rollback
    async fn create_in_bundle(
        &self,
        ctx: &Context,
        bundle: Bundle,
        opts: &CreateOpts,
    ) -> Result<Arc<dyn TaskHandle>> {
        let shim = Arc::new(Shim::launch(ctx, bundle, &opts.runtime, &self.config).await?);
        match self.register(shim.clone(), opts).await {
            Ok(task) => Ok(task),
            Err(err) => {
                shim.close().await;
                Err(err)
            }
        }
    }

    /// Remote create, then registry and monitor
    async fn register(&self, shim: Arc<Shim>, opts: &CreateOpts) -> Result<Arc<dyn TaskHandle>> {
        shim.create(opts).await?;
        let task: Arc<dyn TaskHandle> = shim;
        self.tasks.add(task.clone()).await?;
        if let Err(err) = self.monitor.attach(&task).await {
            // the remote task stays alive; only local bookkeeping is undone
            warn!(
                id = task.id(),
                "monitor attach failed; remote task is not torn down"
            );
            self.tasks.remove(task.id()).await;
            return Err(err);
        }
        Ok(task)
    }

    /// Look up a task by identifier
    pub async fn get(&self, id: &str) -> Result<Arc<dyn TaskHandle>> {
        self.tasks.get(id).await
    }

    /// Snapshot of all live tasks; no ordering guarantee
    pub async fn list(&self) -> Vec<Arc<dyn TaskHandle>> {
        self.tasks.list().await
    }

    /// Delete a task and return its final exit status
    ///
    /// A task the monitor refuses to release is not deleted; a failed remote
    /// delete leaves the registry entry intact.
    pub async fn delete(&self, ctx: &Context, id: &str) -> Result<ExitStatus> {
        let ns = ctx.namespace_required()?.to_string();
        let task = self.tasks.get(id).await?;

        self.monitor.detach(&task).await?;
        let exit = task.delete().await?;
        self.tasks.remove(id).await;

        debug!(id, status = exit.status, "task deleted");
        self.events.publish(
            RuntimeEvent::new("task.deleted", EventCategory::Task, ns).with_data(
                serde_json::json!({ "id": id, "exit_status": exit.status }),
            ),
        );
        Ok(exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::NoopMonitor;
    use async_trait::async_trait;
    use chrono::Utc;
    use keel_foundation::Error;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct StubTask {
        id: String,
        deleted: AtomicBool,
    }

    impl StubTask {
        fn new(id: &str) -> Arc<StubTask> {
            Arc::new(StubTask {
                id: id.to_string(),
                deleted: AtomicBool::new(false),
            })
        }

        fn handle(id: &str) -> Arc<dyn TaskHandle> {
            Self::new(id)
        }
    }

    #[async_trait]
    impl TaskHandle for StubTask {
        fn id(&self) -> &str {
            &self.id
        }

        fn pid(&self) -> Option<u32> {
            Some(1234)
        }

        async fn delete(&self) -> Result<ExitStatus> {
            self.deleted.store(true, Ordering::SeqCst);
            Ok(ExitStatus {
                status: 0,
                exited_at: Utc::now(),
            })
        }
    }

    /// Monitor whose detach always refuses
    struct StickyMonitor;

    #[async_trait]
    impl TaskMonitor for StickyMonitor {
        async fn attach(&self, _task: &Arc<dyn TaskHandle>) -> Result<()> {
            Ok(())
        }

        async fn detach(&self, _task: &Arc<dyn TaskHandle>) -> Result<()> {
            Err(Error::Internal("monitor refuses to let go".into()))
        }
    }

    fn ctx() -> Context {
        Context::with_namespace("default")
    }

    async fn manager_with(
        dir: &std::path::Path,
        monitor: Arc<dyn TaskMonitor>,
    ) -> (TaskManager, Arc<EventBus>) {
        let events = Arc::new(EventBus::new());
        let config = RuntimeConfig {
            root: dir.join("root"),
            state: dir.join("state"),
            ..RuntimeConfig::default()
        };
        let manager = TaskManager::new(config, monitor, events.clone())
            .await
            .unwrap();
        (manager, events)
    }

    #[tokio::test]
    async fn new_builds_both_roots() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_with(dir.path(), Arc::new(NoopMonitor)).await;

        assert_eq!(manager.id(), "io.keel.task.v1");
        for root in [dir.path().join("root"), dir.path().join("state")] {
            let mode = std::fs::metadata(&root).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o711);
        }
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_with(dir.path(), Arc::new(NoopMonitor)).await;

        assert!(manager.get("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_unknown_id_mutates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, events) = manager_with(dir.path(), Arc::new(NoopMonitor)).await;

        let err = manager.delete(&ctx(), "ghost").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(manager.list().await.is_empty());
        assert_eq!(events.event_count(), 0);
    }

    #[tokio::test]
    async fn delete_aborts_when_monitor_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_with(dir.path(), Arc::new(StickyMonitor)).await;

        manager.tasks.add(StubTask::handle("t1")).await.unwrap();
        assert!(manager.delete(&ctx(), "t1").await.is_err());
        // the entry is intact: the task was never deleted remotely
        assert!(manager.get("t1").await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_entry_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, events) = manager_with(dir.path(), Arc::new(NoopMonitor)).await;
        let mut rx = events.subscribe();

        let stub = StubTask::new("t1");
        manager.tasks.add(stub.clone()).await.unwrap();
        let exit = manager.delete(&ctx(), "t1").await.unwrap();
        assert_eq!(exit.status, 0);
        assert!(stub.deleted.load(Ordering::SeqCst));
        assert!(manager.get("t1").await.unwrap_err().is_not_found());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "task.deleted");
        assert_eq!(event.data["id"], "t1");
    }

    #[tokio::test]
    async fn create_with_unlaunchable_shim_leaves_no_residue() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, events) = manager_with(dir.path(), Arc::new(NoopMonitor)).await;

        let opts = CreateOpts::new(b"{}".to_vec(), "io.keel.task.absentshim");
        assert!(manager.create(&ctx(), "t1", opts).await.is_err());

        // bundle rolled back, nothing registered, nothing announced
        assert!(!dir.path().join("root/default/t1").exists());
        assert!(!dir.path().join("state/default/t1").exists());
        assert!(manager.list().await.is_empty());
        assert_eq!(events.event_count(), 0);
    }

    #[tokio::test]
    async fn list_snapshots_current_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_with(dir.path(), Arc::new(NoopMonitor)).await;

        manager.tasks.add(StubTask::handle("t1")).await.unwrap();
        manager.tasks.add(StubTask::handle("t2")).await.unwrap();
        assert_eq!(manager.list().await.len(), 2);
    }
}
