//! Task registry - concurrency-safe id to handle map
//!
//! The registry is the single serialization point for duplicate-create
//! rejection: of two concurrent creates for the same identifier, exactly one
//! `add` wins. All operations take one bounded critical section.

use crate::task::TaskHandle;
use keel_foundation::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared task directory
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, Arc<dyn TaskHandle>>>>,
}

impl TaskRegistry {
    /// New empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle; a present identifier is rejected, not overwritten
    pub async fn add(&self, task: Arc<dyn TaskHandle>) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let id = task.id().to_string();
        if tasks.contains_key(&id) {
            return Err(Error::Conflict(format!("task {} already exists", id)));
        }
        tasks.insert(id, task);
        Ok(())
    }

    /// Look up a handle by identifier
    pub async fn get(&self, id: &str) -> Result<Arc<dyn TaskHandle>> {
        let tasks = self.tasks.read().await;
        tasks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))
    }

    /// Remove a handle; safe to call for an absent identifier
    pub async fn remove(&self, id: &str) -> Option<Arc<dyn TaskHandle>> {
        let mut tasks = self.tasks.write().await;
        tasks.remove(id)
    }

    /// Snapshot of all handles at call time; no ordering guarantee
    pub async fn list(&self) -> Vec<Arc<dyn TaskHandle>> {
        let tasks = self.tasks.read().await;
        tasks.values().cloned().collect()
    }

    /// Number of registered tasks
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ExitStatus;
    use async_trait::async_trait;
    use chrono::Utc;

    #[derive(Debug)]
    struct StubTask {
        id: String,
    }

    impl StubTask {
        fn handle(id: &str) -> Arc<dyn TaskHandle> {
            Arc::new(StubTask { id: id.to_string() })
        }
    }

    #[async_trait]
    impl TaskHandle for StubTask {
        fn id(&self) -> &str {
            &self.id
        }

        fn pid(&self) -> Option<u32> {
            None
        }

        async fn delete(&self) -> Result<ExitStatus> {
            Ok(ExitStatus {
                status: 0,
                exited_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn add_get_remove() {
        let registry = TaskRegistry::new();
        registry.add(StubTask::handle("t1")).await.unwrap();

        assert_eq!(registry.get("t1").await.unwrap().id(), "t1");
        assert!(registry.get("t2").await.unwrap_err().is_not_found());

        assert!(registry.remove("t1").await.is_some());
        assert!(registry.remove("t1").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected() {
        let registry = TaskRegistry::new();
        registry.add(StubTask::handle("t1")).await.unwrap();
        let err = registry.add(StubTask::handle("t1")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_adds_one_winner() {
        let registry = TaskRegistry::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.add(StubTask::handle("same-id")).await
            }));
        }

        let mut winners = 0;
        for join in handles {
            if join.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn list_is_snapshot() {
        let registry = TaskRegistry::new();
        registry.add(StubTask::handle("t1")).await.unwrap();
        registry.add(StubTask::handle("t2")).await.unwrap();

        let snapshot = registry.list().await;
        assert_eq!(snapshot.len(), 2);
    }
}
