//! Event types shared across keel layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event ID
// ============================================================================

/// Unique event id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a new random id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Category
// ============================================================================

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Runtime start/stop, configuration
    System,
    /// Task lifecycle (created, deleted, exited)
    Task,
    /// Error reports
    Error,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Task => "task",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// RuntimeEvent
// ============================================================================

/// A single lifecycle notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    /// Event id
    pub id: EventId,

    /// Event type (e.g. "task.created", "task.deleted")
    pub event_type: String,

    /// Category
    pub category: EventCategory,

    /// Namespace the event belongs to
    pub namespace: String,

    /// When the event was published
    pub timestamp: DateTime<Utc>,

    /// Structured payload
    pub data: Value,
}

impl RuntimeEvent {
    /// New event with an empty payload
    pub fn new(
        event_type: impl Into<String>,
        category: EventCategory,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            category,
            namespace: namespace.into(),
            timestamp: Utc::now(),
            data: Value::Null,
        }
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}
