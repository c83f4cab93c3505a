//! # keel-foundation
//!
//! Foundation layer for keel:
//! - Error: central error taxonomy shared by every layer
//! - Context: namespace scoping for all path and address derivations
//! - Config: runtime configuration (roots, control address, timeouts)
//! - Event: lifecycle event bus (observability only, never load-bearing)

pub mod config;
pub mod context;
pub mod error;
pub mod event;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Context
// ============================================================================
pub use context::Context;

// ============================================================================
// Config
// ============================================================================
pub use config::RuntimeConfig;

// ============================================================================
// Event
// ============================================================================
pub use event::{EventBus, EventBusConfig, EventCategory, EventId, RuntimeEvent};
