//! Lifecycle event system

mod bus;
mod types;

pub use bus::{EventBus, EventBusConfig};
pub use types::{EventCategory, EventId, RuntimeEvent};
