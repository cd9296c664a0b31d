//! Courier Core - Domain models, payloads, and validation.
//!
//! This crate contains the domain types shared by the outbox and sync
//! machinery. It performs no I/O and has no dependencies on other Courier
//! crates.

pub mod catalog;
pub mod error;
pub mod message;
pub mod payload;
pub mod sync;
pub mod validation;

// Re-exports for convenience
pub use catalog::{Event, EventChanges, EventStatus, NewEvent, Place};
pub use error::{DeliveryError, ValidationError};
pub use message::{
    MessageId, OutboxHealth, OutboxMessage, OutboxStats, Payload, DEFAULT_MAX_RETRIES,
    EVENTS_TOPIC, HEALTH_PENDING_THRESHOLD,
};
pub use payload::{EventAction, EventPayload};
pub use sync::{SyncResult, SyncSetting, LAST_SUCCESSFUL_SYNC_KEY};
pub use validation::{ProviderPlace, ProviderRecord};
