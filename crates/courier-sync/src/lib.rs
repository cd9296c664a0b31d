//! Courier Sync - Pulls events from the external provider and merges them locally.

pub mod provider;
pub mod service;

pub use provider::{HttpProviderClient, ProviderClient, ProviderError, DEFAULT_PROVIDER_URL};
pub use service::{load_watermark, SyncError, SyncService};
