use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use courier_core::validation::parse_datetime;
use courier_core::{ProviderRecord, SyncResult, LAST_SUCCESSFUL_SYNC_KEY};
use courier_db::{CatalogStore, DbError, DbResult, SyncStore};

use crate::provider::ProviderClient;

/// Error type for sync runs.
///
/// Provider failures are not errors here: they are recorded in the
/// returned `SyncResult`.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync storage error: {0}")]
    Storage(#[from] DbError),
}

/// Pulls changed events from the provider and merges them into the catalog.
pub struct SyncService<P: ProviderClient> {
    provider: P,
    catalog: CatalogStore,
    sync_store: SyncStore,
}

impl<P: ProviderClient> SyncService<P> {
    pub fn new(provider: P, catalog: CatalogStore, sync_store: SyncStore) -> Self {
        Self {
            provider,
            catalog,
            sync_store,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run one sync and return its persisted result.
    ///
    /// `full` ignores the watermark and pulls everything.
    /// The result row is always finalized once inserted. A storage error
    /// after that is recorded on the row before it is returned.
    pub async fn perform_sync(&self, full: bool) -> Result<SyncResult, SyncError> {
        let mut result = SyncResult::started(Utc::now());
        self.sync_store.insert_result(&result).await?;

        match self.run(&mut result, full).await {
            Ok(()) => Ok(result),
            Err(e) => {
                error!(sync_id = %result.id, "Sync failed: {}", e);
                result.fail(Utc::now(), &e);
                if let Err(update_err) = self.sync_store.update_result(&result).await {
                    warn!(sync_id = %result.id, "Failed to record sync failure: {}", update_err);
                }
                Err(e)
            }
        }
    }

    async fn run(&self, result: &mut SyncResult, full: bool) -> Result<(), SyncError> {
        let since = if full {
            None
        } else {
            self.get_last_sync_date().await?
        };
        info!(sync_id = %result.id, full, since = ?since, "Starting sync");

        let records = match self.provider.fetch_changes(since).await {
            Ok(records) => records,
            Err(e) => {
                warn!(sync_id = %result.id, "Sync aborted: {}", e);
                result.fail(Utc::now(), &e);
                self.sync_store.update_result(result).await?;
                return Ok(());
            }
        };

        let mut new_events = 0u32;
        let mut updated_events = 0u32;
        let mut errors = Vec::new();

        for raw in &records {
            let record = match ProviderRecord::from_value(raw) {
                Ok(record) => record,
                Err(e) => {
                    errors.push(format!(
                        "Invalid data for event {}: {}",
                        one_line(&ProviderRecord::raw_id(raw)),
                        one_line(&e.to_string())
                    ));
                    continue;
                }
            };

            match self.merge(&record).await {
                Ok(true) => new_events += 1,
                Ok(false) => updated_events += 1,
                Err(e) => errors.push(format!(
                    "Error processing event {}: {}",
                    record.id,
                    one_line(&e.to_string())
                )),
            }
        }

        for line in &errors {
            warn!(sync_id = %result.id, "{}", line);
        }

        result.complete(Utc::now(), new_events, updated_events, &errors);
        self.sync_store.update_result(result).await?;

        if result.is_success {
            if let Some(finished_at) = result.finished_at {
                self.save_last_sync_date(finished_at).await?;
            }
        }

        info!(
            sync_id = %result.id,
            received = records.len(),
            new_events,
            updated_events,
            errors = errors.len(),
            "Sync finished"
        );
        Ok(())
    }

    /// Merge one record: get-or-create its place, then its event.
    /// Returns true if the event was created.
    async fn merge(&self, record: &ProviderRecord) -> DbResult<bool> {
        let mut tx = self.catalog.pool().begin().await?;

        let (place, place_created) =
            CatalogStore::get_or_create_place(&mut tx, record.place.id, &record.place.name).await?;
        if place_created {
            debug!(place_id = %place.id, "Created place from provider");
        }

        let (event, created) = CatalogStore::get_or_create_event(
            &mut tx,
            record.id,
            &record.name,
            record.event_date,
            record.status,
            Some(place.id),
        )
        .await?;

        tx.commit().await?;
        debug!(event_id = %event.id, created, "Merged provider event");
        Ok(created)
    }

    /// Watermark for incremental syncs. See [`load_watermark`].
    pub async fn get_last_sync_date(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        load_watermark(&self.sync_store).await
    }

    pub async fn save_last_sync_date(&self, ts: DateTime<Utc>) -> Result<(), SyncError> {
        self.sync_store
            .put_setting(
                LAST_SUCCESSFUL_SYNC_KEY,
                &ts.to_rfc3339(),
                "Timestamp of the last successful sync",
            )
            .await?;
        Ok(())
    }

    /// Run incremental syncs every `interval` until `shutdown` turns true.
    pub async fn run_periodic(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "Periodic sync started");

        while !*shutdown.borrow() {
            match self.perform_sync(false).await {
                Ok(result) if result.is_success => {
                    if result.new_events_count > 0 || result.updated_events_count > 0 {
                        info!(
                            "Synced {} new and {} updated events",
                            result.new_events_count, result.updated_events_count
                        );
                    }
                }
                Ok(result) => {
                    warn!("Sync finished with errors: {}", result.error_message);
                }
                Err(e) => {
                    error!("Sync error: {}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.wait_for(|stopped| *stopped) => break,
            }
        }

        info!("Periodic sync stopped");
    }
}

/// Watermark for incremental syncs.
///
/// The stored setting wins; otherwise the most recent successful run's
/// finish time; otherwise none.
pub async fn load_watermark(sync_store: &SyncStore) -> Result<Option<DateTime<Utc>>, SyncError> {
    if let Some(setting) = sync_store.get_setting(LAST_SUCCESSFUL_SYNC_KEY).await? {
        match parse_datetime(&setting.value) {
            Some(ts) => return Ok(Some(ts)),
            None => warn!(
                value = %setting.value,
                "Ignoring unparseable {} setting", LAST_SUCCESSFUL_SYNC_KEY
            ),
        }
    }

    let latest = sync_store.latest_success().await?;
    Ok(latest.and_then(|r| r.finished_at))
}

/// Error lines are joined with newlines, so each must stay on one line.
fn one_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
