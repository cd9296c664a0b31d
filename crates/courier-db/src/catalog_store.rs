//! Places and events.
//!
//! Local writes go through [`CatalogStore::create_event`] and
//! [`CatalogStore::update_event`], which stage the matching outbox message in
//! the same transaction. Sync merges use the get-or-create helpers on the
//! caller's transaction.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use courier_core::{Event, EventChanges, EventStatus, MessageId, NewEvent, Place};

use crate::error::{DbError, DbResult};
use crate::outbox_store::OutboxWriter;

#[derive(sqlx::FromRow)]
struct PlaceRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PlaceRow> for Place {
    type Error = DbError;

    fn try_from(row: PlaceRow) -> Result<Self, Self::Error> {
        Ok(Place {
            id: Uuid::parse_str(&row.id).map_err(|e| DbError::corrupt("places", e))?,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    name: String,
    event_date: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    place_id: Option<String>,
    place_name: Option<String>,
    place_created_at: Option<DateTime<Utc>>,
    place_updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<EventRow> for Event {
    type Error = DbError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let place = match (
            row.place_id,
            row.place_name,
            row.place_created_at,
            row.place_updated_at,
        ) {
            (Some(id), Some(name), Some(created_at), Some(updated_at)) => {
                Some(Place::try_from(PlaceRow {
                    id,
                    name,
                    created_at,
                    updated_at,
                })?)
            }
            _ => None,
        };

        Ok(Event {
            id: Uuid::parse_str(&row.id).map_err(|e| DbError::corrupt("events", e))?,
            name: row.name,
            event_date: row.event_date,
            status: row
                .status
                .parse::<EventStatus>()
                .map_err(|s| DbError::corrupt("events", format!("unknown status {s}")))?,
            place,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const EVENT_SELECT: &str = r#"
    SELECT e.id, e.name, e.event_date, e.status, e.created_at, e.updated_at,
           p.id AS place_id, p.name AS place_name,
           p.created_at AS place_created_at, p.updated_at AS place_updated_at
    FROM events e
    LEFT JOIN places p ON p.id = e.place_id
"#;

/// SQLite-backed store for places and events.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_place(&self, name: &str) -> DbResult<Place> {
        let mut conn = self.pool.acquire().await?;
        let (place, _) = Self::get_or_create_place(&mut conn, Uuid::new_v4(), name).await?;
        Ok(place)
    }

    pub async fn get_place(&self, id: Uuid) -> DbResult<Option<Place>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_place(&mut conn, id).await
    }

    pub async fn get_event(&self, id: Uuid) -> DbResult<Option<Event>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_event(&mut conn, id).await
    }

    /// Events ordered by date, soonest first.
    pub async fn list_events(&self, limit: u32) -> DbResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "{EVENT_SELECT} ORDER BY e.event_date ASC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    pub async fn count_events(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn count_places(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM places")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Create an event and stage its `event_created` message atomically.
    pub async fn create_event(&self, new_event: NewEvent) -> DbResult<(Event, MessageId)> {
        let mut tx = self.pool.begin().await?;

        if let Some(place_id) = new_event.place_id {
            Self::require_place(&mut tx, place_id).await?;
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO events (id, name, event_date, status, place_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&new_event.name)
        .bind(new_event.event_date)
        .bind(new_event.status.as_str())
        .bind(new_event.place_id.map(|p| p.to_string()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let event = Self::fetch_event(&mut tx, id)
            .await?
            .ok_or_else(|| not_found("event", id))?;
        let message_id = OutboxWriter::event_created(&mut tx, &event).await?;

        tx.commit().await?;
        Ok((event, message_id))
    }

    /// Apply changes to an event and stage its `event_updated` message atomically.
    pub async fn update_event(
        &self,
        id: Uuid,
        changes: EventChanges,
    ) -> DbResult<(Event, MessageId)> {
        let mut tx = self.pool.begin().await?;

        let existing = Self::fetch_event(&mut tx, id)
            .await?
            .ok_or_else(|| not_found("event", id))?;

        let place_id = match changes.place_id {
            Some(Some(place_id)) => {
                Self::require_place(&mut tx, place_id).await?;
                Some(place_id)
            }
            Some(None) => None,
            None => existing.place.as_ref().map(|p| p.id),
        };

        sqlx::query(
            r#"
            UPDATE events
            SET name = ?, event_date = ?, status = ?, place_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(changes.name.unwrap_or(existing.name))
        .bind(changes.event_date.unwrap_or(existing.event_date))
        .bind(changes.status.unwrap_or(existing.status).as_str())
        .bind(place_id.map(|p| p.to_string()))
        .bind(Utc::now().max(existing.updated_at))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        let event = Self::fetch_event(&mut tx, id)
            .await?
            .ok_or_else(|| not_found("event", id))?;
        let message_id = OutboxWriter::event_updated(&mut tx, &event).await?;

        tx.commit().await?;
        Ok((event, message_id))
    }

    /// Insert a place unless one with this id exists.
    /// Returns (place, created); an existing place keeps its fields.
    pub async fn get_or_create_place(
        conn: &mut SqliteConnection,
        id: Uuid,
        name: &str,
    ) -> DbResult<(Place, bool)> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO places (id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let created = result.rows_affected() > 0;
        let place = Self::fetch_place(conn, id)
            .await?
            .ok_or_else(|| not_found("place", id))?;
        Ok((place, created))
    }

    /// Insert an event unless one with this id exists.
    /// Returns (event, created); an existing event keeps its fields.
    pub async fn get_or_create_event(
        conn: &mut SqliteConnection,
        id: Uuid,
        name: &str,
        event_date: DateTime<Utc>,
        status: EventStatus,
        place_id: Option<Uuid>,
    ) -> DbResult<(Event, bool)> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO events (id, name, event_date, status, place_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(event_date)
        .bind(status.as_str())
        .bind(place_id.map(|p| p.to_string()))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let created = result.rows_affected() > 0;
        let event = Self::fetch_event(conn, id)
            .await?
            .ok_or_else(|| not_found("event", id))?;
        Ok((event, created))
    }

    async fn fetch_place(conn: &mut SqliteConnection, id: Uuid) -> DbResult<Option<Place>> {
        let row = sqlx::query_as::<_, PlaceRow>(
            "SELECT id, name, created_at, updated_at FROM places WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        row.map(Place::try_from).transpose()
    }

    async fn fetch_event(conn: &mut SqliteConnection, id: Uuid) -> DbResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!("{EVENT_SELECT} WHERE e.id = ?"))
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Event::try_from).transpose()
    }

    async fn require_place(conn: &mut SqliteConnection, id: Uuid) -> DbResult<()> {
        match Self::fetch_place(conn, id).await? {
            Some(_) => Ok(()),
            None => Err(not_found("place", id)),
        }
    }
}

fn not_found(entity: &'static str, id: Uuid) -> DbError {
    DbError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox_store::OutboxStore;
    use crate::pool::{init_pool, run_migrations};
    use chrono::TimeZone;
    use courier_core::DEFAULT_MAX_RETRIES;

    async fn setup() -> (CatalogStore, OutboxStore) {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        (CatalogStore::new(pool.clone()), OutboxStore::new(pool))
    }

    fn new_event(place_id: Option<Uuid>) -> NewEvent {
        NewEvent {
            name: "Jazz night".to_string(),
            event_date: Utc.with_ymd_and_hms(2025, 6, 1, 19, 30, 0).unwrap(),
            status: EventStatus::Open,
            place_id,
        }
    }

    #[tokio::test]
    async fn test_create_event_stages_message() {
        let (catalog, outbox) = setup().await;
        let place = catalog.create_place("Hall").await.unwrap();

        let (event, message_id) = catalog.create_event(new_event(Some(place.id))).await.unwrap();

        assert_eq!(event.place.as_ref().map(|p| p.id), Some(place.id));

        let message = outbox.get(message_id).await.unwrap().unwrap();
        assert_eq!(message.topic, "events");
        assert_eq!(message.payload["action"], "event_created");
        assert_eq!(message.payload["event_id"], event.id.to_string());
        assert_eq!(message.payload["place_name"], "Hall");
        assert!(!message.sent);
    }

    #[tokio::test]
    async fn test_create_event_with_missing_place_has_no_side_effects() {
        let (catalog, outbox) = setup().await;

        let err = catalog
            .create_event(new_event(Some(Uuid::new_v4())))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(catalog.count_events().await.unwrap(), 0);
        assert_eq!(outbox.stats(DEFAULT_MAX_RETRIES).await.unwrap().total_messages, 0);
    }

    #[tokio::test]
    async fn test_failed_domain_write_leaves_no_message() {
        let (catalog, outbox) = setup().await;

        // Violates the name length constraint.
        let mut event = new_event(None);
        event.name = "x".repeat(129);
        assert!(catalog.create_event(event).await.is_err());

        assert_eq!(catalog.count_events().await.unwrap(), 0);
        assert_eq!(outbox.stats(DEFAULT_MAX_RETRIES).await.unwrap().total_messages, 0);
    }

    #[tokio::test]
    async fn test_update_event_stages_message() {
        let (catalog, outbox) = setup().await;
        let place = catalog.create_place("Hall").await.unwrap();
        let (event, _) = catalog.create_event(new_event(Some(place.id))).await.unwrap();

        let changes = EventChanges {
            status: Some(EventStatus::Closed),
            place_id: Some(None),
            ..Default::default()
        };
        let (updated, message_id) = catalog.update_event(event.id, changes).await.unwrap();

        assert_eq!(updated.status, EventStatus::Closed);
        assert_eq!(updated.name, "Jazz night");
        assert!(updated.place.is_none());
        assert!(updated.updated_at >= event.updated_at);

        let message = outbox.get(message_id).await.unwrap().unwrap();
        assert_eq!(message.payload["action"], "event_updated");
        assert_eq!(message.payload["status"], "closed");
        assert!(message.payload["place_id"].is_null());
        assert_eq!(outbox.stats(DEFAULT_MAX_RETRIES).await.unwrap().total_messages, 2);
    }

    #[tokio::test]
    async fn test_update_missing_event() {
        let (catalog, outbox) = setup().await;

        let err = catalog
            .update_event(Uuid::new_v4(), EventChanges::default())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(outbox.stats(DEFAULT_MAX_RETRIES).await.unwrap().total_messages, 0);
    }

    #[tokio::test]
    async fn test_get_or_create_place_is_idempotent() {
        let (catalog, _) = setup().await;
        let id = Uuid::new_v4();
        let mut conn = catalog.pool().acquire().await.unwrap();

        let (place, created) = CatalogStore::get_or_create_place(&mut conn, id, "Hall")
            .await
            .unwrap();
        assert!(created);
        assert_eq!(place.name, "Hall");

        let (place, created) = CatalogStore::get_or_create_place(&mut conn, id, "Renamed")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(place.name, "Hall"); // Original values preserved

        assert_eq!(catalog.count_places().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_event_is_idempotent() {
        let (catalog, outbox) = setup().await;
        let place = catalog.create_place("Hall").await.unwrap();
        let id = Uuid::new_v4();
        let date = Utc.with_ymd_and_hms(2025, 6, 1, 19, 30, 0).unwrap();
        let mut conn = catalog.pool().acquire().await.unwrap();

        let (event, created) = CatalogStore::get_or_create_event(
            &mut conn,
            id,
            "Gig",
            date,
            EventStatus::Open,
            Some(place.id),
        )
        .await
        .unwrap();
        assert!(created);
        assert_eq!(event.event_date, date);

        let (event, created) = CatalogStore::get_or_create_event(
            &mut conn,
            id,
            "Other",
            date,
            EventStatus::Closed,
            None,
        )
        .await
        .unwrap();
        assert!(!created);
        assert_eq!(event.name, "Gig");
        assert_eq!(event.status, EventStatus::Open);

        assert_eq!(catalog.count_events().await.unwrap(), 1);
        // Merges never stage notifications.
        assert_eq!(outbox.stats(DEFAULT_MAX_RETRIES).await.unwrap().total_messages, 0);
    }

    #[tokio::test]
    async fn test_list_events_by_date() {
        let (catalog, _) = setup().await;

        let mut later = new_event(None);
        later.event_date = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        catalog.create_event(later).await.unwrap();
        catalog.create_event(new_event(None)).await.unwrap();

        let events = catalog.list_events(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].event_date < events[1].event_date);
    }
}
