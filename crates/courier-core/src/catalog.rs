use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A venue that events may reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Open,
    Closed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Open => "open",
            EventStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(EventStatus::Open),
            "closed" => Ok(EventStatus::Closed),
            other => Err(other.to_string()),
        }
    }
}

/// An event with its place resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub event_date: DateTime<Utc>,
    pub status: EventStatus,
    pub place: Option<Place>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a local event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub event_date: DateTime<Utc>,
    pub status: EventStatus,
    pub place_id: Option<Uuid>,
}

/// Partial update of an event. `None` leaves a field unchanged;
/// `place_id: Some(None)` detaches the place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventChanges {
    pub name: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub status: Option<EventStatus>,
    pub place_id: Option<Option<Uuid>>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.event_date.is_none()
            && self.status.is_none()
            && self.place_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!("open".parse::<EventStatus>(), Ok(EventStatus::Open));
        assert_eq!("closed".parse::<EventStatus>(), Ok(EventStatus::Closed));
        assert!("Open".parse::<EventStatus>().is_err());
        assert!("".parse::<EventStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&EventStatus::Closed).unwrap();
        assert_eq!(json, "\"closed\"");
    }

    #[test]
    fn test_event_changes_is_empty() {
        assert!(EventChanges::default().is_empty());

        let detach = EventChanges {
            place_id: Some(None),
            ..Default::default()
        };
        assert!(!detach.is_empty());
    }
}
