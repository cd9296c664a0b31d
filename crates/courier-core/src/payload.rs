use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::catalog::Event;
use crate::message::Payload;

/// Discriminator carried in the `action` field of event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    EventCreated,
    EventUpdated,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::EventCreated => "event_created",
            EventAction::EventUpdated => "event_updated",
        }
    }

    /// Name of the timestamp field that accompanies this action.
    pub fn timestamp_field(&self) -> &'static str {
        match self {
            EventAction::EventCreated => "created_at",
            EventAction::EventUpdated => "updated_at",
        }
    }
}

/// Builder for the canonical event notification payload.
///
/// The payload is self-contained: consumers never need to look anything up.
/// Each payload gets a fresh `message_id` that consumers use to deduplicate.
pub struct EventPayload;

impl EventPayload {
    pub fn build(event: &Event, action: EventAction) -> Payload {
        let timestamp = match action {
            EventAction::EventCreated => event.created_at,
            EventAction::EventUpdated => event.updated_at,
        };

        let mut payload = Payload::new();
        payload.insert("message_id".into(), json!(Uuid::new_v4().to_string()));
        payload.insert("event_id".into(), json!(event.id.to_string()));
        payload.insert("event_name".into(), json!(event.name));
        payload.insert("event_date".into(), json!(event.event_date.to_rfc3339()));
        payload.insert("status".into(), json!(event.status.as_str()));
        payload.insert(
            "place_id".into(),
            event
                .place
                .as_ref()
                .map_or(Value::Null, |p| json!(p.id.to_string())),
        );
        payload.insert(
            "place_name".into(),
            event.place.as_ref().map_or(Value::Null, |p| json!(p.name)),
        );
        payload.insert(
            action.timestamp_field().into(),
            json!(timestamp.to_rfc3339()),
        );
        payload.insert("action".into(), json!(action.as_str()));
        payload
    }

    pub fn event_created(event: &Event) -> Payload {
        Self::build(event, EventAction::EventCreated)
    }

    pub fn event_updated(event: &Event) -> Payload {
        Self::build(event, EventAction::EventUpdated)
    }
}
