use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::EventStatus;
use crate::error::ValidationError;

/// Place reference inside a provider record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPlace {
    pub id: Uuid,
    pub name: String,
}

/// A validated entry from the provider's change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRecord {
    pub id: Uuid,
    pub name: String,
    pub event_date: DateTime<Utc>,
    pub status: EventStatus,
    pub place: ProviderPlace,
    pub changed_at: DateTime<Utc>,
}

impl ProviderRecord {
    /// Validate a raw provider record.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::WrongType {
            field: "record",
            expected: "object",
        })?;

        let id = uuid_field(object.get("id"), "id")?;
        let name = string_field(object.get("name"), "name")?;
        let event_date = datetime_field(object.get("event_date"), "event_date")?;
        let status_raw = string_field(object.get("status"), "status")?;
        let status = status_raw
            .parse::<EventStatus>()
            .map_err(ValidationError::InvalidStatus)?;

        let place = match object.get("place") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("place")),
            Some(Value::Object(place)) => ProviderPlace {
                id: uuid_field(place.get("id"), "place.id")?,
                name: string_field(place.get("name"), "place.name")?,
            },
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "place",
                    expected: "object",
                })
            }
        };

        let changed_at = datetime_field(object.get("changed_at"), "changed_at")?;

        Ok(Self {
            id,
            name,
            event_date,
            status,
            place,
            changed_at,
        })
    }

    /// Best-effort identifier of a raw record, for error reporting.
    pub fn raw_id(value: &Value) -> String {
        match value.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "<unknown>".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

fn string_field(value: Option<&Value>, field: &'static str) -> Result<String, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(ValidationError::EmptyString { field })
        }
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn uuid_field(value: Option<&Value>, field: &'static str) -> Result<Uuid, ValidationError> {
    let raw = string_field(value, field)?;
    Uuid::parse_str(&raw).map_err(|_| ValidationError::InvalidUuid { field, value: raw })
}

fn datetime_field(
    value: Option<&Value>,
    field: &'static str,
) -> Result<DateTime<Utc>, ValidationError> {
    let raw = string_field(value, field)?;
    parse_datetime(&raw).ok_or(ValidationError::InvalidDateTime { field, value: raw })
}

/// Parse an RFC 3339 timestamp, accepting naive timestamps as UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_record() -> Value {
        json!({
            "id": "6f1c6d0e-3b8e-4a4b-9a55-0b5f3c1b2a10",
            "name": "Jazz night",
            "event_date": "2025-06-01T19:30:00+00:00",
            "status": "open",
            "place": {
                "id": "0d7e2d5c-93a4-4a52-8e0e-3f0b8a1c9d11",
                "name": "Hall"
            },
            "changed_at": "2025-05-01T10:00:00Z"
        })
    }

    #[test]
    fn test_valid_record() {
        let record = ProviderRecord::from_value(&valid_record()).unwrap();
        assert_eq!(record.name, "Jazz night");
        assert_eq!(record.status, EventStatus::Open);
        assert_eq!(record.place.name, "Hall");
    }

    #[test]
    fn test_missing_fields() {
        for field in ["id", "name", "event_date", "status", "place", "changed_at"] {
            let mut record = valid_record();
            record.as_object_mut().unwrap().remove(field);
            assert!(
                ProviderRecord::from_value(&record).is_err(),
                "record without {field} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_values() {
        let mut record = valid_record();
        record["id"] = json!("not-a-uuid");
        assert!(matches!(
            ProviderRecord::from_value(&record),
            Err(ValidationError::InvalidUuid { field: "id", .. })
        ));

        let mut record = valid_record();
        record["status"] = json!("cancelled");
        assert_eq!(
            ProviderRecord::from_value(&record),
            Err(ValidationError::InvalidStatus("cancelled".to_string()))
        );

        let mut record = valid_record();
        record["place"]["name"] = json!("  ");
        assert_eq!(
            ProviderRecord::from_value(&record),
            Err(ValidationError::EmptyString {
                field: "place.name"
            })
        );

        let mut record = valid_record();
        record["event_date"] = json!("tomorrow");
        assert!(ProviderRecord::from_value(&record).is_err());

        assert!(ProviderRecord::from_value(&json!("scalar")).is_err());
    }

    #[test]
    fn test_parse_naive_datetime_as_utc() {
        let dt = parse_datetime("2025-06-01T19:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-06-01T19:30:00+00:00");
        assert!(parse_datetime("2025-06-01").is_none());
    }

    #[test]
    fn test_raw_id() {
        assert_eq!(ProviderRecord::raw_id(&json!({"id": "abc"})), "abc");
        assert_eq!(ProviderRecord::raw_id(&json!({"id": 7})), "7");
        assert_eq!(ProviderRecord::raw_id(&json!({})), "<unknown>");
    }
}
