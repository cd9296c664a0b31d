use thiserror::Error;

/// A provider record that cannot be merged into local state.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not a valid UUID: {value}")]
    InvalidUuid { field: &'static str, value: String },

    #[error("field `{field}` is not a valid datetime: {value}")]
    InvalidDateTime { field: &'static str, value: String },

    #[error("field `{field}` must be a non-empty string")]
    EmptyString { field: &'static str },

    #[error("field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown status `{0}` (expected open or closed)")]
    InvalidStatus(String),
}

/// Failure to hand a message to a sink.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("sink rejected message on topic {topic}: {reason}")]
    Rejected { topic: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),
}
