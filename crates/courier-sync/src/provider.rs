use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Default events endpoint of the external provider.
pub const DEFAULT_PROVIDER_URL: &str = "https://events.k3scluster.tech/api/events";

/// Error type for provider fetches.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// Trait for fetching changed event records from the provider.
///
/// Records are returned raw so one bad record cannot fail the whole fetch.
pub trait ProviderClient: Send + Sync {
    fn fetch_changes(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> impl std::future::Future<Output = Result<Vec<Value>, ProviderError>> + Send;
}

/// HTTP client for the provider's events endpoint.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProviderClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ProviderClient for HttpProviderClient {
    async fn fetch_changes(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, ProviderError> {
        let mut request = self.client.get(&self.base_url);
        if let Some(since) = since {
            // The provider filters by calendar day.
            request = request.query(&[("changed_at", since.format("%Y-%m-%d").to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

        match value {
            Value::Array(records) => Ok(records),
            other => Err(ProviderError::Malformed(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
