use courier_core::{DeliveryError, Payload};

/// Destination for outbox messages (message bus, webhook, ...).
///
/// `Ok(true)` means delivered, `Ok(false)` means the sink declined the
/// message and it should be retried. Delivery is at-least-once, so
/// consumers deduplicate on the payload's `message_id`.
pub trait MessageSink: Send + Sync {
    fn send(
        &self,
        topic: &str,
        payload: &Payload,
    ) -> impl std::future::Future<Output = Result<bool, DeliveryError>> + Send;
}

/// Sink that only logs the message. Stands in for a real transport.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl MessageSink for LogSink {
    async fn send(&self, topic: &str, payload: &Payload) -> Result<bool, DeliveryError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| DeliveryError::Rejected {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(topic, payload = %body, "Delivered outbox message");
        Ok(true)
    }
}
