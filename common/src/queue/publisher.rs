// Job publishing for NATS JetStream

use crate::errors::QueueError;
use crate::queue::nats::NatsClient;
use async_nats::jetstream::context::PublishAckFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// The work a queued job carries. Every variant names one subscription;
/// email jobs additionally carry everything they need so they never depend
/// on the fetch job still being around.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    FetchSubscriptionData {
        subscription_id: Uuid,
    },
    SendReportEmail {
        subscription_id: Uuid,
        data: serde_json::Value,
        fetched_at: DateTime<Utc>,
        status_code: u16,
    },
    SendFailureEmail {
        subscription_id: Uuid,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl JobPayload {
    /// Short kind tag used in queue subjects and logs
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::FetchSubscriptionData { .. } => "fetch",
            JobPayload::SendReportEmail { .. } => "email_report",
            JobPayload::SendFailureEmail { .. } => "email_failure",
        }
    }

    pub fn subscription_id(&self) -> Uuid {
        match self {
            JobPayload::FetchSubscriptionData { subscription_id }
            | JobPayload::SendReportEmail {
                subscription_id, ..
            }
            | JobPayload::SendFailureEmail {
                subscription_id, ..
            } => *subscription_id,
        }
    }
}

/// Envelope for a queued job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub id: Uuid,
    /// Queue-level dedup key (Nats-Msg-Id). Deterministic keys let a
    /// double-dispatched due window collapse to one delivery.
    pub idempotency_key: String,
    pub payload: JobPayload,
    pub published_at: DateTime<Utc>,
}

impl JobMessage {
    /// Message with a unique idempotency key
    pub fn new(payload: JobPayload) -> Self {
        let id = Uuid::new_v4();
        let idempotency_key = format!("{}:{}:{}", payload.kind(), payload.subscription_id(), id);
        Self {
            id,
            idempotency_key,
            payload,
            published_at: Utc::now(),
        }
    }

    /// Message with a caller-chosen idempotency key
    pub fn with_key(payload: JobPayload, idempotency_key: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            idempotency_key,
            payload,
            published_at: Utc::now(),
        }
    }
}

/// JobPublisher trait for enqueueing jobs
#[async_trait::async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, message: &JobMessage) -> Result<(), QueueError>;

    /// Publish with bounded in-process retries for transient queue errors
    async fn publish_with_retry(
        &self,
        message: &JobMessage,
        max_retries: u32,
    ) -> Result<(), QueueError>;
}

/// NATS-based job publisher
pub struct NatsJobPublisher {
    client: NatsClient,
    subject_prefix: String,
    publish_timeout: Duration,
}

impl NatsJobPublisher {
    pub fn new(client: NatsClient) -> Self {
        Self {
            client,
            subject_prefix: "jobs".to_string(),
            publish_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    fn subject_for(&self, message: &JobMessage) -> String {
        format!(
            "{}.{}.{}",
            self.subject_prefix,
            message.payload.kind(),
            message.payload.subscription_id()
        )
    }
}

#[async_trait::async_trait]
impl JobPublisher for NatsJobPublisher {
    #[instrument(skip(self, message), fields(
        message_id = %message.id,
        kind = message.payload.kind(),
        subscription_id = %message.payload.subscription_id(),
        idempotency_key = %message.idempotency_key
    ))]
    async fn publish(&self, message: &JobMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(message).map_err(|e| {
            QueueError::SerializationFailed(format!("Failed to serialize job message: {}", e))
        })?;

        let subject = self.subject_for(message);
        let jetstream = self.client.jetstream();

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", message.idempotency_key.as_str());
        headers.insert("Job-Kind", message.payload.kind());

        let publish_future: PublishAckFuture = jetstream
            .publish_with_headers(subject.clone(), headers, payload.into())
            .await
            .map_err(|e| QueueError::PublishFailed(format!("Failed to publish message: {}", e)))?;

        match tokio::time::timeout(self.publish_timeout, publish_future).await {
            Ok(Ok(_ack)) => {
                info!(subject = %subject, "Job published");
                Ok(())
            }
            Ok(Err(e)) => Err(QueueError::PublishFailed(format!(
                "Failed to get publish acknowledgment: {}",
                e
            ))),
            Err(_) => Err(QueueError::Timeout(format!(
                "Publish acknowledgment timeout after {:?}",
                self.publish_timeout
            ))),
        }
    }

    #[instrument(skip(self, message), fields(message_id = %message.id, max_retries))]
    async fn publish_with_retry(
        &self,
        message: &JobMessage,
        max_retries: u32,
    ) -> Result<(), QueueError> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= max_retries {
            match self.publish(message).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    last_error = Some(e);

                    if attempt <= max_retries {
                        let delay = Duration::from_millis(100 * 2_u64.pow(attempt - 1));
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Publish failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            QueueError::PublishFailed("Unknown error during publish with retry".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_message_kinds() {
        let id = Uuid::new_v4();
        let fetch = JobPayload::FetchSubscriptionData {
            subscription_id: id,
        };
        assert_eq!(fetch.kind(), "fetch");
        assert_eq!(fetch.subscription_id(), id);

        let report = JobPayload::SendReportEmail {
            subscription_id: id,
            data: serde_json::json!({"ok": true}),
            fetched_at: Utc::now(),
            status_code: 200,
        };
        assert_eq!(report.kind(), "email_report");

        let failure = JobPayload::SendFailureEmail {
            subscription_id: id,
            error: "boom".to_string(),
            failed_at: Utc::now(),
        };
        assert_eq!(failure.kind(), "email_failure");
    }

    #[test]
    fn test_job_message_serialization_round_trip() {
        let message = JobMessage::new(JobPayload::SendFailureEmail {
            subscription_id: Uuid::new_v4(),
            error: "Request failed: timeout (TIMEOUT)".to_string(),
            failed_at: Utc::now(),
        });

        let json = serde_json::to_vec(&message).unwrap();
        let decoded: JobMessage = serde_json::from_slice(&json).unwrap();

        assert_eq!(decoded.id, message.id);
        assert_eq!(decoded.idempotency_key, message.idempotency_key);
        assert_eq!(decoded.payload.kind(), "email_failure");
    }

    #[test]
    fn test_deterministic_key_dedupes_dispatch() {
        let subscription_id = Uuid::new_v4();
        let key = format!("fetch:{}:2026-08-08T12:00:00Z", subscription_id);
        let first = JobMessage::with_key(
            JobPayload::FetchSubscriptionData { subscription_id },
            key.clone(),
        );
        let second = JobMessage::with_key(
            JobPayload::FetchSubscriptionData { subscription_id },
            key.clone(),
        );

        // Distinct messages, same queue-level dedup identity
        assert_ne!(first.id, second.id);
        assert_eq!(first.idempotency_key, second.idempotency_key);
        assert_eq!(first.idempotency_key, key);
    }
}
