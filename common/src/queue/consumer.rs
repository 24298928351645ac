// Job consumption from NATS JetStream
//
// Failed handlers are negatively acknowledged with a delay from the retry
// policy, so redelivery follows the job backoff schedule. Once the budget
// is spent the message is terminated instead of redelivered.

use crate::errors::QueueError;
use crate::queue::nats::NatsClient;
use crate::queue::publisher::JobMessage;
use crate::retry::RetryStrategy;
use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::{AckKind, Message};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, instrument, warn};

/// Job consumer trait
#[async_trait::async_trait]
pub trait JobConsumer: Send + Sync {
    /// Consume jobs until shutdown is requested
    async fn start(&self) -> Result<(), QueueError>;

    /// Request graceful shutdown
    fn shutdown(&self);
}

/// Callback invoked per decoded job message
pub type JobHandler = Arc<
    dyn Fn(JobMessage) -> futures::future::BoxFuture<'static, Result<(), anyhow::Error>>
        + Send
        + Sync,
>;

/// NATS-based job consumer
pub struct NatsJobConsumer {
    consumer: PullConsumer,
    handler: JobHandler,
    retry: Arc<dyn RetryStrategy>,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl NatsJobConsumer {
    #[instrument(skip(client, handler, retry))]
    pub async fn new(
        client: &NatsClient,
        handler: JobHandler,
        retry: Arc<dyn RetryStrategy>,
    ) -> Result<Self, QueueError> {
        let consumer = client.get_or_create_consumer().await?;

        Ok(Self {
            consumer,
            handler,
            retry,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        })
    }

    #[instrument(skip(self, message), fields(
        stream_sequence = ?message.info().map(|i| i.stream_sequence),
    ))]
    async fn process_message(&self, message: Message) -> Result<(), QueueError> {
        let info = message
            .info()
            .map_err(|e| QueueError::ConsumeFailed(format!("Failed to get message info: {}", e)))?;
        let delivery_attempt = info.delivered.max(1) as u32;

        let job_message: JobMessage = match serde_json::from_slice(&message.payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                // A payload that never decodes will never decode; drop it.
                error!(error = %e, "Undecodable job message, terminating");
                message
                    .ack_with(AckKind::Term)
                    .await
                    .map_err(|e| QueueError::AckFailed(format!("Failed to terminate: {}", e)))?;
                return Err(QueueError::DeserializationFailed(e.to_string()));
            }
        };

        info!(
            message_id = %job_message.id,
            kind = job_message.payload.kind(),
            subscription_id = %job_message.payload.subscription_id(),
            delivery_attempt,
            "Processing job"
        );

        match (self.handler)(job_message.clone()).await {
            Ok(()) => {
                message
                    .ack()
                    .await
                    .map_err(|e| QueueError::AckFailed(format!("Failed to acknowledge: {}", e)))?;
                Ok(())
            }
            Err(e) => {
                error!(
                    message_id = %job_message.id,
                    kind = job_message.payload.kind(),
                    error = %e,
                    "Job processing failed"
                );

                match self.retry.next_delay(delivery_attempt) {
                    Some(delay) => {
                        message
                            .ack_with(AckKind::Nak(Some(delay)))
                            .await
                            .map_err(|e| {
                                QueueError::AckFailed(format!("Failed to Nak message: {}", e))
                            })?;
                        warn!(
                            delivery_attempt,
                            redelivery_delay_ms = delay.as_millis() as u64,
                            "Job scheduled for redelivery"
                        );
                    }
                    None => {
                        message.ack_with(AckKind::Term).await.map_err(|e| {
                            QueueError::AckFailed(format!("Failed to terminate message: {}", e))
                        })?;
                        warn!(delivery_attempt, "Retry budget exhausted, dropping job");
                    }
                }

                Err(QueueError::ConsumeFailed(format!(
                    "Job processing failed: {}",
                    e
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl JobConsumer for NatsJobConsumer {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), QueueError> {
        let mut messages = self.consumer.messages().await.map_err(|e| {
            QueueError::ConsumeFailed(format!("Failed to create message stream: {}", e))
        })?;

        info!("Consumer started, waiting for messages");

        loop {
            if self.shutdown_flag.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping consumer");
                break;
            }

            tokio::select! {
                message_result = messages.next() => {
                    match message_result {
                        Some(Ok(message)) => {
                            if let Err(e) = self.process_message(message).await {
                                error!(error = %e, "Failed to process message");
                                // Keep consuming; the message was Nak'd or Term'd
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Error receiving message");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        None => {
                            warn!("Message stream ended unexpectedly");
                            break;
                        }
                    }
                }
                _ = self.shutdown_notify.notified() => {
                    info!("Shutdown notification received");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    // Loop back to check the shutdown flag
                    continue;
                }
            }
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    fn shutdown(&self) {
        info!("Requesting consumer shutdown");
        self.shutdown_flag.store(true, Ordering::Relaxed);
        self.shutdown_notify.notify_waiters();
    }
}
