// Due-subscription scanner and fetch-job dispatch
//
// Runs on a poll interval. Each pass loads the enabled subscriptions,
// filters them through the cron evaluator and publishes one fetch job per
// due subscription. A short Redis lock per subscription keeps overlapping
// scheduler instances from double-dispatching the same due window; the
// pipeline itself stays at-least-once.

use crate::db::repositories::subscription::SubscriptionRepository;
use crate::errors::DatabaseError;
use crate::lock::DistributedLock;
use crate::models::Subscription;
use crate::queue::{JobMessage, JobPayload, JobPublisher};
use crate::schedule;
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, instrument};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to poll for due subscriptions (in seconds)
    pub poll_interval_seconds: u64,
    /// TTL for per-subscription dispatch locks (in seconds)
    pub lock_ttl_seconds: u64,
    /// Maximum number of subscriptions to dispatch per poll
    pub max_subscriptions_per_poll: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            lock_ttl_seconds: 30,
            max_subscriptions_per_poll: 500,
        }
    }
}

/// Scheduler trait
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start the polling loop; returns after shutdown.
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Stop the scheduler gracefully
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// One scan-and-dispatch pass; returns the number of jobs dispatched.
    async fn process_due_subscriptions(
        &self,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
}

/// Main scheduler engine
pub struct SchedulerEngine {
    config: SchedulerConfig,
    subscriptions: Arc<SubscriptionRepository>,
    lock: Arc<dyn DistributedLock>,
    publisher: Arc<dyn JobPublisher>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl SchedulerEngine {
    pub fn new(
        config: SchedulerConfig,
        subscriptions: Arc<SubscriptionRepository>,
        lock: Arc<dyn DistributedLock>,
        publisher: Arc<dyn JobPublisher>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);

        Self {
            config,
            subscriptions,
            lock,
            publisher,
            shutdown_tx,
        }
    }

    pub fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// The due set at `now`: enabled subscriptions whose schedule has come
    /// around. Read-only and idempotent; calling it twice before any job
    /// completes yields the same set.
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, DatabaseError> {
        let enabled = self.subscriptions.find_enabled().await?;
        let due: Vec<Subscription> = enabled
            .into_iter()
            .filter(|subscription| schedule::is_due(subscription, now))
            .collect();

        debug!(due = due.len(), "Scan complete");
        Ok(due)
    }

    /// Publish the fetch job for one due subscription.
    ///
    /// The idempotency key encodes the due window (`next_run_at`, or "first"
    /// for a never-run subscription), so a second dispatch of the same window
    /// dedupes at the stream.
    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id, name = %subscription.name))]
    async fn dispatch(
        &self,
        subscription: &Subscription,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let lock_resource = format!("dispatch:subscription:{}", subscription.id);
        let lock_ttl = Duration::from_secs(self.config.lock_ttl_seconds);

        let _guard = match self.lock.acquire(&lock_resource, lock_ttl).await {
            Ok(guard) => guard,
            Err(e) => {
                // Another scheduler instance is handling this subscription
                debug!(error = %e, "Dispatch lock busy, skipping");
                return Ok(());
            }
        };

        let due_window = subscription
            .next_run_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "first".to_string());
        let message = JobMessage::with_key(
            JobPayload::FetchSubscriptionData {
                subscription_id: subscription.id,
            },
            format!("fetch:{}:{}", subscription.id, due_window),
        );

        self.publisher.publish(&message).await?;
        telemetry::record_job_dispatched("fetch");

        info!(message_id = %message.id, "Fetch job dispatched");
        Ok(())
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            "Starting scheduler engine"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_seconds));
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    match self.process_due_subscriptions().await {
                        Ok(count) => {
                            if count > 0 {
                                info!(dispatched = count, "Dispatched due subscriptions");
                            } else {
                                debug!("No subscriptions due");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Error processing due subscriptions");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        info!("Scheduler engine stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let _ = self.shutdown_tx.send(());

        // Give in-flight dispatching a moment to finish
        sleep(Duration::from_secs(2)).await;

        info!("Scheduler engine stopped gracefully");
        Ok(())
    }

    /// One pass: scan, then dispatch each due subscription. One
    /// subscription's error never aborts the rest of the batch.
    #[instrument(skip(self))]
    async fn process_due_subscriptions(
        &self,
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let now = Utc::now();
        let due = self.scan(now).await?;

        telemetry::update_due_subscriptions(due.len() as i64);

        let mut dispatched = 0;
        for subscription in due.iter().take(self.config.max_subscriptions_per_poll) {
            match self.dispatch(subscription).await {
                Ok(()) => {
                    dispatched += 1;
                }
                Err(e) => {
                    error!(
                        subscription_id = %subscription.id,
                        name = %subscription.name,
                        error = %e,
                        "Failed to dispatch subscription"
                    );
                }
            }
        }

        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval_seconds, 60);
        assert_eq!(config.lock_ttl_seconds, 30);
        assert_eq!(config.max_subscriptions_per_poll, 500);
    }

    #[test]
    fn test_scheduler_config_custom() {
        let config = SchedulerConfig {
            poll_interval_seconds: 5,
            lock_ttl_seconds: 60,
            max_subscriptions_per_poll: 50,
        };
        assert_eq!(config.poll_interval_seconds, 5);
        assert_eq!(config.lock_ttl_seconds, 60);
        assert_eq!(config.max_subscriptions_per_poll, 50);
    }
}
