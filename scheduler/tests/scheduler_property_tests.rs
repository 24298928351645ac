// Property-based tests for the scheduler component

use common::errors::QueueError;
use common::queue::{JobMessage, JobPayload, JobPublisher};
use common::scheduler::SchedulerConfig;
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

/// Mock job publisher that records what the engine would enqueue
struct MockJobPublisher {
    published: Arc<tokio::sync::Mutex<Vec<JobMessage>>>,
}

impl MockJobPublisher {
    fn new() -> Self {
        Self {
            published: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    async fn published(&self) -> Vec<JobMessage> {
        self.published.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl JobPublisher for MockJobPublisher {
    async fn publish(&self, message: &JobMessage) -> Result<(), QueueError> {
        self.published.lock().await.push(message.clone());
        Ok(())
    }

    async fn publish_with_retry(
        &self,
        message: &JobMessage,
        _max_retries: u32,
    ) -> Result<(), QueueError> {
        self.publish(message).await
    }
}

/// Any positive scheduler configuration is representable and preserved.
#[test]
fn property_scheduler_config_roundtrip() {
    proptest!(|(
        poll_interval_seconds in 1u64..3600u64,
        lock_ttl_seconds in 5u64..300u64,
        max_subscriptions_per_poll in 1usize..1000usize
    )| {
        let config = SchedulerConfig {
            poll_interval_seconds,
            lock_ttl_seconds,
            max_subscriptions_per_poll,
        };

        prop_assert_eq!(config.poll_interval_seconds, poll_interval_seconds);
        prop_assert_eq!(config.lock_ttl_seconds, lock_ttl_seconds);
        prop_assert_eq!(config.max_subscriptions_per_poll, max_subscriptions_per_poll);
    });
}

/// Publishing through the trait object records each message once, in order.
#[tokio::test]
async fn test_mock_publisher_records_messages() {
    let publisher = MockJobPublisher::new();

    for _ in 0..5 {
        let message = JobMessage::new(JobPayload::FetchSubscriptionData {
            subscription_id: Uuid::new_v4(),
        });
        publisher.publish(&message).await.unwrap();
    }

    let published = publisher.published().await;
    assert_eq!(published.len(), 5);
    assert!(published.iter().all(|m| m.payload.kind() == "fetch"));
}

/// Two dispatches of the same due window produce the same idempotency key,
/// so the stream dedups them; a different window produces a different key.
#[test]
fn property_dispatch_key_encodes_due_window() {
    proptest!(|(offset_mins in 0i64..10_000i64)| {
        let subscription_id = Uuid::new_v4();
        let next_run_at = chrono::Utc::now() + chrono::Duration::minutes(offset_mins);
        let window = next_run_at.to_rfc3339();

        let key_a = format!("fetch:{}:{}", subscription_id, window);
        let key_b = format!("fetch:{}:{}", subscription_id, window);
        prop_assert_eq!(&key_a, &key_b);

        let first_a = JobMessage::with_key(
            JobPayload::FetchSubscriptionData { subscription_id },
            key_a,
        );
        let first_b = JobMessage::with_key(
            JobPayload::FetchSubscriptionData { subscription_id },
            key_b,
        );
        prop_assert_eq!(first_a.idempotency_key.clone(), first_b.idempotency_key.clone());

        let other_window = JobMessage::with_key(
            JobPayload::FetchSubscriptionData { subscription_id },
            format!(
                "fetch:{}:{}",
                subscription_id,
                (next_run_at + chrono::Duration::minutes(1)).to_rfc3339()
            ),
        );
        prop_assert_ne!(first_a.idempotency_key.clone(), other_window.idempotency_key);
    });
}
