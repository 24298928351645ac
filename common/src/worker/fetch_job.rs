// Fetch job: the per-subscription unit of the pipeline
//
// Due -> Fetching -> { Succeeded -> report email queued,
//                      Failed    -> failure email queued }
//
// Degraded subscriptions (failure count at threshold) short-circuit before
// any network I/O: no fetch, no emails, nothing enqueued.

use crate::db::repositories::subscription::SubscriptionRepository;
use crate::fetch::SecureFetcher;
use crate::queue::{JobMessage, JobPayload, JobPublisher};
use crate::tracker::{self, FailureTracker, FAILURE_THRESHOLD};
use crate::telemetry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Executes one subscription fetch and its side effects
pub struct FetchSubscriptionJob {
    subscriptions: Arc<SubscriptionRepository>,
    tracker: Arc<FailureTracker>,
    fetcher: Arc<SecureFetcher>,
    publisher: Arc<dyn JobPublisher>,
}

impl FetchSubscriptionJob {
    pub fn new(
        subscriptions: Arc<SubscriptionRepository>,
        tracker: Arc<FailureTracker>,
        fetcher: Arc<SecureFetcher>,
        publisher: Arc<dyn JobPublisher>,
    ) -> Self {
        Self {
            subscriptions,
            tracker,
            fetcher,
            publisher,
        }
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn run(&self, subscription_id: Uuid) -> Result<(), anyhow::Error> {
        let Some(mut subscription) = self.subscriptions.find_by_id(subscription_id).await? else {
            // Deleted between dispatch and execution; nothing to retry.
            warn!("Subscription no longer exists, skipping");
            return Ok(());
        };

        if tracker::should_skip_fetch(&subscription) {
            warn!(
                failure_count = subscription.failure_count,
                threshold = FAILURE_THRESHOLD,
                "Skipping fetch, subscription is over the failure threshold"
            );
            return Ok(());
        }

        info!(name = %subscription.name, "Fetching data for subscription");
        let started = Instant::now();

        match self.fetcher.fetch(&subscription.endpoint).await {
            Ok(result) => {
                telemetry::record_fetch_success(&subscription.id);
                telemetry::record_fetch_duration(&subscription.id, started.elapsed().as_secs_f64());

                let message = JobMessage::new(JobPayload::SendReportEmail {
                    subscription_id,
                    data: result.data,
                    fetched_at: Utc::now(),
                    status_code: result.status,
                });
                self.publisher.publish(&message).await?;

                self.tracker.record_success(&mut subscription).await?;

                info!(status = result.status, "Report email queued");
                Ok(())
            }
            Err(fetch_error) => {
                let reason = fetch_error.to_string();
                telemetry::record_fetch_failure(&subscription.id, &reason);

                // Bookkeeping and notification must not mask the original
                // error; the queue retries the whole fetch job.
                if let Err(db_error) = self
                    .tracker
                    .record_failure(&mut subscription, &reason)
                    .await
                {
                    error!(error = %db_error, "Failed to record fetch failure");
                }

                let message = JobMessage::new(JobPayload::SendFailureEmail {
                    subscription_id,
                    error: reason,
                    failed_at: Utc::now(),
                });
                if let Err(queue_error) = self.publisher.publish(&message).await {
                    error!(error = %queue_error, "Failed to queue failure notification");
                }

                Err(fetch_error.into())
            }
        }
    }
}
