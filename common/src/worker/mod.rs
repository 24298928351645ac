// Worker module: queue consumption and job execution

pub mod email_job;
pub mod fetch_job;

pub use email_job::{EmailDelivery, FailureEmailJob, NatsEmailDelivery, OutboundEmail, ReportEmailJob};
pub use fetch_job::FetchSubscriptionJob;

use crate::errors::QueueError;
use crate::queue::{JobConsumer, JobHandler, JobMessage, JobPayload, NatsJobConsumer, NatsClient};
use crate::retry::RetryStrategy;
use std::sync::Arc;
use tracing::instrument;

/// Routes queued job messages to their handlers. Job types are registered
/// explicitly here; there is no dynamic lookup.
pub struct JobRegistry {
    fetch: FetchSubscriptionJob,
    report_email: ReportEmailJob,
    failure_email: FailureEmailJob,
}

impl JobRegistry {
    pub fn new(
        fetch: FetchSubscriptionJob,
        report_email: ReportEmailJob,
        failure_email: FailureEmailJob,
    ) -> Self {
        Self {
            fetch,
            report_email,
            failure_email,
        }
    }

    /// Run the job a message describes. Errors bubble to the consumer,
    /// which schedules redelivery.
    #[instrument(skip(self, message), fields(message_id = %message.id, kind = message.payload.kind()))]
    pub async fn dispatch(&self, message: JobMessage) -> Result<(), anyhow::Error> {
        match message.payload {
            JobPayload::FetchSubscriptionData { subscription_id } => {
                self.fetch.run(subscription_id).await
            }
            JobPayload::SendReportEmail {
                subscription_id,
                data,
                fetched_at,
                status_code,
            } => {
                self.report_email
                    .run(subscription_id, data, fetched_at, status_code)
                    .await
            }
            JobPayload::SendFailureEmail {
                subscription_id,
                error,
                failed_at,
            } => {
                self.failure_email
                    .run(subscription_id, &error, failed_at)
                    .await
            }
        }
    }
}

/// Wires the job registry into a NATS consumer
pub struct WorkerJobConsumer {
    consumer: NatsJobConsumer,
}

impl WorkerJobConsumer {
    pub async fn new(
        client: &NatsClient,
        registry: Arc<JobRegistry>,
        retry: Arc<dyn RetryStrategy>,
    ) -> Result<Self, QueueError> {
        let handler: JobHandler = Arc::new(move |message| {
            let registry = Arc::clone(&registry);
            Box::pin(async move { registry.dispatch(message).await })
        });

        let consumer = NatsJobConsumer::new(client, handler, retry).await?;

        Ok(Self { consumer })
    }

    pub async fn start(&self) -> Result<(), QueueError> {
        self.consumer.start().await
    }

    pub fn shutdown(&self) {
        self.consumer.shutdown();
    }
}
