// Notification jobs: report and failure emails
//
// Both jobs consult the suppression gate right before sending; a denial is
// a silent no-op (logged, counted), not an error. Rendering and provider
// delivery live in an external mailer service; these jobs write the audit
// log row and hand a fully-described message across the wire.

use crate::db::repositories::email_log::EmailLogRepository;
use crate::db::repositories::subscription::SubscriptionRepository;
use crate::db::repositories::user::UserRepository;
use crate::errors::QueueError;
use crate::models::{EmailType, NewEmailLog, Subscription, User};
use crate::suppression::EmailSuppressionGate;
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A fully-described notification handed to the external mailer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    /// Template key the mailer renders ("subscription_data", "subscription_failure")
    pub template: String,
    /// Audit row this send belongs to
    pub email_log_id: Uuid,
    pub data: serde_json::Value,
}

/// Boundary to the external mailer service
#[async_trait]
pub trait EmailDelivery: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), QueueError>;
}

/// Publishes outbound emails onto a NATS subject the mailer consumes
pub struct NatsEmailDelivery {
    client: async_nats::Client,
    subject_prefix: String,
}

impl NatsEmailDelivery {
    pub fn new(client: async_nats::Client, subject_prefix: impl Into<String>) -> Self {
        Self {
            client,
            subject_prefix: subject_prefix.into(),
        }
    }
}

#[async_trait]
impl EmailDelivery for NatsEmailDelivery {
    #[instrument(skip(self, email), fields(to = %email.to, template = %email.template))]
    async fn send(&self, email: &OutboundEmail) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(email).map_err(|e| {
            QueueError::SerializationFailed(format!("Failed to serialize email: {}", e))
        })?;

        let subject = format!("{}.{}", self.subject_prefix, email.template);
        self.client
            .publish(subject, payload.into())
            .await
            .map_err(|e| QueueError::PublishFailed(format!("Failed to publish email: {}", e)))?;

        info!("Email handed to mailer");
        Ok(())
    }
}

/// Shared load-and-gate step for both email jobs. `None` means the job
/// should silently skip (missing rows or a gate denial).
async fn load_recipient(
    subscriptions: &SubscriptionRepository,
    users: &UserRepository,
    gate: &dyn EmailSuppressionGate,
    subscription_id: Uuid,
    email_kind: &str,
) -> Result<Option<(Subscription, User)>, anyhow::Error> {
    let Some(subscription) = subscriptions.find_by_id(subscription_id).await? else {
        warn!(%subscription_id, "Subscription no longer exists, skipping email");
        return Ok(None);
    };

    let Some(user) = users.find_by_id(subscription.user_id).await? else {
        warn!(user_id = %subscription.user_id, "User no longer exists, skipping email");
        return Ok(None);
    };

    let decision = gate.can_send(&user).await?;
    if !decision.allowed {
        warn!(
            user_id = %user.id,
            reason = decision.reason.as_deref().unwrap_or("unspecified"),
            "Suppression gate denied {} email", email_kind
        );
        telemetry::record_email_suppressed(email_kind);
        return Ok(None);
    }

    Ok(Some((subscription, user)))
}

/// Sends the fetched-data report after a successful fetch
pub struct ReportEmailJob {
    subscriptions: Arc<SubscriptionRepository>,
    users: Arc<UserRepository>,
    email_logs: Arc<EmailLogRepository>,
    gate: Arc<dyn EmailSuppressionGate>,
    delivery: Arc<dyn EmailDelivery>,
}

impl ReportEmailJob {
    pub fn new(
        subscriptions: Arc<SubscriptionRepository>,
        users: Arc<UserRepository>,
        email_logs: Arc<EmailLogRepository>,
        gate: Arc<dyn EmailSuppressionGate>,
        delivery: Arc<dyn EmailDelivery>,
    ) -> Self {
        Self {
            subscriptions,
            users,
            email_logs,
            gate,
            delivery,
        }
    }

    #[instrument(skip(self, data), fields(subscription_id = %subscription_id))]
    pub async fn run(
        &self,
        subscription_id: Uuid,
        data: serde_json::Value,
        fetched_at: DateTime<Utc>,
        status_code: u16,
    ) -> Result<(), anyhow::Error> {
        let Some((subscription, user)) = load_recipient(
            &self.subscriptions,
            &self.users,
            self.gate.as_ref(),
            subscription_id,
            "report",
        )
        .await?
        else {
            return Ok(());
        };

        let subject = format!("{} - Data Update", subscription.name);
        let log = self
            .email_logs
            .create(&NewEmailLog {
                user_id: user.id,
                subscription_id: Some(subscription.id),
                email_type: EmailType::Report,
                subject: subject.clone(),
                recipient_email: user.email.clone(),
            })
            .await?;

        self.delivery
            .send(&OutboundEmail {
                to: user.email.clone(),
                subject,
                template: "subscription_data".to_string(),
                email_log_id: log.id,
                data: serde_json::json!({
                    "subscription": {
                        "nid": subscription.nid,
                        "name": subscription.name,
                        "endpoint": subscription.endpoint,
                    },
                    "fetchedData": data,
                    "fetchedAt": fetched_at,
                    "statusCode": status_code,
                }),
            })
            .await?;

        info!(email_log_id = %log.id, "Report email queued for delivery");
        Ok(())
    }
}

/// Notifies the owner that their endpoint fetch failed
pub struct FailureEmailJob {
    subscriptions: Arc<SubscriptionRepository>,
    users: Arc<UserRepository>,
    email_logs: Arc<EmailLogRepository>,
    gate: Arc<dyn EmailSuppressionGate>,
    delivery: Arc<dyn EmailDelivery>,
}

impl FailureEmailJob {
    pub fn new(
        subscriptions: Arc<SubscriptionRepository>,
        users: Arc<UserRepository>,
        email_logs: Arc<EmailLogRepository>,
        gate: Arc<dyn EmailSuppressionGate>,
        delivery: Arc<dyn EmailDelivery>,
    ) -> Self {
        Self {
            subscriptions,
            users,
            email_logs,
            gate,
            delivery,
        }
    }

    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn run(
        &self,
        subscription_id: Uuid,
        error: &str,
        failed_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        let Some((subscription, user)) = load_recipient(
            &self.subscriptions,
            &self.users,
            self.gate.as_ref(),
            subscription_id,
            "failure",
        )
        .await?
        else {
            return Ok(());
        };

        let subject = format!("{} - Fetch Failed", subscription.name);
        let log = self
            .email_logs
            .create(&NewEmailLog {
                user_id: user.id,
                subscription_id: Some(subscription.id),
                email_type: EmailType::Failure,
                subject: subject.clone(),
                recipient_email: user.email.clone(),
            })
            .await?;

        self.delivery
            .send(&OutboundEmail {
                to: user.email.clone(),
                subject,
                template: "subscription_failure".to_string(),
                email_log_id: log.id,
                data: serde_json::json!({
                    "subscription": {
                        "nid": subscription.nid,
                        "name": subscription.name,
                        "endpoint": subscription.endpoint,
                        "failureCount": subscription.failure_count,
                    },
                    "error": error,
                    "failedAt": failed_at,
                }),
            })
            .await?;

        info!(email_log_id = %log.id, "Failure email queued for delivery");
        Ok(())
    }
}
