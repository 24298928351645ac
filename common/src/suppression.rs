// Email suppression gate and consolidated capability checks
//
// The email jobs consult this gate right before sending; a denial silently
// no-ops the job. A send is allowed when the recipient's address is active
// (no bounce/complaint suppression) AND the user's tier still has daily
// email quota left. The same service carries the subscription-creation
// check so every capability decision lives behind one interface.

use crate::db::repositories::email_log::EmailLogRepository;
use crate::db::repositories::subscription::SubscriptionRepository;
use crate::db::repositories::user::UserRepository;
use crate::errors::DatabaseError;
use crate::models::User;
use crate::tiers::{Tier, TierCatalog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

/// Outcome of a capability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Gate consulted before any outbound notification
#[async_trait]
pub trait EmailSuppressionGate: Send + Sync {
    async fn can_send(&self, user: &User) -> Result<PolicyDecision, DatabaseError>;
}

/// Pure send decision given the counts already in hand
pub fn evaluate_send(user: &User, tier: &Tier, sent_today: i64) -> PolicyDecision {
    if !user.can_receive_emails() {
        return PolicyDecision::deny(format!("email status is {}", user.email_status));
    }

    if tier.unlimited_emails() {
        return PolicyDecision::allow();
    }

    if sent_today >= tier.max_emails_per_day {
        return PolicyDecision::deny(format!(
            "daily email limit of {} reached",
            tier.max_emails_per_day
        ));
    }

    PolicyDecision::allow()
}

/// Pure subscription-creation decision
pub fn evaluate_create(tier: &Tier, current_subscriptions: i64) -> PolicyDecision {
    if tier.unlimited_subscriptions() {
        return PolicyDecision::allow();
    }

    if current_subscriptions >= tier.max_subscriptions {
        return PolicyDecision::deny(format!(
            "subscription limit of {} reached",
            tier.max_subscriptions
        ));
    }

    PolicyDecision::allow()
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists")
        .and_utc()
}

/// Policy service backed by the tier catalog and the email log
pub struct SuppressionPolicy {
    catalog: TierCatalog,
    email_logs: Arc<EmailLogRepository>,
    subscriptions: Arc<SubscriptionRepository>,
}

impl SuppressionPolicy {
    pub fn new(
        catalog: TierCatalog,
        email_logs: Arc<EmailLogRepository>,
        subscriptions: Arc<SubscriptionRepository>,
    ) -> Self {
        Self {
            catalog,
            email_logs,
            subscriptions,
        }
    }

    /// Capability check for the external CRUD surface
    pub async fn can_create_subscription(
        &self,
        user: &User,
    ) -> Result<PolicyDecision, DatabaseError> {
        let tier = self.catalog.get(&user.tier);
        let current = self.subscriptions.count_for_user(user.id).await?;
        Ok(evaluate_create(tier, current))
    }
}

#[async_trait]
impl EmailSuppressionGate for SuppressionPolicy {
    async fn can_send(&self, user: &User) -> Result<PolicyDecision, DatabaseError> {
        let tier = self.catalog.get(&user.tier);

        // Only query the quota when the decision can still depend on it
        let sent_today = if user.can_receive_emails() && !tier.unlimited_emails() {
            self.email_logs
                .count_sent_since(user.id, start_of_day(Utc::now()))
                .await?
        } else {
            0
        };

        Ok(evaluate_send(user, tier, sent_today))
    }
}

/// Bounce classification from the provider notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceKind {
    /// Permanent delivery failure; suppresses immediately
    Hard,
    /// Transient failure; suppresses after repeated occurrences
    Soft,
}

/// Write side of suppression: applies provider bounce/complaint
/// notifications to the user and pulls their subscriptions out of the
/// scan set. The webhook surface that parses and authenticates provider
/// payloads lives outside this crate and calls in here.
pub struct BounceProcessor {
    users: Arc<UserRepository>,
    subscriptions: Arc<SubscriptionRepository>,
}

impl BounceProcessor {
    pub fn new(users: Arc<UserRepository>, subscriptions: Arc<SubscriptionRepository>) -> Self {
        Self {
            users,
            subscriptions,
        }
    }

    #[instrument(skip(self))]
    pub async fn process_bounce(
        &self,
        email: &str,
        kind: BounceKind,
    ) -> Result<(), DatabaseError> {
        let Some(user) = self
            .users
            .mark_bounced(email, kind == BounceKind::Hard)
            .await?
        else {
            return Ok(());
        };

        if !user.can_receive_emails() {
            let disabled = self.subscriptions.disable_for_user(user.id).await?;
            info!(user_id = %user.id, disabled, "Disabled subscriptions after bounce");
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn process_complaint(&self, email: &str) -> Result<(), DatabaseError> {
        let Some(user) = self.users.mark_complained(email).await? else {
            return Ok(());
        };

        let disabled = self.subscriptions.disable_for_user(user.id).await?;
        info!(user_id = %user.id, disabled, "Disabled subscriptions after complaint");

        Ok(())
    }
}
