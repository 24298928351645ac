// Per-subscription failure tracking
//
// A subscription is Healthy below the consecutive-failure threshold and
// Degraded at or above it. Degraded subscriptions are still scanned and
// dispatched, but the fetch job skips them without touching the network.
// Only a success resets the counter; `next_run_at` never advances on
// failure, so a Degraded subscription stays due until it recovers or is
// reset by an operator.

use crate::db::repositories::subscription::SubscriptionRepository;
use crate::errors::DatabaseError;
use crate::models::Subscription;
use crate::schedule;
use crate::telemetry::AlertNotifier;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, instrument, warn};

/// Consecutive failures after which fetch attempts are skipped
pub const FAILURE_THRESHOLD: u32 = 3;

/// Health of a subscription with respect to the failure threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionHealth {
    Healthy,
    Degraded,
}

impl SubscriptionHealth {
    pub fn from_failure_count(failure_count: i32) -> Self {
        if failure_count >= FAILURE_THRESHOLD as i32 {
            SubscriptionHealth::Degraded
        } else {
            SubscriptionHealth::Healthy
        }
    }
}

/// Whether the fetch job must short-circuit without a network call
pub fn should_skip_fetch(subscription: &Subscription) -> bool {
    SubscriptionHealth::from_failure_count(subscription.failure_count)
        == SubscriptionHealth::Degraded
}

/// Pure success transition: counter reset, run bookkeeping, fresh cached
/// next occurrence (None when the expression went bad since creation).
pub fn apply_success(subscription: &mut Subscription, now: DateTime<Utc>) {
    subscription.failure_count = 0;
    subscription.last_run_at = Some(now);
    subscription.next_run_at = match schedule::next_occurrence(
        &subscription.cron_expression,
        &subscription.timezone,
        now,
    ) {
        Ok(next) => Some(next),
        Err(e) => {
            error!(
                subscription_id = %subscription.id,
                error = %e,
                "Could not compute next run after success"
            );
            None
        }
    };
}

/// Pure failure transition: counter bump and failure timestamp. Deliberately
/// leaves `last_run_at`/`next_run_at` alone.
pub fn apply_failure(subscription: &mut Subscription, now: DateTime<Utc>) {
    subscription.failure_count += 1;
    subscription.last_failure_at = Some(now);
}

/// Applies the transitions and persists the resulting run state
pub struct FailureTracker {
    subscriptions: Arc<SubscriptionRepository>,
    alerts: Arc<dyn AlertNotifier>,
}

impl FailureTracker {
    pub fn new(subscriptions: Arc<SubscriptionRepository>, alerts: Arc<dyn AlertNotifier>) -> Self {
        Self {
            subscriptions,
            alerts,
        }
    }

    /// Record a successful fetch: Degraded goes back to Healthy.
    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id))]
    pub async fn record_success(
        &self,
        subscription: &mut Subscription,
    ) -> Result<(), DatabaseError> {
        apply_success(subscription, Utc::now());
        self.subscriptions.update_run_state(subscription).await
    }

    /// Record a failed fetch; alerts once the threshold is crossed.
    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id))]
    pub async fn record_failure(
        &self,
        subscription: &mut Subscription,
        reason: &str,
    ) -> Result<(), DatabaseError> {
        apply_failure(subscription, Utc::now());

        warn!(
            failure_count = subscription.failure_count,
            reason, "Subscription fetch failed"
        );

        if should_skip_fetch(subscription) {
            if let Err(e) = self
                .alerts
                .notify_degraded(subscription.id, &subscription.name, subscription.failure_count)
                .await
            {
                error!(error = %e, "Failed to send degraded-subscription alert");
            }
        }

        self.subscriptions.update_run_state(subscription).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn subscription(failure_count: i32) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            nid: "x1y2z3a4b5".to_string(),
            user_id: Uuid::new_v4(),
            name: "tracked".to_string(),
            enabled: true,
            cron_expression: "0 12 * * *".to_string(),
            timezone: "UTC".to_string(),
            endpoint: "https://api.example.com/data".to_string(),
            last_run_at: None,
            next_run_at: None,
            failure_count,
            last_failure_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_health_threshold() {
        assert_eq!(
            SubscriptionHealth::from_failure_count(0),
            SubscriptionHealth::Healthy
        );
        assert_eq!(
            SubscriptionHealth::from_failure_count(2),
            SubscriptionHealth::Healthy
        );
        assert_eq!(
            SubscriptionHealth::from_failure_count(3),
            SubscriptionHealth::Degraded
        );
        assert_eq!(
            SubscriptionHealth::from_failure_count(10),
            SubscriptionHealth::Degraded
        );
    }

    #[test]
    fn test_three_failures_degrade_then_skip() {
        let mut sub = subscription(0);
        let now = Utc::now();
        for _ in 0..3 {
            assert!(!should_skip_fetch(&sub));
            apply_failure(&mut sub, now);
        }
        assert_eq!(sub.failure_count, 3);
        assert!(should_skip_fetch(&sub));
        assert_eq!(sub.last_failure_at, Some(now));
    }

    #[test]
    fn test_failure_leaves_schedule_untouched() {
        let mut sub = subscription(0);
        let next = Utc::now() + chrono::Duration::hours(3);
        sub.last_run_at = Some(Utc::now());
        sub.next_run_at = Some(next);

        apply_failure(&mut sub, Utc::now());

        assert_eq!(sub.next_run_at, Some(next));
        assert!(sub.last_run_at.is_some());
    }

    #[test]
    fn test_success_resets_from_degraded() {
        let mut sub = subscription(5);
        let now = Utc::now();
        apply_success(&mut sub, now);

        assert_eq!(sub.failure_count, 0);
        assert!(!should_skip_fetch(&sub));
        assert_eq!(sub.last_run_at, Some(now));
        // next_run_at matches the evaluator's answer from the same instant
        let expected = schedule::next_occurrence("0 12 * * *", "UTC", now).unwrap();
        assert_eq!(sub.next_run_at, Some(expected));
    }

    #[test]
    fn test_success_with_broken_expression_clears_next_run() {
        let mut sub = subscription(1);
        sub.cron_expression = "bogus".to_string();
        apply_success(&mut sub, Utc::now());
        assert_eq!(sub.failure_count, 0);
        assert!(sub.next_run_at.is_none());
    }
}
