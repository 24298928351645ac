// Property-based tests for failure tracking, retry policy and suppression

use chrono::Utc;
use common::models::{EmailStatus, Subscription, User};
use common::retry::{ExponentialBackoff, FixedDelay, RetryStrategy, MAX_ATTEMPTS};
use common::suppression::{evaluate_create, evaluate_send};
use common::tiers::TierCatalog;
use common::tracker::{apply_failure, apply_success, should_skip_fetch, SubscriptionHealth};
use proptest::prelude::*;
use std::time::Duration;
use uuid::Uuid;

fn subscription(failure_count: i32) -> Subscription {
    Subscription {
        id: Uuid::new_v4(),
        nid: "propnid001".to_string(),
        user_id: Uuid::new_v4(),
        name: "prop".to_string(),
        enabled: true,
        cron_expression: "0 6 * * *".to_string(),
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

fn user(email_status: EmailStatus, tier: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: "prop@example.com".to_string(),
        email_status,
        bounce_count: 0,
        tier: tier.to_string(),
        email_status_updated_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// The fetch gate opens exactly at the threshold and never below it.
#[test]
fn property_fetch_gate_tracks_threshold() {
    proptest!(|(failure_count in 0i32..100i32)| {
        let sub = subscription(failure_count);
        prop_assert_eq!(should_skip_fetch(&sub), failure_count >= 3);
        prop_assert_eq!(
            SubscriptionHealth::from_failure_count(failure_count) == SubscriptionHealth::Degraded,
            failure_count >= 3
        );
    });
}

/// N consecutive failures leave the counter at exactly N and never touch
/// the schedule columns.
#[test]
fn property_failures_accumulate_and_preserve_schedule() {
    proptest!(|(failures in 1usize..20usize)| {
        let mut sub = subscription(0);
        let pinned_next = Utc::now() + chrono::Duration::hours(1);
        sub.next_run_at = Some(pinned_next);
        sub.last_run_at = Some(Utc::now() - chrono::Duration::hours(23));
        let pinned_last = sub.last_run_at;

        for _ in 0..failures {
            apply_failure(&mut sub, Utc::now());
        }

        prop_assert_eq!(sub.failure_count, failures as i32);
        prop_assert!(sub.last_failure_at.is_some());
        prop_assert_eq!(sub.next_run_at, Some(pinned_next));
        prop_assert_eq!(sub.last_run_at, pinned_last);
    });
}

/// One success heals any amount of damage: counter zero, fresh schedule.
#[test]
fn property_success_always_heals() {
    proptest!(|(prior_failures in 0i32..1000i32)| {
        let mut sub = subscription(prior_failures);
        let now = Utc::now();

        apply_success(&mut sub, now);

        prop_assert_eq!(sub.failure_count, 0);
        prop_assert!(!should_skip_fetch(&sub));
        prop_assert_eq!(sub.last_run_at, Some(now));
        // Daily-at-06:00 schedule always has a next occurrence
        prop_assert!(sub.next_run_at.is_some());
        prop_assert!(sub.next_run_at.unwrap() > now);
    });
}

/// Backoff delays double per attempt and stop past the budget.
#[test]
fn property_backoff_schedule() {
    proptest!(|(attempt in 1u32..10u32)| {
        let strategy = ExponentialBackoff::with_config(2000, 1_000_000, 0.0);

        match strategy.next_delay(attempt) {
            Some(delay) => {
                prop_assert!(attempt < MAX_ATTEMPTS);
                let expected = 2000u64 * 2u64.pow(attempt - 1);
                prop_assert_eq!(delay, Duration::from_millis(expected));
            }
            None => prop_assert!(attempt >= MAX_ATTEMPTS),
        }
    });
}

/// Jittered delays never undershoot the base schedule and never exceed it
/// by more than the jitter factor.
#[test]
fn property_backoff_jitter_bounds() {
    proptest!(|(attempt in 1u32..MAX_ATTEMPTS)| {
        let strategy = ExponentialBackoff::new();
        let base = 2000u64 * 2u64.pow(attempt - 1);

        let delay = strategy.next_delay(attempt).unwrap().as_millis() as u64;
        prop_assert!(delay >= base);
        prop_assert!(delay <= base + base / 10);
    });
}

#[test]
fn property_fixed_delay_respects_budget() {
    proptest!(|(attempt in 0u32..10u32, delay_ms in 1u64..10_000u64)| {
        let strategy = FixedDelay::new(Duration::from_millis(delay_ms));
        match strategy.next_delay(attempt) {
            Some(delay) => {
                prop_assert!(attempt < MAX_ATTEMPTS);
                prop_assert_eq!(delay, Duration::from_millis(delay_ms));
            }
            None => prop_assert!(attempt >= MAX_ATTEMPTS),
        }
    });
}

/// A suppressed address is denied whatever the quota says; an active one is
/// denied exactly when the quota is spent.
#[test]
fn property_suppression_gate() {
    proptest!(|(
        sent_today in 0i64..2000i64,
        status in prop::sample::select(vec![
            EmailStatus::Active,
            EmailStatus::Bounced,
            EmailStatus::Complained,
            EmailStatus::Suppressed,
        ]),
        tier_key in prop::sample::select(vec!["free", "starter", "pro"])
    )| {
        let catalog = TierCatalog::builtin();
        let tier = catalog.get(tier_key);
        let decision = evaluate_send(&user(status, tier_key), tier, sent_today);

        if status != EmailStatus::Active {
            prop_assert!(!decision.allowed);
        } else {
            prop_assert_eq!(decision.allowed, sent_today < tier.max_emails_per_day);
        }
    });
}

/// Creation is allowed strictly below the tier's subscription cap.
#[test]
fn property_creation_cap() {
    proptest!(|(
        current in 0i64..100i64,
        tier_key in prop::sample::select(vec!["free", "starter", "pro"])
    )| {
        let catalog = TierCatalog::builtin();
        let tier = catalog.get(tier_key);
        let decision = evaluate_create(tier, current);
        prop_assert_eq!(decision.allowed, current < tier.max_subscriptions);
    });
}
