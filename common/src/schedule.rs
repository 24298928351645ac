// Cron evaluation: expression validation, next-occurrence math, due-detection.
//
// Expressions are 5-field POSIX cron strings evaluated in the subscription's
// own IANA timezone. Invalid expressions never escape this module as panics
// or errors from the due-path: they degrade to "not due" / no next run.

use crate::errors::ScheduleError;
use crate::models::Subscription;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use tracing::error;

/// Structural pre-check for a cron expression: exactly 5 whitespace-separated
/// fields, each containing only digits, `*`, `,`, `-` or `/`.
///
/// Intentionally stricter than full cron grammar (no month/day names); some
/// theoretically-valid expressions are rejected. Cheap guard before the real
/// parser runs.
pub fn is_valid_expression(expression: &str) -> bool {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.chars().all(|c| matches!(c, '0'..='9' | '*' | ',' | '-' | '/')))
}

/// Parse a 5-field expression into a schedule.
///
/// The cron crate wants a seconds field, so a literal `0` is prepended after
/// the structural check passes; 5-field expressions fire at the top of the
/// minute.
fn parse_expression(expression: &str) -> Result<CronSchedule, ScheduleError> {
    if !is_valid_expression(expression) {
        return Err(ScheduleError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: "expected 5 fields of digits, '*', ',', '-' or '/'".to_string(),
        });
    }

    let with_seconds = format!("0 {}", expression);
    CronSchedule::from_str(&with_seconds).map_err(|e| ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve an IANA timezone name
pub fn parse_timezone(timezone: &str) -> Result<Tz, ScheduleError> {
    Tz::from_str(timezone).map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))
}

/// First occurrence of `expression` strictly after `reference`, evaluated in
/// `timezone`, returned in UTC.
pub fn next_occurrence(
    expression: &str,
    timezone: &str,
    reference: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let schedule = parse_expression(expression)?;
    let tz = parse_timezone(timezone)?;

    let reference_in_tz = reference.with_timezone(&tz);

    let next_in_tz =
        schedule
            .after(&reference_in_tz)
            .next()
            .ok_or_else(|| ScheduleError::NoNextOccurrence {
                expression: expression.to_string(),
            })?;

    Ok(next_in_tz.with_timezone(&Utc))
}

/// Next occurrence after now, or `None` when the expression or timezone is
/// unusable. Errors are logged, never propagated: callers store `NULL` and
/// move on.
pub fn calculate_next_run(expression: &str, timezone: &str) -> Option<DateTime<Utc>> {
    match next_occurrence(expression, timezone, Utc::now()) {
        Ok(next) => Some(next),
        Err(e) => {
            error!(expression, timezone, error = %e, "Failed to calculate next run");
            None
        }
    }
}

/// Whether a subscription is due at `now`.
///
/// 1. Never run -> due.
/// 2. Cached `next_run_at` -> due iff now has reached it.
/// 3. No cache -> recompute from `last_run_at`; computation errors mean
///    "not due" (fail safe, logged).
pub fn is_due(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    let Some(last_run_at) = subscription.last_run_at else {
        return true;
    };

    if let Some(next_run_at) = subscription.next_run_at {
        return now >= next_run_at;
    }

    match next_occurrence(&subscription.cron_expression, &subscription.timezone, last_run_at) {
        Ok(next) => now >= next,
        Err(e) => {
            error!(
                subscription_id = %subscription.id,
                expression = %subscription.cron_expression,
                error = %e,
                "Invalid cron expression, treating subscription as not due"
            );
            false
        }
    }
}
