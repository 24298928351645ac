// Subscription repository

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{generate_nid, NewSubscription, Subscription};
use crate::schedule;
use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, nid, user_id, name, enabled, cron_expression, timezone, endpoint,
    last_run_at, next_run_at, failure_count, last_failure_at,
    created_at, updated_at
"#;

/// Repository for subscription rows
pub struct SubscriptionRepository {
    pool: DbPool,
}

impl SubscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// All subscriptions eligible for scanning. Disabled rows never surface
    /// here; Degraded ones do (the fetch job is the gate).
    #[instrument(skip(self))]
    pub async fn find_enabled(&self) -> Result<Vec<Subscription>, DatabaseError> {
        let subscriptions = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE enabled = true",
            SUBSCRIPTION_COLUMNS
        ))
        .fetch_all(self.pool.pool())
        .await?;

        tracing::debug!(count = subscriptions.len(), "Loaded enabled subscriptions");
        Ok(subscriptions)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>, DatabaseError> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(subscription)
    }

    /// Lookup by the short public identifier
    #[instrument(skip(self))]
    pub async fn find_by_nid(&self, nid: &str) -> Result<Option<Subscription>, DatabaseError> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE nid = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(nid)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(subscription)
    }

    /// Create a subscription: assigns id and nid, caches the first
    /// `next_run_at` (NULL when the expression does not parse).
    #[instrument(skip(self, new), fields(user_id = %new.user_id, name = %new.name))]
    pub async fn create(&self, new: &NewSubscription) -> Result<Subscription, DatabaseError> {
        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::new_v4(),
            nid: generate_nid(),
            user_id: new.user_id,
            name: new.name.clone(),
            enabled: new.enabled,
            cron_expression: new.cron_expression.clone(),
            timezone: new.timezone.clone(),
            endpoint: new.endpoint.clone(),
            last_run_at: None,
            next_run_at: schedule::calculate_next_run(&new.cron_expression, &new.timezone),
            failure_count: 0,
            last_failure_at: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(&format!(
            "INSERT INTO subscriptions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription.id)
        .bind(&subscription.nid)
        .bind(subscription.user_id)
        .bind(&subscription.name)
        .bind(subscription.enabled)
        .bind(&subscription.cron_expression)
        .bind(&subscription.timezone)
        .bind(&subscription.endpoint)
        .bind(subscription.last_run_at)
        .bind(subscription.next_run_at)
        .bind(subscription.failure_count)
        .bind(subscription.last_failure_at)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(subscription_id = %subscription.id, nid = %subscription.nid, "Subscription created");
        Ok(subscription)
    }

    /// Change the schedule; the cached next run is recomputed from the new
    /// expression, or cleared when it does not parse.
    #[instrument(skip(self))]
    pub async fn update_schedule(
        &self,
        id: Uuid,
        cron_expression: &str,
        timezone: &str,
    ) -> Result<(), DatabaseError> {
        let next_run_at = schedule::calculate_next_run(cron_expression, timezone);

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET cron_expression = $2,
                timezone = $3,
                next_run_at = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(cron_expression)
        .bind(timezone)
        .bind(next_run_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Subscription not found: {}",
                id
            )));
        }

        tracing::info!(subscription_id = %id, "Subscription schedule updated");
        Ok(())
    }

    /// Persist the run-state columns after a success/failure transition
    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id))]
    pub async fn update_run_state(
        &self,
        subscription: &Subscription,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET last_run_at = $2,
                next_run_at = $3,
                failure_count = $4,
                last_failure_at = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.last_run_at)
        .bind(subscription.next_run_at)
        .bind(subscription.failure_count)
        .bind(subscription.last_failure_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Subscription not found: {}",
                subscription.id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE subscriptions SET enabled = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(enabled)
                .execute(self.pool.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Subscription not found: {}",
                id
            )));
        }

        tracing::info!(subscription_id = %id, enabled, "Subscription toggled");
        Ok(())
    }

    /// Disable every enabled subscription of a user; returns how many rows
    /// changed. Used when an address bounces or complains.
    #[instrument(skip(self))]
    pub async fn disable_for_user(&self, user_id: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET enabled = false, updated_at = NOW() WHERE user_id = $1 AND enabled = true",
        )
        .bind(user_id)
        .execute(self.pool.pool())
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    pub async fn count_for_user(&self, user_id: Uuid) -> Result<i64, DatabaseError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(self.pool.pool())
                .await?;

        Ok(count.0)
    }
}
