// Email log repository: audit trail and quota accounting

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{EmailLog, NewEmailLog};
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

/// Repository for email log rows
pub struct EmailLogRepository {
    pool: DbPool,
}

impl EmailLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a log entry; the row's `sent_at` is the quota clock.
    #[instrument(skip(self, new), fields(user_id = %new.user_id, email_type = %new.email_type))]
    pub async fn create(&self, new: &NewEmailLog) -> Result<EmailLog, DatabaseError> {
        let log = EmailLog {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            subscription_id: new.subscription_id,
            email_type: new.email_type,
            subject: new.subject.clone(),
            recipient_email: new.recipient_email.clone(),
            sent_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO email_logs (
                id, user_id, subscription_id, email_type, subject,
                recipient_email, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.id)
        .bind(log.user_id)
        .bind(log.subscription_id)
        .bind(log.email_type.to_string())
        .bind(&log.subject)
        .bind(&log.recipient_email)
        .bind(log.sent_at)
        .execute(self.pool.pool())
        .await?;

        Ok(log)
    }

    /// Emails sent to a user since `since`; feeds the daily quota check.
    #[instrument(skip(self))]
    pub async fn count_sent_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM email_logs WHERE user_id = $1 AND sent_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(count.0)
    }
}
