// User repository: recipient lookup and email-status lifecycle

use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::User;
use chrono::Utc;
use tracing::{instrument, warn};
use uuid::Uuid;

const USER_COLUMNS: &str = r#"
    id, email, email_status, bounce_count, tier,
    email_status_updated_at, created_at, updated_at
"#;

/// Repository for user rows
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(user)
    }

    /// Persist the suppression columns after a status transition
    async fn save_email_status(&self, user: &User) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email_status = $2,
                bounce_count = $3,
                email_status_updated_at = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(user.email_status.to_string())
        .bind(user.bounce_count)
        .bind(user.email_status_updated_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "User not found: {}",
                user.id
            )));
        }

        Ok(())
    }

    /// Record a bounce for the address; returns the updated user, or None
    /// when the address is unknown (provider webhooks mention addresses we
    /// never sent to).
    #[instrument(skip(self))]
    pub async fn mark_bounced(
        &self,
        email: &str,
        hard: bool,
    ) -> Result<Option<User>, DatabaseError> {
        let Some(mut user) = self.find_by_email(email).await? else {
            warn!(email, "Bounce received for unknown email");
            return Ok(None);
        };

        user.apply_bounce(hard, Utc::now());
        self.save_email_status(&user).await?;

        tracing::info!(
            user_id = %user.id,
            email_status = %user.email_status,
            bounce_count = user.bounce_count,
            "Email bounce recorded"
        );
        Ok(Some(user))
    }

    /// Record a spam complaint for the address
    #[instrument(skip(self))]
    pub async fn mark_complained(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let Some(mut user) = self.find_by_email(email).await? else {
            warn!(email, "Complaint received for unknown email");
            return Ok(None);
        };

        user.apply_complaint(Utc::now());
        self.save_email_status(&user).await?;

        tracing::info!(user_id = %user.id, "Email complaint recorded");
        Ok(Some(user))
    }

    /// Admin reactivation of a suppressed address
    #[instrument(skip(self))]
    pub async fn reactivate(&self, id: Uuid) -> Result<(), DatabaseError> {
        let Some(mut user) = self.find_by_id(id).await? else {
            return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
        };

        user.reactivate(Utc::now());
        self.save_email_status(&user).await?;

        tracing::info!(user_id = %id, "User email reactivated");
        Ok(())
    }
}
