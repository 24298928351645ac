use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Subscription Models
// ============================================================================

/// Subscription represents a user's scheduled endpoint poll.
///
/// The scheduler core only ever mutates the run-state columns
/// (`last_run_at`, `next_run_at`, `failure_count`, `last_failure_at`);
/// everything else is owned by the external CRUD surface.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    /// Short public-facing identifier, safe to expose in URLs and emails.
    pub nid: String,
    pub user_id: Uuid,
    pub name: String,
    pub enabled: bool,
    /// 5-field POSIX cron expression (minute hour day-of-month month day-of-week).
    pub cron_expression: String,
    /// IANA timezone name the cron expression is evaluated in.
    pub timezone: String,
    /// User-supplied HTTPS endpoint. Untrusted input; validated before every fetch.
    pub endpoint: String,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Cached next cron occurrence strictly after `last_run_at`. Recomputed
    /// on every successful run and whenever the cron expression changes.
    pub next_run_at: Option<DateTime<Utc>>,
    pub failure_count: i32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a subscription; the repository fills in
/// identifiers, timestamps and the cached next run.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub name: String,
    pub cron_expression: String,
    pub timezone: String,
    pub endpoint: String,
    pub enabled: bool,
}

const NID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const NID_LENGTH: usize = 10;

/// Generate a short url-safe public identifier.
pub fn generate_nid() -> String {
    let mut rng = rand::thread_rng();
    (0..NID_LENGTH)
        .map(|_| NID_ALPHABET[rng.gen_range(0..NID_ALPHABET.len())] as char)
        .collect()
}

// ============================================================================
// User Models
// ============================================================================

/// EmailStatus tracks bounce/complaint suppression for a user's address
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Active,
    Bounced,
    Complained,
    Suppressed,
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailStatus::Active => write!(f, "active"),
            EmailStatus::Bounced => write!(f, "bounced"),
            EmailStatus::Complained => write!(f, "complained"),
            EmailStatus::Suppressed => write!(f, "suppressed"),
        }
    }
}

impl FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EmailStatus::Active),
            "bounced" => Ok(EmailStatus::Bounced),
            "complained" => Ok(EmailStatus::Complained),
            "suppressed" => Ok(EmailStatus::Suppressed),
            _ => Err(format!("Invalid email status: {}", s)),
        }
    }
}

impl TryFrom<String> for EmailStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// Number of soft bounces before an address is suppressed
pub const SOFT_BOUNCE_LIMIT: i32 = 3;

/// User account as seen by the scheduler core: the notification recipient
/// and the subject of suppression and tier checks.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub email_status: EmailStatus,
    pub bounce_count: i32,
    /// Billing tier key resolved against the injected tier catalog.
    pub tier: String,
    pub email_status_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether notifications may be delivered to this address at all.
    /// Quota checks are separate; this only reflects bounce/complaint state.
    pub fn can_receive_emails(&self) -> bool {
        self.email_status == EmailStatus::Active
    }

    /// Record a bounce. Hard bounces suppress immediately; soft bounces
    /// suppress once `SOFT_BOUNCE_LIMIT` is reached.
    pub fn apply_bounce(&mut self, hard: bool, now: DateTime<Utc>) {
        self.bounce_count += 1;
        self.email_status_updated_at = Some(now);
        if hard || self.bounce_count >= SOFT_BOUNCE_LIMIT {
            self.email_status = EmailStatus::Bounced;
        }
    }

    /// Record a spam complaint. Always suppresses.
    pub fn apply_complaint(&mut self, now: DateTime<Utc>) {
        self.email_status = EmailStatus::Complained;
        self.email_status_updated_at = Some(now);
    }

    /// Admin reactivation: back to active, bounce counter cleared.
    pub fn reactivate(&mut self, now: DateTime<Utc>) {
        self.email_status = EmailStatus::Active;
        self.email_status_updated_at = Some(now);
        self.bounce_count = 0;
    }
}

// ============================================================================
// Email Log Models
// ============================================================================

/// EmailType distinguishes report emails from failure notifications
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    Report,
    Failure,
}

impl std::fmt::Display for EmailType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailType::Report => write!(f, "report"),
            EmailType::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for EmailType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "report" => Ok(EmailType::Report),
            "failure" => Ok(EmailType::Failure),
            _ => Err(format!("Invalid email type: {}", s)),
        }
    }
}

impl TryFrom<String> for EmailType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// EmailLog is the audit record of an outbound notification. The daily
/// quota check counts rows in this table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub email_type: EmailType,
    pub subject: String,
    pub recipient_email: String,
    pub sent_at: DateTime<Utc>,
}

/// Fields needed to create an email log entry
#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub email_type: EmailType,
    pub subject: String,
    pub recipient_email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_nid_length_and_alphabet() {
        for _ in 0..50 {
            let nid = generate_nid();
            assert_eq!(nid.len(), NID_LENGTH);
            assert!(nid.bytes().all(|b| NID_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_email_status_round_trip() {
        for status in [
            EmailStatus::Active,
            EmailStatus::Bounced,
            EmailStatus::Complained,
            EmailStatus::Suppressed,
        ] {
            let parsed = EmailStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
        assert!(EmailStatus::from_str("unknown").is_err());
    }

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            email_status: EmailStatus::Active,
            bounce_count: 0,
            tier: "free".to_string(),
            email_status_updated_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_hard_bounce_suppresses_immediately() {
        let mut user = test_user();
        user.apply_bounce(true, Utc::now());
        assert_eq!(user.email_status, EmailStatus::Bounced);
        assert!(!user.can_receive_emails());
    }

    #[test]
    fn test_soft_bounces_suppress_at_limit() {
        let mut user = test_user();
        user.apply_bounce(false, Utc::now());
        user.apply_bounce(false, Utc::now());
        assert_eq!(user.email_status, EmailStatus::Active);
        user.apply_bounce(false, Utc::now());
        assert_eq!(user.email_status, EmailStatus::Bounced);
        assert_eq!(user.bounce_count, 3);
    }

    #[test]
    fn test_reactivate_clears_bounce_state() {
        let mut user = test_user();
        user.apply_bounce(true, Utc::now());
        user.reactivate(Utc::now());
        assert_eq!(user.email_status, EmailStatus::Active);
        assert_eq!(user.bounce_count, 0);
    }

    #[test]
    fn test_complaint_always_suppresses() {
        let mut user = test_user();
        user.apply_complaint(Utc::now());
        assert_eq!(user.email_status, EmailStatus::Complained);
        assert!(!user.can_receive_emails());
    }
}
