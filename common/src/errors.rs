// Error handling framework

use thiserror::Error;

/// Schedule-related errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("No next occurrence for cron expression '{expression}'")]
    NoNextOccurrence { expression: String },
}

/// Endpoint URL validation errors
///
/// Applied to every user-supplied endpoint before any network I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("Invalid URL format")]
    InvalidFormat,

    #[error("Invalid URL: HTTPS is required")]
    HttpsRequired,

    #[error("Invalid URL: only HTTPS on port 443 is allowed")]
    Port443Required,

    #[error("Invalid URL: hostname is not allowed")]
    HostnameNotAllowed,

    #[error("Invalid URL: hostname must have a valid domain structure")]
    InvalidDomainStructure,

    #[error("Invalid URL: hostname {hostname} is not allowed")]
    BlockedHostname { hostname: String },

    #[error("Invalid URL: URL is too long ({length} chars)")]
    UrlTooLong { length: usize },
}

/// Outbound fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Validation(#[from] UrlValidationError),

    #[error("Request failed: {message} ({code})")]
    RequestFailed { message: String, code: String },

    #[error("Invalid content type: {content_type}. Only JSON responses are allowed.")]
    InvalidContentType { content_type: String },
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),
}

/// Redis storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Queue-related errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to connect to queue: {0}")]
    Connection(String),

    #[error("Failed to create stream: {0}")]
    StreamCreation(String),

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Failed to create consumer: {0}")]
    ConsumerCreation(String),

    #[error("Failed to publish message: {0}")]
    PublishFailed(String),

    #[error("Failed to consume message: {0}")]
    ConsumeFailed(String),

    #[error("Failed to acknowledge message: {0}")]
    AckFailed(String),

    #[error("Message serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Message deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Health check failed: {0}")]
    HealthCheck(String),

    #[error("Queue operation timeout: {0}")]
    Timeout(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some("23505") {
                    DatabaseError::DuplicateKey(db_err.message().to_string())
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::RedisError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_error_display() {
        let err = ScheduleError::InvalidCronExpression {
            expression: "* * * *".to_string(),
            reason: "wrong field count".to_string(),
        };
        assert!(err.to_string().contains("Invalid cron expression"));
    }

    #[test]
    fn test_url_validation_error_display() {
        let err = UrlValidationError::BlockedHostname {
            hostname: "metadata.google.internal".to_string(),
        };
        assert!(err.to_string().contains("metadata.google.internal"));
    }

    #[test]
    fn test_fetch_error_wraps_validation() {
        let err: FetchError = UrlValidationError::HttpsRequired.into();
        assert!(matches!(
            err,
            FetchError::Validation(UrlValidationError::HttpsRequired)
        ));
    }
}
