// Configuration management with layered sources (files, then environment)

use crate::tiers::{Tier, TierCatalog};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub nats: NatsConfig,
    pub scheduler: SchedulerConfig,
    pub fetch: FetchConfig,
    pub email: EmailConfig,
    /// Overrides the built-in tier catalog when present
    #[serde(default)]
    pub tiers: Option<HashMap<String, Tier>>,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    pub stream_name: String,
    pub consumer_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub poll_interval_seconds: u64,
    pub lock_ttl_seconds: u64,
    pub max_subscriptions_per_poll: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub max_content_length_bytes: usize,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// NATS subject prefix the external mailer consumes
    pub outbound_subject_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults file, local
    /// overrides, then `APP__`-prefixed environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// The tier catalog: configured override or the built-in one
    pub fn tier_catalog(&self) -> TierCatalog {
        match &self.tiers {
            Some(tiers) => TierCatalog::new(tiers.clone()),
            None => TierCatalog::builtin(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.redis.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }

        if self.nats.url.is_empty() {
            return Err("NATS URL cannot be empty".to_string());
        }
        if self.nats.stream_name.is_empty() {
            return Err("NATS stream_name cannot be empty".to_string());
        }

        if self.scheduler.poll_interval_seconds == 0 {
            return Err("Scheduler poll_interval_seconds must be greater than 0".to_string());
        }

        if self.fetch.timeout_ms == 0 {
            return Err("Fetch timeout_ms must be greater than 0".to_string());
        }
        if self.fetch.max_content_length_bytes == 0 {
            return Err("Fetch max_content_length_bytes must be greater than 0".to_string());
        }

        if self.email.outbound_subject_prefix.is_empty() {
            return Err("Email outbound_subject_prefix cannot be empty".to_string());
        }

        if let Some(tiers) = &self.tiers {
            if !tiers.contains_key(crate::tiers::DEFAULT_TIER) {
                return Err(format!(
                    "Tier catalog override must contain the '{}' tier",
                    crate::tiers::DEFAULT_TIER
                ));
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/pollcast".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
            },
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                stream_name: "POLLCAST_JOBS".to_string(),
                consumer_name: "pollcast-workers".to_string(),
            },
            scheduler: SchedulerConfig {
                poll_interval_seconds: 60,
                lock_ttl_seconds: 30,
                max_subscriptions_per_poll: 500,
            },
            fetch: FetchConfig {
                timeout_ms: 5000,
                max_content_length_bytes: 1024 * 1024,
            },
            email: EmailConfig {
                outbound_subject_prefix: "email.outbound".to_string(),
            },
            tiers: None,
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
                tracing_endpoint: None,
            },
        }
    }
}
