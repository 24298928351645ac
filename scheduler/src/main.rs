// Scheduler binary entry point

use common::config::Settings;
use common::db::repositories::SubscriptionRepository;
use common::db::{DbPool, RedisPool};
use common::lock::RedisLock;
use common::queue::{NatsClient, NatsJobPublisher};
use common::scheduler::{Scheduler, SchedulerConfig, SchedulerEngine};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration first so logging respects the configured level
    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    settings.validate().map_err(|e| {
        eprintln!("Invalid configuration: {}", e);
        e
    })?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;
    telemetry::init_metrics(settings.observability.metrics_port)?;

    info!("Starting pollcast scheduler");

    // Database pool
    let db_pool = DbPool::new(&settings.database).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database pool");
        e
    })?;

    // Redis for dispatch locks
    let redis_pool = RedisPool::new(&settings.redis).await.map_err(|e| {
        error!(error = %e, "Failed to initialize Redis connection");
        e
    })?;

    // NATS JetStream for job dispatch
    let nats_config = common::queue::NatsConfig {
        url: settings.nats.url.clone(),
        stream_name: settings.nats.stream_name.clone(),
        consumer_name: settings.nats.consumer_name.clone(),
        ..Default::default()
    };
    let nats_client = NatsClient::new(nats_config).await.map_err(|e| {
        error!(error = %e, "Failed to initialize NATS client");
        e
    })?;
    nats_client.initialize_stream().await.map_err(|e| {
        error!(error = %e, "Failed to initialize NATS stream");
        e
    })?;

    let subscriptions = Arc::new(SubscriptionRepository::new(db_pool));
    let lock = Arc::new(RedisLock::new(redis_pool)) as Arc<dyn common::lock::DistributedLock>;
    let publisher =
        Arc::new(NatsJobPublisher::new(nats_client)) as Arc<dyn common::queue::JobPublisher>;

    let scheduler_config = SchedulerConfig {
        poll_interval_seconds: settings.scheduler.poll_interval_seconds,
        lock_ttl_seconds: settings.scheduler.lock_ttl_seconds,
        max_subscriptions_per_poll: settings.scheduler.max_subscriptions_per_poll,
    };

    let scheduler = Arc::new(SchedulerEngine::new(
        scheduler_config,
        subscriptions,
        lock,
        publisher,
    ));
    info!("Scheduler engine created");

    // Graceful shutdown on Ctrl+C
    let scheduler_for_shutdown = Arc::clone(&scheduler);
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C signal, initiating graceful shutdown");
        if let Err(e) = scheduler_for_shutdown.stop().await {
            error!(error = %e, "Error during scheduler shutdown");
        }
    });

    info!("Starting scheduler polling loop");
    if let Err(e) = scheduler.start().await {
        error!(error = %e, "Scheduler error");
        return Err(e);
    }

    telemetry::shutdown_tracer();
    info!("Scheduler stopped");
    Ok(())
}
