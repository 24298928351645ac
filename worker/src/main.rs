// Worker binary entry point

use anyhow::Result;
use common::config::Settings;
use common::db::repositories::{EmailLogRepository, SubscriptionRepository, UserRepository};
use common::db::DbPool;
use common::fetch::{FetchOptions, SecureFetcher};
use common::queue::{JobPublisher, NatsClient, NatsConfig, NatsJobPublisher};
use common::retry::ExponentialBackoff;
use common::suppression::SuppressionPolicy;
use common::telemetry::{self, LogAlertNotifier};
use common::tracker::FailureTracker;
use common::worker::{
    EmailDelivery, FailureEmailJob, FetchSubscriptionJob, JobRegistry, NatsEmailDelivery,
    ReportEmailJob, WorkerJobConsumer,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;
    telemetry::init_metrics(settings.observability.metrics_port)?;

    info!("Starting pollcast worker");

    // Database pool and repositories
    let db_pool = DbPool::new(&settings.database).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database pool");
        anyhow::anyhow!("Database initialization error: {}", e)
    })?;

    let subscriptions = Arc::new(SubscriptionRepository::new(db_pool.clone()));
    let users = Arc::new(UserRepository::new(db_pool.clone()));
    let email_logs = Arc::new(EmailLogRepository::new(db_pool));

    // NATS: one connection for consuming jobs, publishing follow-up jobs
    // and handing emails to the mailer
    let nats_config = NatsConfig {
        url: settings.nats.url.clone(),
        stream_name: settings.nats.stream_name.clone(),
        consumer_name: settings.nats.consumer_name.clone(),
        ..Default::default()
    };
    let nats_client = NatsClient::new(nats_config).await.map_err(|e| {
        error!(error = %e, "Failed to initialize NATS client");
        anyhow::anyhow!("NATS initialization error: {}", e)
    })?;
    nats_client
        .initialize_stream()
        .await
        .map_err(|e| anyhow::anyhow!("NATS stream error: {}", e))?;

    let raw_client = nats_client.client().clone();
    let publisher_client =
        NatsClient::from_client(raw_client.clone(), nats_client.config().clone());
    let publisher =
        Arc::new(NatsJobPublisher::new(publisher_client)) as Arc<dyn JobPublisher>;

    // Fetch pipeline pieces
    let fetcher = Arc::new(
        SecureFetcher::new(FetchOptions {
            timeout: settings.fetch.timeout(),
            max_content_length: settings.fetch.max_content_length_bytes,
        })
        .map_err(|e| anyhow::anyhow!("Fetcher initialization error: {}", e))?,
    );
    let tracker = Arc::new(FailureTracker::new(
        Arc::clone(&subscriptions),
        Arc::new(LogAlertNotifier),
    ));

    // Policy and email boundary
    let gate = Arc::new(SuppressionPolicy::new(
        settings.tier_catalog(),
        Arc::clone(&email_logs),
        Arc::clone(&subscriptions),
    ));
    let delivery = Arc::new(NatsEmailDelivery::new(
        raw_client,
        settings.email.outbound_subject_prefix.clone(),
    )) as Arc<dyn EmailDelivery>;

    // Job registry: all job types are wired explicitly
    let registry = Arc::new(JobRegistry::new(
        FetchSubscriptionJob::new(
            Arc::clone(&subscriptions),
            tracker,
            fetcher,
            Arc::clone(&publisher),
        ),
        ReportEmailJob::new(
            Arc::clone(&subscriptions),
            Arc::clone(&users),
            Arc::clone(&email_logs),
            gate.clone(),
            Arc::clone(&delivery),
        ),
        FailureEmailJob::new(subscriptions, users, email_logs, gate, delivery),
    ));

    let consumer = WorkerJobConsumer::new(
        &nats_client,
        registry,
        Arc::new(ExponentialBackoff::new()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Worker consumer creation error: {}", e))?;
    let consumer = Arc::new(consumer);

    info!("Worker consumer created, starting job processing");

    let consumer_for_loop = Arc::clone(&consumer);
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = consumer_for_loop.start().await {
            error!(error = %e, "Worker consumer error");
        }
    });

    info!("Worker is running. Press Ctrl+C to shutdown gracefully");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    }

    consumer.shutdown();

    info!("Waiting for worker to finish in-flight jobs");
    let _ = worker_handle.await;

    telemetry::shutdown_tracer();
    info!("Worker shutdown complete");
    Ok(())
}
