// Telemetry: structured logging, metrics, tracing

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

const SERVICE_NAME: &str = "pollcast";

/// Initialize structured JSON logging, optionally exporting spans over OTLP
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_target(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(log_level, tracing_endpoint, "Structured logging initialized");

    Ok(())
}

fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(endpoint, "OpenTelemetry tracer initialized");

    Ok(tracer)
}

/// Flush remaining spans on graceful shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus exporter and register metric descriptions
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("fetch_success_total", "Successful endpoint fetches");
    describe_counter!("fetch_failed_total", "Failed endpoint fetches");
    describe_histogram!("fetch_duration_seconds", "Endpoint fetch duration");
    describe_gauge!("due_subscriptions", "Subscriptions due at the last scan");
    describe_counter!("jobs_dispatched_total", "Jobs published to the queue");
    describe_counter!("emails_suppressed_total", "Emails dropped by the suppression gate");

    tracing::info!(metrics_port, "Prometheus metrics exporter initialized");

    Ok(())
}

#[inline]
pub fn record_fetch_success(subscription_id: &Uuid) {
    counter!("fetch_success_total", "subscription_id" => subscription_id.to_string()).increment(1);
}

#[inline]
pub fn record_fetch_failure(subscription_id: &Uuid, reason: &str) {
    counter!(
        "fetch_failed_total",
        "subscription_id" => subscription_id.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_fetch_duration(subscription_id: &Uuid, duration_seconds: f64) {
    histogram!("fetch_duration_seconds", "subscription_id" => subscription_id.to_string())
        .record(duration_seconds);
}

#[inline]
pub fn update_due_subscriptions(count: i64) {
    gauge!("due_subscriptions").set(count as f64);
}

#[inline]
pub fn record_job_dispatched(kind: &str) {
    counter!("jobs_dispatched_total", "kind" => kind.to_string()).increment(1);
}

#[inline]
pub fn record_email_suppressed(kind: &str) {
    counter!("emails_suppressed_total", "kind" => kind.to_string()).increment(1);
}

/// Notification hook fired when a subscription crosses the failure threshold
#[async_trait::async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify_degraded(
        &self,
        subscription_id: Uuid,
        name: &str,
        failure_count: i32,
    ) -> Result<()>;
}

/// Default notifier: an ERROR-level log line. Production deployments swap
/// in a pager or chat integration.
pub struct LogAlertNotifier;

#[async_trait::async_trait]
impl AlertNotifier for LogAlertNotifier {
    async fn notify_degraded(
        &self,
        subscription_id: Uuid,
        name: &str,
        failure_count: i32,
    ) -> Result<()> {
        tracing::error!(
            subscription_id = %subscription_id,
            name,
            failure_count,
            alert_type = "subscription_degraded",
            "ALERT: subscription degraded after {} consecutive failures",
            failure_count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording_does_not_panic() {
        let id = Uuid::new_v4();
        record_fetch_success(&id);
        record_fetch_failure(&id, "Request failed: timeout (TIMEOUT)");
        record_fetch_duration(&id, 0.25);
        update_due_subscriptions(7);
        record_job_dispatched("fetch");
        record_email_suppressed("report");
    }

    #[tokio::test]
    async fn test_log_alert_notifier() {
        let notifier = LogAlertNotifier;
        let result = notifier
            .notify_degraded(Uuid::new_v4(), "daily-report", 3)
            .await;
        assert!(result.is_ok());
    }
}
