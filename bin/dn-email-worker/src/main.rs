//! Email worker binary: drains `email.queue` through `EmailAdapter`,
//! mounting the StatusAPI/health/metrics router on `SERVICE_PORT`.
//!
//! Load config, connect backing services, spawn the processing loop,
//! serve HTTP, wait for a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dn_breaker::CircuitBreakerConfig;
use dn_config::AppConfig;
use dn_queue::{AmqpBus, AmqpBusConfig, MessageBus};
use dn_status::{RedisStatusStore, StatusStore};
use dn_worker::adapters::EmailAdapter;
use dn_worker::{AppState, WorkerPipeline, WorkerPipelineConfig};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    dn_common::logging::init_logging("dn-email-worker");

    let config = AppConfig::from_env();
    info!("starting dn-email-worker");

    let bus: Arc<dyn MessageBus> = Arc::new(
        AmqpBus::connect(AmqpBusConfig {
            uri: config.rabbitmq_url.clone(),
            ..AmqpBusConfig::default()
        })
        .await?,
    );
    let status_store: Arc<dyn StatusStore> =
        Arc::new(RedisStatusStore::connect(&config.redis_url).await?);

    let adapter = EmailAdapter::new(
        &config.smtp.host,
        config.smtp.port,
        &config.smtp.user,
        &config.smtp.pass,
        &config.smtp.email_from,
    )
    .map_err(|e| anyhow::anyhow!(e))?;

    let pipeline_config = WorkerPipelineConfig {
        max_attempts: config.max_attempts,
        status_ttl: Duration::from_secs(config.status_ttl_seconds),
    };
    let pipeline = Arc::new(WorkerPipeline::new(
        adapter,
        bus.clone(),
        status_store.clone(),
        CircuitBreakerConfig::default(),
        pipeline_config,
    ));

    let pipeline_task = tokio::spawn(pipeline.clone().run());

    let app_state = AppState {
        status_store,
        metrics: pipeline.metrics(),
        channel: dn_common::Channel::Email,
    };
    let app = dn_worker::create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", config.service_port);
    info!(port = config.service_port, "serving StatusAPI/health/metrics");
    let listener = TcpListener::bind(&addr).await?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "http server exited");
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received");

    server_task.abort();
    pipeline_task.abort();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
