//! Ingress gateway binary: authenticated HTTP front door that admits
//! `NotificationRequest`s, publishes them to the bus, and serves status
//! reads.
//!
//! Structure mirrors `bin/fc-router`'s `main.rs`: load config, connect
//! backing services, build the router, serve with graceful shutdown.

mod auth;
mod handlers;
mod model;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use dn_config::AppConfig;
use dn_queue::{AmqpBus, AmqpBusConfig, MessageBus};
use dn_status::{RedisStatusStore, StatusStore};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use auth::{require_api_key, AuthState};
use handlers::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    dn_common::logging::init_logging("dn-gateway");

    let config = AppConfig::from_env();
    info!("starting dn-gateway");

    let bus: Arc<dyn MessageBus> = Arc::new(
        AmqpBus::connect(AmqpBusConfig {
            uri: config.rabbitmq_url.clone(),
            ..AmqpBusConfig::default()
        })
        .await?,
    );
    let status_store: Arc<dyn StatusStore> =
        Arc::new(RedisStatusStore::connect(&config.redis_url).await?);

    let app_state = AppState {
        bus,
        status_store,
        idempotency_ttl: Duration::from_secs(config.idempotency_ttl_seconds),
        status_ttl: Duration::from_secs(config.status_ttl_seconds),
    };
    let auth_state = AuthState {
        api_key: config.api_key.clone(),
    };

    let app = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/v1/notifications/", post(handlers::submit_notification))
        .route("/api/v1/users/", post(handlers::submit_user))
        .route("/api/v1/{channel}/status/", post(handlers::ingest_status))
        .layer(middleware::from_fn_with_state(auth_state, require_api_key))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", config.port);
    info!(port = config.port, "serving IngressGateway");
    let listener = TcpListener::bind(&addr).await?;
    let server_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "http server exited");
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received");

    server_task.abort();

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
