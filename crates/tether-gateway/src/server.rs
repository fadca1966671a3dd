// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the read API.

use std::sync::Arc;

use axum::{Router, middleware as axum_middleware, routing::get};
use tether_config::model::{EventsConfig, GatewayConfig};
use tether_core::TetherError;
use tether_registry::AdapterRegistry;
use tether_storage::Database;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::auth::{TenantTokens, auth_middleware};
use crate::handlers;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl HealthState {
    pub fn new(prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render,
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<AdapterRegistry>,
    pub db: Arc<Database>,
    /// Paging and window defaults.
    pub events: EventsConfig,
    pub tokens: TenantTokens,
    pub health: HealthState,
}

impl GatewayState {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        gateway: &GatewayConfig,
        events: EventsConfig,
        health: HealthState,
    ) -> Self {
        Self {
            db: registry.database().clone(),
            registry,
            events,
            tokens: TenantTokens::new(&gateway.tokens),
            health,
        }
    }
}

/// Build the gateway router.
///
/// - GET /health, GET /metrics (public)
/// - GET /connections/recent
/// - GET /connections/{channel_id}/events
/// - GET /connections/{channel_id}/metrics
/// - GET /connections/{channel_id}/status
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/connections/recent", get(handlers::get_recent_events))
        .route("/connections/{channel_id}/events", get(handlers::get_channel_events))
        .route("/connections/{channel_id}/metrics", get(handlers::get_channel_metrics))
        .route("/connections/{channel_id}/status", get(handlers::get_channel_status))
        .route_layer(axum_middleware::from_fn_with_state(
            state.tokens.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

/// Serve the gateway until `cancel` fires.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), TetherError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TetherError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| TetherError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
