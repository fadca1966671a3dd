// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the read API.
//!
//! Every channel-scoped handler first checks that the channel belongs to the
//! authenticated tenant; other tenants' channels are reported as not found.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::Json;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tether_core::types::Diagnosis;
use tether_core::{Channel, ChannelId, ChannelStatus, ConnectionEvent};
use tether_diagnostics::classify_event;
use tether_metrics::{DEFAULT_TOP_ERRORS, MetricsSnapshot, MetricsWindow, aggregate};
use tether_storage::StoredEvent;
use tether_storage::queries::{channels, events};

use crate::auth::AuthenticatedTenant;
use crate::error::ApiError;
use crate::server::GatewayState;

const DEFAULT_RECENT_HOURS: u32 = 24;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub hours: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub days: Option<u32>,
}

/// An event as returned by the API, with its diagnosis.
#[derive(Debug, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: ConnectionEvent,
    pub diagnosis: Diagnosis,
}

impl From<StoredEvent> for EventView {
    fn from(stored: StoredEvent) -> Self {
        let diagnosis = classify_event(&stored.event);
        Self {
            event: stored.event,
            diagnosis,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub channel_id: Option<ChannelId>,
    pub count: usize,
    pub events: Vec<EventView>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub channel_id: ChannelId,
    pub name: String,
    pub transport_kind: String,
    pub status: ChannelStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub active: bool,
    pub live_status: Option<ChannelStatus>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub live_channels: usize,
}

fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(q)| q)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

fn page_size(state: &GatewayState, limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(state.events.default_limit)
        .clamp(1, state.events.max_limit.max(1))
}

/// Load a channel owned by the caller's tenant.
async fn owned_channel(
    state: &GatewayState,
    tenant: &AuthenticatedTenant,
    channel_id: &str,
) -> Result<Channel, ApiError> {
    let id = ChannelId::from(channel_id);
    match channels::get_channel(&state.db, &id).await? {
        Some(channel) if channel.tenant_id == tenant.0 => Ok(channel),
        Some(_) => {
            tracing::debug!(channel_id, tenant_id = %tenant.0, "cross-tenant channel lookup");
            Err(ApiError::channel_not_found(channel_id))
        }
        None => Err(ApiError::channel_not_found(channel_id)),
    }
}

/// GET /connections/{channel_id}/events
pub async fn get_channel_events(
    State(state): State<GatewayState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Path(channel_id): Path<String>,
    params: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Json<EventListResponse>, ApiError> {
    let params = query(params)?;
    let channel = owned_channel(&state, &tenant, &channel_id).await?;
    let limit = page_size(&state, params.limit);

    let stored = events::recent_for_channel(&state.db, &channel.id, limit).await?;
    let events: Vec<EventView> = stored.into_iter().map(EventView::from).collect();
    Ok(Json(EventListResponse {
        channel_id: Some(channel.id),
        count: events.len(),
        events,
    }))
}

/// GET /connections/recent
pub async fn get_recent_events(
    State(state): State<GatewayState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    params: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<EventListResponse>, ApiError> {
    let params = query(params)?;
    let hours = params.hours.unwrap_or(DEFAULT_RECENT_HOURS);
    if hours == 0 {
        return Err(ApiError::bad_request("hours must be at least 1"));
    }
    let limit = page_size(&state, params.limit);
    let since = Duration::try_hours(i64::from(hours))
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .ok_or_else(|| ApiError::bad_request(format!("hours={hours} is out of range")))?;

    let stored = events::recent_for_tenant(&state.db, &tenant.0, since, limit).await?;
    let events: Vec<EventView> = stored.into_iter().map(EventView::from).collect();
    Ok(Json(EventListResponse {
        channel_id: None,
        count: events.len(),
        events,
    }))
}

/// GET /connections/{channel_id}/metrics
pub async fn get_channel_metrics(
    State(state): State<GatewayState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Path(channel_id): Path<String>,
    params: Result<Query<MetricsQuery>, QueryRejection>,
) -> Result<Json<MetricsSnapshot>, ApiError> {
    let params = query(params)?;
    let days = params.days.unwrap_or(state.events.default_metrics_days);
    if days == 0 {
        return Err(ApiError::bad_request("days must be at least 1"));
    }
    let channel = owned_channel(&state, &tenant, &channel_id).await?;

    let window = MetricsWindow::last_days(days, Utc::now())
        .ok_or_else(|| ApiError::bad_request(format!("days={days} is out of range")))?;
    let events =
        events::channel_events_between(&state.db, &channel.id, window.start, window.end).await?;
    Ok(Json(aggregate(&events, window, DEFAULT_TOP_ERRORS)))
}

/// GET /connections/{channel_id}/status
pub async fn get_channel_status(
    State(state): State<GatewayState>,
    Extension(tenant): Extension<AuthenticatedTenant>,
    Path(channel_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let channel = owned_channel(&state, &tenant, &channel_id).await?;
    let live = state.registry.status(&channel.id).await?;
    Ok(Json(StatusResponse {
        channel_id: channel.id,
        name: channel.name,
        transport_kind: channel.transport_kind.to_string(),
        status: live.status,
        retry_count: live.retry_count,
        last_error: live.last_error,
        active: live.active,
        live_status: live.live_status,
    }))
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        live_channels: state.registry.live_count(),
    })
}

/// GET /metrics
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => ApiError {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: "prometheus exporter is disabled".into(),
        }
        .into_response(),
    }
}
