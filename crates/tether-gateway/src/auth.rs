// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant-scoped bearer authentication.
//!
//! Each configured token grants access to exactly one tenant. The middleware
//! resolves `Authorization: Bearer <token>` to that tenant and stores it in the
//! request extensions for handlers. With no tokens configured every request is
//! rejected (fail-closed).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tether_config::model::GatewayToken;
use tether_core::TenantId;

use crate::error::ApiError;

/// The tenant an authenticated request acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedTenant(pub TenantId);

/// Token-to-tenant table.
#[derive(Clone, Default)]
pub struct TenantTokens {
    tokens: Arc<HashMap<String, TenantId>>,
}

impl TenantTokens {
    pub fn new(tokens: &[GatewayToken]) -> Self {
        let tokens = tokens
            .iter()
            .map(|t| (t.token.clone(), TenantId::from(t.tenant_id.as_str())))
            .collect();
        Self {
            tokens: Arc::new(tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn resolve(&self, token: &str) -> Option<&TenantId> {
        self.tokens.get(token)
    }
}

impl std::fmt::Debug for TenantTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantTokens")
            .field("count", &self.tokens.len())
            .finish()
    }
}

/// Middleware that resolves the bearer token to a tenant.
pub async fn auth_middleware(
    State(tokens): State<TenantTokens>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if tokens.is_empty() {
        tracing::error!("gateway has no tokens configured -- rejecting request");
        return Err(ApiError::unauthorized("no API tokens are configured"));
    }

    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(token) = bearer else {
        return Err(ApiError::unauthorized("missing bearer token"));
    };
    let Some(tenant) = tokens.resolve(token).cloned() else {
        tracing::debug!("gateway request with unknown token");
        return Err(ApiError::unauthorized("invalid bearer token"));
    };

    request.extensions_mut().insert(AuthenticatedTenant(tenant));
    Ok(next.run(request).await)
}
