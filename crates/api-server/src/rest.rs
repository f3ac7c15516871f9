//! Shared REST state, operational endpoints, and envelope helpers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use loyalty_core::error::LoyaltyError;
use loyalty_earning::EarningEngine;
use loyalty_ledger::LedgerStore;
use loyalty_management::models::ApiEnvelope;
use loyalty_referrals::ReferralTracker;
use loyalty_registry::ConfigRegistry;
use loyalty_tiers::TierEvaluator;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConfigRegistry>,
    pub ledger: Arc<LedgerStore>,
    pub engine: Arc<EarningEngine>,
    pub tiers: Arc<TierEvaluator>,
    pub referrals: Arc<ReferralTracker>,
    pub node_id: String,
    pub start_time: Instant,
}

pub(crate) type Enveloped<T> = (StatusCode, Json<ApiEnvelope<T>>);

pub(crate) fn envelope_ok<T: Serialize>(data: T, message: &str) -> Enveloped<T> {
    (StatusCode::OK, Json(ApiEnvelope::ok(data, message)))
}

pub(crate) fn envelope_err<T: Serialize>(err: LoyaltyError) -> Enveloped<T> {
    let (status, code) = match &err {
        LoyaltyError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        LoyaltyError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        LoyaltyError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        LoyaltyError::State(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_state"),
        LoyaltyError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    metrics::counter!("api.errors", "code" => code).increment(1);
    (status, Json(ApiEnvelope::err(code, err.to_string())))
}

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe for Kubernetes.
/// Returns 200 only when the service is ready to accept traffic.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — Liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
