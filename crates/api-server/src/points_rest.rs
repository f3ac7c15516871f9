//! Points REST endpoints — award, redeem, balances, ledger history, tier
//! lookup.

use crate::rest::{envelope_err, envelope_ok, AppState, Enveloped};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use loyalty_core::types::{LedgerEntry, SourceType, Tier};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AwardPointsRequest {
    pub user_id: String,
    pub source_type: SourceType,
}

#[derive(Debug, Deserialize)]
pub struct RedeemPointsRequest {
    pub user_id: String,
    pub points: i64,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: i64,
    pub current_tier: Option<Tier>,
    pub tier_multiplier: f64,
}

/// POST /v1/points/award — Award points for a qualifying action.
pub async fn handle_award(
    State(state): State<AppState>,
    Json(request): Json<AwardPointsRequest>,
) -> Enveloped<LedgerEntry> {
    metrics::counter!("api.points.award").increment(1);
    match state
        .engine
        .award(&request.user_id, request.source_type, Utc::now())
    {
        Ok(entry) => envelope_ok(entry, "points awarded"),
        Err(err) => envelope_err(err),
    }
}

/// POST /v1/points/redeem — Redeem points, soonest-expiring first.
pub async fn handle_redeem(
    State(state): State<AppState>,
    Json(request): Json<RedeemPointsRequest>,
) -> Enveloped<LedgerEntry> {
    metrics::counter!("api.points.redeem").increment(1);
    match state
        .engine
        .redeem(&request.user_id, request.points, Utc::now())
    {
        Ok(entry) => envelope_ok(entry, "points redeemed"),
        Err(err) => envelope_err(err),
    }
}

/// GET /v1/points/balance/:user_id — Usable balance and current tier.
pub async fn handle_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Enveloped<BalanceResponse> {
    let now = Utc::now();
    let current_tier = state.tiers.current_tier(&user_id, now);
    envelope_ok(
        BalanceResponse {
            balance: state.ledger.balance(&user_id, now),
            tier_multiplier: current_tier.as_ref().map(|t| t.multiplier).unwrap_or(1.0),
            current_tier,
            user_id,
        },
        "balance",
    )
}

/// GET /v1/points/ledger/:user_id — Full ledger history.
pub async fn handle_ledger(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Enveloped<Vec<LedgerEntry>> {
    envelope_ok(state.ledger.entries(&user_id), "ledger entries")
}

/// GET /v1/points/expiring/:user_id — Entries expiring inside the warning
/// window of any active expiry rule (14 days when none is configured).
pub async fn handle_expiring(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Enveloped<Vec<LedgerEntry>> {
    let window = state
        .registry
        .list_expiry_rules()
        .into_iter()
        .filter(|r| r.active)
        .map(|r| r.warning_days_before)
        .max()
        .unwrap_or(14);
    envelope_ok(
        state.ledger.expiring_within(&user_id, Utc::now(), window),
        "expiring entries",
    )
}

/// GET /v1/tiers/current/:user_id — The user's current tier.
pub async fn handle_current_tier(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Enveloped<Option<Tier>> {
    envelope_ok(state.tiers.current_tier(&user_id, Utc::now()), "current tier")
}
