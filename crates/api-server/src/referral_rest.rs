//! Referral REST endpoints — signup/purchase recording and progress.

use crate::rest::{envelope_err, envelope_ok, AppState, Enveloped};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use loyalty_referrals::{ReferralOutcome, ReferralProgressReport};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ReferralSignupRequest {
    pub referrer_id: String,
    pub referred_identity: String,
}

#[derive(Debug, Deserialize)]
pub struct ReferralPurchaseRequest {
    pub referrer_id: String,
    pub referred_identity: String,
    pub amount: f64,
}

/// POST /v1/referrals/signup — Record a referred signup.
pub async fn handle_signup(
    State(state): State<AppState>,
    Json(request): Json<ReferralSignupRequest>,
) -> Enveloped<ReferralOutcome> {
    metrics::counter!("api.referrals.signup").increment(1);
    match state.referrals.record_signup(
        &request.referrer_id,
        &request.referred_identity,
        Utc::now(),
    ) {
        Ok(outcome) => envelope_ok(outcome, "referral signup recorded"),
        Err(err) => envelope_err(err),
    }
}

/// POST /v1/referrals/purchase — Record a referred first purchase.
pub async fn handle_purchase(
    State(state): State<AppState>,
    Json(request): Json<ReferralPurchaseRequest>,
) -> Enveloped<ReferralOutcome> {
    metrics::counter!("api.referrals.purchase").increment(1);
    match state.referrals.record_purchase(
        &request.referrer_id,
        &request.referred_identity,
        request.amount,
        Utc::now(),
    ) {
        Ok(outcome) => envelope_ok(outcome, "referral purchase recorded"),
        Err(err) => envelope_err(err),
    }
}

/// GET /v1/referrals/progress/:referrer_id — Successful-referral count and
/// unlocked slots.
pub async fn handle_progress(
    State(state): State<AppState>,
    Path(referrer_id): Path<String>,
) -> Enveloped<ReferralProgressReport> {
    envelope_ok(state.referrals.progress_report(&referrer_id), "referral progress")
}
