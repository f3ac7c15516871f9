//! Axum REST handlers for the admin API.

use crate::auth;
use crate::models::{ApiEnvelope, LoginRequest, LoginResponse, SetActiveRequest};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use loyalty_core::error::LoyaltyError;
use loyalty_core::types::*;
use loyalty_registry::models::*;
use loyalty_registry::ConfigRegistry;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Shared admin state.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ConfigRegistry>,
}

/// Actor recorded in the audit log. Production: taken from the auth token.
const ADMIN_USER: &str = "admin";

type Enveloped<T> = (StatusCode, Json<ApiEnvelope<T>>);

fn ok<T: Serialize>(data: T, message: &str) -> Enveloped<T> {
    (StatusCode::OK, Json(ApiEnvelope::ok(data, message)))
}

fn created<T: Serialize>(data: T, message: &str) -> Enveloped<T> {
    (StatusCode::CREATED, Json(ApiEnvelope::ok(data, message)))
}

fn failure<T: Serialize>(err: LoyaltyError) -> Enveloped<T> {
    let (status, code) = match &err {
        LoyaltyError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        LoyaltyError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        LoyaltyError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
        LoyaltyError::State(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_state"),
        LoyaltyError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    metrics::counter!("admin.errors", "code" => code).increment(1);
    (status, Json(ApiEnvelope::err(code, err.to_string())))
}

fn respond<T: Serialize>(
    result: Result<T, LoyaltyError>,
    message: &str,
) -> Enveloped<T> {
    match result {
        Ok(data) => ok(data, message),
        Err(err) => failure(err),
    }
}

// ─── Auth ──────────────────────────────────────────────────────────────────

pub async fn handle_login(Json(req): Json<LoginRequest>) -> Enveloped<LoginResponse> {
    match auth::authenticate(&req) {
        Ok(resp) => ok(resp, "login successful"),
        Err(msg) => (
            StatusCode::UNAUTHORIZED,
            Json(ApiEnvelope::err("auth_failed", msg)),
        ),
    }
}

// ─── Points Configurations ─────────────────────────────────────────────────

pub async fn list_configurations(
    State(state): State<AdminState>,
) -> Enveloped<Vec<PointsConfiguration>> {
    ok(state.registry.list_configurations(), "configurations")
}

pub async fn create_configuration(
    State(state): State<AdminState>,
    Json(req): Json<CreateConfigurationRequest>,
) -> Enveloped<PointsConfiguration> {
    let config = state.registry.create_configuration(req, ADMIN_USER);
    metrics::counter!("admin.configurations.created").increment(1);
    created(config, "draft configuration created")
}

pub async fn get_configuration(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<PointsConfiguration> {
    respond(state.registry.get_configuration(id), "configuration")
}

pub async fn update_configuration(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateConfigurationRequest>,
) -> Enveloped<PointsConfiguration> {
    respond(
        state.registry.update_configuration(id, req, ADMIN_USER),
        "configuration updated",
    )
}

pub async fn delete_configuration(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<()> {
    respond(
        state.registry.delete_configuration(id, ADMIN_USER),
        "configuration deleted",
    )
}

pub async fn activate_configuration(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<PointsConfiguration> {
    respond(
        state.registry.activate(id, ADMIN_USER),
        "configuration activated",
    )
}

pub async fn deactivate_configuration(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<PointsConfiguration> {
    respond(
        state.registry.deactivate(id, ADMIN_USER),
        "configuration deactivated",
    )
}

// ─── Tiers ─────────────────────────────────────────────────────────────────

pub async fn list_tiers(State(state): State<AdminState>) -> Enveloped<Vec<Tier>> {
    ok(state.registry.list_tiers(), "tiers")
}

pub async fn create_tier(
    State(state): State<AdminState>,
    Json(req): Json<CreateTierRequest>,
) -> Enveloped<Tier> {
    match state.registry.create_tier(req, ADMIN_USER) {
        Ok(tier) => created(tier, "tier created"),
        Err(err) => failure(err),
    }
}

pub async fn get_tier(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<Tier> {
    respond(state.registry.get_tier(id), "tier")
}

pub async fn update_tier(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTierRequest>,
) -> Enveloped<Tier> {
    respond(state.registry.update_tier(id, req, ADMIN_USER), "tier updated")
}

pub async fn delete_tier(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<()> {
    respond(state.registry.delete_tier(id, ADMIN_USER), "tier deleted")
}

// ─── Earning Rules ─────────────────────────────────────────────────────────

pub async fn list_earning_rules(State(state): State<AdminState>) -> Enveloped<Vec<EarningRule>> {
    ok(state.registry.list_earning_rules(), "earning rules")
}

pub async fn create_earning_rule(
    State(state): State<AdminState>,
    Json(req): Json<CreateEarningRuleRequest>,
) -> Enveloped<EarningRule> {
    match state.registry.create_earning_rule(req, ADMIN_USER) {
        Ok(rule) => created(rule, "earning rule created"),
        Err(err) => failure(err),
    }
}

pub async fn get_earning_rule(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<EarningRule> {
    respond(state.registry.get_earning_rule(id), "earning rule")
}

pub async fn update_earning_rule(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEarningRuleRequest>,
) -> Enveloped<EarningRule> {
    respond(
        state.registry.update_earning_rule(id, req, ADMIN_USER),
        "earning rule updated",
    )
}

pub async fn delete_earning_rule(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<()> {
    respond(
        state.registry.delete_earning_rule(id, ADMIN_USER),
        "earning rule deleted",
    )
}

// ─── Expiry Rules ──────────────────────────────────────────────────────────

pub async fn list_expiry_rules(State(state): State<AdminState>) -> Enveloped<Vec<ExpiryRule>> {
    ok(state.registry.list_expiry_rules(), "expiry rules")
}

pub async fn create_expiry_rule(
    State(state): State<AdminState>,
    Json(req): Json<CreateExpiryRuleRequest>,
) -> Enveloped<ExpiryRule> {
    match state.registry.create_expiry_rule(req, ADMIN_USER) {
        Ok(rule) => created(rule, "expiry rule created"),
        Err(err) => failure(err),
    }
}

pub async fn get_expiry_rule(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<ExpiryRule> {
    respond(state.registry.get_expiry_rule(id), "expiry rule")
}

pub async fn update_expiry_rule(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateExpiryRuleRequest>,
) -> Enveloped<ExpiryRule> {
    respond(
        state.registry.update_expiry_rule(id, req, ADMIN_USER),
        "expiry rule updated",
    )
}

pub async fn delete_expiry_rule(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<()> {
    respond(
        state.registry.delete_expiry_rule(id, ADMIN_USER),
        "expiry rule deleted",
    )
}

// ─── Benefits ──────────────────────────────────────────────────────────────

pub async fn list_benefits(State(state): State<AdminState>) -> Enveloped<Vec<Benefit>> {
    ok(state.registry.list_benefits(), "benefits")
}

pub async fn create_benefit(
    State(state): State<AdminState>,
    Json(req): Json<CreateBenefitRequest>,
) -> Enveloped<Benefit> {
    created(state.registry.create_benefit(req, ADMIN_USER), "benefit created")
}

pub async fn update_benefit(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBenefitRequest>,
) -> Enveloped<Benefit> {
    respond(
        state.registry.update_benefit(id, req, ADMIN_USER),
        "benefit updated",
    )
}

pub async fn delete_benefit(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<()> {
    respond(state.registry.delete_benefit(id, ADMIN_USER), "benefit deleted")
}

pub async fn list_tier_benefits(State(state): State<AdminState>) -> Enveloped<Vec<TierBenefit>> {
    ok(state.registry.list_tier_benefits(), "tier benefits")
}

pub async fn create_tier_benefit(
    State(state): State<AdminState>,
    Json(req): Json<CreateTierBenefitRequest>,
) -> Enveloped<TierBenefit> {
    match state.registry.create_tier_benefit(req, ADMIN_USER) {
        Ok(link) => created(link, "benefit linked to tier"),
        Err(err) => failure(err),
    }
}

pub async fn set_tier_benefit_active(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetActiveRequest>,
) -> Enveloped<TierBenefit> {
    respond(
        state.registry.set_tier_benefit_active(id, req.active, ADMIN_USER),
        "tier benefit toggled",
    )
}

pub async fn delete_tier_benefit(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<()> {
    respond(
        state.registry.delete_tier_benefit(id, ADMIN_USER),
        "tier benefit removed",
    )
}

// ─── Referral Rewards ──────────────────────────────────────────────────────

pub async fn list_referral_configs(
    State(state): State<AdminState>,
) -> Enveloped<Vec<ReferralRewardConfig>> {
    ok(state.registry.list_referral_configs(), "referral configs")
}

pub async fn create_referral_config(
    State(state): State<AdminState>,
    Json(req): Json<CreateReferralConfigRequest>,
) -> Enveloped<ReferralRewardConfig> {
    match state.registry.create_referral_config(req, ADMIN_USER) {
        Ok(config) => created(config, "referral config created"),
        Err(err) => failure(err),
    }
}

pub async fn get_referral_config(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<ReferralRewardConfig> {
    respond(state.registry.get_referral_config(id), "referral config")
}

pub async fn update_referral_config(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReferralConfigRequest>,
) -> Enveloped<ReferralRewardConfig> {
    respond(
        state.registry.update_referral_config(id, req, ADMIN_USER),
        "referral config updated",
    )
}

pub async fn delete_referral_config(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<()> {
    respond(
        state.registry.delete_referral_config(id, ADMIN_USER),
        "referral config deleted",
    )
}

pub async fn list_slot_rewards(
    State(state): State<AdminState>,
) -> Enveloped<Vec<ReferralSlotReward>> {
    ok(state.registry.list_slot_rewards(), "slot rewards")
}

pub async fn create_slot_reward(
    State(state): State<AdminState>,
    Json(req): Json<CreateSlotRewardRequest>,
) -> Enveloped<ReferralSlotReward> {
    match state.registry.create_slot_reward(req, ADMIN_USER) {
        Ok(slot) => created(slot, "slot reward created"),
        Err(err) => failure(err),
    }
}

pub async fn get_slot_reward(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<ReferralSlotReward> {
    respond(state.registry.get_slot_reward(id), "slot reward")
}

pub async fn update_slot_reward(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSlotRewardRequest>,
) -> Enveloped<ReferralSlotReward> {
    respond(
        state.registry.update_slot_reward(id, req, ADMIN_USER),
        "slot reward updated",
    )
}

pub async fn delete_slot_reward(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<()> {
    respond(
        state.registry.delete_slot_reward(id, ADMIN_USER),
        "slot reward deleted",
    )
}

// ─── Guardrails ────────────────────────────────────────────────────────────

pub async fn list_guardrails(State(state): State<AdminState>) -> Enveloped<Vec<GuardrailConfig>> {
    ok(state.registry.list_guardrails(), "guardrails")
}

pub async fn create_guardrail(
    State(state): State<AdminState>,
    Json(req): Json<CreateGuardrailRequest>,
) -> Enveloped<GuardrailConfig> {
    created(state.registry.create_guardrail(req, ADMIN_USER), "guardrail created")
}

pub async fn delete_guardrail(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Enveloped<()> {
    respond(state.registry.delete_guardrail(id, ADMIN_USER), "guardrail deleted")
}

// ─── Audit Log ─────────────────────────────────────────────────────────────

pub async fn audit_log(State(state): State<AdminState>) -> Enveloped<Vec<AuditLogEntry>> {
    ok(state.registry.get_audit_log(), "audit log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_core::event_bus::noop_sink;

    #[tokio::test]
    async fn test_envelope_shapes() {
        let state = AdminState {
            registry: Arc::new(ConfigRegistry::new(noop_sink())),
        };

        let (status, Json(env)) = create_configuration(
            State(state.clone()),
            Json(CreateConfigurationRequest {
                points_enabled: true,
                redemption_enabled: true,
                allow_stacking: false,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(env.error.is_none());
        assert!(!env.data.as_ref().unwrap().is_active);

        let (status, Json(env)) =
            get_configuration(State(state), Path(Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(env.error.as_deref(), Some("not_found"));
        assert!(env.data.is_none());
    }

    #[tokio::test]
    async fn test_activate_conflict_maps_to_409() {
        let state = AdminState {
            registry: Arc::new(ConfigRegistry::new(noop_sink())),
        };
        let config = state.registry.create_configuration(
            CreateConfigurationRequest {
                points_enabled: true,
                redemption_enabled: true,
                allow_stacking: false,
            },
            "test",
        );
        state.registry.activate(config.id, "test").unwrap();

        let (status, Json(env)) =
            activate_configuration(State(state), Path(config.id)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(env.error.as_deref(), Some("conflict"));
    }
}
