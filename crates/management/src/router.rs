//! Admin API router — mounts all rule-set endpoints under /api/v1/admin.

use crate::auth;
use crate::handlers::{self, AdminState};
use axum::routing::{get, post, put};
use axum::Router;
use loyalty_registry::ConfigRegistry;
use std::sync::Arc;

/// Build the admin router over a shared registry.
/// Returns a Router that should be merged into the main app.
pub fn admin_router(registry: Arc<ConfigRegistry>) -> Router {
    let state = AdminState { registry };

    Router::new()
        // Auth
        .route("/api/v1/admin/auth/login", post(handlers::handle_login))
        // Points configurations
        .route("/api/v1/admin/points-config", get(handlers::list_configurations).post(handlers::create_configuration))
        .route("/api/v1/admin/points-config/:id", get(handlers::get_configuration).put(handlers::update_configuration).delete(handlers::delete_configuration))
        .route("/api/v1/admin/points-config/:id/activate", post(handlers::activate_configuration))
        .route("/api/v1/admin/points-config/:id/deactivate", post(handlers::deactivate_configuration))
        // Tiers
        .route("/api/v1/admin/tiers", get(handlers::list_tiers).post(handlers::create_tier))
        .route("/api/v1/admin/tiers/:id", get(handlers::get_tier).put(handlers::update_tier).delete(handlers::delete_tier))
        // Earning rules
        .route("/api/v1/admin/earning-rules", get(handlers::list_earning_rules).post(handlers::create_earning_rule))
        .route("/api/v1/admin/earning-rules/:id", get(handlers::get_earning_rule).put(handlers::update_earning_rule).delete(handlers::delete_earning_rule))
        // Expiry rules
        .route("/api/v1/admin/expiry-rules", get(handlers::list_expiry_rules).post(handlers::create_expiry_rule))
        .route("/api/v1/admin/expiry-rules/:id", get(handlers::get_expiry_rule).put(handlers::update_expiry_rule).delete(handlers::delete_expiry_rule))
        // Benefits
        .route("/api/v1/admin/benefits", get(handlers::list_benefits).post(handlers::create_benefit))
        .route("/api/v1/admin/benefits/:id", put(handlers::update_benefit).delete(handlers::delete_benefit))
        // Tier-benefit links
        .route("/api/v1/admin/tier-benefits", get(handlers::list_tier_benefits).post(handlers::create_tier_benefit))
        .route("/api/v1/admin/tier-benefits/:id", put(handlers::set_tier_benefit_active).delete(handlers::delete_tier_benefit))
        // Referral rewards
        .route("/api/v1/admin/referral-reward-configs", get(handlers::list_referral_configs).post(handlers::create_referral_config))
        .route("/api/v1/admin/referral-reward-configs/:id", get(handlers::get_referral_config).put(handlers::update_referral_config).delete(handlers::delete_referral_config))
        .route("/api/v1/admin/referral-slot-rewards", get(handlers::list_slot_rewards).post(handlers::create_slot_reward))
        .route("/api/v1/admin/referral-slot-rewards/:id", get(handlers::get_slot_reward).put(handlers::update_slot_reward).delete(handlers::delete_slot_reward))
        // Guardrails
        .route("/api/v1/admin/guardrails", get(handlers::list_guardrails).post(handlers::create_guardrail))
        .route("/api/v1/admin/guardrails/:id", axum::routing::delete(handlers::delete_guardrail))
        // Audit log
        .route("/api/v1/admin/audit-log", get(handlers::audit_log))
        // Bearer-token gate over everything under /admin/
        .layer(axum::middleware::from_fn(auth::auth_middleware))
        .with_state(state)
}
