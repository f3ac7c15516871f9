//! Request DTOs consumed by the registry store.

use loyalty_core::types::{EvaluationWindow, ExpiryMode, GuardrailAction, SourceType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Configurations ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConfigurationRequest {
    #[serde(default = "default_true")]
    pub points_enabled: bool,
    #[serde(default = "default_true")]
    pub redemption_enabled: bool,
    #[serde(default)]
    pub allow_stacking: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateConfigurationRequest {
    pub points_enabled: Option<bool>,
    pub redemption_enabled: Option<bool>,
    pub allow_stacking: Option<bool>,
}

// ─── Tiers ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTierRequest {
    pub tier_level: u32,
    pub name: String,
    pub min_points: i64,
    pub multiplier: f64,
    #[serde(default)]
    pub can_gift_points: bool,
    #[serde(default)]
    pub max_gift_per_month: Option<i64>,
    #[serde(default)]
    pub expiry_override_days: Option<u32>,
    #[serde(default = "default_downgrade_days")]
    pub downgrade_after_inactive_days: u32,
    pub evaluation_window: EvaluationWindow,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTierRequest {
    pub name: Option<String>,
    pub min_points: Option<i64>,
    pub multiplier: Option<f64>,
    pub can_gift_points: Option<bool>,
    pub max_gift_per_month: Option<Option<i64>>,
    pub expiry_override_days: Option<Option<u32>>,
    pub downgrade_after_inactive_days: Option<u32>,
    pub evaluation_window: Option<EvaluationWindow>,
    pub active: Option<bool>,
}

// ─── Earning Rules ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEarningRuleRequest {
    pub rule_name: String,
    pub source_type: SourceType,
    pub points_awarded: i64,
    pub expiry_rule_id: Uuid,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEarningRuleRequest {
    pub rule_name: Option<String>,
    pub points_awarded: Option<i64>,
    pub expiry_rule_id: Option<Uuid>,
    pub enabled: Option<bool>,
    pub description: Option<Option<String>>,
}

// ─── Expiry Rules ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExpiryRuleRequest {
    pub expiry_type: SourceType,
    pub expiry_mode: ExpiryMode,
    pub expiry_days: u32,
    #[serde(default = "default_fixed_day")]
    pub fixed_day_of_month: u32,
    #[serde(default)]
    pub grace_period_days: u32,
    #[serde(default = "default_warning_days")]
    pub warning_days_before: u32,
    #[serde(default = "default_true")]
    pub send_expiry_notifications: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateExpiryRuleRequest {
    pub expiry_mode: Option<ExpiryMode>,
    pub expiry_days: Option<u32>,
    pub fixed_day_of_month: Option<u32>,
    pub grace_period_days: Option<u32>,
    pub warning_days_before: Option<u32>,
    pub send_expiry_notifications: Option<bool>,
    pub active: Option<bool>,
}

// ─── Benefits ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBenefitRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBenefitRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTierBenefitRequest {
    pub tier_id: Uuid,
    pub benefit_id: Uuid,
    #[serde(default = "default_true")]
    pub active: bool,
}

// ─── Referral Rewards ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReferralConfigRequest {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub signup_points: i64,
    pub first_purchase_points: i64,
    #[serde(default)]
    pub min_purchase_amount: f64,
    #[serde(default = "default_true")]
    pub one_reward_per_referred_user: bool,
    #[serde(default)]
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReferralConfigRequest {
    pub enabled: Option<bool>,
    pub signup_points: Option<i64>,
    pub first_purchase_points: Option<i64>,
    pub min_purchase_amount: Option<f64>,
    pub one_reward_per_referred_user: Option<bool>,
    pub start_date: Option<Option<chrono::DateTime<chrono::Utc>>>,
    pub end_date: Option<Option<chrono::DateTime<chrono::Utc>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRewardRequest {
    pub reward_config_id: Uuid,
    pub slot_number: u32,
    pub title: String,
    pub quantity: u32,
    pub value_points: i64,
    /// URL returned by the external file-storage service; the engine never
    /// handles the bytes.
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSlotRewardRequest {
    pub slot_number: Option<u32>,
    pub title: Option<String>,
    pub quantity: Option<u32>,
    pub value_points: Option<i64>,
    pub image_url: Option<Option<String>>,
    pub active: Option<bool>,
}

// ─── Guardrails ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGuardrailRequest {
    #[serde(default)]
    pub max_points_per_user_per_day: Option<i64>,
    #[serde(default)]
    pub max_referrals_per_referrer_per_day: Option<u32>,
    pub action: GuardrailAction,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}
fn default_downgrade_days() -> u32 {
    90
}
fn default_fixed_day() -> u32 {
    1
}
fn default_warning_days() -> u32 {
    14
}
