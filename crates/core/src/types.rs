//! Loyalty domain types — versioned rule-set, tiers, point ledger, referrals.
//!
//! These types are the shared vocabulary of every engine crate. The rule-set
//! (configurations, tiers, earning/expiry rules, referral rewards,
//! guardrails) is mutable through the registry; ledger entries are immutable
//! once written apart from consumption bookkeeping.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Point Sources ──────────────────────────────────────────────────────────

/// Actions that can earn points. Earning rules and expiry rules are keyed by
/// this category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Purchase,
    Referral,
    Review,
    Engagement,
    Signup,
    Campaign,
    Bonus,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Purchase => "purchase",
            SourceType::Referral => "referral",
            SourceType::Review => "review",
            SourceType::Engagement => "engagement",
            SourceType::Signup => "signup",
            SourceType::Campaign => "campaign",
            SourceType::Bonus => "bonus",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── Points Configuration ───────────────────────────────────────────────────

/// One version of the program-wide rule-set toggles. At most one
/// configuration is active at any instant; activation atomically supersedes
/// the predecessor. Versions are monotonic and never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsConfiguration {
    pub id: Uuid,
    pub version: u64,
    pub is_active: bool,
    pub points_enabled: bool,
    pub redemption_enabled: bool,
    /// When false, the larger of tier/campaign multiplier applies instead of
    /// their product.
    pub allow_stacking: bool,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

// ─── Tiers ──────────────────────────────────────────────────────────────────

/// Qualification window for tier evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationWindow {
    /// All points ever earned count.
    Lifetime,
    /// Only points earned in the trailing window count.
    Days(u32),
}

impl EvaluationWindow {
    /// Earliest `earned_at` that still counts, or `None` for lifetime.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            EvaluationWindow::Lifetime => None,
            EvaluationWindow::Days(d) => Some(now - Duration::days(*d as i64)),
        }
    }
}

/// A customer segment unlocked by a points threshold. Active tiers form a
/// contiguous ascending `tier_level` sequence matching ascending
/// `min_points`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier {
    pub id: Uuid,
    pub tier_level: u32,
    pub name: String,
    pub min_points: i64,
    pub multiplier: f64,
    pub can_gift_points: bool,
    pub max_gift_per_month: Option<i64>,
    /// `None` = use the expiry rule's days, `Some(0)` = points never expire,
    /// `Some(n)` = override the rule's rolling duration.
    pub expiry_override_days: Option<u32>,
    pub downgrade_after_inactive_days: u32,
    pub evaluation_window: EvaluationWindow,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Earning Rules ──────────────────────────────────────────────────────────

/// Maps a qualifying action to a base point award. An enabled rule whose
/// `expiry_rule_id` does not resolve is excluded from earning calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningRule {
    pub id: Uuid,
    pub rule_name: String,
    pub source_type: SourceType,
    pub points_awarded: i64,
    pub expiry_rule_id: Uuid,
    pub enabled: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Expiry Rules ───────────────────────────────────────────────────────────

/// How an expiry deadline is anchored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryMode {
    /// A fixed duration after the earn date.
    Rolling,
    /// Anchored to a specific day of the month regardless of earn date.
    FixedMonthly,
}

/// Expiry policy for one source-type category. At most one active rule per
/// `expiry_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryRule {
    pub id: Uuid,
    pub expiry_type: SourceType,
    pub expiry_mode: ExpiryMode,
    pub expiry_days: u32,
    /// 1–28; meaningful only under `FixedMonthly`. Days past a target
    /// month's length clamp to that month's last day.
    pub fixed_day_of_month: u32,
    pub grace_period_days: u32,
    pub warning_days_before: u32,
    pub send_expiry_notifications: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Ledger ─────────────────────────────────────────────────────────────────

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Earn,
    Spend,
}

/// One immutable record of points gained or spent by a user. Earn entries
/// are drained soonest-expiry-first on redemption; `points_remaining` tracks
/// partial consumption and `consumed_at` stamps full depletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: String,
    pub kind: EntryKind,
    pub source_type: SourceType,
    pub points_delta: i64,
    pub points_remaining: i64,
    pub earned_at: DateTime<Utc>,
    /// `None` = never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Points this entry still contributes to the user's balance.
    pub fn available_points(&self, now: DateTime<Utc>) -> i64 {
        if self.kind != EntryKind::Earn || self.is_expired(now) {
            return 0;
        }
        self.points_remaining
    }
}

// ─── Referral Rewards ───────────────────────────────────────────────────────

/// Program-wide referral reward settings. Either date bound may be open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralRewardConfig {
    pub id: Uuid,
    pub enabled: bool,
    pub signup_points: i64,
    pub first_purchase_points: i64,
    pub min_purchase_amount: f64,
    /// When true, a referred identity may trigger a reward under at most one
    /// referrer platform-wide.
    pub one_reward_per_referred_user: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReferralRewardConfig {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(start) = self.start_date {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if now > end {
                return false;
            }
        }
        true
    }
}

/// A one-time milestone bonus unlocked when a referrer's successful-referral
/// count reaches `quantity` exactly. Slot numbers are ordinals and need not
/// be contiguous. Imagery lives in external file storage; only the returned
/// URL is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralSlotReward {
    pub id: Uuid,
    pub reward_config_id: Uuid,
    pub slot_number: u32,
    pub title: String,
    pub quantity: u32,
    pub value_points: i64,
    pub image_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Benefits ───────────────────────────────────────────────────────────────

/// Catalog entry describing a perk that tiers can grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benefit {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tier ↔ benefit association, toggleable without deleting the benefit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBenefit {
    pub id: Uuid,
    pub tier_id: Uuid,
    pub benefit_id: Uuid,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

// ─── Guardrails ─────────────────────────────────────────────────────────────

/// What a tripped guardrail does to the offending operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailAction {
    /// Log and count; the operation proceeds.
    Flag,
    /// Reject the operation.
    Block,
}

/// Abuse thresholds. Anything unset is unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub id: Uuid,
    pub max_points_per_user_per_day: Option<i64>,
    pub max_referrals_per_referrer_per_day: Option<u32>,
    pub action: GuardrailAction,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

// ─── Audit Log ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Activate,
    Deactivate,
}

/// One recorded registry mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user: String,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
