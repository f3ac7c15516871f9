//! In-memory rule-set registry backed by DashMap.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store. The
//! activation mutex stands in for the transaction + row lock that guards the
//! single-active-configuration invariant there.

use crate::models::*;
use chrono::Utc;
use dashmap::DashMap;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::event_bus::{make_event, EventSink, EventType};
use loyalty_core::types::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Thread-safe store for the whole loyalty rule-set: configurations, tiers,
/// earning rules, expiry rules, benefits, referral rewards, guardrails, and
/// the audit log.
pub struct ConfigRegistry {
    configurations: DashMap<Uuid, PointsConfiguration>,
    tiers: DashMap<Uuid, Tier>,
    earning_rules: DashMap<Uuid, EarningRule>,
    expiry_rules: DashMap<Uuid, ExpiryRule>,
    benefits: DashMap<Uuid, Benefit>,
    tier_benefits: DashMap<Uuid, TierBenefit>,
    referral_configs: DashMap<Uuid, ReferralRewardConfig>,
    slot_rewards: DashMap<Uuid, ReferralSlotReward>,
    guardrails: DashMap<Uuid, GuardrailConfig>,
    audit_log: DashMap<Uuid, AuditLogEntry>,
    version_counter: AtomicU64,
    /// Serializes every check-then-act over the active-configuration
    /// invariant.
    activation_lock: Mutex<()>,
    events: Arc<dyn EventSink>,
}

impl ConfigRegistry {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        info!("Config registry initialized (in-memory, development mode)");
        Self {
            configurations: DashMap::new(),
            tiers: DashMap::new(),
            earning_rules: DashMap::new(),
            expiry_rules: DashMap::new(),
            benefits: DashMap::new(),
            tier_benefits: DashMap::new(),
            referral_configs: DashMap::new(),
            slot_rewards: DashMap::new(),
            guardrails: DashMap::new(),
            audit_log: DashMap::new(),
            version_counter: AtomicU64::new(0),
            activation_lock: Mutex::new(()),
            events,
        }
    }

    // ─── Configurations ────────────────────────────────────────────────────

    /// Create a draft configuration. Drafts are never active; versions come
    /// from a monotonic counter and are immutable once assigned.
    pub fn create_configuration(
        &self,
        req: CreateConfigurationRequest,
        user: &str,
    ) -> PointsConfiguration {
        let config = PointsConfiguration {
            id: Uuid::new_v4(),
            version: self.version_counter.fetch_add(1, Ordering::SeqCst) + 1,
            is_active: false,
            points_enabled: req.points_enabled,
            redemption_enabled: req.redemption_enabled,
            allow_stacking: req.allow_stacking,
            created_at: Utc::now(),
            activated_at: None,
            deactivated_at: None,
        };
        let id = config.id;
        self.configurations.insert(id, config.clone());
        self.log_audit(
            user,
            AuditAction::Create,
            "configuration",
            &id.to_string(),
            serde_json::json!({"version": config.version}),
        );
        config
    }

    pub fn list_configurations(&self) -> Vec<PointsConfiguration> {
        let mut configs: Vec<PointsConfiguration> =
            self.configurations.iter().map(|r| r.value().clone()).collect();
        configs.sort_by(|a, b| b.version.cmp(&a.version));
        configs
    }

    pub fn get_configuration(&self, id: Uuid) -> LoyaltyResult<PointsConfiguration> {
        self.configurations
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LoyaltyError::not_found("configuration", id))
    }

    /// The single active configuration, if any version has been activated.
    pub fn active_configuration(&self) -> Option<PointsConfiguration> {
        self.configurations
            .iter()
            .find(|r| r.value().is_active)
            .map(|r| r.value().clone())
    }

    pub fn update_configuration(
        &self,
        id: Uuid,
        req: UpdateConfigurationRequest,
        user: &str,
    ) -> LoyaltyResult<PointsConfiguration> {
        let mut entry = self
            .configurations
            .get_mut(&id)
            .ok_or_else(|| LoyaltyError::not_found("configuration", id))?;
        let c = entry.value_mut();
        if let Some(v) = req.points_enabled {
            c.points_enabled = v;
        }
        if let Some(v) = req.redemption_enabled {
            c.redemption_enabled = v;
        }
        if let Some(v) = req.allow_stacking {
            c.allow_stacking = v;
        }
        let updated = c.clone();
        drop(entry);
        self.log_audit(
            user,
            AuditAction::Update,
            "configuration",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(updated)
    }

    /// Activate a configuration version, atomically deactivating the
    /// predecessor. Concurrent activations serialize on the activation
    /// lock; a request whose target is already active loses with a
    /// conflict instead of corrupting the invariant.
    pub fn activate(&self, id: Uuid, user: &str) -> LoyaltyResult<PointsConfiguration> {
        let _guard = self.activation_lock.lock();

        let target = self.get_configuration(id)?;
        if target.is_active {
            return Err(LoyaltyError::conflict(
                "configuration",
                id,
                "already active",
            ));
        }

        let now = Utc::now();
        if let Some(previous) = self.active_configuration() {
            if let Some(mut entry) = self.configurations.get_mut(&previous.id) {
                entry.is_active = false;
                entry.deactivated_at = Some(now);
            }
            self.events.emit(make_event(
                EventType::ConfigurationDeactivated,
                None,
                Some(previous.id.to_string()),
                None,
            ));
        }

        let activated = {
            let mut entry = self
                .configurations
                .get_mut(&id)
                .ok_or_else(|| LoyaltyError::not_found("configuration", id))?;
            entry.is_active = true;
            entry.activated_at = Some(now);
            entry.clone()
        };

        metrics::counter!("registry.configurations.activated").increment(1);
        self.events.emit(make_event(
            EventType::ConfigurationActivated,
            None,
            Some(id.to_string()),
            None,
        ));
        self.log_audit(
            user,
            AuditAction::Activate,
            "configuration",
            &id.to_string(),
            serde_json::json!({"version": activated.version}),
        );
        info!(config_id = %id, version = activated.version, "Configuration activated");

        Ok(activated)
    }

    /// Deactivate the given configuration, leaving no active version.
    pub fn deactivate(&self, id: Uuid, user: &str) -> LoyaltyResult<PointsConfiguration> {
        let _guard = self.activation_lock.lock();

        let target = self.get_configuration(id)?;
        if !target.is_active {
            return Err(LoyaltyError::state(format!(
                "configuration {} is not active",
                id
            )));
        }

        let deactivated = {
            let mut entry = self
                .configurations
                .get_mut(&id)
                .ok_or_else(|| LoyaltyError::not_found("configuration", id))?;
            entry.is_active = false;
            entry.deactivated_at = Some(Utc::now());
            entry.clone()
        };

        self.events.emit(make_event(
            EventType::ConfigurationDeactivated,
            None,
            Some(id.to_string()),
            None,
        ));
        self.log_audit(
            user,
            AuditAction::Deactivate,
            "configuration",
            &id.to_string(),
            serde_json::json!({}),
        );

        Ok(deactivated)
    }

    pub fn delete_configuration(&self, id: Uuid, user: &str) -> LoyaltyResult<()> {
        let _guard = self.activation_lock.lock();

        let target = self.get_configuration(id)?;
        if target.is_active {
            return Err(LoyaltyError::state(format!(
                "cannot delete active configuration {}",
                id
            )));
        }
        self.configurations.remove(&id);
        self.log_audit(
            user,
            AuditAction::Delete,
            "configuration",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(())
    }

    // ─── Tiers ─────────────────────────────────────────────────────────────

    pub fn create_tier(&self, req: CreateTierRequest, user: &str) -> LoyaltyResult<Tier> {
        if req.multiplier < 1.0 {
            return Err(LoyaltyError::validation(format!(
                "tier multiplier must be >= 1.0, got {}",
                req.multiplier
            )));
        }
        let now = Utc::now();
        let tier = Tier {
            id: Uuid::new_v4(),
            tier_level: req.tier_level,
            name: req.name,
            min_points: req.min_points,
            multiplier: req.multiplier,
            can_gift_points: req.can_gift_points,
            max_gift_per_month: req.max_gift_per_month,
            expiry_override_days: req.expiry_override_days,
            downgrade_after_inactive_days: req.downgrade_after_inactive_days,
            evaluation_window: req.evaluation_window,
            active: req.active,
            created_at: now,
            updated_at: now,
        };

        let mut candidate = self.active_tiers_sorted();
        if tier.active {
            candidate.push(tier.clone());
        }
        validate_tier_set(&candidate)?;

        self.tiers.insert(tier.id, tier.clone());
        self.log_audit(
            user,
            AuditAction::Create,
            "tier",
            &tier.id.to_string(),
            serde_json::json!({"name": &tier.name, "level": tier.tier_level}),
        );
        Ok(tier)
    }

    pub fn update_tier(&self, id: Uuid, req: UpdateTierRequest, user: &str) -> LoyaltyResult<Tier> {
        let current = self.get_tier(id)?;
        let mut updated = current.clone();
        if let Some(name) = req.name {
            updated.name = name;
        }
        if let Some(min_points) = req.min_points {
            updated.min_points = min_points;
        }
        if let Some(multiplier) = req.multiplier {
            updated.multiplier = multiplier;
        }
        if let Some(v) = req.can_gift_points {
            updated.can_gift_points = v;
        }
        if let Some(v) = req.max_gift_per_month {
            updated.max_gift_per_month = v;
        }
        if let Some(v) = req.expiry_override_days {
            updated.expiry_override_days = v;
        }
        if let Some(v) = req.downgrade_after_inactive_days {
            updated.downgrade_after_inactive_days = v;
        }
        if let Some(v) = req.evaluation_window {
            updated.evaluation_window = v;
        }
        if let Some(v) = req.active {
            updated.active = v;
        }
        updated.updated_at = Utc::now();

        if updated.multiplier < 1.0 {
            return Err(LoyaltyError::validation(format!(
                "tier multiplier must be >= 1.0, got {}",
                updated.multiplier
            )));
        }

        let mut candidate: Vec<Tier> = self
            .active_tiers_sorted()
            .into_iter()
            .filter(|t| t.id != id)
            .collect();
        if updated.active {
            candidate.push(updated.clone());
        }
        validate_tier_set(&candidate)?;

        self.tiers.insert(id, updated.clone());
        self.log_audit(
            user,
            AuditAction::Update,
            "tier",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(updated)
    }

    pub fn delete_tier(&self, id: Uuid, user: &str) -> LoyaltyResult<()> {
        let target = self.get_tier(id)?;

        let candidate: Vec<Tier> = self
            .active_tiers_sorted()
            .into_iter()
            .filter(|t| t.id != id)
            .collect();
        validate_tier_set(&candidate)?;

        self.tiers.remove(&id);
        // Tier-benefit links die with the tier.
        let link_ids: Vec<Uuid> = self
            .tier_benefits
            .iter()
            .filter(|r| r.value().tier_id == id)
            .map(|r| *r.key())
            .collect();
        for link_id in link_ids {
            self.tier_benefits.remove(&link_id);
        }
        self.log_audit(
            user,
            AuditAction::Delete,
            "tier",
            &id.to_string(),
            serde_json::json!({"name": target.name}),
        );
        Ok(())
    }

    pub fn get_tier(&self, id: Uuid) -> LoyaltyResult<Tier> {
        self.tiers
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LoyaltyError::not_found("tier", id))
    }

    pub fn list_tiers(&self) -> Vec<Tier> {
        let mut tiers: Vec<Tier> = self.tiers.iter().map(|r| r.value().clone()).collect();
        tiers.sort_by_key(|t| t.tier_level);
        tiers
    }

    /// Active tiers in ascending level order.
    pub fn active_tiers_sorted(&self) -> Vec<Tier> {
        let mut tiers: Vec<Tier> = self
            .tiers
            .iter()
            .filter(|r| r.value().active)
            .map(|r| r.value().clone())
            .collect();
        tiers.sort_by_key(|t| t.tier_level);
        tiers
    }

    // ─── Earning Rules ─────────────────────────────────────────────────────

    pub fn create_earning_rule(
        &self,
        req: CreateEarningRuleRequest,
        user: &str,
    ) -> LoyaltyResult<EarningRule> {
        if req.points_awarded < 0 {
            return Err(LoyaltyError::validation(format!(
                "points awarded must be non-negative, got {}",
                req.points_awarded
            )));
        }
        if !self.expiry_rules.contains_key(&req.expiry_rule_id) {
            return Err(LoyaltyError::not_found("expiry rule", req.expiry_rule_id));
        }
        if req.enabled {
            self.ensure_no_enabled_rule_for(req.source_type, None)?;
        }

        let now = Utc::now();
        let rule = EarningRule {
            id: Uuid::new_v4(),
            rule_name: req.rule_name,
            source_type: req.source_type,
            points_awarded: req.points_awarded,
            expiry_rule_id: req.expiry_rule_id,
            enabled: req.enabled,
            description: req.description,
            created_at: now,
            updated_at: now,
        };
        self.earning_rules.insert(rule.id, rule.clone());
        self.log_audit(
            user,
            AuditAction::Create,
            "earning_rule",
            &rule.id.to_string(),
            serde_json::json!({"name": &rule.rule_name, "source": rule.source_type.as_str()}),
        );
        Ok(rule)
    }

    pub fn update_earning_rule(
        &self,
        id: Uuid,
        req: UpdateEarningRuleRequest,
        user: &str,
    ) -> LoyaltyResult<EarningRule> {
        let current = self.get_earning_rule(id)?;
        let mut updated = current.clone();
        if let Some(name) = req.rule_name {
            updated.rule_name = name;
        }
        if let Some(points) = req.points_awarded {
            updated.points_awarded = points;
        }
        if let Some(expiry_id) = req.expiry_rule_id {
            updated.expiry_rule_id = expiry_id;
        }
        if let Some(enabled) = req.enabled {
            updated.enabled = enabled;
        }
        if let Some(desc) = req.description {
            updated.description = desc;
        }
        updated.updated_at = Utc::now();

        if updated.points_awarded < 0 {
            return Err(LoyaltyError::validation(format!(
                "points awarded must be non-negative, got {}",
                updated.points_awarded
            )));
        }
        if !self.expiry_rules.contains_key(&updated.expiry_rule_id) {
            return Err(LoyaltyError::not_found("expiry rule", updated.expiry_rule_id));
        }
        if updated.enabled && !current.enabled {
            self.ensure_no_enabled_rule_for(updated.source_type, Some(id))?;
        }

        self.earning_rules.insert(id, updated.clone());
        self.log_audit(
            user,
            AuditAction::Update,
            "earning_rule",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(updated)
    }

    pub fn delete_earning_rule(&self, id: Uuid, user: &str) -> LoyaltyResult<()> {
        self.get_earning_rule(id)?;
        self.earning_rules.remove(&id);
        self.log_audit(
            user,
            AuditAction::Delete,
            "earning_rule",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(())
    }

    pub fn get_earning_rule(&self, id: Uuid) -> LoyaltyResult<EarningRule> {
        self.earning_rules
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LoyaltyError::not_found("earning rule", id))
    }

    pub fn list_earning_rules(&self) -> Vec<EarningRule> {
        let mut rules: Vec<EarningRule> =
            self.earning_rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rules
    }

    /// The enabled earning rule for a source type, if its expiry reference
    /// still resolves. A dangling reference makes the rule invalid and it is
    /// excluded from earning calculation.
    pub fn enabled_rule_for_source(&self, source_type: SourceType) -> Option<EarningRule> {
        let rule = self
            .earning_rules
            .iter()
            .find(|r| r.value().enabled && r.value().source_type == source_type)
            .map(|r| r.value().clone())?;
        if !self.expiry_rules.contains_key(&rule.expiry_rule_id) {
            tracing::warn!(
                rule_id = %rule.id,
                expiry_rule_id = %rule.expiry_rule_id,
                "Enabled earning rule references a missing expiry rule; excluded"
            );
            return None;
        }
        Some(rule)
    }

    fn ensure_no_enabled_rule_for(
        &self,
        source_type: SourceType,
        exclude: Option<Uuid>,
    ) -> LoyaltyResult<()> {
        if let Some(existing) = self.earning_rules.iter().find(|r| {
            r.value().enabled
                && r.value().source_type == source_type
                && Some(*r.key()) != exclude
        }) {
            return Err(LoyaltyError::conflict(
                "earning_rule",
                *existing.key(),
                format!("an enabled rule for source '{}' already exists", source_type),
            ));
        }
        Ok(())
    }

    // ─── Expiry Rules ──────────────────────────────────────────────────────

    pub fn create_expiry_rule(
        &self,
        req: CreateExpiryRuleRequest,
        user: &str,
    ) -> LoyaltyResult<ExpiryRule> {
        if req.expiry_mode == ExpiryMode::FixedMonthly
            && !(1..=28).contains(&req.fixed_day_of_month)
        {
            return Err(LoyaltyError::validation(format!(
                "fixed_day_of_month must be within 1-28, got {}",
                req.fixed_day_of_month
            )));
        }
        if req.active {
            self.ensure_no_active_expiry_rule_for(req.expiry_type, None)?;
        }

        let now = Utc::now();
        let rule = ExpiryRule {
            id: Uuid::new_v4(),
            expiry_type: req.expiry_type,
            expiry_mode: req.expiry_mode,
            expiry_days: req.expiry_days,
            fixed_day_of_month: req.fixed_day_of_month,
            grace_period_days: req.grace_period_days,
            warning_days_before: req.warning_days_before,
            send_expiry_notifications: req.send_expiry_notifications,
            active: req.active,
            created_at: now,
            updated_at: now,
        };
        self.expiry_rules.insert(rule.id, rule.clone());
        self.log_audit(
            user,
            AuditAction::Create,
            "expiry_rule",
            &rule.id.to_string(),
            serde_json::json!({"type": rule.expiry_type.as_str()}),
        );
        Ok(rule)
    }

    pub fn update_expiry_rule(
        &self,
        id: Uuid,
        req: UpdateExpiryRuleRequest,
        user: &str,
    ) -> LoyaltyResult<ExpiryRule> {
        let current = self.get_expiry_rule(id)?;
        let mut updated = current.clone();
        if let Some(mode) = req.expiry_mode {
            updated.expiry_mode = mode;
        }
        if let Some(days) = req.expiry_days {
            updated.expiry_days = days;
        }
        if let Some(day) = req.fixed_day_of_month {
            updated.fixed_day_of_month = day;
        }
        if let Some(grace) = req.grace_period_days {
            updated.grace_period_days = grace;
        }
        if let Some(warn_days) = req.warning_days_before {
            updated.warning_days_before = warn_days;
        }
        if let Some(send) = req.send_expiry_notifications {
            updated.send_expiry_notifications = send;
        }
        if let Some(active) = req.active {
            updated.active = active;
        }
        updated.updated_at = Utc::now();

        if updated.expiry_mode == ExpiryMode::FixedMonthly
            && !(1..=28).contains(&updated.fixed_day_of_month)
        {
            return Err(LoyaltyError::validation(format!(
                "fixed_day_of_month must be within 1-28, got {}",
                updated.fixed_day_of_month
            )));
        }
        if updated.active && !current.active {
            self.ensure_no_active_expiry_rule_for(updated.expiry_type, Some(id))?;
        }
        // Disabling a rule an enabled earning rule still depends on would
        // silently break earning for that source.
        if !updated.active && current.active {
            self.ensure_not_referenced_by_enabled_rule(id, "disable")?;
        }

        self.expiry_rules.insert(id, updated.clone());
        self.log_audit(
            user,
            AuditAction::Update,
            "expiry_rule",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(updated)
    }

    pub fn delete_expiry_rule(&self, id: Uuid, user: &str) -> LoyaltyResult<()> {
        self.get_expiry_rule(id)?;
        self.ensure_not_referenced_by_enabled_rule(id, "delete")?;
        self.expiry_rules.remove(&id);
        self.log_audit(
            user,
            AuditAction::Delete,
            "expiry_rule",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(())
    }

    pub fn get_expiry_rule(&self, id: Uuid) -> LoyaltyResult<ExpiryRule> {
        self.expiry_rules
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LoyaltyError::not_found("expiry rule", id))
    }

    pub fn list_expiry_rules(&self) -> Vec<ExpiryRule> {
        let mut rules: Vec<ExpiryRule> =
            self.expiry_rules.iter().map(|r| r.value().clone()).collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rules
    }

    /// The active expiry rule for a source-type category, if configured.
    pub fn active_expiry_rule_for(&self, source_type: SourceType) -> Option<ExpiryRule> {
        self.expiry_rules
            .iter()
            .find(|r| r.value().active && r.value().expiry_type == source_type)
            .map(|r| r.value().clone())
    }

    fn ensure_no_active_expiry_rule_for(
        &self,
        expiry_type: SourceType,
        exclude: Option<Uuid>,
    ) -> LoyaltyResult<()> {
        if let Some(existing) = self.expiry_rules.iter().find(|r| {
            r.value().active && r.value().expiry_type == expiry_type && Some(*r.key()) != exclude
        }) {
            return Err(LoyaltyError::conflict(
                "expiry_rule",
                *existing.key(),
                format!("an active rule for type '{}' already exists", expiry_type),
            ));
        }
        Ok(())
    }

    fn ensure_not_referenced_by_enabled_rule(
        &self,
        expiry_rule_id: Uuid,
        verb: &str,
    ) -> LoyaltyResult<()> {
        if let Some(dependent) = self
            .earning_rules
            .iter()
            .find(|r| r.value().enabled && r.value().expiry_rule_id == expiry_rule_id)
        {
            return Err(LoyaltyError::state(format!(
                "cannot {} expiry rule {}: enabled earning rule {} still references it",
                verb,
                expiry_rule_id,
                dependent.key()
            )));
        }
        Ok(())
    }

    // ─── Benefits ──────────────────────────────────────────────────────────

    pub fn create_benefit(&self, req: CreateBenefitRequest, user: &str) -> Benefit {
        let now = Utc::now();
        let benefit = Benefit {
            id: Uuid::new_v4(),
            name: req.name,
            description: req.description,
            active: req.active,
            created_at: now,
            updated_at: now,
        };
        self.benefits.insert(benefit.id, benefit.clone());
        self.log_audit(
            user,
            AuditAction::Create,
            "benefit",
            &benefit.id.to_string(),
            serde_json::json!({"name": &benefit.name}),
        );
        benefit
    }

    pub fn update_benefit(
        &self,
        id: Uuid,
        req: UpdateBenefitRequest,
        user: &str,
    ) -> LoyaltyResult<Benefit> {
        let mut entry = self
            .benefits
            .get_mut(&id)
            .ok_or_else(|| LoyaltyError::not_found("benefit", id))?;
        let b = entry.value_mut();
        if let Some(name) = req.name {
            b.name = name;
        }
        if let Some(desc) = req.description {
            b.description = desc;
        }
        if let Some(active) = req.active {
            b.active = active;
        }
        b.updated_at = Utc::now();
        let updated = b.clone();
        drop(entry);
        self.log_audit(
            user,
            AuditAction::Update,
            "benefit",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(updated)
    }

    pub fn delete_benefit(&self, id: Uuid, user: &str) -> LoyaltyResult<()> {
        self.benefits
            .remove(&id)
            .ok_or_else(|| LoyaltyError::not_found("benefit", id))?;
        let link_ids: Vec<Uuid> = self
            .tier_benefits
            .iter()
            .filter(|r| r.value().benefit_id == id)
            .map(|r| *r.key())
            .collect();
        for link_id in link_ids {
            self.tier_benefits.remove(&link_id);
        }
        self.log_audit(
            user,
            AuditAction::Delete,
            "benefit",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(())
    }

    pub fn list_benefits(&self) -> Vec<Benefit> {
        let mut benefits: Vec<Benefit> = self.benefits.iter().map(|r| r.value().clone()).collect();
        benefits.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        benefits
    }

    /// Link a benefit to a tier. The association toggles independently of
    /// the benefit definition.
    pub fn create_tier_benefit(
        &self,
        req: CreateTierBenefitRequest,
        user: &str,
    ) -> LoyaltyResult<TierBenefit> {
        self.get_tier(req.tier_id)?;
        if !self.benefits.contains_key(&req.benefit_id) {
            return Err(LoyaltyError::not_found("benefit", req.benefit_id));
        }
        if let Some(existing) = self
            .tier_benefits
            .iter()
            .find(|r| r.value().tier_id == req.tier_id && r.value().benefit_id == req.benefit_id)
        {
            return Err(LoyaltyError::conflict(
                "tier_benefit",
                *existing.key(),
                "tier already has this benefit",
            ));
        }

        let link = TierBenefit {
            id: Uuid::new_v4(),
            tier_id: req.tier_id,
            benefit_id: req.benefit_id,
            active: req.active,
            created_at: Utc::now(),
        };
        self.tier_benefits.insert(link.id, link.clone());
        self.log_audit(
            user,
            AuditAction::Create,
            "tier_benefit",
            &link.id.to_string(),
            serde_json::json!({"tier_id": req.tier_id, "benefit_id": req.benefit_id}),
        );
        Ok(link)
    }

    pub fn set_tier_benefit_active(
        &self,
        id: Uuid,
        active: bool,
        user: &str,
    ) -> LoyaltyResult<TierBenefit> {
        let mut entry = self
            .tier_benefits
            .get_mut(&id)
            .ok_or_else(|| LoyaltyError::not_found("tier benefit", id))?;
        entry.value_mut().active = active;
        let updated = entry.value().clone();
        drop(entry);
        self.log_audit(
            user,
            AuditAction::Update,
            "tier_benefit",
            &id.to_string(),
            serde_json::json!({"active": active}),
        );
        Ok(updated)
    }

    pub fn delete_tier_benefit(&self, id: Uuid, user: &str) -> LoyaltyResult<()> {
        self.tier_benefits
            .remove(&id)
            .ok_or_else(|| LoyaltyError::not_found("tier benefit", id))?;
        self.log_audit(
            user,
            AuditAction::Delete,
            "tier_benefit",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(())
    }

    pub fn list_tier_benefits(&self) -> Vec<TierBenefit> {
        self.tier_benefits.iter().map(|r| r.value().clone()).collect()
    }

    // ─── Referral Rewards ──────────────────────────────────────────────────

    pub fn create_referral_config(
        &self,
        req: CreateReferralConfigRequest,
        user: &str,
    ) -> LoyaltyResult<ReferralRewardConfig> {
        if req.signup_points < 0 || req.first_purchase_points < 0 {
            return Err(LoyaltyError::validation(
                "referral reward points must be non-negative",
            ));
        }
        if req.min_purchase_amount < 0.0 {
            return Err(LoyaltyError::validation(
                "minimum purchase amount must be non-negative",
            ));
        }
        if req.enabled {
            self.ensure_no_enabled_referral_config(None)?;
        }

        let now = Utc::now();
        let config = ReferralRewardConfig {
            id: Uuid::new_v4(),
            enabled: req.enabled,
            signup_points: req.signup_points,
            first_purchase_points: req.first_purchase_points,
            min_purchase_amount: req.min_purchase_amount,
            one_reward_per_referred_user: req.one_reward_per_referred_user,
            start_date: req.start_date,
            end_date: req.end_date,
            created_at: now,
            updated_at: now,
        };
        self.referral_configs.insert(config.id, config.clone());
        self.log_audit(
            user,
            AuditAction::Create,
            "referral_config",
            &config.id.to_string(),
            serde_json::json!({}),
        );
        Ok(config)
    }

    pub fn update_referral_config(
        &self,
        id: Uuid,
        req: UpdateReferralConfigRequest,
        user: &str,
    ) -> LoyaltyResult<ReferralRewardConfig> {
        let current = self.get_referral_config(id)?;
        let mut updated = current.clone();
        if let Some(enabled) = req.enabled {
            updated.enabled = enabled;
        }
        if let Some(points) = req.signup_points {
            updated.signup_points = points;
        }
        if let Some(points) = req.first_purchase_points {
            updated.first_purchase_points = points;
        }
        if let Some(amount) = req.min_purchase_amount {
            updated.min_purchase_amount = amount;
        }
        if let Some(v) = req.one_reward_per_referred_user {
            updated.one_reward_per_referred_user = v;
        }
        if let Some(date) = req.start_date {
            updated.start_date = date;
        }
        if let Some(date) = req.end_date {
            updated.end_date = date;
        }
        updated.updated_at = Utc::now();

        if updated.signup_points < 0 || updated.first_purchase_points < 0 {
            return Err(LoyaltyError::validation(
                "referral reward points must be non-negative",
            ));
        }
        if updated.min_purchase_amount < 0.0 {
            return Err(LoyaltyError::validation(
                "minimum purchase amount must be non-negative",
            ));
        }
        if updated.enabled && !current.enabled {
            self.ensure_no_enabled_referral_config(Some(id))?;
        }

        self.referral_configs.insert(id, updated.clone());
        self.log_audit(
            user,
            AuditAction::Update,
            "referral_config",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(updated)
    }

    pub fn delete_referral_config(&self, id: Uuid, user: &str) -> LoyaltyResult<()> {
        self.referral_configs
            .remove(&id)
            .ok_or_else(|| LoyaltyError::not_found("referral config", id))?;
        let slot_ids: Vec<Uuid> = self
            .slot_rewards
            .iter()
            .filter(|r| r.value().reward_config_id == id)
            .map(|r| *r.key())
            .collect();
        for slot_id in slot_ids {
            self.slot_rewards.remove(&slot_id);
        }
        self.log_audit(
            user,
            AuditAction::Delete,
            "referral_config",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(())
    }

    pub fn get_referral_config(&self, id: Uuid) -> LoyaltyResult<ReferralRewardConfig> {
        self.referral_configs
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LoyaltyError::not_found("referral config", id))
    }

    pub fn list_referral_configs(&self) -> Vec<ReferralRewardConfig> {
        let mut configs: Vec<ReferralRewardConfig> =
            self.referral_configs.iter().map(|r| r.value().clone()).collect();
        configs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        configs
    }

    /// The single enabled referral config, if any.
    pub fn enabled_referral_config(&self) -> Option<ReferralRewardConfig> {
        self.referral_configs
            .iter()
            .find(|r| r.value().enabled)
            .map(|r| r.value().clone())
    }

    fn ensure_no_enabled_referral_config(&self, exclude: Option<Uuid>) -> LoyaltyResult<()> {
        if let Some(existing) = self
            .referral_configs
            .iter()
            .find(|r| r.value().enabled && Some(*r.key()) != exclude)
        {
            return Err(LoyaltyError::conflict(
                "referral_config",
                *existing.key(),
                "an enabled referral config already exists",
            ));
        }
        Ok(())
    }

    // ─── Slot Rewards ──────────────────────────────────────────────────────

    pub fn create_slot_reward(
        &self,
        req: CreateSlotRewardRequest,
        user: &str,
    ) -> LoyaltyResult<ReferralSlotReward> {
        self.get_referral_config(req.reward_config_id)?;
        if req.quantity == 0 {
            return Err(LoyaltyError::validation("slot quantity must be at least 1"));
        }
        if req.value_points < 0 {
            return Err(LoyaltyError::validation("slot value points must be non-negative"));
        }
        if let Some(existing) = self.slot_rewards.iter().find(|r| {
            r.value().reward_config_id == req.reward_config_id
                && r.value().slot_number == req.slot_number
        }) {
            return Err(LoyaltyError::conflict(
                "slot_reward",
                *existing.key(),
                format!("slot number {} already exists", req.slot_number),
            ));
        }

        let now = Utc::now();
        let slot = ReferralSlotReward {
            id: Uuid::new_v4(),
            reward_config_id: req.reward_config_id,
            slot_number: req.slot_number,
            title: req.title,
            quantity: req.quantity,
            value_points: req.value_points,
            image_url: req.image_url,
            active: req.active,
            created_at: now,
            updated_at: now,
        };
        self.slot_rewards.insert(slot.id, slot.clone());
        self.log_audit(
            user,
            AuditAction::Create,
            "slot_reward",
            &slot.id.to_string(),
            serde_json::json!({"slot": slot.slot_number, "quantity": slot.quantity}),
        );
        Ok(slot)
    }

    pub fn update_slot_reward(
        &self,
        id: Uuid,
        req: UpdateSlotRewardRequest,
        user: &str,
    ) -> LoyaltyResult<ReferralSlotReward> {
        let current = self.get_slot_reward(id)?;
        let mut updated = current.clone();
        if let Some(number) = req.slot_number {
            updated.slot_number = number;
        }
        if let Some(title) = req.title {
            updated.title = title;
        }
        if let Some(quantity) = req.quantity {
            updated.quantity = quantity;
        }
        if let Some(points) = req.value_points {
            updated.value_points = points;
        }
        if let Some(url) = req.image_url {
            updated.image_url = url;
        }
        if let Some(active) = req.active {
            updated.active = active;
        }
        updated.updated_at = Utc::now();

        if updated.quantity == 0 {
            return Err(LoyaltyError::validation("slot quantity must be at least 1"));
        }
        if updated.value_points < 0 {
            return Err(LoyaltyError::validation("slot value points must be non-negative"));
        }
        if updated.slot_number != current.slot_number {
            if let Some(existing) = self.slot_rewards.iter().find(|r| {
                r.value().reward_config_id == updated.reward_config_id
                    && r.value().slot_number == updated.slot_number
                    && *r.key() != id
            }) {
                return Err(LoyaltyError::conflict(
                    "slot_reward",
                    *existing.key(),
                    format!("slot number {} already exists", updated.slot_number),
                ));
            }
        }

        self.slot_rewards.insert(id, updated.clone());
        self.log_audit(
            user,
            AuditAction::Update,
            "slot_reward",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(updated)
    }

    pub fn delete_slot_reward(&self, id: Uuid, user: &str) -> LoyaltyResult<()> {
        self.slot_rewards
            .remove(&id)
            .ok_or_else(|| LoyaltyError::not_found("slot reward", id))?;
        self.log_audit(
            user,
            AuditAction::Delete,
            "slot_reward",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(())
    }

    pub fn get_slot_reward(&self, id: Uuid) -> LoyaltyResult<ReferralSlotReward> {
        self.slot_rewards
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LoyaltyError::not_found("slot reward", id))
    }

    pub fn list_slot_rewards(&self) -> Vec<ReferralSlotReward> {
        let mut slots: Vec<ReferralSlotReward> =
            self.slot_rewards.iter().map(|r| r.value().clone()).collect();
        slots.sort_by_key(|s| s.slot_number);
        slots
    }

    /// Active slots belonging to one referral config.
    pub fn active_slot_rewards_for(&self, reward_config_id: Uuid) -> Vec<ReferralSlotReward> {
        let mut slots: Vec<ReferralSlotReward> = self
            .slot_rewards
            .iter()
            .filter(|r| r.value().active && r.value().reward_config_id == reward_config_id)
            .map(|r| r.value().clone())
            .collect();
        slots.sort_by_key(|s| s.slot_number);
        slots
    }

    // ─── Guardrails ────────────────────────────────────────────────────────

    pub fn create_guardrail(&self, req: CreateGuardrailRequest, user: &str) -> GuardrailConfig {
        let guardrail = GuardrailConfig {
            id: Uuid::new_v4(),
            max_points_per_user_per_day: req.max_points_per_user_per_day,
            max_referrals_per_referrer_per_day: req.max_referrals_per_referrer_per_day,
            action: req.action,
            active: req.active,
            created_at: Utc::now(),
        };
        self.guardrails.insert(guardrail.id, guardrail.clone());
        self.log_audit(
            user,
            AuditAction::Create,
            "guardrail",
            &guardrail.id.to_string(),
            serde_json::json!({}),
        );
        guardrail
    }

    pub fn delete_guardrail(&self, id: Uuid, user: &str) -> LoyaltyResult<()> {
        self.guardrails
            .remove(&id)
            .ok_or_else(|| LoyaltyError::not_found("guardrail", id))?;
        self.log_audit(
            user,
            AuditAction::Delete,
            "guardrail",
            &id.to_string(),
            serde_json::json!({}),
        );
        Ok(())
    }

    pub fn list_guardrails(&self) -> Vec<GuardrailConfig> {
        self.guardrails.iter().map(|r| r.value().clone()).collect()
    }

    pub fn active_guardrails(&self) -> Vec<GuardrailConfig> {
        self.guardrails
            .iter()
            .filter(|r| r.value().active)
            .map(|r| r.value().clone())
            .collect()
    }

    // ─── Audit Log ─────────────────────────────────────────────────────────

    pub fn get_audit_log(&self) -> Vec<AuditLogEntry> {
        let mut entries: Vec<AuditLogEntry> =
            self.audit_log.iter().map(|r| r.value().clone()).collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    fn log_audit(
        &self,
        user: &str,
        action: AuditAction,
        resource_type: &str,
        resource_id: &str,
        details: serde_json::Value,
    ) {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            user: user.to_string(),
            action,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details,
            timestamp: Utc::now(),
        };
        self.audit_log.insert(entry.id, entry);
    }
}

/// Active tiers must form a contiguous 1..N level sequence with strictly
/// ascending thresholds.
fn validate_tier_set(tiers: &[Tier]) -> LoyaltyResult<()> {
    let mut sorted: Vec<&Tier> = tiers.iter().collect();
    sorted.sort_by_key(|t| t.tier_level);

    for (i, tier) in sorted.iter().enumerate() {
        let expected = (i + 1) as u32;
        if tier.tier_level != expected {
            return Err(LoyaltyError::validation(format!(
                "active tier levels must be contiguous from 1; expected level {}, found {}",
                expected, tier.tier_level
            )));
        }
        if i > 0 && sorted[i - 1].min_points >= tier.min_points {
            return Err(LoyaltyError::validation(format!(
                "tier thresholds must ascend with level: level {} ({}) vs level {} ({})",
                sorted[i - 1].tier_level,
                sorted[i - 1].min_points,
                tier.tier_level,
                tier.min_points
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_core::event_bus::noop_sink;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::new(noop_sink())
    }

    fn config_req() -> CreateConfigurationRequest {
        CreateConfigurationRequest {
            points_enabled: true,
            redemption_enabled: true,
            allow_stacking: true,
        }
    }

    fn tier_req(level: u32, min_points: i64) -> CreateTierRequest {
        CreateTierRequest {
            tier_level: level,
            name: format!("Tier {}", level),
            min_points,
            multiplier: 1.0 + level as f64 * 0.25,
            can_gift_points: false,
            max_gift_per_month: None,
            expiry_override_days: None,
            downgrade_after_inactive_days: 90,
            evaluation_window: EvaluationWindow::Days(365),
            active: true,
        }
    }

    fn expiry_req(source: SourceType) -> CreateExpiryRuleRequest {
        CreateExpiryRuleRequest {
            expiry_type: source,
            expiry_mode: ExpiryMode::Rolling,
            expiry_days: 180,
            fixed_day_of_month: 1,
            grace_period_days: 0,
            warning_days_before: 14,
            send_expiry_notifications: true,
            active: true,
        }
    }

    #[test]
    fn test_create_yields_inactive_draft_with_monotonic_versions() {
        let reg = registry();
        let a = reg.create_configuration(config_req(), "admin");
        let b = reg.create_configuration(config_req(), "admin");
        assert!(!a.is_active);
        assert!(!b.is_active);
        assert!(b.version > a.version);
        assert!(reg.active_configuration().is_none());
    }

    #[test]
    fn test_activate_flips_predecessor() {
        let reg = registry();
        let a = reg.create_configuration(config_req(), "admin");
        let b = reg.create_configuration(config_req(), "admin");

        reg.activate(a.id, "admin").unwrap();
        let activated_b = reg.activate(b.id, "admin").unwrap();

        assert!(activated_b.is_active);
        assert!(activated_b.activated_at.is_some());

        let stale_a = reg.get_configuration(a.id).unwrap();
        assert!(!stale_a.is_active);
        assert!(stale_a.deactivated_at.is_some());

        let active: Vec<_> = reg
            .list_configurations()
            .into_iter()
            .filter(|c| c.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
    }

    #[test]
    fn test_activate_already_active_conflicts() {
        let reg = registry();
        let a = reg.create_configuration(config_req(), "admin");
        reg.activate(a.id, "admin").unwrap();
        let err = reg.activate(a.id, "admin").unwrap_err();
        assert!(matches!(err, LoyaltyError::Conflict { .. }));
    }

    #[test]
    fn test_activate_missing_not_found() {
        let reg = registry();
        let err = reg.activate(Uuid::new_v4(), "admin").unwrap_err();
        assert!(matches!(err, LoyaltyError::NotFound { .. }));
    }

    #[test]
    fn test_deactivate_requires_active() {
        let reg = registry();
        let a = reg.create_configuration(config_req(), "admin");
        assert!(matches!(
            reg.deactivate(a.id, "admin").unwrap_err(),
            LoyaltyError::State(_)
        ));

        reg.activate(a.id, "admin").unwrap();
        let deactivated = reg.deactivate(a.id, "admin").unwrap();
        assert!(!deactivated.is_active);
        assert!(reg.active_configuration().is_none());
    }

    #[test]
    fn test_delete_active_configuration_rejected() {
        let reg = registry();
        let a = reg.create_configuration(config_req(), "admin");
        reg.activate(a.id, "admin").unwrap();
        assert!(matches!(
            reg.delete_configuration(a.id, "admin").unwrap_err(),
            LoyaltyError::State(_)
        ));

        reg.deactivate(a.id, "admin").unwrap();
        reg.delete_configuration(a.id, "admin").unwrap();
        assert!(reg.get_configuration(a.id).is_err());
    }

    #[test]
    fn test_concurrent_activations_keep_single_active() {
        let reg = Arc::new(registry());
        let ids: Vec<Uuid> = (0..4)
            .map(|_| reg.create_configuration(config_req(), "admin").id)
            .collect();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = reg.clone();
                let id = ids[i % ids.len()];
                std::thread::spawn(move || {
                    // Conflicts are expected; the invariant must hold anyway.
                    let _ = reg.activate(id, "admin");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let active_count = reg
            .list_configurations()
            .iter()
            .filter(|c| c.is_active)
            .count();
        assert_eq!(active_count, 1);
    }

    #[test]
    fn test_tier_levels_must_be_contiguous() {
        let reg = registry();
        reg.create_tier(tier_req(1, 0), "admin").unwrap();
        // Skipping level 2 breaks contiguity.
        assert!(matches!(
            reg.create_tier(tier_req(3, 1000), "admin").unwrap_err(),
            LoyaltyError::Validation(_)
        ));
        reg.create_tier(tier_req(2, 500), "admin").unwrap();
        reg.create_tier(tier_req(3, 1000), "admin").unwrap();
        assert_eq!(reg.active_tiers_sorted().len(), 3);
    }

    #[test]
    fn test_tier_thresholds_must_ascend() {
        let reg = registry();
        reg.create_tier(tier_req(1, 0), "admin").unwrap();
        let mut req = tier_req(2, 0);
        req.min_points = 0;
        assert!(reg.create_tier(req, "admin").is_err());
    }

    #[test]
    fn test_tier_multiplier_floor() {
        let reg = registry();
        let mut req = tier_req(1, 0);
        req.multiplier = 0.5;
        assert!(matches!(
            reg.create_tier(req, "admin").unwrap_err(),
            LoyaltyError::Validation(_)
        ));
    }

    #[test]
    fn test_tier_update_cannot_break_invariant() {
        let reg = registry();
        reg.create_tier(tier_req(1, 0), "admin").unwrap();
        let t2 = reg.create_tier(tier_req(2, 500), "admin").unwrap();

        let req = UpdateTierRequest {
            min_points: Some(0),
            ..Default::default()
        };
        assert!(reg.update_tier(t2.id, req, "admin").is_err());
        // Unchanged after the rejected update.
        assert_eq!(reg.get_tier(t2.id).unwrap().min_points, 500);
    }

    #[test]
    fn test_earning_rule_requires_existing_expiry_rule() {
        let reg = registry();
        let req = CreateEarningRuleRequest {
            rule_name: "Purchase points".into(),
            source_type: SourceType::Purchase,
            points_awarded: 10,
            expiry_rule_id: Uuid::new_v4(),
            enabled: true,
            description: None,
        };
        assert!(matches!(
            reg.create_earning_rule(req, "admin").unwrap_err(),
            LoyaltyError::NotFound { .. }
        ));
    }

    #[test]
    fn test_one_enabled_earning_rule_per_source() {
        let reg = registry();
        let expiry = reg
            .create_expiry_rule(expiry_req(SourceType::Purchase), "admin")
            .unwrap();
        let req = CreateEarningRuleRequest {
            rule_name: "Purchase points".into(),
            source_type: SourceType::Purchase,
            points_awarded: 10,
            expiry_rule_id: expiry.id,
            enabled: true,
            description: None,
        };
        reg.create_earning_rule(req.clone(), "admin").unwrap();
        assert!(matches!(
            reg.create_earning_rule(req, "admin").unwrap_err(),
            LoyaltyError::Conflict { .. }
        ));
    }

    #[test]
    fn test_negative_points_rejected() {
        let reg = registry();
        let expiry = reg
            .create_expiry_rule(expiry_req(SourceType::Review), "admin")
            .unwrap();
        let req = CreateEarningRuleRequest {
            rule_name: "Review points".into(),
            source_type: SourceType::Review,
            points_awarded: -5,
            expiry_rule_id: expiry.id,
            enabled: true,
            description: None,
        };
        assert!(matches!(
            reg.create_earning_rule(req, "admin").unwrap_err(),
            LoyaltyError::Validation(_)
        ));
    }

    #[test]
    fn test_expiry_rule_fixed_day_range() {
        let reg = registry();
        let mut req = expiry_req(SourceType::Purchase);
        req.expiry_mode = ExpiryMode::FixedMonthly;
        req.fixed_day_of_month = 29;
        assert!(matches!(
            reg.create_expiry_rule(req, "admin").unwrap_err(),
            LoyaltyError::Validation(_)
        ));
    }

    #[test]
    fn test_one_active_expiry_rule_per_type() {
        let reg = registry();
        reg.create_expiry_rule(expiry_req(SourceType::Purchase), "admin")
            .unwrap();
        assert!(matches!(
            reg.create_expiry_rule(expiry_req(SourceType::Purchase), "admin")
                .unwrap_err(),
            LoyaltyError::Conflict { .. }
        ));
        // A different category is fine.
        reg.create_expiry_rule(expiry_req(SourceType::Referral), "admin")
            .unwrap();
    }

    #[test]
    fn test_referenced_expiry_rule_cannot_be_deleted_or_disabled() {
        let reg = registry();
        let expiry = reg
            .create_expiry_rule(expiry_req(SourceType::Purchase), "admin")
            .unwrap();
        reg.create_earning_rule(
            CreateEarningRuleRequest {
                rule_name: "Purchase points".into(),
                source_type: SourceType::Purchase,
                points_awarded: 10,
                expiry_rule_id: expiry.id,
                enabled: true,
                description: None,
            },
            "admin",
        )
        .unwrap();

        assert!(matches!(
            reg.delete_expiry_rule(expiry.id, "admin").unwrap_err(),
            LoyaltyError::State(_)
        ));
        let disable = UpdateExpiryRuleRequest {
            active: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            reg.update_expiry_rule(expiry.id, disable, "admin").unwrap_err(),
            LoyaltyError::State(_)
        ));
        // Still resolvable for earning.
        assert!(reg.enabled_rule_for_source(SourceType::Purchase).is_some());
    }

    #[test]
    fn test_single_enabled_referral_config() {
        let reg = registry();
        let req = CreateReferralConfigRequest {
            enabled: true,
            signup_points: 50,
            first_purchase_points: 100,
            min_purchase_amount: 25.0,
            one_reward_per_referred_user: true,
            start_date: None,
            end_date: None,
        };
        reg.create_referral_config(req.clone(), "admin").unwrap();
        assert!(matches!(
            reg.create_referral_config(req, "admin").unwrap_err(),
            LoyaltyError::Conflict { .. }
        ));
    }

    #[test]
    fn test_slot_number_unique_per_config() {
        let reg = registry();
        let config = reg
            .create_referral_config(
                CreateReferralConfigRequest {
                    enabled: true,
                    signup_points: 50,
                    first_purchase_points: 100,
                    min_purchase_amount: 0.0,
                    one_reward_per_referred_user: true,
                    start_date: None,
                    end_date: None,
                },
                "admin",
            )
            .unwrap();
        let req = CreateSlotRewardRequest {
            reward_config_id: config.id,
            slot_number: 1,
            title: "First milestone".into(),
            quantity: 3,
            value_points: 500,
            image_url: Some("https://files.example.com/slots/bronze.png".into()),
            active: true,
        };
        reg.create_slot_reward(req.clone(), "admin").unwrap();
        assert!(matches!(
            reg.create_slot_reward(req, "admin").unwrap_err(),
            LoyaltyError::Conflict { .. }
        ));
    }

    #[test]
    fn test_tier_benefit_toggle_keeps_benefit() {
        let reg = registry();
        let tier = reg.create_tier(tier_req(1, 0), "admin").unwrap();
        let benefit = reg.create_benefit(
            CreateBenefitRequest {
                name: "Free shipping".into(),
                description: None,
                active: true,
            },
            "admin",
        );
        let link = reg
            .create_tier_benefit(
                CreateTierBenefitRequest {
                    tier_id: tier.id,
                    benefit_id: benefit.id,
                    active: true,
                },
                "admin",
            )
            .unwrap();

        let toggled = reg.set_tier_benefit_active(link.id, false, "admin").unwrap();
        assert!(!toggled.active);
        // The benefit definition is untouched.
        assert_eq!(reg.list_benefits().len(), 1);
    }

    #[test]
    fn test_audit_log_records_mutations() {
        let reg = registry();
        let a = reg.create_configuration(config_req(), "ops");
        reg.activate(a.id, "ops").unwrap();
        let log = reg.get_audit_log();
        assert_eq!(log.len(), 2);
        assert!(log.iter().any(|e| e.action == AuditAction::Activate));
        assert!(log.iter().all(|e| e.user == "ops"));
    }
}
