//! Core earning engine: gates on the active configuration, applies tier and
//! campaign multipliers, and writes one ledger entry per qualifying action.

use chrono::{DateTime, Utc};
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::event_bus::{make_event, EventSink, EventType};
use loyalty_core::types::{GuardrailAction, LedgerEntry, SourceType};
use loyalty_expiry::expiry_for_source;
use loyalty_ledger::LedgerStore;
use loyalty_registry::ConfigRegistry;
use loyalty_tiers::TierEvaluator;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where the campaign multiplier comes from. The engine deliberately does
/// not know how campaigns are scoped (global, per-vendor, per-segment); a
/// campaign service implements this seam.
pub trait CampaignMultiplierSource: Send + Sync {
    fn multiplier_for(
        &self,
        user_id: &str,
        source_type: SourceType,
        now: DateTime<Utc>,
    ) -> f64;
}

/// Constant multiplier — configuration-driven default (1.0 = no campaign).
pub struct FixedMultiplier(pub f64);

impl CampaignMultiplierSource for FixedMultiplier {
    fn multiplier_for(&self, _user_id: &str, _source_type: SourceType, _now: DateTime<Utc>) -> f64 {
        self.0
    }
}

/// Stateless earning computation over the registry, ledger, and tier
/// evaluator.
pub struct EarningEngine {
    registry: Arc<ConfigRegistry>,
    ledger: Arc<LedgerStore>,
    tiers: Arc<TierEvaluator>,
    campaigns: Arc<dyn CampaignMultiplierSource>,
    events: Arc<dyn EventSink>,
}

impl EarningEngine {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        ledger: Arc<LedgerStore>,
        tiers: Arc<TierEvaluator>,
        campaigns: Arc<dyn CampaignMultiplierSource>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            ledger,
            tiers,
            campaigns,
            events,
        }
    }

    /// Award points for a qualifying action. Rejects with no side effect
    /// when points are disabled or no enabled rule matches; otherwise
    /// appends exactly one ledger entry whose expiry is fixed at earn-time.
    pub fn award(
        &self,
        user_id: &str,
        source_type: SourceType,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<LedgerEntry> {
        let config = self
            .registry
            .active_configuration()
            .ok_or_else(|| LoyaltyError::state("no active points configuration"))?;
        if !config.points_enabled {
            return Err(LoyaltyError::state("points earning is disabled"));
        }

        let rule = self
            .registry
            .enabled_rule_for_source(source_type)
            .ok_or_else(|| LoyaltyError::not_found("earning rule", source_type))?;

        let tier_multiplier = self.tiers.multiplier_for(user_id, now);
        let campaign_multiplier = self.campaigns.multiplier_for(user_id, source_type, now);
        let factor = if config.allow_stacking {
            tier_multiplier * campaign_multiplier
        } else {
            tier_multiplier.max(campaign_multiplier)
        };

        // Points are integral; round half-up.
        let final_points = (rule.points_awarded as f64 * factor).round() as i64;
        if final_points <= 0 {
            return Err(LoyaltyError::validation(format!(
                "rule '{}' resolves to a zero award",
                rule.rule_name
            )));
        }

        self.check_points_guardrails(user_id, final_points, now)?;

        let tier_override = self.tiers.expiry_override_for(user_id, now);
        let expiry_rule = self
            .registry
            .get_expiry_rule(rule.expiry_rule_id)
            .ok()
            .filter(|r| r.active);
        let expiry = expiry_for_source(now, source_type, expiry_rule.as_ref(), tier_override);

        let entry =
            self.ledger
                .append_earn(user_id, source_type, final_points, now, expiry.timestamp())?;

        // Ledger mutation may unlock a tier upgrade; apply it eagerly.
        self.tiers.current_tier(user_id, now);

        metrics::counter!("earning.awards").increment(1);
        debug!(
            user_id = %user_id,
            source = %source_type,
            base = rule.points_awarded,
            tier_multiplier = tier_multiplier,
            campaign_multiplier = campaign_multiplier,
            points = final_points,
            "Points awarded"
        );

        Ok(entry)
    }

    /// Redeem points from the user's balance, soonest-expiring first.
    pub fn redeem(
        &self,
        user_id: &str,
        points: i64,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<LedgerEntry> {
        let config = self
            .registry
            .active_configuration()
            .ok_or_else(|| LoyaltyError::state("no active points configuration"))?;
        if !config.redemption_enabled {
            return Err(LoyaltyError::state("redemption is disabled"));
        }
        self.ledger.redeem(user_id, points, now)
    }

    fn check_points_guardrails(
        &self,
        user_id: &str,
        points: i64,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<()> {
        for guardrail in self.registry.active_guardrails() {
            let Some(cap) = guardrail.max_points_per_user_per_day else {
                continue;
            };
            let today = self.ledger.earned_on_day(user_id, now.date_naive());
            if today + points <= cap {
                continue;
            }

            metrics::counter!("earning.guardrail_trips").increment(1);
            self.events.emit(make_event(
                EventType::GuardrailTripped,
                Some(user_id.to_string()),
                Some(guardrail.id.to_string()),
                Some(points),
            ));
            warn!(
                user_id = %user_id,
                cap = cap,
                earned_today = today,
                attempted = points,
                action = ?guardrail.action,
                "Daily points guardrail tripped"
            );

            if guardrail.action == GuardrailAction::Block {
                return Err(LoyaltyError::validation(format!(
                    "daily points cap of {} exceeded for user {}",
                    cap, user_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_core::event_bus::noop_sink;
    use loyalty_core::types::{EvaluationWindow, ExpiryMode};
    use loyalty_registry::models::*;

    struct Fixture {
        registry: Arc<ConfigRegistry>,
        ledger: Arc<LedgerStore>,
        engine: EarningEngine,
    }

    fn fixture(campaign_multiplier: f64) -> Fixture {
        let registry = Arc::new(ConfigRegistry::new(noop_sink()));
        let ledger = Arc::new(LedgerStore::new(noop_sink()));
        let tiers = Arc::new(TierEvaluator::new(
            registry.clone(),
            ledger.clone(),
            noop_sink(),
        ));
        let engine = EarningEngine::new(
            registry.clone(),
            ledger.clone(),
            tiers,
            Arc::new(FixedMultiplier(campaign_multiplier)),
            noop_sink(),
        );
        Fixture {
            registry,
            ledger,
            engine,
        }
    }

    fn seed_active_config(fix: &Fixture, allow_stacking: bool) {
        let config = fix.registry.create_configuration(
            CreateConfigurationRequest {
                points_enabled: true,
                redemption_enabled: true,
                allow_stacking,
            },
            "test",
        );
        fix.registry.activate(config.id, "test").unwrap();
    }

    fn seed_purchase_rule(fix: &Fixture, points: i64) {
        let expiry = fix
            .registry
            .create_expiry_rule(
                CreateExpiryRuleRequest {
                    expiry_type: SourceType::Purchase,
                    expiry_mode: ExpiryMode::Rolling,
                    expiry_days: 180,
                    fixed_day_of_month: 1,
                    grace_period_days: 0,
                    warning_days_before: 14,
                    send_expiry_notifications: true,
                    active: true,
                },
                "test",
            )
            .unwrap();
        fix.registry
            .create_earning_rule(
                CreateEarningRuleRequest {
                    rule_name: "Purchase points".into(),
                    source_type: SourceType::Purchase,
                    points_awarded: points,
                    expiry_rule_id: expiry.id,
                    enabled: true,
                    description: None,
                },
                "test",
            )
            .unwrap();
    }

    fn seed_tiers(fix: &Fixture) {
        for (level, min_points, multiplier) in [(1u32, 0i64, 1.0f64), (2, 500, 1.5)] {
            fix.registry
                .create_tier(
                    CreateTierRequest {
                        tier_level: level,
                        name: format!("Tier {}", level),
                        min_points,
                        multiplier,
                        can_gift_points: false,
                        max_gift_per_month: None,
                        expiry_override_days: None,
                        downgrade_after_inactive_days: 90,
                        evaluation_window: EvaluationWindow::Days(365),
                        active: true,
                    },
                    "test",
                )
                .unwrap();
        }
    }

    #[test]
    fn test_award_is_noop_when_points_disabled() {
        let fix = fixture(1.0);
        let config = fix.registry.create_configuration(
            CreateConfigurationRequest {
                points_enabled: false,
                redemption_enabled: true,
                allow_stacking: true,
            },
            "test",
        );
        fix.registry.activate(config.id, "test").unwrap();
        seed_purchase_rule(&fix, 10);

        let now = Utc::now();
        for source in [
            SourceType::Purchase,
            SourceType::Referral,
            SourceType::Review,
            SourceType::Engagement,
            SourceType::Signup,
            SourceType::Campaign,
            SourceType::Bonus,
        ] {
            assert!(fix.engine.award("u-1", source, now).is_err());
        }
        assert!(fix.ledger.entries("u-1").is_empty());
    }

    #[test]
    fn test_award_requires_active_configuration() {
        let fix = fixture(1.0);
        seed_purchase_rule(&fix, 10);
        let err = fix.engine.award("u-1", SourceType::Purchase, Utc::now()).unwrap_err();
        assert!(matches!(err, LoyaltyError::State(_)));
        assert!(fix.ledger.entries("u-1").is_empty());
    }

    #[test]
    fn test_award_requires_matching_enabled_rule() {
        let fix = fixture(1.0);
        seed_active_config(&fix, true);
        seed_purchase_rule(&fix, 10);
        let err = fix.engine.award("u-1", SourceType::Review, Utc::now()).unwrap_err();
        assert!(matches!(err, LoyaltyError::NotFound { .. }));
        assert!(fix.ledger.entries("u-1").is_empty());
    }

    #[test]
    fn test_multiplier_stacking() {
        let fix = fixture(2.0);
        seed_active_config(&fix, true);
        seed_purchase_rule(&fix, 10);
        seed_tiers(&fix);

        let now = Utc::now();
        // Qualify the user for tier 2 (1.5x) first.
        fix.ledger
            .append_earn("u-1", SourceType::Bonus, 600, now, None)
            .unwrap();

        let entry = fix.engine.award("u-1", SourceType::Purchase, now).unwrap();
        // 10 * 1.5 * 2.0 = 30, exactly.
        assert_eq!(entry.points_delta, 30);
    }

    #[test]
    fn test_stacking_disabled_takes_larger_multiplier() {
        let fix = fixture(2.0);
        seed_active_config(&fix, false);
        seed_purchase_rule(&fix, 10);
        seed_tiers(&fix);

        let now = Utc::now();
        fix.ledger
            .append_earn("u-1", SourceType::Bonus, 600, now, None)
            .unwrap();

        let entry = fix.engine.award("u-1", SourceType::Purchase, now).unwrap();
        // max(1.5, 2.0) = 2.0, not 3.0x.
        assert_eq!(entry.points_delta, 20);
    }

    #[test]
    fn test_rounding_is_half_up() {
        let fix = fixture(1.25);
        seed_active_config(&fix, true);
        seed_purchase_rule(&fix, 10);

        let entry = fix
            .engine
            .award("u-1", SourceType::Purchase, Utc::now())
            .unwrap();
        // 10 * 1.25 = 12.5 rounds up to 13.
        assert_eq!(entry.points_delta, 13);
    }

    #[test]
    fn test_award_attaches_rolling_expiry() {
        let fix = fixture(1.0);
        seed_active_config(&fix, true);
        seed_purchase_rule(&fix, 10);

        let now = Utc::now();
        let entry = fix.engine.award("u-1", SourceType::Purchase, now).unwrap();
        assert_eq!(entry.expires_at, Some(now + chrono::Duration::days(180)));
    }

    #[test]
    fn test_tier_override_zero_means_never_expires() {
        let fix = fixture(1.0);
        seed_active_config(&fix, true);
        seed_purchase_rule(&fix, 10);
        fix.registry
            .create_tier(
                CreateTierRequest {
                    tier_level: 1,
                    name: "Members".into(),
                    min_points: 0,
                    multiplier: 1.0,
                    can_gift_points: false,
                    max_gift_per_month: None,
                    expiry_override_days: Some(0),
                    downgrade_after_inactive_days: 90,
                    evaluation_window: EvaluationWindow::Lifetime,
                    active: true,
                },
                "test",
            )
            .unwrap();

        let entry = fix
            .engine
            .award("u-1", SourceType::Purchase, Utc::now())
            .unwrap();
        assert_eq!(entry.expires_at, None);
    }

    #[test]
    fn test_guardrail_block_rejects_without_ledger_write() {
        let fix = fixture(1.0);
        seed_active_config(&fix, true);
        seed_purchase_rule(&fix, 10);
        fix.registry.create_guardrail(
            CreateGuardrailRequest {
                max_points_per_user_per_day: Some(15),
                max_referrals_per_referrer_per_day: None,
                action: loyalty_core::types::GuardrailAction::Block,
                active: true,
            },
            "test",
        );

        let now = Utc::now();
        fix.engine.award("u-1", SourceType::Purchase, now).unwrap();
        let err = fix.engine.award("u-1", SourceType::Purchase, now).unwrap_err();
        assert!(matches!(err, LoyaltyError::Validation(_)));
        assert_eq!(fix.ledger.entries("u-1").len(), 1);
    }

    #[test]
    fn test_guardrail_flag_lets_award_through() {
        let fix = fixture(1.0);
        seed_active_config(&fix, true);
        seed_purchase_rule(&fix, 10);
        fix.registry.create_guardrail(
            CreateGuardrailRequest {
                max_points_per_user_per_day: Some(15),
                max_referrals_per_referrer_per_day: None,
                action: loyalty_core::types::GuardrailAction::Flag,
                active: true,
            },
            "test",
        );

        let now = Utc::now();
        fix.engine.award("u-1", SourceType::Purchase, now).unwrap();
        fix.engine.award("u-1", SourceType::Purchase, now).unwrap();
        assert_eq!(fix.ledger.entries("u-1").len(), 2);
    }

    #[test]
    fn test_redeem_respects_redemption_toggle() {
        let fix = fixture(1.0);
        let config = fix.registry.create_configuration(
            CreateConfigurationRequest {
                points_enabled: true,
                redemption_enabled: false,
                allow_stacking: true,
            },
            "test",
        );
        fix.registry.activate(config.id, "test").unwrap();

        let now = Utc::now();
        fix.ledger
            .append_earn("u-1", SourceType::Purchase, 100, now, None)
            .unwrap();
        assert!(matches!(
            fix.engine.redeem("u-1", 50, now).unwrap_err(),
            LoyaltyError::State(_)
        ));
        assert_eq!(fix.ledger.balance("u-1", now), 100);
    }
}
