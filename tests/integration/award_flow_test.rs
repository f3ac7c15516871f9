//! Integration test for the full configuration → award → redeem flow.

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use loyalty_core::event_bus::noop_sink;
    use loyalty_core::types::{EvaluationWindow, ExpiryMode, SourceType};
    use loyalty_earning::{EarningEngine, FixedMultiplier};
    use loyalty_ledger::LedgerStore;
    use loyalty_registry::models::*;
    use loyalty_registry::ConfigRegistry;
    use loyalty_tiers::TierEvaluator;
    use std::sync::Arc;

    fn build_engine() -> (Arc<ConfigRegistry>, Arc<LedgerStore>, EarningEngine) {
        let events = noop_sink();
        let registry = Arc::new(ConfigRegistry::new(events.clone()));
        let ledger = Arc::new(LedgerStore::new(events.clone()));
        let tiers = Arc::new(TierEvaluator::new(
            registry.clone(),
            ledger.clone(),
            events.clone(),
        ));
        let engine = EarningEngine::new(
            registry.clone(),
            ledger.clone(),
            tiers,
            Arc::new(FixedMultiplier(1.0)),
            events,
        );
        (registry, ledger, engine)
    }

    fn seed_rule_set(registry: &ConfigRegistry) {
        let expiry = registry
            .create_expiry_rule(
                CreateExpiryRuleRequest {
                    expiry_type: SourceType::Purchase,
                    expiry_mode: ExpiryMode::Rolling,
                    expiry_days: 365,
                    fixed_day_of_month: 1,
                    grace_period_days: 30,
                    warning_days_before: 14,
                    send_expiry_notifications: true,
                    active: true,
                },
                "itest",
            )
            .unwrap();
        registry
            .create_earning_rule(
                CreateEarningRuleRequest {
                    rule_name: "Purchase points".into(),
                    source_type: SourceType::Purchase,
                    points_awarded: 10,
                    expiry_rule_id: expiry.id,
                    enabled: true,
                    description: None,
                },
                "itest",
            )
            .unwrap();
        registry
            .create_tier(
                CreateTierRequest {
                    tier_level: 1,
                    name: "Bronze".into(),
                    min_points: 0,
                    multiplier: 1.0,
                    can_gift_points: false,
                    max_gift_per_month: None,
                    expiry_override_days: None,
                    downgrade_after_inactive_days: 90,
                    evaluation_window: EvaluationWindow::Days(365),
                    active: true,
                },
                "itest",
            )
            .unwrap();
    }

    #[test]
    fn test_draft_activate_award_redeem_round_trip() {
        let (registry, ledger, engine) = build_engine();
        seed_rule_set(&registry);

        // Draft is created inactive.
        let first = registry.create_configuration(
            CreateConfigurationRequest {
                points_enabled: true,
                redemption_enabled: true,
                allow_stacking: true,
            },
            "itest",
        );
        assert!(!first.is_active);

        // No active configuration yet: awards are rejected with no entry.
        assert!(engine.award("u-1", SourceType::Purchase, Utc::now()).is_err());
        assert!(ledger.entries("u-1").is_empty());

        registry.activate(first.id, "itest").unwrap();

        let now = Utc::now();
        let entry = engine.award("u-1", SourceType::Purchase, now).unwrap();
        assert_eq!(entry.points_delta, 10);
        assert_eq!(ledger.balance("u-1", now), 10);

        // Redeem part of it; the spend shows up in history.
        engine.redeem("u-1", 4, now).unwrap();
        assert_eq!(ledger.balance("u-1", now), 6);
        assert_eq!(ledger.entries("u-1").len(), 2);

        // Supersede the active version; the predecessor flips inactive with
        // a deactivation timestamp.
        let second = registry.create_configuration(
            CreateConfigurationRequest {
                points_enabled: true,
                redemption_enabled: false,
                allow_stacking: true,
            },
            "itest",
        );
        let activated = registry.activate(second.id, "itest").unwrap();
        assert!(activated.is_active);

        let superseded = registry.get_configuration(first.id).unwrap();
        assert!(!superseded.is_active);
        assert!(superseded.deactivated_at.is_some());

        // The new version's redemption toggle takes effect immediately.
        assert!(engine.redeem("u-1", 1, now).is_err());
        assert_eq!(ledger.balance("u-1", now), 6);
    }

    #[test]
    fn test_rule_change_never_rewrites_existing_expiry() {
        let (registry, ledger, engine) = build_engine();
        seed_rule_set(&registry);
        let config = registry.create_configuration(
            CreateConfigurationRequest {
                points_enabled: true,
                redemption_enabled: true,
                allow_stacking: true,
            },
            "itest",
        );
        registry.activate(config.id, "itest").unwrap();

        let now = Utc::now();
        let before = engine.award("u-1", SourceType::Purchase, now).unwrap();

        // Shorten the expiry rule after the fact.
        let rule_id = registry.list_expiry_rules()[0].id;
        registry
            .update_expiry_rule(
                rule_id,
                UpdateExpiryRuleRequest {
                    expiry_days: Some(30),
                    ..Default::default()
                },
                "itest",
            )
            .unwrap();

        // The earlier entry keeps its earn-time expiry.
        let stored = ledger
            .entries("u-1")
            .into_iter()
            .find(|e| e.id == before.id)
            .unwrap();
        assert_eq!(stored.expires_at, before.expires_at);

        // New entries pick up the shortened rule.
        let after = engine.award("u-2", SourceType::Purchase, now).unwrap();
        assert!(after.expires_at.unwrap() < before.expires_at.unwrap());
    }
}
