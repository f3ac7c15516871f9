//! Assigns and maintains customer tiers from qualifying point sums.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use loyalty_core::event_bus::{make_event, EventSink, EventType};
use loyalty_core::types::Tier;
use loyalty_ledger::LedgerStore;
use loyalty_registry::ConfigRegistry;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Lagging tier assignment. `below_since` marks the first observation of a
/// qualifying sum under the assigned threshold; the sweep downgrades once
/// the gap has persisted long enough.
#[derive(Debug, Clone)]
struct TierAssignment {
    tier_id: Uuid,
    tier_level: u32,
    below_since: Option<DateTime<Utc>>,
}

/// Evaluates tier membership as a function of ledger history within each
/// tier's qualification window.
pub struct TierEvaluator {
    registry: Arc<ConfigRegistry>,
    ledger: Arc<LedgerStore>,
    assignments: DashMap<String, TierAssignment>,
    events: Arc<dyn EventSink>,
}

impl TierEvaluator {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        ledger: Arc<LedgerStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            ledger,
            assignments: DashMap::new(),
            events,
        }
    }

    /// Pure resolution: the highest active tier whose threshold the user's
    /// qualifying sum meets, with the lowest active tier as the floor.
    /// `None` only when no tiers are configured.
    pub fn resolve_tier(&self, user_id: &str, now: DateTime<Utc>) -> Option<Tier> {
        let tiers = self.registry.active_tiers_sorted();
        for tier in tiers.iter().rev() {
            let since = tier.evaluation_window.start(now);
            let sum = self.ledger.qualifying_points(user_id, since, now);
            if sum >= tier.min_points {
                return Some(tier.clone());
            }
        }
        // Never "no tier": the lowest active tier is the floor.
        tiers.into_iter().next()
    }

    /// The user's current tier. Upgrades apply immediately; a qualifying sum
    /// below the assigned threshold only starts the inactivity clock.
    pub fn current_tier(&self, user_id: &str, now: DateTime<Utc>) -> Option<Tier> {
        let resolved = self.resolve_tier(user_id, now)?;

        let mut assignment = self
            .assignments
            .entry(user_id.to_string())
            .or_insert_with(|| TierAssignment {
                tier_id: resolved.id,
                tier_level: resolved.tier_level,
                below_since: None,
            });

        if resolved.tier_level > assignment.tier_level {
            info!(
                user_id = %user_id,
                from_level = assignment.tier_level,
                to_level = resolved.tier_level,
                "Tier upgrade"
            );
            metrics::counter!("tiers.upgrades").increment(1);
            self.events.emit(make_event(
                EventType::TierUpgraded,
                Some(user_id.to_string()),
                Some(resolved.id.to_string()),
                None,
            ));
            assignment.tier_id = resolved.id;
            assignment.tier_level = resolved.tier_level;
            assignment.below_since = None;
            return Some(resolved);
        }

        if resolved.tier_level < assignment.tier_level {
            if assignment.below_since.is_none() {
                assignment.below_since = Some(now);
            }
            // Downgrades wait for the sweep.
            let assigned_id = assignment.tier_id;
            drop(assignment);
            return match self.registry.get_tier(assigned_id) {
                Ok(tier) if tier.active => Some(tier),
                // Assigned tier vanished from the rule-set; fall back to the
                // resolved one and restamp.
                _ => {
                    self.assignments.insert(
                        user_id.to_string(),
                        TierAssignment {
                            tier_id: resolved.id,
                            tier_level: resolved.tier_level,
                            below_since: None,
                        },
                    );
                    Some(resolved)
                }
            };
        }

        assignment.below_since = None;
        Some(resolved)
    }

    /// Earn multiplier of the user's current tier (1.0 when no tiers are
    /// configured).
    pub fn multiplier_for(&self, user_id: &str, now: DateTime<Utc>) -> f64 {
        self.current_tier(user_id, now)
            .map(|t| t.multiplier)
            .unwrap_or(1.0)
    }

    /// The current tier's expiry override, for earn-time expiry
    /// computation.
    pub fn expiry_override_for(&self, user_id: &str, now: DateTime<Utc>) -> Option<u32> {
        self.current_tier(user_id, now)
            .and_then(|t| t.expiry_override_days)
    }

    /// Apply overdue downgrades. Idempotent and user-scoped; safe to run
    /// concurrently with live traffic. Returns the number of users
    /// downgraded.
    pub fn run_downgrade_sweep(&self, now: DateTime<Utc>) -> usize {
        let mut downgraded = 0;

        let users: Vec<String> = self.assignments.iter().map(|e| e.key().clone()).collect();
        for user_id in users {
            let Some(resolved) = self.resolve_tier(&user_id, now) else {
                continue;
            };
            let Some(mut assignment) = self.assignments.get_mut(&user_id) else {
                continue;
            };

            if resolved.tier_level >= assignment.tier_level {
                assignment.below_since = None;
                continue;
            }

            let below_since = *assignment.below_since.get_or_insert(now);
            let wait_days = match self.registry.get_tier(assignment.tier_id) {
                Ok(tier) => tier.downgrade_after_inactive_days,
                // Assigned tier no longer exists; downgrade right away.
                Err(_) => 0,
            };

            if now - below_since >= Duration::days(wait_days as i64) {
                info!(
                    user_id = %user_id,
                    from_level = assignment.tier_level,
                    to_level = resolved.tier_level,
                    "Tier downgrade"
                );
                metrics::counter!("tiers.downgrades").increment(1);
                self.events.emit(make_event(
                    EventType::TierDowngraded,
                    Some(user_id.clone()),
                    Some(resolved.id.to_string()),
                    None,
                ));
                assignment.tier_id = resolved.id;
                assignment.tier_level = resolved.tier_level;
                assignment.below_since = None;
                downgraded += 1;
            }
        }

        debug!(downgraded = downgraded, "Downgrade sweep finished");
        downgraded
    }
}
