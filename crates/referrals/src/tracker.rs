//! Credits referral rewards and milestone slot bonuses through the ledger.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::event_bus::{make_event, EventSink, EventType};
use loyalty_core::types::{
    GuardrailAction, LedgerEntry, ReferralRewardConfig, ReferralSlotReward, SourceType,
};
use loyalty_expiry::expiry_for_source;
use loyalty_ledger::LedgerStore;
use loyalty_registry::ConfigRegistry;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-referrer reward bookkeeping. An identity joins `successful` the
/// first time it triggers any reward; slot grants are remembered by id so a
/// later quantity edit can never re-grant them.
#[derive(Debug, Default)]
struct ReferrerProgress {
    successful: HashSet<String>,
    signup_rewarded: HashSet<String>,
    purchase_rewarded: HashSet<String>,
    granted_slots: HashSet<Uuid>,
}

/// Result of recording one referral event.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralOutcome {
    pub referrer_id: String,
    pub reward_entry: Option<LedgerEntry>,
    pub unlocked_slots: Vec<ReferralSlotReward>,
    pub successful_referrals: u32,
}

/// Progress summary for the admin UI.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralProgressReport {
    pub referrer_id: String,
    pub successful_referrals: u32,
    pub granted_slot_ids: Vec<Uuid>,
}

/// Tracks referral rewards per referrer. The identity-claim map is the
/// in-memory stand-in for the uniqueness constraint that prevents two
/// concurrent referrals of the same identity from both rewarding.
pub struct ReferralTracker {
    registry: Arc<ConfigRegistry>,
    ledger: Arc<LedgerStore>,
    events: Arc<dyn EventSink>,
    identity_claims: DashMap<String, String>,
    progress: DashMap<String, ReferrerProgress>,
    daily_counts: DashMap<(String, NaiveDate), u32>,
}

impl ReferralTracker {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        ledger: Arc<LedgerStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            ledger,
            events,
            identity_claims: DashMap::new(),
            progress: DashMap::new(),
            daily_counts: DashMap::new(),
        }
    }

    /// Record a referred signup and credit the signup reward once per
    /// `(referrer, identity)` pair.
    pub fn record_signup(
        &self,
        referrer_id: &str,
        referred_identity: &str,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<ReferralOutcome> {
        let config = self.open_config(now)?;
        let identity = normalize_identity(referred_identity)?;

        self.check_referral_guardrails(referrer_id, now)?;

        if self
            .progress
            .get(referrer_id)
            .map(|p| p.signup_rewarded.contains(&identity))
            .unwrap_or(false)
        {
            return Err(LoyaltyError::conflict(
                "referral",
                &identity,
                "signup already rewarded for this referrer",
            ));
        }

        if config.one_reward_per_referred_user {
            self.claim_identity(&identity, referrer_id)?;
        }

        let reward_entry = if config.signup_points > 0 {
            Some(self.credit(referrer_id, SourceType::Referral, config.signup_points, now)?)
        } else {
            None
        };
        self.events.emit(make_event(
            EventType::ReferralSignupRewarded,
            Some(referrer_id.to_string()),
            Some(identity.clone()),
            Some(config.signup_points),
        ));
        metrics::counter!("referrals.signup_rewards").increment(1);
        self.bump_daily_count(referrer_id, now);

        let (count, unlocked) =
            self.mark_successful_and_unlock(referrer_id, &identity, &config, now, |p| {
                p.signup_rewarded.insert(identity.clone());
            })?;

        info!(
            referrer_id = %referrer_id,
            successful = count,
            unlocked = unlocked.len(),
            "Referral signup recorded"
        );

        Ok(ReferralOutcome {
            referrer_id: referrer_id.to_string(),
            reward_entry,
            unlocked_slots: unlocked,
            successful_referrals: count,
        })
    }

    /// Record a referred first purchase and credit its reward when the
    /// amount clears the configured minimum (boundary inclusive).
    pub fn record_purchase(
        &self,
        referrer_id: &str,
        referred_identity: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<ReferralOutcome> {
        let config = self.open_config(now)?;
        let identity = normalize_identity(referred_identity)?;

        if amount < 0.0 {
            return Err(LoyaltyError::validation("purchase amount must be non-negative"));
        }
        if amount < config.min_purchase_amount {
            return Err(LoyaltyError::validation(format!(
                "purchase of {:.2} is below the {:.2} minimum",
                amount, config.min_purchase_amount
            )));
        }

        self.check_referral_guardrails(referrer_id, now)?;

        if self
            .progress
            .get(referrer_id)
            .map(|p| p.purchase_rewarded.contains(&identity))
            .unwrap_or(false)
        {
            return Err(LoyaltyError::conflict(
                "referral",
                &identity,
                "first purchase already rewarded for this referrer",
            ));
        }

        if config.one_reward_per_referred_user {
            self.claim_identity(&identity, referrer_id)?;
        }

        let reward_entry = if config.first_purchase_points > 0 {
            Some(self.credit(
                referrer_id,
                SourceType::Referral,
                config.first_purchase_points,
                now,
            )?)
        } else {
            None
        };
        self.events.emit(make_event(
            EventType::ReferralPurchaseRewarded,
            Some(referrer_id.to_string()),
            Some(identity.clone()),
            Some(config.first_purchase_points),
        ));
        metrics::counter!("referrals.purchase_rewards").increment(1);
        self.bump_daily_count(referrer_id, now);

        let (count, unlocked) =
            self.mark_successful_and_unlock(referrer_id, &identity, &config, now, |p| {
                p.purchase_rewarded.insert(identity.clone());
            })?;

        info!(
            referrer_id = %referrer_id,
            successful = count,
            unlocked = unlocked.len(),
            "Referral purchase recorded"
        );

        Ok(ReferralOutcome {
            referrer_id: referrer_id.to_string(),
            reward_entry,
            unlocked_slots: unlocked,
            successful_referrals: count,
        })
    }

    pub fn progress_report(&self, referrer_id: &str) -> ReferralProgressReport {
        let (successful, granted) = self
            .progress
            .get(referrer_id)
            .map(|p| {
                let mut granted: Vec<Uuid> = p.granted_slots.iter().copied().collect();
                granted.sort();
                (p.successful.len() as u32, granted)
            })
            .unwrap_or((0, Vec::new()));
        ReferralProgressReport {
            referrer_id: referrer_id.to_string(),
            successful_referrals: successful,
            granted_slot_ids: granted,
        }
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    fn open_config(&self, now: DateTime<Utc>) -> LoyaltyResult<ReferralRewardConfig> {
        let config = self
            .registry
            .enabled_referral_config()
            .ok_or_else(|| LoyaltyError::state("referral rewards are disabled"))?;
        if !config.is_open_at(now) {
            return Err(LoyaltyError::state("referral program window is closed"));
        }
        Ok(config)
    }

    /// First-writer-wins claim of a referred identity, platform-wide.
    fn claim_identity(&self, identity: &str, referrer_id: &str) -> LoyaltyResult<()> {
        match self.identity_claims.entry(identity.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(referrer_id.to_string());
                Ok(())
            }
            Entry::Occupied(existing) if existing.get() == referrer_id => Ok(()),
            Entry::Occupied(_) => Err(LoyaltyError::conflict(
                "referral",
                identity,
                "identity already rewarded under another referrer",
            )),
        }
    }

    fn credit(
        &self,
        referrer_id: &str,
        source_type: SourceType,
        points: i64,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<LedgerEntry> {
        let rule = self.registry.active_expiry_rule_for(source_type);
        let expiry = expiry_for_source(now, source_type, rule.as_ref(), None);
        self.ledger
            .append_earn(referrer_id, source_type, points, now, expiry.timestamp())
    }

    /// Mark the identity successful (first reward only), then grant every
    /// active slot whose quantity equals the new count exactly.
    fn mark_successful_and_unlock(
        &self,
        referrer_id: &str,
        identity: &str,
        config: &ReferralRewardConfig,
        now: DateTime<Utc>,
        record_reward: impl FnOnce(&mut ReferrerProgress),
    ) -> LoyaltyResult<(u32, Vec<ReferralSlotReward>)> {
        let mut progress = self.progress.entry(referrer_id.to_string()).or_default();
        record_reward(&mut progress);

        let newly_successful = progress.successful.insert(identity.to_string());
        let count = progress.successful.len() as u32;
        if !newly_successful {
            return Ok((count, Vec::new()));
        }

        let mut unlocked = Vec::new();
        for slot in self.registry.active_slot_rewards_for(config.id) {
            if slot.quantity != count || progress.granted_slots.contains(&slot.id) {
                continue;
            }
            if slot.value_points > 0 {
                self.credit(referrer_id, SourceType::Bonus, slot.value_points, now)?;
            }
            progress.granted_slots.insert(slot.id);
            self.events.emit(make_event(
                EventType::SlotBonusUnlocked,
                Some(referrer_id.to_string()),
                Some(slot.id.to_string()),
                Some(slot.value_points),
            ));
            metrics::counter!("referrals.slot_bonuses").increment(1);
            info!(
                referrer_id = %referrer_id,
                slot = slot.slot_number,
                quantity = slot.quantity,
                points = slot.value_points,
                "Referral slot bonus unlocked"
            );
            unlocked.push(slot);
        }

        Ok((count, unlocked))
    }

    fn bump_daily_count(&self, referrer_id: &str, now: DateTime<Utc>) {
        *self
            .daily_counts
            .entry((referrer_id.to_string(), now.date_naive()))
            .or_insert(0) += 1;
    }

    fn check_referral_guardrails(&self, referrer_id: &str, now: DateTime<Utc>) -> LoyaltyResult<()> {
        for guardrail in self.registry.active_guardrails() {
            let Some(cap) = guardrail.max_referrals_per_referrer_per_day else {
                continue;
            };
            let today = self
                .daily_counts
                .get(&(referrer_id.to_string(), now.date_naive()))
                .map(|c| *c)
                .unwrap_or(0);
            if today < cap {
                continue;
            }

            metrics::counter!("referrals.guardrail_trips").increment(1);
            self.events.emit(make_event(
                EventType::GuardrailTripped,
                Some(referrer_id.to_string()),
                Some(guardrail.id.to_string()),
                None,
            ));
            warn!(
                referrer_id = %referrer_id,
                cap = cap,
                today = today,
                action = ?guardrail.action,
                "Daily referral guardrail tripped"
            );

            if guardrail.action == GuardrailAction::Block {
                return Err(LoyaltyError::validation(format!(
                    "daily referral cap of {} exceeded for referrer {}",
                    cap, referrer_id
                )));
            }
        }
        Ok(())
    }
}

/// Referred identities are emails or phone numbers; normalize before any
/// uniqueness comparison.
fn normalize_identity(raw: &str) -> LoyaltyResult<String> {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(LoyaltyError::validation("referred identity must not be empty"));
    }
    Ok(normalized)
}
