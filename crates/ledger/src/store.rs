//! Per-user append-only ledger store.
//!
//! Redemption drains earn entries soonest-expiry-first (never-expiring
//! entries last) to minimize waste — FIFO by expiry, not by earn date.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::event_bus::{make_event, EventSink, EventType};
use loyalty_core::types::{EntryKind, LedgerEntry, SourceType};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Thread-safe in-memory ledger. The per-user entry guard is the
/// transaction boundary of a single award or redeem call.
pub struct LedgerStore {
    entries: DashMap<String, Vec<LedgerEntry>>,
    events: Arc<dyn EventSink>,
}

impl LedgerStore {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            entries: DashMap::new(),
            events,
        }
    }

    /// Append one earn entry. The expiry has already been fixed by the
    /// caller at earn-time and is never recomputed.
    pub fn append_earn(
        &self,
        user_id: &str,
        source_type: SourceType,
        points: i64,
        earned_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> LoyaltyResult<LedgerEntry> {
        if points <= 0 {
            return Err(LoyaltyError::validation(format!(
                "earn amount must be positive, got {}",
                points
            )));
        }

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind: EntryKind::Earn,
            source_type,
            points_delta: points,
            points_remaining: points,
            earned_at,
            expires_at,
            consumed_at: None,
        };

        self.entries
            .entry(user_id.to_string())
            .or_default()
            .push(entry.clone());

        metrics::counter!("ledger.points_earned").increment(points as u64);
        self.events.emit(make_event(
            EventType::PointsEarned,
            Some(user_id.to_string()),
            Some(entry.id.to_string()),
            Some(points),
        ));

        debug!(
            user_id = %user_id,
            points = points,
            source = %source_type,
            expires_at = ?expires_at,
            "Ledger earn appended"
        );

        Ok(entry)
    }

    /// Redeem `points` from a user's balance, consuming earn entries
    /// soonest-expiry-first, and append one spend entry recording the
    /// deduction.
    pub fn redeem(
        &self,
        user_id: &str,
        points: i64,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<LedgerEntry> {
        if points <= 0 {
            return Err(LoyaltyError::validation(format!(
                "redemption amount must be positive, got {}",
                points
            )));
        }

        let mut user_entries = self
            .entries
            .get_mut(user_id)
            .ok_or_else(|| LoyaltyError::validation("insufficient balance: no ledger history"))?;

        let available: i64 = user_entries
            .iter()
            .map(|e| e.available_points(now))
            .sum();
        if available < points {
            return Err(LoyaltyError::validation(format!(
                "insufficient balance: need {}, have {}",
                points, available
            )));
        }

        // Consume in expiry order; entries that never expire go last.
        let mut order: Vec<usize> = (0..user_entries.len())
            .filter(|&i| user_entries[i].available_points(now) > 0)
            .collect();
        order.sort_by_key(|&i| match user_entries[i].expires_at {
            Some(at) => (0, at),
            None => (1, DateTime::<Utc>::MAX_UTC),
        });

        let mut to_consume = points;
        for i in order {
            if to_consume == 0 {
                break;
            }
            let entry = &mut user_entries[i];
            let take = entry.points_remaining.min(to_consume);
            entry.points_remaining -= take;
            to_consume -= take;
            if entry.points_remaining == 0 {
                entry.consumed_at = Some(now);
            }
        }

        // Spend entries carry the purchase tag: redemptions are spends
        // against purchases.
        let spend = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind: EntryKind::Spend,
            source_type: SourceType::Purchase,
            points_delta: -points,
            points_remaining: 0,
            earned_at: now,
            expires_at: None,
            consumed_at: None,
        };
        user_entries.push(spend.clone());
        drop(user_entries);

        metrics::counter!("ledger.points_redeemed").increment(points as u64);
        metrics::counter!("ledger.redemptions").increment(1);
        self.events.emit(make_event(
            EventType::PointsRedeemed,
            Some(user_id.to_string()),
            Some(spend.id.to_string()),
            Some(points),
        ));

        debug!(user_id = %user_id, points = points, "Points redeemed");

        Ok(spend)
    }

    /// All ledger entries for a user, oldest first.
    pub fn entries(&self, user_id: &str) -> Vec<LedgerEntry> {
        self.entries
            .get(user_id)
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Usable balance: unexpired, unconsumed earn points.
    pub fn balance(&self, user_id: &str, now: DateTime<Utc>) -> i64 {
        self.entries
            .get(user_id)
            .map(|entries| entries.iter().map(|e| e.available_points(now)).sum())
            .unwrap_or(0)
    }

    /// Unexpired, unconsumed points earned on or after `since` (all-time
    /// when `None`) — the tier qualification sum.
    pub fn qualifying_points(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> i64 {
        self.entries
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| since.map(|s| e.earned_at >= s).unwrap_or(true))
                    .map(|e| e.available_points(now))
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Gross points awarded to a user on one UTC day, for guardrail checks.
    pub fn earned_on_day(&self, user_id: &str, day: NaiveDate) -> i64 {
        self.entries
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.kind == EntryKind::Earn && e.earned_at.date_naive() == day)
                    .map(|e| e.points_delta)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Entries with usable points expiring within `days` — feeds expiry
    /// warning notifications.
    pub fn expiring_within(&self, user_id: &str, now: DateTime<Utc>, days: u32) -> Vec<LedgerEntry> {
        let horizon = now + Duration::days(days as i64);
        self.entries
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| {
                        e.available_points(now) > 0
                            && matches!(e.expires_at, Some(at) if at <= horizon)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every user with ledger history, for the downgrade sweep.
    pub fn users(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_core::event_bus::{capture_sink, noop_sink};

    fn store() -> LedgerStore {
        LedgerStore::new(noop_sink())
    }

    #[test]
    fn test_append_and_balance() {
        let ledger = store();
        let now = Utc::now();
        ledger
            .append_earn("u-1", SourceType::Purchase, 100, now, None)
            .unwrap();
        ledger
            .append_earn("u-1", SourceType::Review, 20, now, Some(now + Duration::days(30)))
            .unwrap();
        assert_eq!(ledger.balance("u-1", now), 120);
        assert_eq!(ledger.balance("u-2", now), 0);
    }

    #[test]
    fn test_rejects_non_positive_earn() {
        let ledger = store();
        assert!(ledger
            .append_earn("u-1", SourceType::Purchase, 0, Utc::now(), None)
            .is_err());
        assert!(ledger
            .append_earn("u-1", SourceType::Purchase, -5, Utc::now(), None)
            .is_err());
    }

    #[test]
    fn test_expired_points_excluded_from_balance() {
        let ledger = store();
        let now = Utc::now();
        ledger
            .append_earn(
                "u-1",
                SourceType::Purchase,
                100,
                now - Duration::days(60),
                Some(now - Duration::days(1)),
            )
            .unwrap();
        assert_eq!(ledger.balance("u-1", now), 0);
    }

    #[test]
    fn test_redeem_consumes_soonest_expiry_first() {
        let ledger = store();
        let now = Utc::now();
        // Appended out of expiry order on purpose.
        ledger
            .append_earn("u-1", SourceType::Purchase, 50, now, None)
            .unwrap();
        ledger
            .append_earn("u-1", SourceType::Purchase, 40, now, Some(now + Duration::days(90)))
            .unwrap();
        ledger
            .append_earn("u-1", SourceType::Purchase, 30, now, Some(now + Duration::days(10)))
            .unwrap();

        ledger.redeem("u-1", 60, now).unwrap();

        let entries = ledger.entries("u-1");
        // Soonest expiry (30pt) fully consumed, 90-day entry partially,
        // never-expiring entry untouched.
        let soonest = entries.iter().find(|e| e.points_delta == 30).unwrap();
        assert_eq!(soonest.points_remaining, 0);
        assert!(soonest.consumed_at.is_some());

        let later = entries.iter().find(|e| e.points_delta == 40).unwrap();
        assert_eq!(later.points_remaining, 10);
        assert!(later.consumed_at.is_none());

        let never = entries.iter().find(|e| e.points_delta == 50).unwrap();
        assert_eq!(never.points_remaining, 50);

        assert_eq!(ledger.balance("u-1", now), 60);
    }

    #[test]
    fn test_redeem_appends_spend_entry() {
        let ledger = store();
        let now = Utc::now();
        ledger
            .append_earn("u-1", SourceType::Purchase, 100, now, None)
            .unwrap();
        let spend = ledger.redeem("u-1", 25, now).unwrap();
        assert_eq!(spend.kind, EntryKind::Spend);
        assert_eq!(spend.points_delta, -25);
        assert_eq!(ledger.entries("u-1").len(), 2);
    }

    #[test]
    fn test_redeem_insufficient_balance() {
        let ledger = store();
        let now = Utc::now();
        ledger
            .append_earn("u-1", SourceType::Purchase, 10, now, None)
            .unwrap();
        let err = ledger.redeem("u-1", 11, now).unwrap_err();
        assert!(matches!(err, LoyaltyError::Validation(_)));
        // Nothing was consumed.
        assert_eq!(ledger.balance("u-1", now), 10);
    }

    #[test]
    fn test_qualifying_points_window() {
        let ledger = store();
        let now = Utc::now();
        ledger
            .append_earn("u-1", SourceType::Purchase, 100, now - Duration::days(100), None)
            .unwrap();
        ledger
            .append_earn("u-1", SourceType::Purchase, 40, now - Duration::days(10), None)
            .unwrap();

        assert_eq!(ledger.qualifying_points("u-1", None, now), 140);
        assert_eq!(
            ledger.qualifying_points("u-1", Some(now - Duration::days(30)), now),
            40
        );
    }

    #[test]
    fn test_earned_on_day() {
        let ledger = store();
        let now = Utc::now();
        ledger
            .append_earn("u-1", SourceType::Purchase, 30, now, None)
            .unwrap();
        ledger
            .append_earn("u-1", SourceType::Review, 20, now, None)
            .unwrap();
        ledger
            .append_earn("u-1", SourceType::Purchase, 99, now - Duration::days(2), None)
            .unwrap();
        assert_eq!(ledger.earned_on_day("u-1", now.date_naive()), 50);
    }

    #[test]
    fn test_expiring_within() {
        let ledger = store();
        let now = Utc::now();
        ledger
            .append_earn("u-1", SourceType::Purchase, 10, now, Some(now + Duration::days(5)))
            .unwrap();
        ledger
            .append_earn("u-1", SourceType::Purchase, 20, now, Some(now + Duration::days(60)))
            .unwrap();
        ledger
            .append_earn("u-1", SourceType::Purchase, 30, now, None)
            .unwrap();

        let soon = ledger.expiring_within("u-1", now, 14);
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].points_delta, 10);
    }

    #[test]
    fn test_events_emitted_on_mutation() {
        let sink = capture_sink();
        let ledger = LedgerStore::new(sink.clone());
        let now = Utc::now();
        ledger
            .append_earn("u-1", SourceType::Purchase, 100, now, None)
            .unwrap();
        ledger.redeem("u-1", 40, now).unwrap();

        assert_eq!(sink.count_type(EventType::PointsEarned), 1);
        assert_eq!(sink.count_type(EventType::PointsRedeemed), 1);
    }
}
