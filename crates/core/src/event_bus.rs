//! Unified event bus — trait for emitting loyalty events from any module.
//!
//! The ledger, tier evaluator, referral tracker, and registry accept an
//! `Arc<dyn EventSink>` and emit events on every mutation; downstream
//! consumers (notification service, webhook fan-out) subscribe behind it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Event categories emitted by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PointsEarned,
    PointsRedeemed,
    PointsExpiryWarning,
    TierUpgraded,
    TierDowngraded,
    ReferralSignupRewarded,
    ReferralPurchaseRewarded,
    SlotBonusUnlocked,
    ConfigurationActivated,
    ConfigurationDeactivated,
    GuardrailTripped,
}

/// One emitted loyalty event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub user_id: Option<String>,
    /// Id of the configuration/rule/slot involved, when there is one.
    pub entity_id: Option<String>,
    pub points: Option<i64>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Trait for emitting loyalty events. Implementations route events to the
/// notification pipeline, webhooks, or an external queue.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LoyaltyEvent);
}

/// No-op sink for tests and modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: LoyaltyEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<LoyaltyEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<LoyaltyEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: LoyaltyEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating a `LoyaltyEvent` with minimal
/// boilerplate.
pub fn make_event(
    event_type: EventType,
    user_id: Option<String>,
    entity_id: Option<String>,
    points: Option<i64>,
) -> LoyaltyEvent {
    LoyaltyEvent {
        event_id: Uuid::new_v4(),
        event_type,
        user_id,
        entity_id,
        points,
        detail: None,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
