//! Earning engine: computes points for qualifying actions under the active
//! configuration and appends expiry-tagged ledger entries.

pub mod engine;

pub use engine::{CampaignMultiplierSource, EarningEngine, FixedMultiplier};
