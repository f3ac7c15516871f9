//! Referral reward tracking — signup and first-purchase rewards, global
//! referred-identity uniqueness, and exact-count milestone slot bonuses.

pub mod tracker;

pub use tracker::{ReferralOutcome, ReferralProgressReport, ReferralTracker};
