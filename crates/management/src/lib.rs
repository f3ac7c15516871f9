//! Admin API for the loyalty rule-set — configuration versioning, tiers,
//! earning/expiry rules, benefits, referral rewards, and guardrails.
//!
//! Every response uses the `{data, message, error}` envelope the admin UI
//! consumes.

pub mod auth;
pub mod handlers;
pub mod models;
pub mod router;

pub use router::admin_router;
