//! Rule-set registry — the versioned configuration store every other engine
//! crate reads.
//!
//! Owns the single-active-configuration invariant, monotonic version
//! assignment, CRUD over tiers / earning rules / expiry rules / benefits /
//! referral rewards / guardrails, referential-integrity checks, and the
//! audit log. Data held in DashMap (development); swap to PostgreSQL for
//! production.

pub mod models;
pub mod store;

pub use store::ConfigRegistry;
