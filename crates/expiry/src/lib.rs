//! Expiry calculation for ledger entries — rolling and fixed-monthly
//! policies, grace periods, and tier overrides.
//!
//! Pure computation over core types; the expiry of an entry is fixed at
//! earn-time and never recomputed when rules change.

pub mod calculator;

pub use calculator::{compute_expiry, expiry_for_source, Expiry};
