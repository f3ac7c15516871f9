//! Append-only point ledger — the source of truth for every point earned or
//! spent. Balances and tier qualification are derived from it, never stored.
//!
//! Data held in DashMap (development); swap to PostgreSQL for production.

pub mod store;

pub use store::LedgerStore;
