//! Tier evaluation — membership derived from ledger history, never stored
//! as truth. Upgrades apply eagerly on earn; downgrades only through the
//! scheduled sweep, so volatile balances don't thrash tier state.

pub mod evaluator;

pub use evaluator::TierEvaluator;
