//! Derives the instant a ledger entry becomes unusable.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use loyalty_core::types::{ExpiryMode, ExpiryRule, SourceType};
use tracing::warn;

/// Outcome of an expiry computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiry {
    /// The entry never becomes unusable.
    Never,
    At(DateTime<Utc>),
}

impl Expiry {
    /// Ledger representation: `None` = never expires.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Expiry::Never => None,
            Expiry::At(at) => Some(*at),
        }
    }
}

/// Compute the expiry for an entry earned at `earned_at` under `rule`, with
/// the earner's tier override applied.
///
/// Resolution order: `Some(0)` override → never expires, regardless of mode;
/// `Some(n > 0)` replaces the rule's day count under rolling mode only
/// (fixed-monthly is date-anchored, not duration-anchored); otherwise the
/// rule's own `expiry_days` applies.
pub fn compute_expiry(
    earned_at: DateTime<Utc>,
    rule: &ExpiryRule,
    tier_override_days: Option<u32>,
) -> Expiry {
    if tier_override_days == Some(0) {
        return Expiry::Never;
    }

    match rule.expiry_mode {
        ExpiryMode::Rolling => {
            let days = match tier_override_days {
                Some(d) => d,
                None => rule.expiry_days,
            };
            Expiry::At(earned_at + Duration::days((days + rule.grace_period_days) as i64))
        }
        ExpiryMode::FixedMonthly => {
            let anchor = next_fixed_day(
                earned_at.date_naive() + Duration::days(rule.expiry_days as i64),
                rule.fixed_day_of_month,
            );
            let at = Utc
                .from_utc_datetime(&anchor.and_hms_opt(0, 0, 0).expect("midnight is valid"))
                + Duration::days(rule.grace_period_days as i64);
            Expiry::At(at)
        }
    }
}

/// Expiry for a source type that may have no active rule configured. A
/// missing rule means the entry never expires; that is a data-integrity
/// signal, not a silent default, so it is logged.
pub fn expiry_for_source(
    earned_at: DateTime<Utc>,
    source_type: SourceType,
    rule: Option<&ExpiryRule>,
    tier_override_days: Option<u32>,
) -> Expiry {
    match rule {
        Some(rule) => compute_expiry(earned_at, rule, tier_override_days),
        None => {
            warn!(
                source_type = %source_type,
                "No active expiry rule for source type; entry will never expire"
            );
            Expiry::Never
        }
    }
}

/// First occurrence of `day_of_month` on or after `threshold`, clamping to
/// the last day of months too short to contain it.
fn next_fixed_day(threshold: NaiveDate, day_of_month: u32) -> NaiveDate {
    let mut year = threshold.year();
    let mut month = threshold.month();
    loop {
        let day = day_of_month.min(days_in_month(year, month));
        let candidate = NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is valid");
        if candidate >= threshold {
            return candidate;
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month is valid")
        .pred_opt()
        .expect("date has a predecessor")
        .day()
}
