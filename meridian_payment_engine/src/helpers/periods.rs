//! Settlement period arithmetic.
//!
//! All period math is done in UTC. A settlement window groups transactions by their `completed_at` time:
//! * `T+N`: transactions completed on day `D` settle on day `D+N`. The period label is `yyyymmdd` of the settle
//!   day and funds mature at 00:00 UTC on that day.
//! * `W+1`: transactions completed in ISO week `W` settle in week `W+1`. The period label is `yyyyww` of the
//!   settle week and funds mature at 00:00 UTC on its Monday.
//! * `M+1`: transactions completed in month `M` settle in month `M+1`. The period label is `yyyymm` of the
//!   settle month and funds mature at 00:00 UTC on its first day.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use thiserror::Error;

use crate::db_types::PeriodType;

#[derive(Debug, Clone, Error)]
#[error("Timestamp is outside the representable date range: {0}")]
pub struct PeriodError(pub String);

/// The settlement window a transaction falls into, given its completion time and the contract cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleWindow {
    /// Numeric period label: `yyyymmdd` for `T+N`, `yyyyww` for `W+1`, `yyyymm` for `M+1`.
    pub period: i64,
    /// Inclusive start of the transaction window.
    pub trx_start_at: DateTime<Utc>,
    /// Exclusive end of the transaction window.
    pub trx_end_at: DateTime<Utc>,
    /// When funds in this window become eligible for posting to the merchant account.
    pub mature_at: DateTime<Utc>,
}

fn midnight(d: NaiveDate) -> DateTime<Utc> {
    d.and_time(NaiveTime::MIN).and_utc()
}

/// Computes the settlement window for a transaction completed at `completed_at` under `period_type`.
pub fn settle_window(period_type: PeriodType, completed_at: DateTime<Utc>) -> Result<SettleWindow, PeriodError> {
    let day = completed_at.date_naive();
    let oor = |what: &str| PeriodError(format!("{what} for {completed_at}"));
    match period_type {
        PeriodType::T0 | PeriodType::T1 | PeriodType::T2 | PeriodType::T3 => {
            let offset = period_type.day_offset().unwrap_or(0) as u64;
            let settle_day = day.checked_add_days(Days::new(offset)).ok_or_else(|| oor("settle day overflows"))?;
            let window_end = day.checked_add_days(Days::new(1)).ok_or_else(|| oor("window end overflows"))?;
            Ok(SettleWindow {
                period: settle_day.year() as i64 * 10_000 + settle_day.month() as i64 * 100 + settle_day.day() as i64,
                trx_start_at: midnight(day),
                trx_end_at: midnight(window_end),
                mature_at: midnight(settle_day),
            })
        },
        PeriodType::W1 => {
            let iso = day.iso_week();
            let week_start = NaiveDate::from_isoywd_opt(iso.year(), iso.week(), Weekday::Mon)
                .ok_or_else(|| oor("ISO week start is unrepresentable"))?;
            let next_week_start =
                week_start.checked_add_days(Days::new(7)).ok_or_else(|| oor("settle week overflows"))?;
            let settle_iso = next_week_start.iso_week();
            Ok(SettleWindow {
                period: settle_iso.year() as i64 * 100 + settle_iso.week() as i64,
                trx_start_at: midnight(week_start),
                trx_end_at: midnight(next_week_start),
                mature_at: midnight(next_week_start),
            })
        },
        PeriodType::M1 => {
            let month_start =
                NaiveDate::from_ymd_opt(day.year(), day.month(), 1).ok_or_else(|| oor("month start is unrepresentable"))?;
            let next_month_start =
                month_start.checked_add_months(Months::new(1)).ok_or_else(|| oor("settle month overflows"))?;
            Ok(SettleWindow {
                period: next_month_start.year() as i64 * 100 + next_month_start.month() as i64,
                trx_start_at: midnight(month_start),
                trx_end_at: midnight(next_month_start),
                mature_at: midnight(next_month_start),
            })
        },
    }
}

/// Converts a unix-millisecond timestamp into a UTC datetime, rejecting out-of-range values.
pub fn ms_to_utc(ms: i64) -> Result<DateTime<Utc>, PeriodError> {
    match Utc.timestamp_millis_opt(ms) {
        chrono::LocalResult::Single(dt) => Ok(dt),
        _ => Err(PeriodError(format!("{ms} ms"))),
    }
}

pub fn utc_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}
