//! Data quality scoring (spec §4.8): a non-gating completeness/duplicate metric computed per
//! `(symbol, interval, trading day)`.
//!
//! Grounded on `barter::statistic`'s one-pass metric style: a pure function over counts, with no
//! side effects or I/O, callable from both the live quality manager's incremental updates and the
//! historical backfill pass.
use crate::{data::model::QualitySnapshot, time::calendar::TradingSession};
use chrono::Utc;

/// `quality_percent = 100 * (0.9*completeness + 0.1*(1 - duplicates_penalty))` (spec §4.8).
/// Completeness and the duplicate penalty are both clamped to `[0, 1]` so an over-counted bucket
/// (e.g. a late-arriving duplicate counted before eviction) never pushes the score outside
/// `[0, 100]`.
pub fn compute_quality(expected: usize, observed: usize, duplicates: usize) -> QualitySnapshot {
    let completeness = if expected == 0 {
        1.0
    } else {
        (observed.min(expected) as f64 / expected as f64).clamp(0.0, 1.0)
    };
    let duplicates_penalty = if duplicates > 0 { 0.1 } else { 0.0 };
    let quality_percent = 100.0 * (0.9 * completeness + 0.1 * (1.0 - duplicates_penalty));

    QualitySnapshot {
        quality_percent,
        completeness,
        duplicates_penalty,
        expected_bars: expected,
        observed_bars: observed,
        computed_at: Utc::now(),
    }
}

/// Expected base-bar count for a trading day's regular session, derived from the session's
/// actual span rather than a hardcoded 390 (spec §4.8 Open Question: early closes and half days
/// must not be penalised as incomplete).
pub fn expected_bar_count(session: &TradingSession, interval_minutes: f64) -> usize {
    if !session.is_trading_day || interval_minutes <= 0.0 {
        return 0;
    }
    (session.regular_minutes() / interval_minutes).round().max(0.0) as usize
}
