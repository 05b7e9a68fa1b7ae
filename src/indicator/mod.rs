//! Historical indicators (spec §4.7): simple windowed metrics computed over a symbol's bar
//! history and cached in `SessionData` by name.
//!
//! Grounded on `barter::statistic::metric`'s one-pass windowed-metric style: pure functions over
//! a bar slice, no internal state, callable equally from the historical backfill pass and live
//! incremental updates.
use crate::{
    config::{IndicatorField, IndicatorKind},
    data::model::Bar,
    error::{Result, SessionError},
    time::calendar::TradingSession,
};
use rust_decimal::prelude::ToPrimitive;

/// A period expressed in trading days, the unit every indicator window is computed in. Calendar
/// units (`w`, `m`, `y`) are approximated to trading days (spec §4.7: 5 trading days/week, 21/
/// month, 252/year) rather than re-deriving them from `TimeManager` for every indicator
/// evaluation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Period {
    pub trading_days: u32,
}

/// Parses a period string: `Nd` (trading days), `Nw` (weeks), `Nm` (months), `Ny` (years).
pub fn parse_period(text: &str) -> Result<Period> {
    let text = text.trim();
    let (digits, unit) = text.split_at(text.len().saturating_sub(1));
    let count: u32 = digits
        .parse()
        .map_err(|_| SessionError::configuration(format!("invalid period string {text:?}")))?;

    let trading_days = match unit {
        "d" => count,
        "w" => count.saturating_mul(5),
        "m" => count.saturating_mul(21),
        "y" => count.saturating_mul(252),
        other => {
            return Err(SessionError::configuration(format!(
                "unrecognised period unit {other:?} in {text:?}"
            )));
        }
    };

    Ok(Period { trading_days })
}

/// Extracts the OHLCV field an indicator is configured over (spec §4.7).
pub fn field_value(bar: &Bar, field: IndicatorField) -> Option<f64> {
    match field {
        IndicatorField::Open => bar.open.to_f64(),
        IndicatorField::High => bar.high.to_f64(),
        IndicatorField::Low => bar.low.to_f64(),
        IndicatorField::Close => bar.close.to_f64(),
        IndicatorField::Volume => bar.volume.to_f64(),
    }
}

fn field_values(bars: &[Bar], field: IndicatorField) -> Vec<f64> {
    bars.iter().filter_map(|bar| field_value(bar, field)).collect()
}

/// Mean of `field` over the trailing `window` bars (the most recent `window`, or fewer if the
/// history is shorter). Returns `None` for an empty slice.
pub fn trailing_average(bars: &[Bar], field: IndicatorField, window: usize) -> Option<f64> {
    let values = field_values(&bars[bars.len().saturating_sub(window)..], field);
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn trailing_max(bars: &[Bar], field: IndicatorField, window: usize) -> Option<f64> {
    field_values(&bars[bars.len().saturating_sub(window)..], field)
        .into_iter()
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

pub fn trailing_min(bars: &[Bar], field: IndicatorField, window: usize) -> Option<f64> {
    field_values(&bars[bars.len().saturating_sub(window)..], field)
        .into_iter()
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
}

/// Evaluates a daily-granularity indicator (spec §4.5, §4.7) over daily bars: `window` is
/// `period.trading_days`, one bar per trading day.
pub fn evaluate_daily(bars: &[Bar], kind: IndicatorKind, field: IndicatorField, period: Period) -> Option<f64> {
    let window = period.trading_days as usize;
    match kind {
        IndicatorKind::TrailingAverage => trailing_average(bars, field, window),
        IndicatorKind::TrailingMax => trailing_max(bars, field, window),
        IndicatorKind::TrailingMin => trailing_min(bars, field, window),
    }
}

/// Evaluates a minute-granularity indicator (spec §4.5, §4.7): one value per minute-of-day slot,
/// each the trailing `period.trading_days`-day statistic of that slot's field value.
/// `daily_buckets` holds one `Vec<Bar>` of base-interval bars per trading day, each indexed by
/// minute-of-day position; `minute_count` is `minute_buffer_len(session)`, never hardcoded.
pub fn trailing_minute_array(
    daily_buckets: &[Vec<Bar>],
    field: IndicatorField,
    kind: IndicatorKind,
    period: Period,
    minute_count: usize,
) -> Vec<f64> {
    let window = period.trading_days as usize;
    let recent_days = &daily_buckets[daily_buckets.len().saturating_sub(window)..];

    (0..minute_count)
        .map(|slot| {
            let values: Vec<f64> = recent_days
                .iter()
                .filter_map(|day| day.get(slot))
                .filter_map(|bar| field_value(bar, field))
                .collect();
            if values.is_empty() {
                return 0.0;
            }
            match kind {
                IndicatorKind::TrailingAverage => values.iter().sum::<f64>() / values.len() as f64,
                IndicatorKind::TrailingMax => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
                IndicatorKind::TrailingMin => values.into_iter().fold(f64::INFINITY, f64::min),
            }
        })
        .collect()
}

/// Length of a per-minute intraday buffer for one trading session, sized from the session's
/// actual span rather than a hardcoded minute count (spec §4.7, mirroring the §4.8 quality
/// formula's same Open Question resolution).
pub fn minute_buffer_len(session: &TradingSession) -> usize {
    session.regular_minutes().round().max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn bar(close: rust_decimal::Decimal) -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            trade_count: None,
            vwap: None,
        }
    }

    #[test]
    fn parses_every_period_unit() {
        assert_eq!(parse_period("30d").unwrap().trading_days, 30);
        assert_eq!(parse_period("4w").unwrap().trading_days, 20);
        assert_eq!(parse_period("3m").unwrap().trading_days, 63);
        assert_eq!(parse_period("1y").unwrap().trading_days, 252);
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_period("5x").is_err());
    }

    #[test]
    fn trailing_average_uses_only_the_window() {
        let bars: Vec<Bar> = [1, 2, 3, 4].iter().map(|v| bar(dec!(1) * rust_decimal::Decimal::from(*v))).collect();
        assert_eq!(trailing_average(&bars, IndicatorField::Close, 2), Some(3.5));
    }

    #[test]
    fn trailing_max_and_min_over_full_history() {
        let bars: Vec<Bar> = [1, 5, 3].iter().map(|v| bar(rust_decimal::Decimal::from(*v))).collect();
        assert_eq!(trailing_max(&bars, IndicatorField::Close, 10), Some(5.0));
        assert_eq!(trailing_min(&bars, IndicatorField::Close, 10), Some(1.0));
    }

    #[test]
    fn evaluate_daily_dispatches_on_kind() {
        let bars: Vec<Bar> = [1, 5, 3].iter().map(|v| bar(rust_decimal::Decimal::from(*v))).collect();
        let period = Period { trading_days: 10 };
        assert_eq!(
            evaluate_daily(&bars, IndicatorKind::TrailingMax, IndicatorField::Close, period),
            Some(5.0)
        );
        assert_eq!(
            evaluate_daily(&bars, IndicatorKind::TrailingAverage, IndicatorField::Close, period),
            Some(3.0)
        );
    }

    #[test]
    fn trailing_minute_array_is_sized_to_minute_count_and_windowed_by_trading_days() {
        let day1 = vec![bar(dec!(1)), bar(dec!(3))];
        let day2 = vec![bar(dec!(3)), bar(dec!(5))];
        let buckets = vec![day1, day2];
        let values = trailing_minute_array(
            &buckets,
            IndicatorField::Close,
            IndicatorKind::TrailingAverage,
            Period { trading_days: 2 },
            2,
        );
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], 2.0); // (1 + 3) / 2
        assert_eq!(values[1], 4.0); // (3 + 5) / 2
    }

    #[test]
    fn minute_buffer_len_matches_session_span() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        let midnight = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let session = TradingSession {
            date,
            is_trading_day: true,
            is_holiday: false,
            holiday_name: None,
            is_early_close: false,
            regular_open: midnight,
            regular_close: midnight + chrono::Duration::minutes(210),
            pre_market_open: None,
            post_market_close: None,
            timezone: chrono_tz::UTC,
        };
        assert_eq!(minute_buffer_len(&session), 210);
    }
}
