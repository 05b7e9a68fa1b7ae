use crate::data::interval::Interval;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Normalised OHLCV bar, one per (symbol, interval, timestamp).
///
/// Grounded on `barter-data::subscription::candle::Candle`, generalised from `f64` to `Decimal`
/// pricing (matching `barter`'s own statistic/portfolio modules) and extended with `vwap` per
/// spec §3.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_count: Option<u64>,
    pub vwap: Option<Decimal>,
}

impl Bar {
    /// Validates the OHLC invariants from spec §3: `low <= open,close <= high`, `volume >= 0`.
    pub fn is_valid(&self) -> bool {
        self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
            && self.volume >= Decimal::ZERO
    }
}

/// Quote source discriminant (spec §3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum QuoteSource {
    Api,
    Bar,
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Quote {
    pub timestamp: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
    pub bid_size: Decimal,
    pub ask_size: Decimal,
    pub source: QuoteSource,
}

impl Quote {
    /// Synthetic backtest quote generated from the latest close (spec §3, §4.9's
    /// Open-Question resolution: backtest always generates from the latest base bar, live never
    /// synthesizes).
    pub fn synthetic_from_close(timestamp: DateTime<Utc>, last_close: Decimal) -> Self {
        Self {
            timestamp,
            bid: last_close,
            ask: last_close,
            bid_size: Decimal::ZERO,
            ask_size: Decimal::ZERO,
            source: QuoteSource::Bar,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub size: Decimal,
}

/// Bookkeeping for a missing range of bars on one (symbol, interval).
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct GapInfo {
    pub interval: Option<Interval>,
    pub missing_ranges: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub missing_count: usize,
    pub retries: u32,
}

impl GapInfo {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval: Some(interval),
            missing_ranges: Vec::new(),
            missing_count: 0,
            retries: 0,
        }
    }

    pub fn record_missing(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, count: usize) {
        self.missing_ranges.push((start, end));
        self.missing_count += count;
    }

    pub fn has_retries_remaining(&self, max_retries: u32) -> bool {
        self.retries < max_retries
    }
}

/// Identifies a (symbol, stream kind) for `SessionData::active_streams` (spec §3).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum StreamKind {
    Bars(Interval),
    Quotes,
}

/// Result of the quality computation (spec §4.8), cached per `(symbol, interval)`.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct QualitySnapshot {
    pub quality_percent: f64,
    pub completeness: f64,
    pub duplicates_penalty: f64,
    pub expected_bars: usize,
    pub observed_bars: usize,
    pub computed_at: DateTime<Utc>,
}

/// One base-bar arrival, broadcast on `SessionData`'s arrival channel so workers (the data
/// processor, selective subscribers) can react without polling.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArrival {
    pub symbol: Symbol,
    pub interval: Interval,
    pub timestamp: DateTime<Utc>,
}

pub type Symbol = SmolStr;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid_bar() -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: dec!(10),
            high: dec!(12),
            low: dec!(9),
            close: dec!(11),
            volume: dec!(100),
            trade_count: Some(5),
            vwap: Some(dec!(10.5)),
        }
    }

    #[test]
    fn valid_bar_passes_invariant_check() {
        assert!(valid_bar().is_valid());
    }

    #[test]
    fn bar_with_close_above_high_is_invalid() {
        let mut bar = valid_bar();
        bar.close = dec!(13);
        assert!(!bar.is_valid());
    }

    #[test]
    fn bar_with_negative_volume_is_invalid() {
        let mut bar = valid_bar();
        bar.volume = dec!(-1);
        assert!(!bar.is_valid());
    }

    #[test]
    fn synthetic_quote_has_equal_bid_ask_and_zero_size() {
        let q = Quote::synthetic_from_close(Utc::now(), dec!(42));
        assert_eq!(q.bid, q.ask);
        assert_eq!(q.bid_size, Decimal::ZERO);
        assert_eq!(q.source, QuoteSource::Bar);
    }
}
