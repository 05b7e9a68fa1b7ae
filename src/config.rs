//! Session configuration (spec §6.3).
//!
//! Grounded on `barter::system::config::SystemConfig`: a single `Deserialize`-able tree handed
//! to the system builder at startup, with nested config blocks owned by the component that
//! consumes them.
use crate::{
    data::interval::Interval,
    time::calendar::{AssetClass, ExchangeGroup},
};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use smol_str::SmolStr;
use std::{collections::HashMap, time::Duration};

/// Live trading vs. historical replay (spec §3, §4.1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    Live,
    Backtest,
}

/// Per-symbol subscription request (spec §4.2): the caller asks for an interval, the
/// `RequirementAnalyzer` decides the base interval that actually gets fetched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SymbolRequest {
    pub symbol: SmolStr,
    pub intervals: Vec<Interval>,
    pub quotes: bool,
}

/// `[backtest]` config block — ignored entirely in `Live` mode.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestConfig {
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    /// `0` replays data-driven (the coordinator blocks on each consumer in turn, as fast as the
    /// pipeline can go); `> 0` paces bars at `(t - t_prev) / speed_multiplier` wall-clock seconds
    /// apart, the clock-driven mode the concurrency model's overrun accounting exists for
    /// (spec §4.5 step 5, §5).
    #[serde(default = "default_speed_multiplier")]
    pub speed_multiplier: f64,
    /// Trading days of base-interval bars fetched ahead of the streaming cursor in one adapter
    /// call (spec §6.3).
    #[serde(default = "default_prefetch_days")]
    pub prefetch_days: u32,
}

fn default_speed_multiplier() -> f64 {
    1.0
}

fn default_prefetch_days() -> u32 {
    1
}

/// `[session_data]` config block (spec §3: retention, historical lookback).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionDataConfig {
    /// Bars retained per (symbol, interval) before the oldest are evicted.
    pub max_bars_per_series: usize,
    /// Trading days of historical bars loaded at session start, per interval.
    pub historical_lookback_days: u32,
}

impl Default for SessionDataConfig {
    fn default() -> Self {
        Self {
            max_bars_per_series: 5_000,
            historical_lookback_days: 30,
        }
    }
}

/// `[gap_filler]` config block — live-mode-only retry policy (spec §4.8 Open Question).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GapFillerConfig {
    pub max_retries: u32,
    #[serde(with = "duration_millis")]
    pub retry_interval: Duration,
    /// Disabling skips real completeness/duplicate scoring for the current session and reports
    /// every affected bar as 100% quality instead (spec §4.7 Open Question).
    #[serde(default = "default_true")]
    pub enable_session_quality: bool,
}

impl Default for GapFillerConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_interval: Duration::from_secs(30),
            enable_session_quality: true,
        }
    }
}

/// Which symbols one `[[historical.data]]` block applies to (spec §6.3: `"all"` or an explicit
/// symbol list).
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyTo {
    All,
    Symbols(Vec<SmolStr>),
}

impl ApplyTo {
    pub fn matches(&self, symbol: &SmolStr) -> bool {
        match self {
            ApplyTo::All => true,
            ApplyTo::Symbols(symbols) => symbols.iter().any(|s| s == symbol),
        }
    }
}

impl<'de> Deserialize<'de> for ApplyTo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Literal(String),
            List(Vec<SmolStr>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Literal(text) if text == "all" => Ok(ApplyTo::All),
            Raw::Literal(other) => Err(D::Error::custom(format!(
                "apply_to must be \"all\" or a symbol list, got {other:?}"
            ))),
            Raw::List(symbols) => Ok(ApplyTo::Symbols(symbols)),
        }
    }
}

impl Serialize for ApplyTo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ApplyTo::All => serializer.serialize_str("all"),
            ApplyTo::Symbols(symbols) => symbols.serialize(serializer),
        }
    }
}

/// One `historical.data` entry (spec §4.5, §6.3): a trailing window of bars to load for a set of
/// intervals, scoped to `apply_to`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistoricalDataConfig {
    pub trailing_days: u32,
    pub intervals: Vec<Interval>,
    pub apply_to: ApplyTo,
}

/// The field an indicator is computed over (spec §4.7).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// The statistic an indicator computes (spec §4.7).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    TrailingAverage,
    TrailingMax,
    TrailingMin,
}

/// Whether an indicator resolves to one scalar or a per-minute-of-day array (spec §4.5, §4.7).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorGranularity {
    #[default]
    Daily,
    Minute,
}

/// One `historical.indicators` entry (spec §4.5, §4.7).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IndicatorConfig {
    pub kind: IndicatorKind,
    pub field: IndicatorField,
    /// `Nd`, `Nw`, `Nm`, `Ny` — parsed by `indicator::parse_period`.
    pub period: SmolStr,
    #[serde(default)]
    pub granularity: IndicatorGranularity,
}

/// `[historical]` config block: config-driven historical loading and indicator warm-up
/// (spec §4.5, §6.3).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistoricalConfig {
    /// Disabling skips historical completeness/duplicate scoring and reports every affected bar
    /// as 100% quality instead (spec §4.7 Open Question).
    #[serde(default = "default_true")]
    pub enable_quality: bool,
    /// Trailing-window bar loads, each scoped to a set of intervals and symbols. Empty means "no
    /// explicit plan": the coordinator falls back to loading each symbol's own base interval for
    /// `SessionDataConfig::historical_lookback_days`.
    #[serde(default)]
    pub data: Vec<HistoricalDataConfig>,
    #[serde(default)]
    pub indicators: HashMap<String, IndicatorConfig>,
}

fn default_true() -> bool {
    true
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            enable_quality: true,
            data: Vec::new(),
            indicators: HashMap::new(),
        }
    }
}

/// Top-level session configuration (spec §6.3), the root of what's parsed from the
/// application's config file before it's handed to `SessionEngine::build`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionConfig {
    pub mode: OperatingMode,
    pub exchange_group: ExchangeGroup,
    pub asset_class: AssetClass,
    pub symbols: Vec<SymbolRequest>,
    #[serde(default)]
    pub backtest: Option<BacktestConfig>,
    #[serde(default)]
    pub session_data: SessionDataConfig,
    #[serde(default)]
    pub gap_filler: GapFillerConfig,
    #[serde(default)]
    pub historical: HistoricalConfig,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_to_all_round_trips_through_json() {
        let json = serde_json::to_string(&ApplyTo::All).unwrap();
        assert_eq!(json, "\"all\"");
        assert_eq!(serde_json::from_str::<ApplyTo>(&json).unwrap(), ApplyTo::All);
    }

    #[test]
    fn apply_to_symbols_round_trips_through_json() {
        let original = ApplyTo::Symbols(vec!["AAPL".into(), "MSFT".into()]);
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(serde_json::from_str::<ApplyTo>(&json).unwrap(), original);
    }

    #[test]
    fn apply_to_rejects_unrecognised_literal() {
        assert!(serde_json::from_str::<ApplyTo>("\"none\"").is_err());
    }

    #[test]
    fn backtest_config_defaults_speed_multiplier_and_prefetch_days() {
        let json = r#"{"start_date":"2025-07-02","end_date":"2025-07-02"}"#;
        let config: BacktestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.speed_multiplier, 1.0);
        assert_eq!(config.prefetch_days, 1);
    }
}
