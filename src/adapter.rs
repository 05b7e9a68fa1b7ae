//! `DataAdapter` — the external market-data collaborator (spec §4.3, out of scope per spec §1:
//! "no concrete broker/vendor integration").
//!
//! Grounded on `barter::backtest::market_data::BacktestMarketData` (a narrow trait the backtest
//! runner depends on, implemented once per data source) and the `barter-data` split between
//! historical and live fetch paths. Production deployments supply a concrete implementation per
//! vendor; nothing in this crate depends on one.
use crate::{
    data::{
        interval::Interval,
        model::{Bar, Quote, Tick},
    },
    error::Result,
};
use chrono::{DateTime, Utc};
use crossbeam::channel::Receiver;
use smol_str::SmolStr;

/// A single bar pushed from a live adapter stream, carrying the interval it was fetched on since
/// one adapter may multiplex several per symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveBarEvent {
    pub symbol: SmolStr,
    pub interval: Interval,
    pub bar: Bar,
}

/// Source of historical and live market data. Implementations own the vendor connection; the
/// session engine only ever calls through this trait.
pub trait DataAdapter: Send + Sync {
    /// Historical bars for `symbol` on `interval`, covering `[start, end]`. May return fewer
    /// bars than the range implies — the caller (the data quality manager) is responsible for
    /// detecting the gap, not the adapter.
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;

    fn get_quotes(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Quote>>;

    fn get_ticks(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Tick>>;

    /// Whether the adapter can serve `interval` for `symbol` at all (spec §4.5: not every
    /// adapter-native interval is available for every symbol, e.g. options without `1s` trades).
    fn check_availability(&self, symbol: &str, interval: Interval) -> Result<bool>;

    /// Opens a live push stream for `(symbol, interval)`. Only called in `Live` mode; backtest
    /// replay is driven entirely by `get_bars`.
    fn open_live_stream(&self, symbol: &str, interval: Interval) -> Result<Receiver<LiveBarEvent>>;

    /// Re-requests a specific range, used by the live gap filler's retry loop (spec §4.8) when a
    /// previously missing range might now be backfilled by the vendor.
    fn refetch(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        self.get_bars(symbol, interval, start, end)
    }
}
