//! `SessionData` — the process-wide concurrent bar/quote/tick/indicator/quality store (spec §3).
//!
//! Grounded on `barter::engine::state::instrument::{InstrumentState, market_data::MarketDataState}`:
//! one nested state struct per instrument, indexed in a top-level map behind a single lock,
//! mutated only through named operations rather than exposed `&mut` access.
use crate::data::{
    interval::Interval,
    model::{Bar, DataArrival, GapInfo, QualitySnapshot, Quote, Symbol, Tick},
};
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender};
use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};

/// Fixed-capacity, oldest-evicted series of bars for one `(symbol, interval)` (spec §3:
/// "retains up to `max_bars_per_series`").
#[derive(Debug, Clone)]
pub struct BarIntervalData {
    bars: Vec<Bar>,
    max_len: usize,
}

impl BarIntervalData {
    fn new(max_len: usize) -> Self {
        Self {
            bars: Vec::new(),
            max_len,
        }
    }

    fn push(&mut self, bar: Bar) {
        if let Some(pos) = self
            .bars
            .iter()
            .position(|existing| existing.timestamp == bar.timestamp)
        {
            self.bars[pos] = bar;
            return;
        }
        let insert_at = self
            .bars
            .partition_point(|existing| existing.timestamp < bar.timestamp);
        self.bars.insert(insert_at, bar);
        if self.bars.len() > self.max_len {
            self.bars.remove(0);
        }
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn last_n(&self, n: usize) -> &[Bar] {
        let len = self.bars.len();
        &self.bars[len.saturating_sub(n)..]
    }

    pub fn since(&self, from: DateTime<Utc>) -> &[Bar] {
        let idx = self.bars.partition_point(|bar| bar.timestamp < from);
        &self.bars[idx..]
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    fn retain_from(&mut self, cutoff: DateTime<Utc>, keep_from: bool) {
        if keep_from {
            self.bars.retain(|bar| bar.timestamp >= cutoff);
        } else {
            self.bars.retain(|bar| bar.timestamp < cutoff);
        }
    }
}

/// Per-symbol state: bars per interval, latest quote/tick, indicator values, quality snapshots
/// and gap bookkeeping, plus the stream-activity flag consulted at session end detection.
#[derive(Debug, Clone, Default)]
struct SymbolSessionData {
    bars: FnvHashMap<Interval, BarIntervalData>,
    latest_quote: Option<Quote>,
    latest_tick: Option<Tick>,
    indicators: FnvHashMap<String, f64>,
    minute_indicators: FnvHashMap<String, Vec<f64>>,
    quality: FnvHashMap<Interval, QualitySnapshot>,
    gaps: FnvHashMap<Interval, GapInfo>,
    active: bool,
    session_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SessionDataInner {
    symbols: FnvHashMap<Symbol, SymbolSessionData>,
}

/// The process-wide `SessionData` store. Shared by every worker via `Arc<SessionData>`.
pub struct SessionData {
    inner: RwLock<SessionDataInner>,
    max_bars_per_series: usize,
    /// One independent channel per subscriber (the data processor, the analysis engine, ...) —
    /// every subscriber must see every arrival, so a single shared MPMC channel (which splits
    /// messages across competing consumers) would not do.
    arrival_subscribers: Mutex<Vec<Sender<DataArrival>>>,
}

impl SessionData {
    pub fn new(max_bars_per_series: usize) -> Self {
        Self {
            inner: RwLock::new(SessionDataInner::default()),
            max_bars_per_series,
            arrival_subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber and returns its private receiver. Every `append_bar`/
    /// `add_derived_bar` call after this point is broadcast to it.
    pub fn subscribe_arrivals(&self) -> Receiver<DataArrival> {
        let (tx, rx) = channel::unbounded();
        self.arrival_subscribers.lock().push(tx);
        rx
    }

    fn broadcast_arrival(&self, arrival: DataArrival) {
        let mut subscribers = self.arrival_subscribers.lock();
        subscribers.retain(|tx| tx.send(arrival.clone()).is_ok());
    }

    pub fn register_symbol(&self, symbol: Symbol) {
        self.inner
            .write()
            .symbols
            .entry(symbol)
            .or_insert_with(SymbolSessionData::default);
    }

    pub fn remove_symbol(&self, symbol: &Symbol) {
        self.inner.write().symbols.remove(symbol);
    }

    pub fn set_session_active(&self, symbol: &Symbol, active: bool, session_start: Option<DateTime<Utc>>) {
        let mut guard = self.inner.write();
        let entry = guard.symbols.entry(symbol.clone()).or_default();
        entry.active = active;
        if session_start.is_some() {
            entry.session_start = session_start;
        }
    }

    pub fn is_active(&self, symbol: &Symbol) -> bool {
        self.inner
            .read()
            .symbols
            .get(symbol)
            .map(|s| s.active)
            .unwrap_or(false)
    }

    /// Appends a base-interval bar, published by the data adapter or the coordinator's merge
    /// loop. Broadcasts a `DataArrival` so the processor can react.
    pub fn append_bar(&self, symbol: &Symbol, interval: Interval, bar: Bar) {
        {
            let mut guard = self.inner.write();
            let entry = guard.symbols.entry(symbol.clone()).or_default();
            entry
                .bars
                .entry(interval)
                .or_insert_with(|| BarIntervalData::new(self.max_bars_per_series))
                .push(bar);
        }
        self.broadcast_arrival(DataArrival {
            symbol: symbol.clone(),
            interval,
            timestamp: bar.timestamp,
        });
    }

    /// Appends a bar computed by aggregation (spec §4.6) rather than received from the adapter.
    /// Distinct entry point from `append_bar` only in intent; storage is identical.
    pub fn add_derived_bar(&self, symbol: &Symbol, interval: Interval, bar: Bar) {
        self.append_bar(symbol, interval, bar);
    }

    pub fn set_latest_quote(&self, symbol: &Symbol, quote: Quote) {
        self.inner
            .write()
            .symbols
            .entry(symbol.clone())
            .or_default()
            .latest_quote = Some(quote);
    }

    pub fn set_latest_tick(&self, symbol: &Symbol, tick: Tick) {
        self.inner
            .write()
            .symbols
            .entry(symbol.clone())
            .or_default()
            .latest_tick = Some(tick);
    }

    pub fn set_indicator(&self, symbol: &Symbol, name: impl Into<String>, value: f64) {
        self.inner
            .write()
            .symbols
            .entry(symbol.clone())
            .or_default()
            .indicators
            .insert(name.into(), value);
    }

    /// Stores a minute-granularity indicator's per-minute-of-day array (spec §4.5, §4.7), one
    /// value per slot sized by `indicator::minute_buffer_len`.
    pub fn set_minute_indicator(&self, symbol: &Symbol, name: impl Into<String>, values: Vec<f64>) {
        self.inner
            .write()
            .symbols
            .entry(symbol.clone())
            .or_default()
            .minute_indicators
            .insert(name.into(), values);
    }

    pub fn get_minute_indicator(&self, symbol: &Symbol, name: &str) -> Option<Vec<f64>> {
        self.inner
            .read()
            .symbols
            .get(symbol)?
            .minute_indicators
            .get(name)
            .cloned()
    }

    pub fn set_quality(&self, symbol: &Symbol, interval: Interval, snapshot: QualitySnapshot) {
        self.inner
            .write()
            .symbols
            .entry(symbol.clone())
            .or_default()
            .quality
            .insert(interval, snapshot);
    }

    pub fn record_gap(&self, symbol: &Symbol, interval: Interval, start: DateTime<Utc>, end: DateTime<Utc>, count: usize) {
        let mut guard = self.inner.write();
        let entry = guard
            .symbols
            .entry(symbol.clone())
            .or_default()
            .gaps
            .entry(interval)
            .or_insert_with(|| GapInfo::new(interval));
        entry.record_missing(start, end, count);
    }

    pub fn increment_gap_retry(&self, symbol: &Symbol, interval: Interval) {
        if let Some(gap) = self
            .inner
            .write()
            .symbols
            .get_mut(symbol)
            .and_then(|s| s.gaps.get_mut(&interval))
        {
            gap.retries += 1;
        }
    }

    pub fn get_latest_bar(&self, symbol: &Symbol, interval: Interval) -> Option<Bar> {
        self.inner
            .read()
            .symbols
            .get(symbol)?
            .bars
            .get(&interval)?
            .last()
            .copied()
    }

    pub fn get_last_n_bars(&self, symbol: &Symbol, interval: Interval, n: usize) -> Vec<Bar> {
        self.inner
            .read()
            .symbols
            .get(symbol)
            .and_then(|s| s.bars.get(&interval))
            .map(|series| series.last_n(n).to_vec())
            .unwrap_or_default()
    }

    pub fn get_bars_since(&self, symbol: &Symbol, interval: Interval, from: DateTime<Utc>) -> Vec<Bar> {
        self.inner
            .read()
            .symbols
            .get(symbol)
            .and_then(|s| s.bars.get(&interval))
            .map(|series| series.since(from).to_vec())
            .unwrap_or_default()
    }

    /// Latest bar per symbol for a single interval, for strategies watching many instruments at
    /// once (spec §4.2).
    pub fn get_latest_bars_multi(&self, symbols: &[Symbol], interval: Interval) -> FnvHashMap<Symbol, Bar> {
        let guard = self.inner.read();
        symbols
            .iter()
            .filter_map(|symbol| {
                let bar = guard.symbols.get(symbol)?.bars.get(&interval)?.last()?;
                Some((symbol.clone(), *bar))
            })
            .collect()
    }

    pub fn get_bar_count(&self, symbol: &Symbol, interval: Interval) -> usize {
        self.inner
            .read()
            .symbols
            .get(symbol)
            .and_then(|s| s.bars.get(&interval))
            .map(|series| series.len())
            .unwrap_or(0)
    }

    pub fn get_latest_quote(&self, symbol: &Symbol) -> Option<Quote> {
        self.inner.read().symbols.get(symbol)?.latest_quote
    }

    pub fn get_latest_tick(&self, symbol: &Symbol) -> Option<Tick> {
        self.inner.read().symbols.get(symbol)?.latest_tick
    }

    pub fn get_historical_indicator(&self, symbol: &Symbol, name: &str) -> Option<f64> {
        self.inner
            .read()
            .symbols
            .get(symbol)?
            .indicators
            .get(name)
            .copied()
    }

    pub fn get_quality(&self, symbol: &Symbol, interval: Interval) -> Option<QualitySnapshot> {
        self.inner.read().symbols.get(symbol)?.quality.get(&interval).copied()
    }

    pub fn get_gap(&self, symbol: &Symbol, interval: Interval) -> Option<GapInfo> {
        self.inner.read().symbols.get(symbol)?.gaps.get(&interval).cloned()
    }

    /// Drops bars from the current trading session (`timestamp >= session_start`), keeping
    /// historical bars loaded at startup. Used when a day ends without a full teardown.
    pub fn clear_session_bars(&self, symbol: &Symbol) {
        let mut guard = self.inner.write();
        if let Some(entry) = guard.symbols.get_mut(symbol) {
            let Some(cutoff) = entry.session_start else {
                return;
            };
            for series in entry.bars.values_mut() {
                series.retain_from(cutoff, false);
            }
        }
    }

    /// Drops bars older than the current session, freeing memory once they're no longer needed
    /// for indicator warm-up (spec §3: "persists only while needed").
    pub fn clear_historical_bars(&self, symbol: &Symbol) {
        let mut guard = self.inner.write();
        if let Some(entry) = guard.symbols.get_mut(symbol) {
            let Some(cutoff) = entry.session_start else {
                return;
            };
            for series in entry.bars.values_mut() {
                series.retain_from(cutoff, true);
            }
        }
    }

    /// Full teardown: drops every symbol's state (spec §3: called between trading days when the
    /// universe changes). `TimeManager` is untouched — it is process-wide, not session-scoped.
    pub fn clear_all(&self) {
        self.inner.write().symbols.clear();
    }
}
