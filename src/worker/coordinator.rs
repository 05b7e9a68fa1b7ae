//! Session Coordinator (spec §4.4): owns the per-trading-day lifecycle — teardown, init,
//! activate, stream, end — and, during the stream phase, the chronological k-way merge across
//! every subscribed symbol's base-interval bars.
//!
//! Grounded on the orphaned top-level `src/engine/trader.rs`'s `Trader::run` loop: a plain
//! `std::thread`-driven loop reading from channels, predating the workspace's move to an async
//! `Engine`. The per-day phase structure is grounded on
//! `barter::backtest::market_data::BacktestMarketData`'s historical-then-live split, generalised
//! here into a five-phase cycle that repeats once per trading day instead of running once.
use crate::{
    adapter::DataAdapter,
    config::{IndicatorGranularity, OperatingMode, SessionConfig},
    data::{
        interval::Interval,
        model::{Bar, Symbol},
        session::SessionData,
    },
    error::{Result, SessionError},
    indicator,
    plan::{ProvisioningPlan, SymbolPlan},
    quality::score::{compute_quality, expected_bar_count},
    sync::subscription::StreamSubscription,
    time::{calendar::TradingSession, manager::TimeManager},
    worker::processor::aggregate_bars,
};
use chrono::{DateTime, NaiveDate, Utc};
use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

pub struct Coordinator {
    time: Arc<TimeManager>,
    data: Arc<SessionData>,
    adapter: Arc<dyn DataAdapter>,
    plan: ProvisioningPlan,
    config: SessionConfig,
    cancel: Arc<AtomicBool>,
    /// Flipped once the coordinator loop exits, so the data quality manager's backtest pass
    /// (which scores once over the full session rather than retrying) knows streaming is done
    /// rather than scoring against a store that is still being written to.
    streaming_done: Arc<AtomicBool>,
    /// Coordinator -> Processor handoff gate, one per symbol (spec §4.3, §4.5 step 4): the
    /// coordinator waits on the symbol's subscription before handing it a bar, the processor
    /// signals readiness once it has finished reacting to the previous one.
    processor_subs: Arc<FnvHashMap<Symbol, StreamSubscription>>,
    /// Per-symbol lookahead buffer filled by `ensure_prefetched` (spec §6.3: `prefetch_days`)
    /// so the adapter is called once per prefetch window rather than once per trading day.
    prefetch_cache: Mutex<FnvHashMap<Symbol, VecDeque<Bar>>>,
}

impl Coordinator {
    pub fn new(
        time: Arc<TimeManager>,
        data: Arc<SessionData>,
        adapter: Arc<dyn DataAdapter>,
        plan: ProvisioningPlan,
        config: SessionConfig,
        cancel: Arc<AtomicBool>,
        streaming_done: Arc<AtomicBool>,
        processor_subs: Arc<FnvHashMap<Symbol, StreamSubscription>>,
    ) -> Self {
        Self {
            time,
            data,
            adapter,
            plan,
            config,
            cancel,
            streaming_done,
            processor_subs,
            prefetch_cache: Mutex::new(FnvHashMap::default()),
        }
    }

    /// `SESSION_COORDINATOR_LOOP` (spec §4.4): Teardown -> Init -> Activate -> Stream -> End,
    /// repeated for every trading day in scope.
    pub fn run(&self) -> Result<()> {
        let (start_date, end_date) = self.resolve_window()?;
        let mut date = start_date;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }

            tracing::info!(%date, "trading day starting");
            self.teardown();
            let active_symbols = self.init(date)?;
            if active_symbols.is_empty() {
                return Err(SessionError::critical(format!(
                    "every symbol failed to load for {date}, terminating session"
                )));
            }
            self.activate(date, &active_symbols)?;
            self.stream(date)?;
            self.end(date)?;
            tracing::info!(%date, "trading day complete");

            if self.config.mode == OperatingMode::Backtest && date >= end_date {
                break;
            }

            date = self.time.get_next_trading_date(date, None)?;
            let session = self.time.get_trading_session(date, None, None)?;
            if self.config.mode == OperatingMode::Backtest {
                self.time.set_backtest_time(session.regular_open)?;
            }
        }

        self.streaming_done.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resolve_window(&self) -> Result<(NaiveDate, NaiveDate)> {
        match self.config.mode {
            OperatingMode::Backtest => {
                let backtest = self.config.backtest.as_ref().ok_or_else(|| {
                    SessionError::configuration("backtest config missing while in backtest mode")
                })?;
                self.time.init_backtest(backtest.start_date, backtest.end_date)
            }
            OperatingMode::Live => {
                let today = self.time.get_current_time(None)?.date_naive();
                let start = self.time.get_first_trading_date(today, None)?;
                Ok((start, start))
            }
        }
    }

    /// Phase 0: drops every symbol's in-memory state. `TimeManager` and its caches are untouched
    /// (spec §3: they persist across days).
    fn teardown(&self) {
        self.data.clear_all();
    }

    /// Phase 1: registers every planned symbol, loads its historical window(s) and warms up its
    /// configured indicators. Returns the set of symbols that survived (spec §4.2: a symbol that
    /// can't be served today is dropped with a warning, not a fatal error; phase 2 terminates the
    /// session only when every symbol dropped).
    fn init(&self, date: NaiveDate) -> Result<FnvHashSet<Symbol>> {
        let today_open = self.time.get_trading_session(date, None, None)?.regular_open;
        let mut active = FnvHashSet::default();

        for symbol_plan in &self.plan.symbols {
            self.data.register_symbol(symbol_plan.symbol.clone());

            match self.adapter.check_availability(&symbol_plan.symbol, symbol_plan.base_interval) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(symbol = %symbol_plan.symbol, interval = %symbol_plan.base_interval, "adapter cannot serve base interval, dropping symbol for today");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(symbol = %symbol_plan.symbol, %err, "availability check failed, dropping symbol for today");
                    continue;
                }
            }

            if let Err(err) = self.load_historical_data(symbol_plan, date, today_open) {
                tracing::warn!(symbol = %symbol_plan.symbol, %err, "historical load failed, dropping symbol for today");
                continue;
            }

            self.warm_up_indicators(symbol_plan, date);
            active.insert(symbol_plan.symbol.clone());
        }

        Ok(active)
    }

    /// Loads every `historical.data` block that applies to `plan`'s symbol (spec §4.5, §6.3),
    /// falling back to a single block over the symbol's own base interval when none are
    /// configured (preserving the old scalar `historical_lookback_days` behaviour).
    fn load_historical_data(&self, plan: &SymbolPlan, date: NaiveDate, today_open: DateTime<Utc>) -> Result<()> {
        let blocks: Vec<_> = self
            .config
            .historical
            .data
            .iter()
            .filter(|block| block.apply_to.matches(&plan.symbol))
            .collect();

        if blocks.is_empty() {
            return self.load_historical_block(
                plan,
                std::slice::from_ref(&plan.base_interval),
                self.config.session_data.historical_lookback_days,
                date,
                today_open,
            );
        }

        for block in blocks {
            self.load_historical_block(plan, &block.intervals, block.trailing_days, date, today_open)?;
        }
        Ok(())
    }

    fn load_historical_block(
        &self,
        plan: &SymbolPlan,
        intervals: &[Interval],
        trailing_days: u32,
        date: NaiveDate,
        today_open: DateTime<Utc>,
    ) -> Result<()> {
        let lookback_start = self.time.get_previous_trading_date_n(date, trailing_days, None)?;
        let lookback_open = self.time.get_trading_session(lookback_start, None, None)?.regular_open;

        for &interval in intervals {
            let bars = self.adapter.get_bars(&plan.symbol, interval, lookback_open, today_open)?;
            for bar in &bars {
                self.data.append_bar(&plan.symbol, interval, *bar);
            }
            self.score_historical_quality(plan, interval, date, trailing_days);
        }
        Ok(())
    }

    /// Scores historical completeness for `interval`, or reports a synthetic 100% snapshot when
    /// `historical.enable_quality` is disabled (spec §4.7 Open Question).
    fn score_historical_quality(&self, plan: &SymbolPlan, interval: Interval, date: NaiveDate, trailing_days: u32) {
        let observed = self.data.get_bar_count(&plan.symbol, interval);

        if !self.config.historical.enable_quality {
            self.data.set_quality(&plan.symbol, interval, compute_quality(observed, observed, 0));
            return;
        }

        let mut expected = 0usize;
        let mut cursor = date;
        for _ in 0..trailing_days.max(1) {
            cursor = match self.time.get_previous_trading_date(cursor, None) {
                Ok(d) => d,
                Err(_) => break,
            };
            if let Ok(session) = self.time.get_trading_session(cursor, None, None) {
                expected += expected_bar_count(&session, interval.as_minutes());
            }
        }
        self.data.set_quality(&plan.symbol, interval, compute_quality(expected, observed, 0));
    }

    /// Warms up every configured historical indicator (spec §4.5, §4.7): daily-granularity
    /// indicators read `1d` bars, minute-granularity indicators read a day-by-day minute buffer.
    fn warm_up_indicators(&self, plan: &SymbolPlan, date: NaiveDate) {
        for (name, cfg) in &self.config.historical.indicators {
            let period = match indicator::parse_period(&cfg.period) {
                Ok(period) => period,
                Err(err) => {
                    tracing::warn!(indicator = %name, %err, "invalid indicator period, skipping");
                    continue;
                }
            };

            match cfg.granularity {
                IndicatorGranularity::Daily => {
                    if let Err(err) = self.ensure_daily_bars(plan, date, period.trading_days) {
                        tracing::warn!(symbol = %plan.symbol, indicator = %name, %err, "failed to load daily bars for indicator");
                        continue;
                    }
                    let bars = self
                        .data
                        .get_last_n_bars(&plan.symbol, Interval::OneDay, period.trading_days as usize);
                    if let Some(value) = indicator::evaluate_daily(&bars, cfg.kind, cfg.field, period) {
                        self.data.set_indicator(&plan.symbol, name.clone(), value);
                    }
                }
                IndicatorGranularity::Minute => {
                    let Ok(session) = self.time.get_trading_session(date, None, None) else {
                        continue;
                    };
                    let minute_count = indicator::minute_buffer_len(&session);
                    let buckets = self.load_minute_buckets(plan, date, period.trading_days);
                    let values = indicator::trailing_minute_array(&buckets, cfg.field, cfg.kind, period, minute_count);
                    self.data.set_minute_indicator(&plan.symbol, name.clone(), values);
                }
            }
        }
    }

    /// Lazily fetches `1d` bars directly from the adapter when fewer than `trading_days` are
    /// already stored (spec §4.5: daily-granularity indicators need `period.trading_days` worth
    /// of `1d` bars, independent of whatever base-interval history was loaded).
    fn ensure_daily_bars(&self, plan: &SymbolPlan, date: NaiveDate, trading_days: u32) -> Result<()> {
        if self.data.get_bar_count(&plan.symbol, Interval::OneDay) >= trading_days as usize {
            return Ok(());
        }
        let lookback_start = self.time.get_previous_trading_date_n(date, trading_days, None)?;
        let lookback_open = self.time.get_trading_session(lookback_start, None, None)?.regular_open;
        let today_open = self.time.get_trading_session(date, None, None)?.regular_open;
        let bars = self.adapter.get_bars(&plan.symbol, Interval::OneDay, lookback_open, today_open)?;
        for bar in bars {
            self.data.append_bar(&plan.symbol, Interval::OneDay, bar);
        }
        Ok(())
    }

    /// One base-interval bar vector per trailing trading day, oldest first, for
    /// `indicator::trailing_minute_array`'s day-by-day minute-of-day windowing.
    fn load_minute_buckets(&self, plan: &SymbolPlan, date: NaiveDate, trading_days: u32) -> Vec<Vec<Bar>> {
        let mut days = Vec::new();
        let mut cursor = date;
        for _ in 0..trading_days.max(1) {
            cursor = match self.time.get_previous_trading_date(cursor, None) {
                Ok(d) => d,
                Err(_) => break,
            };
            let Ok(session) = self.time.get_trading_session(cursor, None, None) else {
                continue;
            };
            if !session.is_trading_day {
                continue;
            }
            let bars = self
                .adapter
                .get_bars(&plan.symbol, plan.base_interval, session.regular_open, session.regular_close)
                .unwrap_or_default();
            days.push(bars);
        }
        days.reverse();
        days
    }

    /// Phase 2: marks every surviving symbol active for the day, anchoring the session-vs-
    /// historical bar boundary at the regular open.
    fn activate(&self, date: NaiveDate, active_symbols: &FnvHashSet<Symbol>) -> Result<()> {
        let session = self.time.get_trading_session(date, None, None)?;
        for symbol_plan in &self.plan.symbols {
            if active_symbols.contains(&symbol_plan.symbol) {
                self.data
                    .set_session_active(&symbol_plan.symbol, true, Some(session.regular_open));
            }
        }
        Ok(())
    }

    /// Phase 3: chronological k-way merge of the day's base-interval bars across every symbol
    /// (spec §4.4). Live mode is out of this crate's concrete adapter scope (spec §1) but the
    /// merge is written generically: whichever source produces bars — a pre-fetched historical
    /// range or a live push stream behind `DataAdapter::open_live_stream` — arrives through the
    /// same `next_bar` abstraction.
    fn stream(&self, date: NaiveDate) -> Result<()> {
        let session = self.time.get_trading_session(date, None, None)?;
        if !session.is_trading_day {
            return Ok(());
        }

        match self.config.mode {
            OperatingMode::Backtest => self.stream_backtest(date, &session),
            OperatingMode::Live => self.stream_live(&session),
        }
    }

    /// Returns `symbol_plan`'s unconsumed bars for `date`, fetching `prefetch_days` trading days
    /// ahead in one adapter call when the cache is exhausted (spec §6.3: `prefetch_days`).
    fn ensure_prefetched(&self, symbol_plan: &SymbolPlan, date: NaiveDate, session: &TradingSession) -> Vec<Bar> {
        let mut cache = self.prefetch_cache.lock();
        let queue = cache.entry(symbol_plan.symbol.clone()).or_default();

        let needs_fetch = queue.back().map(|bar| bar.timestamp < session.regular_close).unwrap_or(true);
        if needs_fetch {
            let prefetch_days = self
                .config
                .backtest
                .as_ref()
                .map(|b| b.prefetch_days.max(1))
                .unwrap_or(1);
            let mut end_date = date;
            for _ in 1..prefetch_days {
                end_date = self.time.get_next_trading_date(end_date, None).unwrap_or(end_date);
            }
            if let Ok(end_session) = self.time.get_trading_session(end_date, None, None) {
                if let Ok(bars) = self.adapter.get_bars(
                    &symbol_plan.symbol,
                    symbol_plan.base_interval,
                    session.regular_open,
                    end_session.regular_close,
                ) {
                    let high_watermark = queue.back().map(|bar| bar.timestamp);
                    for bar in bars {
                        if high_watermark.map(|ts| bar.timestamp > ts).unwrap_or(true) {
                            queue.push_back(bar);
                        }
                    }
                }
            }
        }

        let mut today = Vec::new();
        while let Some(bar) = queue.front().copied() {
            if bar.timestamp >= session.regular_close {
                break;
            }
            today.push(bar);
            queue.pop_front();
        }
        today
    }

    fn stream_backtest(&self, date: NaiveDate, session: &TradingSession) -> Result<()> {
        let mut queues: Vec<(&SymbolPlan, VecDeque<Bar>)> = Vec::new();
        for symbol_plan in &self.plan.symbols {
            if !self.data.is_active(&symbol_plan.symbol) {
                continue;
            }
            let bars = self.ensure_prefetched(symbol_plan, date, session);
            queues.push((symbol_plan, bars.into_iter().collect()));
        }
        // Simultaneous bars are drained in lexicographic symbol order (spec §4.5 step 4).
        queues.sort_by(|a, b| a.0.symbol.cmp(&b.0.symbol));

        let speed_multiplier = self.config.backtest.as_ref().map(|b| b.speed_multiplier).unwrap_or(1.0);
        let mut prev_timestamp: Option<DateTime<Utc>> = None;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }

            let next_ts = queues
                .iter()
                .filter_map(|(_, queue)| queue.front().map(|bar| bar.timestamp))
                .min();

            let Some(next_ts) = next_ts else {
                break; // every queue drained: the day is over
            };

            if next_ts < session.regular_open || next_ts > session.regular_close {
                // Invariant 7: `open(D) <= t <= close(D)`. A bar past close with nothing left
                // before it is the normal end of day; one sitting strictly outside the window on
                // either side while earlier data remains unconsumed is a source invariant
                // violation the merge cannot recover from.
                let remaining_in_window = queues.iter().any(|(_, queue)| {
                    queue
                        .front()
                        .map(|bar| bar.timestamp >= session.regular_open && bar.timestamp <= session.regular_close)
                        .unwrap_or(false)
                });
                if remaining_in_window || next_ts < session.regular_open {
                    return Err(SessionError::critical(format!(
                        "bar timestamp {next_ts} outside session window [{}, {}]",
                        session.regular_open, session.regular_close
                    )));
                }
                break; // normal end of day
            }

            self.time.set_backtest_time(next_ts)?;

            for (symbol_plan, queue) in queues.iter_mut() {
                while queue.front().map(|bar| bar.timestamp) == Some(next_ts) {
                    let bar = queue.pop_front().expect("checked non-empty above");
                    if let Some(sub) = self.processor_subs.get(&symbol_plan.symbol) {
                        match sub.wait_until_ready() {
                            Ok(()) => {}
                            Err(SessionError::Overrun { sync_point }) => {
                                tracing::warn!(%sync_point, symbol = %symbol_plan.symbol, "coordinator overran processor");
                            }
                            Err(err) => return Err(err),
                        }
                    }
                    self.data.append_bar(&symbol_plan.symbol, symbol_plan.base_interval, bar);
                }
            }

            if speed_multiplier > 0.0 {
                if let Some(prev) = prev_timestamp {
                    let elapsed = (next_ts - prev).to_std().unwrap_or_default();
                    std::thread::sleep(elapsed.div_f64(speed_multiplier));
                }
            }
            prev_timestamp = Some(next_ts);
        }

        Ok(())
    }

    /// Live streaming merge: reads from every symbol's live channel via `crossbeam::Select`
    /// until market close or cancellation.
    fn stream_live(&self, session: &TradingSession) -> Result<()> {
        use crossbeam::channel::Select;

        let mut streams = Vec::new();
        for symbol_plan in &self.plan.symbols {
            if !self.data.is_active(&symbol_plan.symbol) {
                continue;
            }
            match self.adapter.open_live_stream(&symbol_plan.symbol, symbol_plan.base_interval) {
                Ok(rx) => streams.push((symbol_plan, rx)),
                Err(err) => tracing::warn!(symbol = %symbol_plan.symbol, %err, "failed to open live stream"),
            }
        }

        if streams.is_empty() {
            return Ok(());
        }

        while !self.cancel.load(Ordering::SeqCst) {
            if self.time.now_utc()? >= session.regular_close {
                break;
            }

            let mut select = Select::new();
            for (_, rx) in &streams {
                select.recv(rx);
            }

            let oper = match select.select_timeout(std::time::Duration::from_millis(200)) {
                Ok(oper) => oper,
                Err(_) => continue, // timed out, re-check close time and cancellation
            };
            let idx = oper.index();
            match oper.recv(&streams[idx].1) {
                Ok(event) => {
                    if let Some(sub) = self.processor_subs.get(&streams[idx].0.symbol) {
                        if let Err(err) = sub.wait_until_ready() {
                            if err.is_fatal() {
                                return Err(err);
                            }
                            tracing::warn!(symbol = %streams[idx].0.symbol, %err, "coordinator overran processor");
                        }
                    }
                    self.data.append_bar(&event.symbol, event.interval, event.bar);
                }
                Err(_) => {
                    tracing::warn!(symbol = %streams[idx].0.symbol, "live stream disconnected");
                }
            }
        }

        Ok(())
    }

    /// Phase 4: derives the full-day `1d` bar where requested, advances the backtest clock to
    /// the session's regular close (so `TimeManager::now` reflects the close even when the last
    /// bar's own timestamp sits a minute or more short of it), then deactivates every symbol.
    fn end(&self, date: NaiveDate) -> Result<()> {
        let session = self.time.get_trading_session(date, None, None)?;
        if session.is_trading_day {
            for symbol_plan in &self.plan.symbols {
                if symbol_plan.derived_intervals.contains(&Interval::OneDay) {
                    self.derive_day_bar(symbol_plan, &session);
                }
            }
            if self.config.mode == OperatingMode::Backtest {
                self.time.set_backtest_time(session.regular_close)?;
            }
        }
        for symbol_plan in &self.plan.symbols {
            self.data.set_session_active(&symbol_plan.symbol, false, None);
        }
        Ok(())
    }

    fn derive_day_bar(&self, plan: &SymbolPlan, session: &TradingSession) {
        let bars = self
            .data
            .get_bars_since(&plan.symbol, plan.base_interval, session.regular_open);
        let in_session: Vec<Bar> = bars
            .into_iter()
            .filter(|bar| bar.timestamp < session.regular_close)
            .collect();
        if in_session.is_empty() {
            return;
        }
        if let Some(bar) = aggregate_bars(&in_session, session.regular_open) {
            self.data.add_derived_bar(&plan.symbol, Interval::OneDay, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{BacktestConfig, GapFillerConfig, HistoricalConfig, SessionDataConfig, SymbolRequest},
        data::model::{Quote, Tick},
        plan::RequirementAnalyzer,
        sync::subscription::SyncMode,
        time::calendar::{InMemoryCalendar, MarketHours},
    };
    use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
    use crossbeam::channel::Receiver;
    use parking_lot::Mutex as TestMutex;
    use rust_decimal_macros::dec;

    struct FixtureAdapter {
        bars_by_symbol: TestMutex<std::collections::HashMap<String, Vec<Bar>>>,
    }

    impl DataAdapter for FixtureAdapter {
        fn get_bars(&self, symbol: &str, _: Interval, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>> {
            let guard = self.bars_by_symbol.lock();
            Ok(guard
                .get(symbol)
                .map(|bars| {
                    bars.iter()
                        .copied()
                        .filter(|bar| bar.timestamp >= start && bar.timestamp < end)
                        .collect()
                })
                .unwrap_or_default())
        }
        fn get_quotes(&self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Quote>> {
            Ok(Vec::new())
        }
        fn get_ticks(&self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Tick>> {
            Ok(Vec::new())
        }
        fn check_availability(&self, _: &str, _: Interval) -> Result<bool> {
            Ok(true)
        }
        fn open_live_stream(&self, _: &str, _: Interval) -> Result<Receiver<crate::adapter::LiveBarEvent>> {
            Err(SessionError::adapter("fixture has no live stream"))
        }
    }

    fn calendar() -> InMemoryCalendar {
        InMemoryCalendar::new().with_market_hours(MarketHours {
            exchange_group: "US_EQUITY".into(),
            asset_class: "EQUITY".into(),
            exchanges: vec!["NYSE".into()],
            timezone: chrono_tz::America::New_York,
            regular_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            regular_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            pre_market_open: None,
            post_market_close: None,
        })
    }

    fn bar(ts: DateTime<Utc>) -> Bar {
        Bar {
            timestamp: ts,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
            trade_count: Some(1),
            vwap: None,
        }
    }

    fn processor_subs(symbols: &[&str]) -> Arc<FnvHashMap<Symbol, StreamSubscription>> {
        Arc::new(
            symbols
                .iter()
                .map(|s| {
                    (
                        Symbol::from(*s),
                        StreamSubscription::new(format!("coordinator->processor:{s}"), SyncMode::ClockDriven),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn single_day_backtest_streams_bars_chronologically() {
        let time = Arc::new(
            TimeManager::new(OperatingMode::Backtest, Arc::new(calendar()), "US_EQUITY".into(), "EQUITY".into())
                .unwrap(),
        );
        let data = Arc::new(SessionData::new(10_000));

        let date = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        let open = time.get_trading_session(date, None, None).unwrap().regular_open;

        let mut bars_by_symbol = std::collections::HashMap::new();
        bars_by_symbol.insert(
            "AAPL".to_string(),
            vec![bar(open), bar(open + ChronoDuration::minutes(1))],
        );
        bars_by_symbol.insert("MSFT".to_string(), vec![bar(open + ChronoDuration::seconds(30))]);
        let adapter = Arc::new(FixtureAdapter {
            bars_by_symbol: TestMutex::new(bars_by_symbol),
        });

        let plan = RequirementAnalyzer::new().analyze(&[
            SymbolRequest {
                symbol: "AAPL".into(),
                intervals: vec![Interval::OneMinute],
                quotes: false,
            },
            SymbolRequest {
                symbol: "MSFT".into(),
                intervals: vec![Interval::OneMinute],
                quotes: false,
            },
        ]);

        let config = SessionConfig {
            mode: OperatingMode::Backtest,
            exchange_group: "US_EQUITY".into(),
            asset_class: "EQUITY".into(),
            symbols: Vec::new(),
            backtest: Some(BacktestConfig {
                start_date: date,
                end_date: date,
                speed_multiplier: 0.0,
                prefetch_days: 1,
            }),
            session_data: SessionDataConfig::default(),
            gap_filler: GapFillerConfig::default(),
            historical: HistoricalConfig::default(),
        };

        let coordinator = Coordinator::new(
            Arc::clone(&time),
            Arc::clone(&data),
            adapter,
            plan,
            config,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
            processor_subs(&["AAPL", "MSFT"]),
        );
        coordinator.run().unwrap();

        let aapl: crate::data::model::Symbol = "AAPL".into();
        let msft: crate::data::model::Symbol = "MSFT".into();
        assert_eq!(data.get_bar_count(&aapl, Interval::OneMinute), 2);
        assert_eq!(data.get_bar_count(&msft, Interval::OneMinute), 1);
        // the session ended: symbols are deactivated again
        assert!(!data.is_active(&aapl));
    }

    #[test]
    fn all_symbols_failing_availability_terminates_the_session() {
        struct UnavailableAdapter;
        impl DataAdapter for UnavailableAdapter {
            fn get_bars(&self, _: &str, _: Interval, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Bar>> {
                Ok(Vec::new())
            }
            fn get_quotes(&self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Quote>> {
                Ok(Vec::new())
            }
            fn get_ticks(&self, _: &str, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Tick>> {
                Ok(Vec::new())
            }
            fn check_availability(&self, _: &str, _: Interval) -> Result<bool> {
                Ok(false)
            }
            fn open_live_stream(&self, _: &str, _: Interval) -> Result<Receiver<crate::adapter::LiveBarEvent>> {
                Err(SessionError::adapter("unavailable"))
            }
        }

        let time = Arc::new(
            TimeManager::new(OperatingMode::Backtest, Arc::new(calendar()), "US_EQUITY".into(), "EQUITY".into())
                .unwrap(),
        );
        let data = Arc::new(SessionData::new(1_000));
        let date = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();

        let plan = RequirementAnalyzer::new().analyze(&[SymbolRequest {
            symbol: "AAPL".into(),
            intervals: vec![Interval::OneMinute],
            quotes: false,
        }]);

        let config = SessionConfig {
            mode: OperatingMode::Backtest,
            exchange_group: "US_EQUITY".into(),
            asset_class: "EQUITY".into(),
            symbols: Vec::new(),
            backtest: Some(BacktestConfig {
                start_date: date,
                end_date: date,
                speed_multiplier: 0.0,
                prefetch_days: 1,
            }),
            session_data: SessionDataConfig::default(),
            gap_filler: GapFillerConfig::default(),
            historical: HistoricalConfig::default(),
        };

        let coordinator = Coordinator::new(
            time,
            data,
            Arc::new(UnavailableAdapter),
            plan,
            config,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
            processor_subs(&["AAPL"]),
        );

        assert!(matches!(coordinator.run(), Err(SessionError::Critical(_))));
    }
}
