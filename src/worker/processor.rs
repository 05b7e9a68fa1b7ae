//! Data Processor (spec §4.6): event-driven base-interval-to-derived-interval aggregation.
//!
//! Grounded on `barter::engine::state::instrument::data::MarketDataState`'s `Processor<&MarketEvent>`
//! impl: a pure reaction to one incoming event, with no polling loop of its own beyond waiting on
//! the next message. Day-level (`1d`) aggregation is not handled here — it runs once per session
//! at market close, alongside the other end-of-day bookkeeping in `worker::coordinator`.
use crate::{
    config::{IndicatorConfig, IndicatorGranularity},
    data::{
        interval::Interval,
        model::{Bar, DataArrival, Symbol},
        session::SessionData,
    },
    error::{Result, SessionError},
    indicator,
    plan::{ProvisioningPlan, SymbolPlan},
    sync::subscription::StreamSubscription,
};
use chrono::{DateTime, TimeZone, Utc};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

pub struct Processor {
    data: Arc<SessionData>,
    plan: ProvisioningPlan,
    cancel: Arc<AtomicBool>,
    indicator_configs: Arc<HashMap<String, IndicatorConfig>>,
    /// Coordinator -> Processor handoff gate, signalled once this symbol's base bar has been
    /// fully processed (spec §4.3, §4.6 step 5).
    processor_subs: Arc<FnvHashMap<Symbol, StreamSubscription>>,
    /// Processor -> Analysis handoff gate, waited on before the arrival broadcast reaches the
    /// analysis engine (spec §4.6 step 6).
    analysis_subs: Arc<FnvHashMap<(Symbol, Interval), StreamSubscription>>,
}

impl Processor {
    pub fn new(
        data: Arc<SessionData>,
        plan: ProvisioningPlan,
        cancel: Arc<AtomicBool>,
        indicator_configs: Arc<HashMap<String, IndicatorConfig>>,
        processor_subs: Arc<FnvHashMap<Symbol, StreamSubscription>>,
        analysis_subs: Arc<FnvHashMap<(Symbol, Interval), StreamSubscription>>,
    ) -> Self {
        Self {
            data,
            plan,
            cancel,
            indicator_configs,
            processor_subs,
            analysis_subs,
        }
    }

    pub fn run(&self) -> Result<()> {
        let arrivals = self.data.subscribe_arrivals();
        self.run_with(&arrivals)
    }

    fn run_with(&self, arrivals: &Receiver<DataArrival>) -> Result<()> {
        while !self.cancel.load(Ordering::SeqCst) {
            match arrivals.recv_timeout(POLL_TIMEOUT) {
                Ok(arrival) => self.handle_arrival(&arrival)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    fn handle_arrival(&self, arrival: &DataArrival) -> Result<()> {
        let Some(plan) = self.plan.symbols.iter().find(|p| p.symbol == arrival.symbol).cloned() else {
            return Ok(());
        };

        if arrival.interval == plan.base_interval {
            for &derived in &plan.derived_intervals {
                if derived.is_day() {
                    continue;
                }
                if let Err(err) = self.try_aggregate(&plan, derived) {
                    if err.is_fatal() {
                        return Err(err);
                    }
                    tracing::warn!(symbol = %plan.symbol, %derived, %err, "derived bar aggregation skipped");
                }
            }
            // Copy the base interval's quality onto every derived interval (spec §4.6 step 4):
            // completeness is a property of the source data, not of each rollup independently.
            self.propagate_base_quality(&plan);
        }

        // Step 3: real-time indicators whose dependency just changed get re-evaluated and
        // republished, rather than only ever being computed once at session start (spec §4.6).
        self.evaluate_realtime_indicators(&plan, arrival.interval);

        if arrival.interval == plan.base_interval {
            if let Some(sub) = self.processor_subs.get(&plan.symbol) {
                sub.signal_ready();
            }
        }

        if let Some(sub) = self.analysis_subs.get(&(plan.symbol.clone(), arrival.interval)) {
            match sub.wait_until_ready() {
                Ok(()) => {}
                Err(SessionError::Overrun { sync_point }) => {
                    tracing::warn!(%sync_point, symbol = %plan.symbol, "processor overran analysis engine");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// Re-evaluates every daily-granularity indicator when a new `1d` bar lands — the only
    /// dependency change a historical indicator can have after session start (spec §4.6 step 3,
    /// §4.7). Minute-granularity arrays are warmed up once per day by the coordinator rather than
    /// recomputed per tick.
    fn evaluate_realtime_indicators(&self, plan: &SymbolPlan, changed_interval: Interval) {
        if changed_interval != Interval::OneDay {
            return;
        }
        for (name, cfg) in self.indicator_configs.iter() {
            if cfg.granularity != IndicatorGranularity::Daily {
                continue;
            }
            let Ok(period) = indicator::parse_period(&cfg.period) else {
                continue;
            };
            let bars = self
                .data
                .get_last_n_bars(&plan.symbol, Interval::OneDay, period.trading_days as usize);
            if let Some(value) = indicator::evaluate_daily(&bars, cfg.kind, cfg.field, period) {
                self.data.set_indicator(&plan.symbol, name.clone(), value);
            }
        }
    }

    fn propagate_base_quality(&self, plan: &SymbolPlan) {
        if let Some(snapshot) = self.data.get_quality(&plan.symbol, plan.base_interval) {
            for &derived in &plan.derived_intervals {
                self.data.set_quality(&plan.symbol, derived, snapshot);
            }
        }
    }

    /// Aggregates the most recently closed bucket of `derived`, if its base bars are 100%
    /// complete (spec §4.6: "never emit a derived bar from a partial bucket").
    fn try_aggregate(&self, plan: &SymbolPlan, derived: Interval) -> Result<()> {
        let Some(derived_duration) = derived.duration() else {
            return Ok(());
        };
        let Some(base_duration) = plan.base_interval.duration() else {
            return Ok(());
        };

        let base_bars = self.data.get_last_n_bars(&plan.symbol, plan.base_interval, 100_000);
        let Some(latest) = base_bars.last() else {
            return Ok(());
        };
        let latest_bucket_start = derived.floor(latest.timestamp);

        // Two ways a bucket becomes ready to evaluate: (a) the base bars landed exactly on the
        // bucket's own boundary (the in-place case), or (b) a base bar skipped ahead into a
        // later bucket, leaving the prior one — possibly incomplete — with no more bars coming
        // (a gap). Case (b) must evaluate the PRIOR bucket, not the one the latest bar landed in.
        let (bucket_start, bucket_end) = if base_bars.len() >= 2
            && derived.floor(base_bars[base_bars.len() - 2].timestamp) != latest_bucket_start
        {
            (latest_bucket_start - derived_duration, latest_bucket_start)
        } else {
            let bucket_end = latest_bucket_start + derived_duration;
            if latest.timestamp + base_duration < bucket_end {
                return Ok(()); // still filling the current bucket
            }
            (latest_bucket_start, bucket_end)
        };

        if self.data.get_latest_bar(&plan.symbol, derived).map(|b| b.timestamp) == Some(bucket_start) {
            return Ok(()); // already emitted
        }

        let in_bucket: Vec<Bar> = base_bars
            .iter()
            .copied()
            .filter(|bar| bar.timestamp >= bucket_start && bar.timestamp < bucket_end)
            .collect();

        let expected = (derived_duration.num_seconds() as f64 / base_duration.num_seconds() as f64).round() as usize;
        if in_bucket.len() < expected {
            return Err(SessionError::Completeness {
                symbol: plan.symbol.clone(),
                interval: derived,
                bucket_start,
                observed: in_bucket.len(),
                expected,
            });
        }

        if let Some(bar) = aggregate_bars(&in_bucket, bucket_start) {
            self.data.add_derived_bar(&plan.symbol, derived, bar);
        }
        Ok(())
    }
}

/// OHLCV rollup of consecutive base bars into one bucket (spec §4.6: open from the first bar,
/// close from the last, high/low across the bucket, volumes summed).
pub fn aggregate_bars(bars: &[Bar], bucket_start: DateTime<Utc>) -> Option<Bar> {
    let first = bars.first()?;
    let last = bars.last()?;
    let high = bars.iter().map(|bar| bar.high).max()?;
    let low = bars.iter().map(|bar| bar.low).min()?;
    let volume = bars.iter().fold(Decimal::ZERO, |acc, bar| acc + bar.volume);
    let trade_count = bars
        .iter()
        .try_fold(0u64, |acc, bar| bar.trade_count.map(|c| acc + c));

    Some(Bar {
        timestamp: bucket_start,
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
        trade_count,
        vwap: None,
    })
}
