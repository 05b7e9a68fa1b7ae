//! Data Quality Manager (spec §4.8): non-gating quality scoring plus the live-only gap-retry
//! timer.
//!
//! Grounded on `barter::statistic` for the scoring shape (a periodic recomputation over stored
//! state, not a gate on the data path) and `Czichy-ibkr-rust`'s retry/backoff texture for the
//! live timer, built on `crossbeam::channel::tick` rather than a `tokio::time::interval`.
use crate::{
    adapter::DataAdapter,
    config::{GapFillerConfig, OperatingMode},
    data::session::SessionData,
    error::Result,
    plan::{ProvisioningPlan, SymbolPlan},
    quality::score::{compute_quality, expected_bar_count},
    time::manager::TimeManager,
};
use crossbeam::channel::{self, RecvTimeoutError};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

pub struct QualityManager {
    data: Arc<SessionData>,
    adapter: Arc<dyn DataAdapter>,
    time: Arc<TimeManager>,
    config: GapFillerConfig,
    cancel: Arc<AtomicBool>,
    streaming_done: Arc<AtomicBool>,
}

impl QualityManager {
    pub fn new(
        data: Arc<SessionData>,
        adapter: Arc<dyn DataAdapter>,
        time: Arc<TimeManager>,
        config: GapFillerConfig,
        cancel: Arc<AtomicBool>,
        streaming_done: Arc<AtomicBool>,
    ) -> Self {
        Self {
            data,
            adapter,
            time,
            config,
            cancel,
            streaming_done,
        }
    }

    /// Backtest mode scores once after streaming completes (there is nothing to retry against,
    /// since the adapter already returned everything it has); live mode runs a retry timer for
    /// the full duration of the session (spec §4.8 Open Question: gap retries are live-only).
    pub fn run(&self, plan: &ProvisioningPlan, mode: OperatingMode) -> Result<()> {
        match mode {
            OperatingMode::Backtest => self.await_streaming_then_score(plan),
            OperatingMode::Live => self.run_live_loop(plan),
        }
    }

    /// Waits for the coordinator to finish the full backtest window before scoring — scoring
    /// against a store that is still mid-stream would read a partial bar count and report a
    /// spuriously low quality percentage.
    fn await_streaming_then_score(&self, plan: &ProvisioningPlan) -> Result<()> {
        while !self.streaming_done.load(Ordering::SeqCst) {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            std::thread::sleep(POLL_TIMEOUT);
        }
        self.score_once(plan)
    }

    pub fn score_once(&self, plan: &ProvisioningPlan) -> Result<()> {
        for symbol_plan in &plan.symbols {
            self.score_symbol(symbol_plan)?;
        }
        Ok(())
    }

    fn run_live_loop(&self, plan: &ProvisioningPlan) -> Result<()> {
        let ticker = channel::tick(self.config.retry_interval);
        while !self.cancel.load(Ordering::SeqCst) {
            match ticker.recv_timeout(POLL_TIMEOUT) {
                Ok(_) => {
                    for symbol_plan in &plan.symbols {
                        self.retry_gaps(symbol_plan);
                        self.score_symbol(symbol_plan)?;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    fn score_symbol(&self, plan: &SymbolPlan) -> Result<()> {
        let observed = self.data.get_bar_count(&plan.symbol, plan.base_interval);

        if !self.config.enable_session_quality {
            // Disabled: report every affected bar as 100% quality instead of scoring it for
            // real (spec §4.7 Open Question).
            let snapshot = compute_quality(observed, observed, 0);
            self.data.set_quality(&plan.symbol, plan.base_interval, snapshot);
            return Ok(());
        }

        let date = self.time.get_current_time(None)?.date_naive();
        let session = self.time.get_trading_session(date, None, None)?;
        let expected = expected_bar_count(&session, plan.base_interval.as_minutes());
        let snapshot = compute_quality(expected, observed, 0);
        self.data.set_quality(&plan.symbol, plan.base_interval, snapshot);
        Ok(())
    }

    /// Re-requests every outstanding missing range for `plan`'s base interval, up to
    /// `max_retries` (spec §4.8). Failures are logged, never fatal — a transient adapter hiccup
    /// during a retry pass must not take down the session.
    fn retry_gaps(&self, plan: &SymbolPlan) {
        let Some(gap) = self.data.get_gap(&plan.symbol, plan.base_interval) else {
            return;
        };
        if gap.missing_ranges.is_empty() || !gap.has_retries_remaining(self.config.max_retries) {
            return;
        }

        for (start, end) in &gap.missing_ranges {
            match self
                .adapter
                .refetch(&plan.symbol, plan.base_interval, *start, *end)
            {
                Ok(bars) => {
                    for bar in bars {
                        self.data.append_bar(&plan.symbol, plan.base_interval, bar);
                    }
                }
                Err(err) => {
                    tracing::warn!(symbol = %plan.symbol, interval = %plan.base_interval, %err, "gap refetch failed");
                }
            }
        }
        self.data.increment_gap_retry(&plan.symbol, plan.base_interval);
    }
}
