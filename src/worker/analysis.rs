//! Analysis Engine (spec §4.9): the strategy boundary. A selective subscriber over
//! `SessionData`'s arrival broadcast — only notifications for `(symbol, interval)` pairs the
//! strategy actually asked for reach `Strategy::on_notification`.
//!
//! Grounded on `barter::strategy`'s narrow trait boundary (one method, no access to engine
//! internals beyond what's passed in) combined with the old `Trader::run` loop's invocation
//! style: the engine drives the strategy, the strategy never drives the engine.
use crate::{
    data::{
        model::{DataArrival, Symbol},
        session::SessionData,
        Interval,
    },
    error::Result,
    sync::subscription::StreamSubscription,
};
use chrono::{DateTime, Utc};
use crossbeam::channel::RecvTimeoutError;
use fnv::FnvHashMap;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// Everything a strategy needs to react to one notification: the store it can read from, and
/// which `(symbol, interval)` just updated.
pub struct AnalysisContext<'a> {
    pub data: &'a SessionData,
    pub symbol: &'a Symbol,
    pub interval: Interval,
    pub timestamp: DateTime<Utc>,
}

/// The strategy boundary (spec §1: strategy logic is explicitly out of scope — this trait is the
/// seam a real strategy implementation plugs into).
pub trait Strategy: Send {
    fn on_notification(&mut self, ctx: AnalysisContext<'_>);
}

/// A strategy that does nothing, used where a caller needs a `SessionEngine` without plugging in
/// real strategy logic (smoke tests, operational dry runs).
#[derive(Debug, Default)]
pub struct NullStrategy;

impl Strategy for NullStrategy {
    fn on_notification(&mut self, _ctx: AnalysisContext<'_>) {}
}

pub struct AnalysisEngine<S: Strategy> {
    data: Arc<SessionData>,
    strategy: S,
    /// The selective subscription set (spec §4.9: strategies subscribe to specific
    /// `(symbol, interval)` pairs rather than receiving every arrival).
    subscriptions: Vec<(Symbol, Interval)>,
    cancel: Arc<AtomicBool>,
    /// Processor -> Analysis handoff gate, signalled once the strategy has finished reacting to
    /// a notification (spec §4.3, §4.9 step 3: the analysis engine is the consumer here).
    analysis_subs: Arc<FnvHashMap<(Symbol, Interval), StreamSubscription>>,
}

impl<S: Strategy> AnalysisEngine<S> {
    pub fn new(
        data: Arc<SessionData>,
        strategy: S,
        subscriptions: Vec<(Symbol, Interval)>,
        cancel: Arc<AtomicBool>,
        analysis_subs: Arc<FnvHashMap<(Symbol, Interval), StreamSubscription>>,
    ) -> Self {
        Self {
            data,
            strategy,
            subscriptions,
            cancel,
            analysis_subs,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let arrivals = self.data.subscribe_arrivals();
        while !self.cancel.load(Ordering::SeqCst) {
            match arrivals.recv_timeout(POLL_TIMEOUT) {
                Ok(arrival) => self.dispatch(arrival),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, arrival: DataArrival) {
        let key = (arrival.symbol.clone(), arrival.interval);
        if !self.subscriptions.iter().any(|(symbol, interval)| *symbol == key.0 && *interval == key.1) {
            return;
        }
        self.strategy.on_notification(AnalysisContext {
            data: &self.data,
            symbol: &arrival.symbol,
            interval: arrival.interval,
            timestamp: arrival.timestamp,
        });
        if let Some(sub) = self.analysis_subs.get(&key) {
            sub.signal_ready();
        }
    }
}
