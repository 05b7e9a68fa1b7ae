//! Shared test double for end-to-end `SessionEngine` tests.
use chrono::{DateTime, Utc};
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use session_engine::{
    adapter::LiveBarEvent,
    data::{Bar, Interval},
    Result, SessionError,
};
use std::collections::HashMap;

/// In-memory `DataAdapter` backed by a fixed bar table, keyed by `(symbol, interval)`. Every
/// range query is served by filtering the table; nothing is ever missing unless the test leaves
/// a symbol out of the table entirely.
#[derive(Default)]
pub struct FixtureAdapter {
    bars: Mutex<HashMap<(String, Interval), Vec<Bar>>>,
}

impl FixtureAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(self, symbol: &str, interval: Interval, bars: Vec<Bar>) -> Self {
        self.bars.lock().insert((symbol.to_string(), interval), bars);
        self
    }
}

impl session_engine::DataAdapter for FixtureAdapter {
    fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        Ok(self
            .bars
            .lock()
            .get(&(symbol.to_string(), interval))
            .map(|bars| {
                bars.iter()
                    .copied()
                    .filter(|bar| bar.timestamp >= start && bar.timestamp < end)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_quotes(&self, _symbol: &str, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<session_engine::data::Quote>> {
        Ok(Vec::new())
    }

    fn get_ticks(&self, _symbol: &str, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<session_engine::data::Tick>> {
        Ok(Vec::new())
    }

    fn check_availability(&self, _symbol: &str, _interval: Interval) -> Result<bool> {
        Ok(true)
    }

    fn open_live_stream(&self, _symbol: &str, _interval: Interval) -> Result<Receiver<LiveBarEvent>> {
        Err(SessionError::adapter("fixture adapter has no live stream"))
    }
}
