//! `SessionEngine` — wires the four workers (coordinator, processor, quality manager, analysis
//! engine) together and owns their lifecycle.
//!
//! Grounded on `barter::system::{System, builder::SystemBuilder}`: a builder that validates
//! configuration once and hands back a running system with a `start`/`shutdown` lifecycle,
//! retargeted from `tokio::task::JoinHandle` to `std::thread::JoinHandle` per the thread-based
//! concurrency model this crate uses throughout.
use crate::{
    adapter::DataAdapter,
    config::{OperatingMode, SessionConfig},
    data::{interval::Interval, model::Symbol, session::SessionData},
    error::{Result, SessionError},
    plan::RequirementAnalyzer,
    sync::subscription::{StreamSubscription, SyncMode},
    time::{calendar::CalendarStore, manager::TimeManager},
    worker::{
        analysis::{AnalysisEngine, Strategy},
        coordinator::Coordinator,
        processor::Processor,
        quality::QualityManager,
    },
};
use fnv::FnvHashMap;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

/// How long a data-driven (`speed_multiplier == 0`) producer waits for its consumer before the
/// handoff is treated as stuck and the session fails (spec §4.3, §5).
const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// `Live` mode and any paced (`speed_multiplier > 0`) backtest never block a producer on a slow
/// consumer; only a `speed_multiplier == 0` backtest — nothing else racing the clock — blocks
/// (spec §4.3 Open Question, §5).
fn sync_mode(config: &SessionConfig) -> SyncMode {
    match config.mode {
        OperatingMode::Live => SyncMode::ClockDriven,
        OperatingMode::Backtest => {
            let speed_multiplier = config.backtest.as_ref().map(|b| b.speed_multiplier).unwrap_or(1.0);
            if speed_multiplier <= 0.0 {
                SyncMode::DataDriven { timeout: DEFAULT_SYNC_TIMEOUT }
            } else {
                SyncMode::ClockDriven
            }
        }
    }
}

/// A started `SessionEngine`'s worker threads, kept so `stop` can signal cancellation and join
/// them in the order each worker's consumers must stop before their producers do.
struct Handles {
    analysis: JoinHandle<()>,
    processor: JoinHandle<()>,
    quality: JoinHandle<()>,
    coordinator: JoinHandle<()>,
}

/// Top-level entry point: builds the worker set from a `SessionConfig` and runs it.
pub struct SessionEngine {
    time: Arc<TimeManager>,
    data: Arc<SessionData>,
    adapter: Arc<dyn DataAdapter>,
    config: SessionConfig,
    cancel: Arc<AtomicBool>,
    handles: Option<Handles>,
    /// Coordinator -> Processor and Processor -> Analysis sync points (spec §4.3), retained so
    /// `overrun_counts` can report each point's cumulative overruns after the session ends.
    processor_subs: Arc<FnvHashMap<Symbol, StreamSubscription>>,
    analysis_subs: Arc<FnvHashMap<(Symbol, Interval), StreamSubscription>>,
}

impl SessionEngine {
    pub fn build(
        config: SessionConfig,
        calendar: Arc<dyn CalendarStore>,
        adapter: Arc<dyn DataAdapter>,
    ) -> Result<Self> {
        if config.symbols.is_empty() {
            return Err(SessionError::configuration("no symbols configured"));
        }

        let time = Arc::new(TimeManager::new(
            config.mode,
            calendar,
            config.exchange_group.clone(),
            config.asset_class.clone(),
        )?);
        let data = Arc::new(SessionData::new(config.session_data.max_bars_per_series));

        Ok(Self {
            time,
            data,
            adapter,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            handles: None,
            processor_subs: Arc::new(FnvHashMap::default()),
            analysis_subs: Arc::new(FnvHashMap::default()),
        })
    }

    pub fn session_data(&self) -> Arc<SessionData> {
        Arc::clone(&self.data)
    }

    pub fn time_manager(&self) -> Arc<TimeManager> {
        Arc::clone(&self.time)
    }

    /// Cumulative overruns recorded at every Coordinator->Processor and Processor->Analysis sync
    /// point (spec §5, §6.4), reported as `(sync_point, count)` pairs once a session ends.
    pub fn overrun_counts(&self) -> Vec<(String, u64)> {
        self.processor_subs
            .values()
            .chain(self.analysis_subs.values())
            .map(|sub| (sub.sync_point().to_string(), sub.overrun_count()))
            .collect()
    }

    /// Builds the provisioning plan, spawns every worker thread, and returns once they're
    /// running. `strategy` receives notifications only for `subscriptions` (spec §4.9).
    pub fn start<S>(&mut self, strategy: S, subscriptions: Vec<(Symbol, Interval)>) -> Result<()>
    where
        S: Strategy + 'static,
    {
        if self.handles.is_some() {
            return Err(SessionError::configuration("session engine already started"));
        }

        // Establish the backtest clock before any worker starts: the quality manager and
        // processor both read `TimeManager::get_current_time` from their own threads, and must
        // not race the coordinator's own `init_backtest` call on its first loop iteration.
        if self.config.mode == crate::config::OperatingMode::Backtest {
            let backtest = self.config.backtest.as_ref().ok_or_else(|| {
                SessionError::configuration("backtest config missing while in backtest mode")
            })?;
            self.time.init_backtest(backtest.start_date, backtest.end_date)?;
        }

        let plan = RequirementAnalyzer::new().analyze(&self.config.symbols);
        let streaming_done = Arc::new(AtomicBool::new(false));
        let sync_mode_val = sync_mode(&self.config);

        let processor_subs: Arc<FnvHashMap<Symbol, StreamSubscription>> = Arc::new(
            plan.symbols
                .iter()
                .map(|symbol_plan| {
                    let sync_point = format!("coordinator->processor:{}", symbol_plan.symbol);
                    (symbol_plan.symbol.clone(), StreamSubscription::new(sync_point, sync_mode_val))
                })
                .collect(),
        );
        let analysis_subs: Arc<FnvHashMap<(Symbol, Interval), StreamSubscription>> = Arc::new(
            subscriptions
                .iter()
                .map(|(symbol, interval)| {
                    let sync_point = format!("processor->analysis:{symbol}:{interval}");
                    ((symbol.clone(), *interval), StreamSubscription::new(sync_point, sync_mode_val))
                })
                .collect(),
        );
        self.processor_subs = Arc::clone(&processor_subs);
        self.analysis_subs = Arc::clone(&analysis_subs);

        let mut analysis_engine = AnalysisEngine::new(
            Arc::clone(&self.data),
            strategy,
            subscriptions,
            Arc::clone(&self.cancel),
            Arc::clone(&analysis_subs),
        );
        let analysis = std::thread::Builder::new()
            .name("analysis-engine".into())
            .spawn(move || {
                if let Err(err) = analysis_engine.run() {
                    tracing::error!(%err, "analysis engine terminated");
                }
            })
            .map_err(|err| SessionError::critical(format!("failed to spawn analysis thread: {err}")))?;

        let processor = Processor::new(
            Arc::clone(&self.data),
            plan.clone(),
            Arc::clone(&self.cancel),
            Arc::new(self.config.historical.indicators.clone()),
            Arc::clone(&processor_subs),
            Arc::clone(&analysis_subs),
        );
        let processor_handle = std::thread::Builder::new()
            .name("data-processor".into())
            .spawn(move || {
                if let Err(err) = processor.run() {
                    tracing::error!(%err, "data processor terminated");
                }
            })
            .map_err(|err| SessionError::critical(format!("failed to spawn processor thread: {err}")))?;

        let quality_manager = QualityManager::new(
            Arc::clone(&self.data),
            Arc::clone(&self.adapter),
            Arc::clone(&self.time),
            self.config.gap_filler.clone(),
            Arc::clone(&self.cancel),
            Arc::clone(&streaming_done),
        );
        let mode = self.config.mode;
        let quality_plan = plan.clone();
        let quality = std::thread::Builder::new()
            .name("data-quality-manager".into())
            .spawn(move || {
                if let Err(err) = quality_manager.run(&quality_plan, mode) {
                    tracing::error!(%err, "data quality manager terminated");
                }
            })
            .map_err(|err| SessionError::critical(format!("failed to spawn quality thread: {err}")))?;

        let coordinator = Coordinator::new(
            Arc::clone(&self.time),
            Arc::clone(&self.data),
            Arc::clone(&self.adapter),
            plan,
            self.config.clone(),
            Arc::clone(&self.cancel),
            streaming_done,
            processor_subs,
        );
        let coordinator_handle = std::thread::Builder::new()
            .name("session-coordinator".into())
            .spawn(move || {
                if let Err(err) = coordinator.run() {
                    tracing::error!(%err, "session coordinator terminated");
                }
            })
            .map_err(|err| SessionError::critical(format!("failed to spawn coordinator thread: {err}")))?;

        self.handles = Some(Handles {
            analysis,
            processor: processor_handle,
            quality,
            coordinator: coordinator_handle,
        });
        Ok(())
    }

    /// Signals cancellation and joins every worker, consumers before producers: the analysis
    /// engine and processor stop reading from `SessionData` before the quality manager and
    /// coordinator stop writing to it (spec §4.4).
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        let Some(handles) = self.handles.take() else {
            return;
        };

        for (name, handle) in [
            ("analysis-engine", handles.analysis),
            ("data-processor", handles.processor),
            ("data-quality-manager", handles.quality),
            ("session-coordinator", handles.coordinator),
        ] {
            if handle.join().is_err() {
                tracing::error!(worker = name, "worker thread panicked during shutdown");
            }
        }
    }

}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        if self.handles.is_some() {
            self.stop();
        }
    }
}
