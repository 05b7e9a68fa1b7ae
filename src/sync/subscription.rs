//! `StreamSubscription` — a one-shot ready/consumed synchronisation point between the session
//! coordinator and a downstream consumer (spec §4.3).
//!
//! Grounded on `SyncShutdown`'s minimal-trait idiom (a signal with exactly one meaningful
//! transition) combined with the blocking-channel texture of `Czichy-ibkr-rust`'s
//! `blocking_client`: `crossbeam::channel` gives `recv_timeout` for the data-driven case and
//! `try_recv` for the clock-driven case without pulling in an async runtime.
use crate::error::{Result, SessionError};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// How a `StreamSubscription` behaves when the consumer isn't ready in time (spec §4.3's
/// Open Question: data-driven sources block, clock-driven sources overrun).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SyncMode {
    /// The producer blocks (up to `timeout`) until the consumer signals readiness. Backtest
    /// replay, where nothing else is racing the clock, uses this mode.
    DataDriven { timeout: Duration },
    /// The producer never blocks; if the consumer isn't ready it counts an overrun and moves on.
    /// Live trading, paced by the wall clock, uses this mode.
    ClockDriven,
}

/// A single-use ready/consumed gate. Constructed fresh for each synchronisation point (e.g. once
/// per symbol's bar-processing handoff); `signal_ready` is called by the consumer,
/// `wait_until_ready` by the producer. The gate starts ready (spec §4.3: "initialised to true")
/// so the first handoff through a freshly constructed subscription never blocks or overruns.
pub struct StreamSubscription {
    mode: SyncMode,
    tx: Sender<()>,
    rx: Receiver<()>,
    sync_point: String,
    overrun_count: Arc<AtomicU64>,
}

impl StreamSubscription {
    pub fn new(sync_point: impl Into<String>, mode: SyncMode) -> Self {
        let (tx, rx) = channel::bounded(1);
        let _ = tx.try_send(());
        Self {
            mode,
            tx,
            rx,
            sync_point: sync_point.into(),
            overrun_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn sync_point(&self) -> &str {
        &self.sync_point
    }

    /// Cumulative overruns observed at this sync point (spec §5, §6.4): incremented every time a
    /// clock-driven `wait_until_ready` finds the consumer not ready.
    pub fn overrun_count(&self) -> u64 {
        self.overrun_count.load(Ordering::Relaxed)
    }

    /// Called by the consumer once it has finished with the previous cycle and is ready for the
    /// next item.
    pub fn signal_ready(&self) {
        // Bounded(1) channel: a second signal before the first is consumed is a harmless no-op.
        let _ = self.tx.try_send(());
    }

    /// Called by the producer before publishing the next item.
    pub fn wait_until_ready(&self) -> Result<()> {
        match self.mode {
            SyncMode::DataDriven { timeout } => match self.rx.recv_timeout(timeout) {
                Ok(()) => Ok(()),
                Err(RecvTimeoutError::Timeout) => Err(SessionError::Timeout {
                    sync_point: self.sync_point.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
                Err(RecvTimeoutError::Disconnected) => Err(SessionError::critical(format!(
                    "sync point {} disconnected while waiting",
                    self.sync_point
                ))),
            },
            SyncMode::ClockDriven => match self.rx.try_recv() {
                Ok(()) => Ok(()),
                Err(TryRecvError::Empty) => {
                    self.overrun_count.fetch_add(1, Ordering::Relaxed);
                    Err(SessionError::Overrun {
                        sync_point: self.sync_point.clone(),
                    })
                }
                Err(TryRecvError::Disconnected) => Err(SessionError::critical(format!(
                    "sync point {} disconnected while waiting",
                    self.sync_point
                ))),
            },
        }
    }
}
