use crate::data::interval::Interval;
use smol_str::SmolStr;
use thiserror::Error;

/// Full error taxonomy for the session engine (spec §7).
///
/// Mirrors the flat, `#[from]`-heavy shape of `barter::error::BarterError`: one enum per crate
/// rather than a nested error type per component, since every variant ultimately surfaces to the
/// same place (a worker boundary or the `SessionEngine::start` caller).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Invalid mode, unknown timezone, missing config field, or unparsable interval string.
    /// Fatal; surfaced at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Adapter cannot provide a required base interval for a symbol. Per-symbol: drop the
    /// symbol with a warning; if all symbols drop, the session terminates.
    #[error("data unavailable for {symbol} on {interval}: {reason}")]
    DataAvailability {
        symbol: SmolStr,
        interval: Interval,
        reason: String,
    },

    /// Source bars missing 100% completeness for a derived bar bucket. Soft: skip with warning,
    /// retry on future updates.
    #[error("incomplete source bucket for {symbol} {interval} at bucket starting {bucket_start}: {observed}/{expected} base bars")]
    Completeness {
        symbol: SmolStr,
        interval: Interval,
        bucket_start: chrono::DateTime<chrono::Utc>,
        observed: usize,
        expected: usize,
    },

    /// A consumer was not ready under clock-driven/live mode. Counted, logged, non-fatal.
    #[error("overrun at sync point {sync_point}: consumer not ready")]
    Overrun { sync_point: String },

    /// A producer blocked beyond the configured per-item timeout in data-driven mode. Fatal.
    #[error("timeout at sync point {sync_point} after {timeout_ms}ms")]
    Timeout { sync_point: String, timeout_ms: u64 },

    /// Invariant violation: out-of-order timestamp, timestamp beyond market close, duplicate
    /// sequence anomaly. Fatal; aborts the session.
    #[error("critical invariant violation: {0}")]
    Critical(String),

    /// Transient adapter I/O failure. Retried up to `max_retries` in live gap filling; fatal in
    /// the initial historical load if unrecoverable.
    #[error("adapter error: {0}")]
    Adapter(String),
}

impl SessionError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn critical(msg: impl Into<String>) -> Self {
        Self::Critical(msg.into())
    }

    pub fn adapter(msg: impl Into<String>) -> Self {
        Self::Adapter(msg.into())
    }

    /// Whether this error is recoverable at the level it's raised (logged and the system
    /// continues) or must propagate to the system boundary and stop workers.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Timeout { .. } | Self::Critical(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
