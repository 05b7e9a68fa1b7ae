//! Session engine: chronological multi-symbol bar replay, derived-interval aggregation,
//! indicators and non-gating data quality scoring under a single authoritative clock, for both
//! backtests and live trading.
//!
//! The engine is built from four long-running workers coordinated over `SessionData` (a
//! process-wide, lock-protected bar/quote/tick/indicator/quality store) and driven entirely by
//! `std::thread` + `crossbeam::channel` — there is no async runtime anywhere in this crate.
//! `SessionEngine` (see [`system`]) is the entry point; everything else is a collaborator it
//! wires together.
pub mod adapter;
pub mod config;
pub mod data;
pub mod error;
pub mod indicator;
pub mod logging;
pub mod plan;
pub mod quality;
pub mod sync;
pub mod system;
pub mod time;
pub mod worker;

pub use adapter::DataAdapter;
pub use config::{OperatingMode, SessionConfig};
pub use data::{Bar, Interval, Quote, SessionData, Symbol, Tick};
pub use error::{Result, SessionError};
pub use system::SessionEngine;
pub use worker::{NullStrategy, Strategy};
