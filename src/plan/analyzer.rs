//! Requirement analysis (spec §4.2): turns the symbols/intervals a caller asked for into a
//! concrete provisioning plan the data adapter and processor can execute.
//!
//! Grounded on `barter::engine::state::builder::EngineStateBuilder` and
//! `barter::system::config::SystemConfig`: configuration is validated and expanded into a
//! complete execution plan once, up front, rather than re-derived ad hoc at each call site.
use crate::{config::SymbolRequest, data::interval::Interval};
use smol_str::SmolStr;

/// What the adapter must fetch and the processor must derive for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolPlan {
    pub symbol: SmolStr,
    /// The interval actually requested from the adapter (spec §4.5: `1s`, `1m` or `1d`).
    pub base_interval: Interval,
    /// Every interval the caller asked for, in ascending-granularity order, including
    /// `base_interval` itself when it was directly requested.
    pub requested_intervals: Vec<Interval>,
    /// Intervals the processor must aggregate from `base_interval` (everything requested that
    /// isn't `base_interval` itself).
    pub derived_intervals: Vec<Interval>,
    pub quotes: bool,
}

/// The full plan for a session: one `SymbolPlan` per requested symbol, all pinned to the same
/// `shared_base_interval` (spec §4.4, glossary: "Base interval — the smallest required interval
/// across all symbols in a session").
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisioningPlan {
    pub symbols: Vec<SymbolPlan>,
    pub shared_base_interval: Interval,
}

impl Default for ProvisioningPlan {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            shared_base_interval: Interval::OneMinute,
        }
    }
}

/// Stateless analyzer: selects the base interval for a symbol's requested set and builds the
/// corresponding plan.
#[derive(Debug, Default)]
pub struct RequirementAnalyzer;

impl RequirementAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Selects the adapter-native base interval for a requested interval set (spec §4.5): any
    /// sub-minute request forces a `1s` base; otherwise `1m` covers every minute/hour/day
    /// derivation.
    pub fn select_base_interval(requested: &[Interval]) -> Interval {
        if requested.iter().any(|i| i.is_sub_minute()) {
            Interval::OneSecond
        } else {
            Interval::OneMinute
        }
    }

    /// Builds one symbol's plan against `base_interval` — either its own smallest required
    /// interval (used to find the session-wide minimum) or the session's `shared_base_interval`
    /// once that minimum is known (spec §4.4: every symbol in a session streams on the same base
    /// interval, even one it never explicitly requested).
    fn build_symbol_plan(request: &SymbolRequest, base_interval: Interval) -> SymbolPlan {
        let mut requested_intervals = request.intervals.clone();
        requested_intervals.sort_by_key(|i| i.rank());
        requested_intervals.dedup();

        let derived_intervals = requested_intervals
            .iter()
            .copied()
            .filter(|i| *i != base_interval)
            .collect();

        SymbolPlan {
            symbol: request.symbol.clone(),
            base_interval,
            requested_intervals,
            derived_intervals,
            quotes: request.quotes,
        }
    }

    /// Builds the full plan for a session's configured symbol requests: each symbol's own
    /// minimal base interval is computed first, then every `SymbolPlan` is pinned to the
    /// smallest of those (spec §4.4's shared base interval).
    pub fn analyze(&self, requests: &[SymbolRequest]) -> ProvisioningPlan {
        let shared_base_interval = requests
            .iter()
            .map(|request| Self::select_base_interval(&request.intervals))
            .min()
            .unwrap_or(Interval::OneMinute);

        let symbols = requests
            .iter()
            .map(|request| Self::build_symbol_plan(request, shared_base_interval))
            .collect();

        ProvisioningPlan {
            symbols,
            shared_base_interval,
        }
    }

    /// Lightweight re-analysis for a single ad-hoc addition after the session has already
    /// started (spec §4.2: callers may subscribe to a new symbol mid-session without
    /// re-running the full plan). The new symbol is pinned to the session's already-established
    /// `shared_base_interval` rather than recomputing a new session-wide minimum, since changing
    /// the base interval for symbols already streaming would require re-provisioning them too.
    pub fn analyze_addition(&self, request: &SymbolRequest, shared_base_interval: Interval) -> SymbolPlan {
        Self::build_symbol_plan(request, shared_base_interval)
    }
}
