//! Trading-calendar data (spec §6.2) — persistent tables consulted by `TimeManager`.
//!
//! This module is the in-crate stand-in for what the real system fetches from a database; it is
//! an external collaborator per spec §1 ("configuration file parsing... and the database ORM"
//! are out of scope). `CalendarStore` is the trait `TimeManager` depends on, grounded on the same
//! "small interface, pluggable implementation" idiom as `barter::backtest::market_data::
//! BacktestMarketData` — production deployments supply their own `CalendarStore` backed by a
//! real database; `InMemoryCalendar` here is the reference implementation used by tests and
//! standalone backtests.
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub type ExchangeGroup = SmolStr;
pub type AssetClass = SmolStr;
pub type ExchangeId = SmolStr;

/// One row of `market_hours` (spec §6.2): `(exchange_group, asset_class) -> hours/timezone`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketHours {
    pub exchange_group: ExchangeGroup,
    pub asset_class: AssetClass,
    pub exchanges: Vec<ExchangeId>,
    pub timezone: Tz,
    pub regular_open: NaiveTime,
    pub regular_close: NaiveTime,
    pub pre_market_open: Option<NaiveTime>,
    pub post_market_close: Option<NaiveTime>,
}

/// One row of `trading_holidays` (spec §6.2), `UNIQUE(date, exchange_group)`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub exchange_group: ExchangeGroup,
    pub holiday_name: SmolStr,
    pub is_closed: bool,
    pub early_close_time: Option<NaiveTime>,
}

/// A fully resolved trading-session description for one `(date, exchange_group, asset_class)`
/// (spec §3). Times are resolved already; callers never re-derive them from `MarketHours`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradingSession {
    pub date: NaiveDate,
    pub is_trading_day: bool,
    pub is_holiday: bool,
    pub holiday_name: Option<SmolStr>,
    pub is_early_close: bool,
    pub regular_open: chrono::DateTime<chrono::Utc>,
    pub regular_close: chrono::DateTime<chrono::Utc>,
    pub pre_market_open: Option<chrono::DateTime<chrono::Utc>>,
    pub post_market_close: Option<chrono::DateTime<chrono::Utc>>,
    pub timezone: Tz,
}

impl TradingSession {
    /// Regular-trading-hours span in minutes, taking early closes into account. Used by the
    /// quality formula (spec §4.8) instead of a hardcoded 390.
    pub fn regular_minutes(&self) -> f64 {
        (self.regular_close - self.regular_open).num_seconds() as f64 / 60.0
    }

    /// A non-trading-day placeholder (weekend, holiday with no session).
    fn closed(date: NaiveDate, timezone: Tz, holiday_name: Option<SmolStr>) -> Self {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        Self {
            date,
            is_trading_day: false,
            is_holiday: holiday_name.is_some(),
            holiday_name,
            is_early_close: false,
            regular_open: midnight,
            regular_close: midnight,
            pre_market_open: None,
            post_market_close: None,
            timezone,
        }
    }
}

/// Read-only access to calendar tables, keyed by exchange group (spec §6.2: "per exchange
/// group, not per exchange").
pub trait CalendarStore: Send + Sync {
    fn market_hours(&self, group: &ExchangeGroup, asset_class: &AssetClass) -> Option<&MarketHours>;
    fn holiday(&self, date: NaiveDate, group: &ExchangeGroup) -> Option<&Holiday>;
    /// Maps an individual exchange (`NYSE`, `NASDAQ`, ...) to its exchange group
    /// (`US_EQUITY`) (spec §4.1, §6.2).
    fn exchange_group(&self, exchange: &ExchangeId) -> Option<ExchangeGroup>;
}

/// Reference in-memory `CalendarStore`, populated via `register_*` at construction.
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    hours: FnvHashMap<(ExchangeGroup, AssetClass), MarketHours>,
    holidays: FnvHashMap<(NaiveDate, ExchangeGroup), Holiday>,
    exchange_to_group: FnvHashMap<ExchangeId, ExchangeGroup>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_market_hours(mut self, hours: MarketHours) -> Self {
        for exchange in &hours.exchanges {
            self.exchange_to_group
                .insert(exchange.clone(), hours.exchange_group.clone());
        }
        self.hours
            .insert((hours.exchange_group.clone(), hours.asset_class.clone()), hours);
        self
    }

    pub fn with_holiday(mut self, holiday: Holiday) -> Self {
        self.holidays
            .insert((holiday.date, holiday.exchange_group.clone()), holiday);
        self
    }

    /// Resolves a `TradingSession` for `date`, consulting holidays and early-close overrides.
    /// This is the canonical builder every `CalendarStore`-backed `TimeManager` funnels through;
    /// kept here (rather than as a inherent `TimeManager` method) so alternate `CalendarStore`
    /// implementations can reuse it.
    pub fn resolve_session(
        &self,
        date: NaiveDate,
        group: &ExchangeGroup,
        asset_class: &AssetClass,
    ) -> Option<TradingSession> {
        let hours = self.market_hours(group, asset_class)?;
        let weekday = date.format("%u").to_string(); // 1..=7, Mon..Sun
        let is_weekend = matches!(weekday.as_str(), "6" | "7");

        if let Some(holiday) = self.holiday(date, group) {
            if holiday.is_closed {
                return Some(TradingSession::closed(
                    date,
                    hours.timezone,
                    Some(holiday.holiday_name.clone()),
                ));
            }
            // Early-close but still trading.
            let close_time = holiday.early_close_time.unwrap_or(hours.regular_close);
            return Some(build_open_session(date, hours, close_time, true, None));
        }

        if is_weekend {
            return Some(TradingSession::closed(date, hours.timezone, None));
        }

        Some(build_open_session(date, hours, hours.regular_close, false, None))
    }
}

fn build_open_session(
    date: NaiveDate,
    hours: &MarketHours,
    close_time: NaiveTime,
    is_early_close: bool,
    holiday_name: Option<SmolStr>,
) -> TradingSession {
    let resolve = |t: NaiveTime| {
        hours
            .timezone
            .from_local_datetime(&date.and_time(t))
            .single()
            .unwrap_or_else(|| hours.timezone.from_utc_datetime(&date.and_time(t)))
            .with_timezone(&chrono::Utc)
    };

    TradingSession {
        date,
        is_trading_day: true,
        is_holiday: holiday_name.is_some(),
        holiday_name,
        is_early_close,
        regular_open: resolve(hours.regular_open),
        regular_close: resolve(close_time),
        pre_market_open: hours.pre_market_open.map(resolve),
        post_market_close: hours.post_market_close.map(resolve),
        timezone: hours.timezone,
    }
}

use chrono::TimeZone;

impl CalendarStore for InMemoryCalendar {
    fn market_hours(&self, group: &ExchangeGroup, asset_class: &AssetClass) -> Option<&MarketHours> {
        self.hours.get(&(group.clone(), asset_class.clone()))
    }

    fn holiday(&self, date: NaiveDate, group: &ExchangeGroup) -> Option<&Holiday> {
        self.holidays.get(&(date, group.clone()))
    }

    fn exchange_group(&self, exchange: &ExchangeId) -> Option<ExchangeGroup> {
        self.exchange_to_group.get(exchange).cloned()
    }
}
