//! `TimeManager` — the single source of truth for "now" (spec §4.1).
//!
//! Grounded on `barter::engine::clock::{EngineClock, LiveClock, HistoricalClock}`: a live mode
//! reading the wall clock, and a backtest mode holding a mutable, externally-advanced timestamp
//! behind a `parking_lot::RwLock`. Generalised beyond the teacher's narrow `EngineClock::time()`
//! with calendar/session queries and a cache, since those concerns live in `TimeManager` rather
//! than a separate calendar service in this design.
use crate::{
    config::OperatingMode,
    error::{Result, SessionError},
    time::calendar::{AssetClass, CalendarStore, ExchangeGroup, Holiday, TradingSession},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

const LRU_CAPACITY: usize = 100;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct CacheKey {
    date: NaiveDate,
    exchange_group: ExchangeGroup,
    asset_class: AssetClass,
}

/// Bounded LRU over resolved `TradingSession`s, keyed by `(date, exchange_group, asset_class)`
/// (spec §4.1: "bounded LRU (~100 entries)").
struct LruCache {
    entries: IndexMap<CacheKey, TradingSession>,
    capacity: usize,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<TradingSession> {
        let value = self.entries.shift_remove(key)?;
        self.entries.insert(key.clone(), value.clone());
        Some(value)
    }

    fn put(&mut self, key: CacheKey, value: TradingSession) {
        self.entries.shift_remove(&key);
        if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, value);
    }
}

/// Authoritative engine clock. One instance is constructed at system start and shared by
/// reference; it (and its caches) is the only state that survives a day-boundary teardown
/// (spec §3: "The process-wide clock (TimeManager) and its caches persist.").
pub struct TimeManager {
    mode: OperatingMode,
    calendar: Arc<dyn CalendarStore>,
    exchange_group: RwLock<ExchangeGroup>,
    asset_class: RwLock<AssetClass>,
    system_timezone: RwLock<Tz>,
    backtest_time: RwLock<Option<DateTime<Utc>>>,
    last_query: RwLock<Option<(CacheKey, TradingSession)>>,
    lru: RwLock<LruCache>,
}

impl TimeManager {
    pub fn new(
        mode: OperatingMode,
        calendar: Arc<dyn CalendarStore>,
        exchange_group: ExchangeGroup,
        asset_class: AssetClass,
    ) -> Result<Self> {
        let system_timezone = derive_system_timezone(&calendar, &exchange_group, &asset_class);

        Ok(Self {
            mode,
            calendar,
            exchange_group: RwLock::new(exchange_group),
            asset_class: RwLock::new(asset_class),
            system_timezone: RwLock::new(system_timezone),
            backtest_time: RwLock::new(None),
            last_query: RwLock::new(None),
            lru: RwLock::new(LruCache::new(LRU_CAPACITY)),
        })
    }

    /// Recomputes `system_timezone` from `(exchange_group, asset_class)`. Called whenever the
    /// overarching system mutates those fields (spec §4.1: "Recomputed whenever the overarching
    /// system mutates those fields; never specified per call site.").
    pub fn set_scope(&self, exchange_group: ExchangeGroup, asset_class: AssetClass) {
        let timezone = derive_system_timezone(&self.calendar, &exchange_group, &asset_class);
        *self.exchange_group.write() = exchange_group;
        *self.asset_class.write() = asset_class;
        *self.system_timezone.write() = timezone;
    }

    pub fn system_timezone(&self) -> Tz {
        *self.system_timezone.read()
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// `now` in the requested timezone, default the system timezone.
    pub fn get_current_time(&self, tz: Option<Tz>) -> Result<DateTime<Tz>> {
        let tz = tz.unwrap_or_else(|| self.system_timezone());
        let utc = match self.mode {
            OperatingMode::Live => Utc::now(),
            OperatingMode::Backtest => self
                .backtest_time
                .read()
                .ok_or_else(|| {
                    SessionError::configuration("backtest clock accessed before initialisation")
                })?,
        };
        Ok(utc.with_timezone(&tz))
    }

    /// `now`, always in UTC — the form most callers outside the calendar layer want.
    pub fn now_utc(&self) -> Result<DateTime<Utc>> {
        Ok(self.get_current_time(Some(chrono_tz::UTC))?.with_timezone(&Utc))
    }

    pub fn set_backtest_time(&self, ts: DateTime<Utc>) -> Result<()> {
        if self.mode != OperatingMode::Backtest {
            return Err(SessionError::configuration(
                "set_backtest_time called while not in backtest mode",
            ));
        }
        *self.backtest_time.write() = Some(ts);
        Ok(())
    }

    fn group_or_default<'a>(&'a self, group: Option<&'a ExchangeGroup>) -> ExchangeGroup {
        group.cloned().unwrap_or_else(|| self.exchange_group.read().clone())
    }

    fn asset_class_or_default<'a>(&'a self, asset_class: Option<&'a AssetClass>) -> AssetClass {
        asset_class
            .cloned()
            .unwrap_or_else(|| self.asset_class.read().clone())
    }

    /// `TradingSession` for `date`, using the two-tier cache (spec §4.1).
    pub fn get_trading_session(
        &self,
        date: NaiveDate,
        exchange_group: Option<&ExchangeGroup>,
        asset_class: Option<&AssetClass>,
    ) -> Result<TradingSession> {
        let group = self.group_or_default(exchange_group);
        let asset_class = self.asset_class_or_default(asset_class);
        let key = CacheKey {
            date,
            exchange_group: group.clone(),
            asset_class: asset_class.clone(),
        };

        if let Some((last_key, last_session)) = self.last_query.read().as_ref() {
            if *last_key == key {
                return Ok(last_session.clone());
            }
        }

        if let Some(session) = self.lru.write().get(&key) {
            *self.last_query.write() = Some((key, session.clone()));
            return Ok(session);
        }

        let session = self
            .calendar
            .market_hours(&group, &asset_class)
            .and_then(|_| {
                // resolve_session lives on InMemoryCalendar for the default implementation; the
                // trait only exposes the raw tables, so reconstruct the session generically here
                // using the same logic for any CalendarStore implementation.
                resolve_session_generic(self.calendar.as_ref(), date, &group, &asset_class)
            })
            .ok_or_else(|| {
                SessionError::configuration(format!(
                    "no market_hours registered for ({group}, {asset_class})"
                ))
            })?;

        self.lru.write().put(key.clone(), session.clone());
        *self.last_query.write() = Some((key, session.clone()));
        Ok(session)
    }

    pub fn is_trading_day(
        &self,
        date: NaiveDate,
        exchange_group: Option<&ExchangeGroup>,
        asset_class: Option<&AssetClass>,
    ) -> Result<bool> {
        Ok(self
            .get_trading_session(date, exchange_group, asset_class)?
            .is_trading_day)
    }

    pub fn is_holiday(&self, date: NaiveDate, exchange_group: Option<&ExchangeGroup>) -> Result<bool> {
        let group = self.group_or_default(exchange_group);
        Ok(self.calendar.holiday(date, &group).is_some())
    }

    pub fn is_early_close(
        &self,
        date: NaiveDate,
        exchange_group: Option<&ExchangeGroup>,
        asset_class: Option<&AssetClass>,
    ) -> Result<bool> {
        Ok(self
            .get_trading_session(date, exchange_group, asset_class)?
            .is_early_close)
    }

    pub fn get_holidays_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        exchange_group: Option<&ExchangeGroup>,
    ) -> Vec<NaiveDate> {
        let group = self.group_or_default(exchange_group);
        let mut date = start;
        let mut out = Vec::new();
        while date <= end {
            if self.calendar.holiday(date, &group).is_some() {
                out.push(date);
            }
            date += Duration::days(1);
        }
        out
    }

    /// Inclusive: returns `from_date` if it is a trading day, else the next trading day.
    pub fn get_first_trading_date(
        &self,
        from_date: NaiveDate,
        exchange_group: Option<&ExchangeGroup>,
    ) -> Result<NaiveDate> {
        let group = self.group_or_default(exchange_group);
        let asset_class = self.asset_class.read().clone();
        let mut date = from_date;
        for _ in 0..3650 {
            if self.is_trading_day(date, Some(&group), Some(&asset_class))? {
                return Ok(date);
            }
            date += Duration::days(1);
        }
        Err(SessionError::configuration(
            "no trading day found within 10 years of from_date",
        ))
    }

    /// Exclusive: the first trading day strictly after `from_date`.
    pub fn get_next_trading_date(
        &self,
        from_date: NaiveDate,
        exchange_group: Option<&ExchangeGroup>,
    ) -> Result<NaiveDate> {
        self.get_first_trading_date(from_date + Duration::days(1), exchange_group)
    }

    /// `n` trading days before `date`, used to size a historical warm-up window.
    pub fn get_previous_trading_date_n(
        &self,
        date: NaiveDate,
        n: u32,
        exchange_group: Option<&ExchangeGroup>,
    ) -> Result<NaiveDate> {
        let mut cursor = date;
        for _ in 0..n.max(1) {
            cursor = self.get_previous_trading_date(cursor, exchange_group)?;
        }
        Ok(cursor)
    }

    pub fn get_previous_trading_date(
        &self,
        from_date: NaiveDate,
        exchange_group: Option<&ExchangeGroup>,
    ) -> Result<NaiveDate> {
        let group = self.group_or_default(exchange_group);
        let asset_class = self.asset_class.read().clone();
        let mut date = from_date - Duration::days(1);
        for _ in 0..3650 {
            if self.is_trading_day(date, Some(&group), Some(&asset_class))? {
                return Ok(date);
            }
            date -= Duration::days(1);
        }
        Err(SessionError::configuration(
            "no trading day found within 10 years before from_date",
        ))
    }

    /// Number of trading days in `[start, end]` inclusive.
    pub fn count_trading_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        exchange_group: Option<&ExchangeGroup>,
    ) -> Result<u32> {
        let group = self.group_or_default(exchange_group);
        let asset_class = self.asset_class.read().clone();
        let mut date = start;
        let mut count = 0u32;
        while date <= end {
            if self.is_trading_day(date, Some(&group), Some(&asset_class))? {
                count += 1;
            }
            date += Duration::days(1);
        }
        Ok(count)
    }

    /// Computes the backtest window from configured reference dates and sets the clock to
    /// `open` of the start day (spec §4.1). Returns `(first_trading_day, last_trading_day)`.
    pub fn init_backtest(
        &self,
        start_ref: NaiveDate,
        end_ref: NaiveDate,
    ) -> Result<(NaiveDate, NaiveDate)> {
        if self.mode != OperatingMode::Backtest {
            return Err(SessionError::configuration(
                "init_backtest called while not in backtest mode",
            ));
        }
        let group = self.exchange_group.read().clone();
        let start = self.get_first_trading_date(start_ref, Some(&group))?;
        let end = self.get_first_trading_date(end_ref, Some(&group))?;
        let session = self.get_trading_session(start, Some(&group), None)?;
        self.set_backtest_time(session.regular_open)?;
        Ok((start, end))
    }

    /// Advances the backtest clock to the regular (or pre-market, if `include_extended`) open of
    /// the trading session for the clock's current date.
    pub fn advance_to_market_open(&self, include_extended: bool) -> Result<()> {
        let now = self.now_utc()?;
        let date = now.with_timezone(&self.system_timezone()).date_naive();
        let session = self.get_trading_session(date, None, None)?;
        let open = if include_extended {
            session.pre_market_open.unwrap_or(session.regular_open)
        } else {
            session.regular_open
        };
        self.set_backtest_time(open)
    }

    /// Resolves `(open, close)` boundary instants spanning `[start_ref, end_ref]`, mapped
    /// through `get_first_trading_date` the same way `init_backtest` does.
    pub fn get_session_boundary_times(
        &self,
        start_ref: NaiveDate,
        end_ref: NaiveDate,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let group = self.exchange_group.read().clone();
        let start = self.get_first_trading_date(start_ref, Some(&group))?;
        let end = self.get_first_trading_date(end_ref, Some(&group))?;
        let start_session = self.get_trading_session(start, Some(&group), None)?;
        let end_session = self.get_trading_session(end, Some(&group), None)?;
        Ok((start_session.regular_open, end_session.regular_close))
    }
}

fn derive_system_timezone(
    calendar: &Arc<dyn CalendarStore>,
    exchange_group: &ExchangeGroup,
    asset_class: &AssetClass,
) -> Tz {
    calendar
        .market_hours(exchange_group, asset_class)
        .map(|hours| hours.timezone)
        .unwrap_or(chrono_tz::UTC)
}

/// Rebuilds a `TradingSession` the same way `InMemoryCalendar::resolve_session` does, but
/// generically over any `CalendarStore` implementation (the trait only exposes raw table
/// lookups, not the session-building logic itself).
fn resolve_session_generic(
    calendar: &dyn CalendarStore,
    date: NaiveDate,
    group: &ExchangeGroup,
    asset_class: &AssetClass,
) -> Option<TradingSession> {
    use chrono::{Datelike, TimeZone, Weekday};

    let hours = calendar.market_hours(group, asset_class)?;
    let is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);

    let resolve = |t: chrono::NaiveTime| {
        hours
            .timezone
            .from_local_datetime(&date.and_time(t))
            .single()
            .unwrap_or_else(|| hours.timezone.from_utc_datetime(&date.and_time(t)))
            .with_timezone(&Utc)
    };

    let holiday: Option<&Holiday> = calendar.holiday(date, group);
    if let Some(holiday) = holiday {
        if holiday.is_closed {
            let midnight = resolve(chrono::NaiveTime::MIN);
            return Some(TradingSession {
                date,
                is_trading_day: false,
                is_holiday: true,
                holiday_name: Some(holiday.holiday_name.clone()),
                is_early_close: false,
                regular_open: midnight,
                regular_close: midnight,
                pre_market_open: None,
                post_market_close: None,
                timezone: hours.timezone,
            });
        }
        let close_time = holiday.early_close_time.unwrap_or(hours.regular_close);
        return Some(TradingSession {
            date,
            is_trading_day: true,
            is_holiday: false,
            holiday_name: None,
            is_early_close: true,
            regular_open: resolve(hours.regular_open),
            regular_close: resolve(close_time),
            pre_market_open: hours.pre_market_open.map(resolve),
            post_market_close: hours.post_market_close.map(resolve),
            timezone: hours.timezone,
        });
    }

    if is_weekend {
        let midnight = resolve(chrono::NaiveTime::MIN);
        return Some(TradingSession {
            date,
            is_trading_day: false,
            is_holiday: false,
            holiday_name: None,
            is_early_close: false,
            regular_open: midnight,
            regular_close: midnight,
            pre_market_open: None,
            post_market_close: None,
            timezone: hours.timezone,
        });
    }

    Some(TradingSession {
        date,
        is_trading_day: true,
        is_holiday: false,
        holiday_name: None,
        is_early_close: false,
        regular_open: resolve(hours.regular_open),
        regular_close: resolve(hours.regular_close),
        pre_market_open: hours.pre_market_open.map(resolve),
        post_market_close: hours.post_market_close.map(resolve),
        timezone: hours.timezone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::calendar::{Holiday, InMemoryCalendar, MarketHours};
    use chrono::NaiveTime;

    fn manager(mode: OperatingMode) -> TimeManager {
        let calendar = InMemoryCalendar::new()
            .with_market_hours(MarketHours {
                exchange_group: "US_EQUITY".into(),
                asset_class: "EQUITY".into(),
                exchanges: vec!["NYSE".into()],
                timezone: chrono_tz::America::New_York,
                regular_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                regular_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
                pre_market_open: Some(NaiveTime::from_hms_opt(4, 0, 0).unwrap()),
                post_market_close: None,
            })
            .with_holiday(Holiday {
                date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
                exchange_group: "US_EQUITY".into(),
                holiday_name: "Independence Day".into(),
                is_closed: true,
                early_close_time: None,
            });

        TimeManager::new(mode, Arc::new(calendar), "US_EQUITY".into(), "EQUITY".into()).unwrap()
    }

    #[test]
    fn backtest_clock_uninitialized_is_configuration_error() {
        let tm = manager(OperatingMode::Backtest);
        assert!(matches!(
            tm.get_current_time(None),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn init_backtest_skips_weekend_and_holiday() {
        let tm = manager(OperatingMode::Backtest);
        // July 4 2025 is a Friday holiday; July 5-6 are weekend; next trading day is July 7.
        let (start, end) = tm
            .init_backtest(
                NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
                NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
            )
            .unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 7, 7).unwrap());
        assert_eq!(end, start);
        let now = tm.get_current_time(None).unwrap();
        assert_eq!(now.date_naive(), start);
    }

    #[test]
    fn get_next_trading_date_is_exclusive() {
        let tm = manager(OperatingMode::Backtest);
        let next = tm
            .get_next_trading_date(NaiveDate::from_ymd_opt(2025, 7, 2).unwrap(), None)
            .unwrap();
        assert_eq!(next, NaiveDate::from_ymd_opt(2025, 7, 3).unwrap());
    }

    #[test]
    fn count_trading_days_excludes_weekend_and_holiday() {
        let tm = manager(OperatingMode::Backtest);
        let count = tm
            .count_trading_days(
                NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(),
                None,
            )
            .unwrap();
        // Jul 1(Tue) 2 3 are trading days (3 is early close but still trading), 4 is holiday,
        // 5-6 weekend, 7 (Mon) trading. Total = 4.
        assert_eq!(count, 4);
    }

    #[test]
    fn trading_session_lookup_is_cached_and_stable() {
        let tm = manager(OperatingMode::Backtest);
        let date = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        let first = tm.get_trading_session(date, None, None).unwrap();
        let second = tm.get_trading_session(date, None, None).unwrap();
        assert_eq!(first, second);
    }
}
