//! Scenario tests S1-S5: concrete literal-input cases a session engine must satisfy, driving the
//! public `SessionEngine` API end to end with an in-memory adapter test double. S6 (clock-driven
//! overrun bookkeeping) is covered at the `sync::subscription` unit level instead — see DESIGN.md.
mod support;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use session_engine::{
    config::{BacktestConfig, SessionConfig, SymbolRequest},
    data::{Bar, Interval},
    time::calendar::{AssetClass, ExchangeGroup, Holiday, InMemoryCalendar, MarketHours},
    NullStrategy, OperatingMode, SessionEngine,
};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use support::FixtureAdapter;

const EXCHANGE_GROUP: &str = "US_EQUITY";
const ASSET_CLASS: &str = "EQUITY";

fn market_hours(regular_close: NaiveTime) -> MarketHours {
    MarketHours {
        exchange_group: ExchangeGroup::from(EXCHANGE_GROUP),
        asset_class: AssetClass::from(ASSET_CLASS),
        exchanges: vec!["NYSE".into()],
        timezone: chrono_tz::America::New_York,
        regular_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        regular_close,
        pre_market_open: None,
        post_market_close: None,
    }
}

fn full_day_calendar() -> InMemoryCalendar {
    InMemoryCalendar::new().with_market_hours(market_hours(NaiveTime::from_hms_opt(16, 0, 0).unwrap()))
}

fn bar(ts: chrono::DateTime<Utc>, close: Decimal) -> Bar {
    Bar {
        timestamp: ts,
        open: close,
        high: close,
        low: close,
        close,
        volume: dec!(10),
        trade_count: Some(1),
        vwap: None,
    }
}

fn session_open(date: NaiveDate) -> chrono::DateTime<Utc> {
    chrono_tz::America::New_York
        .from_local_datetime(&date.and_hms_opt(9, 30, 0).unwrap())
        .unwrap()
        .with_timezone(&Utc)
}

fn backtest_config(date: NaiveDate) -> SessionConfig {
    SessionConfig {
        mode: OperatingMode::Backtest,
        exchange_group: ExchangeGroup::from(EXCHANGE_GROUP),
        asset_class: AssetClass::from(ASSET_CLASS),
        symbols: vec![SymbolRequest {
            symbol: "AAPL".into(),
            intervals: vec![Interval::OneMinute, Interval::FiveMinute],
            quotes: false,
        }],
        backtest: Some(BacktestConfig {
            start_date: date,
            end_date: date,
            speed_multiplier: 0.0,
            prefetch_days: 1,
        }),
        session_data: Default::default(),
        gap_filler: Default::default(),
        historical: Default::default(),
    }
}

/// Runs `engine` to convergence: `done` is polled every 50ms for up to 2.5s of wall-clock time.
fn run_until(engine: &mut SessionEngine, done: impl Fn() -> bool) {
    for _ in 0..50 {
        std::thread::sleep(StdDuration::from_millis(50));
        if done() {
            break;
        }
    }
    engine.stop();
}

#[test]
fn s1_single_symbol_single_day_data_driven() {
    let date = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
    let open = session_open(date);

    let bars: Vec<Bar> = (0..390)
        .map(|i| bar(open + Duration::minutes(i), dec!(100) + Decimal::from(i)))
        .collect();
    let adapter = Arc::new(FixtureAdapter::new().with_bars("AAPL", Interval::OneMinute, bars));

    let mut engine = SessionEngine::build(backtest_config(date), Arc::new(full_day_calendar()), adapter).unwrap();
    let data = engine.session_data();
    let time = engine.time_manager();
    engine.start(NullStrategy, Vec::new()).unwrap();

    run_until(&mut engine, || {
        data.get_bar_count(&"AAPL".into(), Interval::OneMinute) == 390
            && data.get_quality(&"AAPL".into(), Interval::OneMinute).is_some()
    });

    assert_eq!(data.get_bar_count(&"AAPL".into(), Interval::OneMinute), 390);
    assert_eq!(data.get_bar_count(&"AAPL".into(), Interval::FiveMinute), 78);

    let quality_1m = data.get_quality(&"AAPL".into(), Interval::OneMinute).unwrap();
    assert_eq!(quality_1m.quality_percent, 100.0);

    let latest = data.get_latest_bar(&"AAPL".into(), Interval::OneMinute).unwrap();
    assert_eq!(latest.timestamp, open + Duration::minutes(389));
    assert_eq!(latest, data.get_last_n_bars(&"AAPL".into(), Interval::OneMinute, 1)[0]);

    let now = time.get_current_time(None).unwrap();
    let close = session_open(date) - Duration::minutes(390) + Duration::hours(6) + Duration::minutes(30);
    assert_eq!(now.with_timezone(&Utc), close);
}

#[test]
fn s2_single_day_with_missing_minute() {
    let date = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
    let open = session_open(date);

    let bars: Vec<Bar> = (0..390)
        .filter(|&i| i != 45) // 10:15 is the 45th minute after 09:30
        .map(|i| bar(open + Duration::minutes(i), dec!(100)))
        .collect();
    let adapter = Arc::new(FixtureAdapter::new().with_bars("AAPL", Interval::OneMinute, bars));

    let mut engine = SessionEngine::build(backtest_config(date), Arc::new(full_day_calendar()), adapter).unwrap();
    let data = engine.session_data();
    engine.start(NullStrategy, Vec::new()).unwrap();

    run_until(&mut engine, || {
        data.get_bar_count(&"AAPL".into(), Interval::OneMinute) == 389
            && data.get_quality(&"AAPL".into(), Interval::OneMinute).is_some()
    });

    assert_eq!(data.get_bar_count(&"AAPL".into(), Interval::OneMinute), 389);
    // the bucket [10:15, 10:20) is short one base bar: no 5m bar at that bucket start
    let missing_bucket_start = open + Duration::minutes(45);
    let five_minute_bars = data.get_last_n_bars(&"AAPL".into(), Interval::FiveMinute, 100);
    assert!(!five_minute_bars.iter().any(|b| b.timestamp == missing_bucket_start));
    assert_eq!(five_minute_bars.len(), 77);

    let quality = data.get_quality(&"AAPL".into(), Interval::OneMinute).unwrap();
    assert!((quality.quality_percent - (100.0 * (0.9 * 389.0 / 390.0 + 0.1))).abs() < 1e-6);
}

#[test]
fn s3_early_close_day_uses_actual_session_span_not_390() {
    let date = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
    let calendar = InMemoryCalendar::new()
        .with_market_hours(market_hours(NaiveTime::from_hms_opt(16, 0, 0).unwrap()))
        .with_holiday(Holiday {
            date,
            exchange_group: ExchangeGroup::from(EXCHANGE_GROUP),
            holiday_name: "Early Close Day".into(),
            is_closed: false,
            early_close_time: Some(NaiveTime::from_hms_opt(13, 0, 0).unwrap()),
        });

    let open = session_open(date);
    let bars: Vec<Bar> = (0..210).map(|i| bar(open + Duration::minutes(i), dec!(100))).collect();
    let adapter = Arc::new(FixtureAdapter::new().with_bars("AAPL", Interval::OneMinute, bars));

    let mut engine = SessionEngine::build(backtest_config(date), Arc::new(calendar), adapter).unwrap();
    let data = engine.session_data();
    engine.start(NullStrategy, Vec::new()).unwrap();

    run_until(&mut engine, || {
        data.get_quality(&"AAPL".into(), Interval::OneMinute).is_some()
    });

    assert_eq!(data.get_bar_count(&"AAPL".into(), Interval::OneMinute), 210);
    assert_eq!(data.get_bar_count(&"AAPL".into(), Interval::FiveMinute), 42);

    let quality = data.get_quality(&"AAPL".into(), Interval::OneMinute).unwrap();
    assert_eq!(quality.expected_bars, 210);
    assert_eq!(quality.quality_percent, 100.0);
}

#[test]
fn s4_holiday_is_skipped_by_historical_lookback() {
    let calendar = full_day_calendar().with_holiday(Holiday {
        date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
        exchange_group: ExchangeGroup::from(EXCHANGE_GROUP),
        holiday_name: "Independence Day".into(),
        is_closed: true,
        early_close_time: None,
    });
    let time = session_engine::time::TimeManager::new(
        OperatingMode::Backtest,
        Arc::new(calendar),
        ExchangeGroup::from(EXCHANGE_GROUP),
        AssetClass::from(ASSET_CLASS),
    )
    .unwrap();

    // July 7 2025 (Monday) is the trading day after the July 4 holiday and the July 5-6 weekend.
    let before_holiday = time
        .get_previous_trading_date_n(NaiveDate::from_ymd_opt(2025, 7, 7).unwrap(), 1, None)
        .unwrap();
    assert_eq!(before_holiday, NaiveDate::from_ymd_opt(2025, 7, 3).unwrap());
    assert!(time.is_holiday(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(), None).unwrap());

    let session = time
        .get_trading_session(NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(), None, None)
        .unwrap();
    let expected = session_engine::quality::expected_bar_count(&session, 1.0);
    assert_eq!(expected, 0);
    let snapshot = session_engine::quality::compute_quality(expected, 0, 0);
    assert_eq!(snapshot.quality_percent, 100.0);
}

#[test]
fn s5_multi_symbol_notifications_arrive_in_timestamp_order() {
    let date = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
    let open = session_open(date);

    let timestamps: Vec<_> = (0..3).map(|i| open + Duration::minutes(i)).collect();
    let aapl_bars: Vec<Bar> = timestamps.iter().map(|&ts| bar(ts, dec!(100))).collect();
    let msft_bars: Vec<Bar> = timestamps.iter().map(|&ts| bar(ts, dec!(200))).collect();

    let adapter = Arc::new(
        FixtureAdapter::new()
            .with_bars("AAPL", Interval::OneMinute, aapl_bars)
            .with_bars("MSFT", Interval::OneMinute, msft_bars),
    );

    let mut config = backtest_config(date);
    config.symbols.push(SymbolRequest {
        symbol: "MSFT".into(),
        intervals: vec![Interval::OneMinute],
        quotes: false,
    });

    let mut engine = SessionEngine::build(config, Arc::new(full_day_calendar()), adapter).unwrap();
    let data = engine.session_data();
    let arrivals = data.subscribe_arrivals();
    engine.start(NullStrategy, Vec::new()).unwrap();

    let mut order = Vec::new();
    while order.len() < 6 {
        match arrivals.recv_timeout(StdDuration::from_secs(2)) {
            Ok(arrival) => order.push((arrival.symbol, arrival.timestamp)),
            Err(_) => break,
        }
    }
    engine.stop();

    assert_eq!(order.len(), 6, "expected 3 bars each for AAPL and MSFT");
    for t in 0..3 {
        let aapl_idx = order
            .iter()
            .position(|(s, ts)| s.as_str() == "AAPL" && *ts == timestamps[t])
            .unwrap();
        let msft_idx = order
            .iter()
            .position(|(s, ts)| s.as_str() == "MSFT" && *ts == timestamps[t])
            .unwrap();
        assert!(
            aapl_idx < msft_idx,
            "AAPL's {t}-th bar must be notified before MSFT's at the same timestamp"
        );
    }
}
