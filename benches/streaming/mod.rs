use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{Criterion, Throughput};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use session_engine::data::{interval::Interval, model::Bar, session::SessionData};
use std::sync::Arc;

criterion::criterion_main!(benchmark_streaming);

fn bar(ts: DateTime<Utc>, close: Decimal) -> Bar {
    Bar {
        timestamp: ts,
        open: close,
        high: close,
        low: close,
        close,
        volume: dec!(100),
        trade_count: Some(1),
        vwap: None,
    }
}

/// Throughput of `SessionData::append_bar` under a subscriber draining arrivals, the hot path of
/// the streaming phase (spec §4.4): one append per incoming base bar, fanned out to every worker.
fn bench_append_bar(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_data_append_bar");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_subscriber", |b| {
        let data = Arc::new(SessionData::new(10_000));
        let _subscriber = data.subscribe_arrivals();
        let symbol = session_engine::data::model::Symbol::from("AAPL");
        let base = Utc.with_ymd_and_hms(2025, 7, 2, 9, 30, 0).unwrap();
        let mut i = 0i64;

        b.iter(|| {
            let ts = base + Duration::seconds(i);
            data.append_bar(&symbol, Interval::OneSecond, bar(ts, dec!(100)));
            i += 1;
        });
    });

    group.finish();
}

fn benchmark_streaming() {
    let mut c = Criterion::default().without_plots();
    bench_append_bar(&mut c);
}
