//! Benchmarks for chart pattern scanning.

use chartscan::prelude::*;
use chrono::{DateTime, Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Deterministic oscillating series with a slow drift, so swings, levels and
/// the odd candlestick shape all show up.
fn generate_candles(n: usize) -> Vec<Candle> {
    let start = DateTime::<Utc>::from_timestamp(1_600_000_000, 0).unwrap_or_default();
    let mut price = 100.0_f64;

    (0..n)
        .map(|i| {
            let wave = ((i as f64) / 6.0).sin() * 1.5;
            let noise = ((i * 7 + 13) % 100) as f64 / 100.0 - 0.5;
            let open = price;
            let close = (price + wave * 0.4 + noise).max(1.0);
            let spread = 0.5 + ((i * 3) % 10) as f64 / 10.0;
            price = close;
            Candle::new(
                start + Duration::hours(i as i64),
                open,
                open.max(close) + spread,
                (open.min(close) - spread).max(0.5),
                close,
                1_000.0 + (i % 50) as f64 * 10.0,
            )
        })
        .collect()
}

fn bench_single_pattern(c: &mut Criterion) {
    let candles = generate_candles(1000);
    let engine = EngineBuilder::new()
        .add(BuiltinDetector::DoubleTop(DoubleTopDetector::with_defaults()))
        .build()
        .unwrap();

    c.bench_function("scan_double_top_1000_bars", |b| {
        b.iter(|| black_box(engine.scan(black_box(&candles))))
    });
}

fn bench_all_patterns(c: &mut Criterion) {
    let candles = generate_candles(1000);
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

    c.bench_function("scan_all_patterns_1000_bars", |b| {
        b.iter(|| black_box(engine.scan(black_box(&candles))))
    });
}

fn bench_parallel_vs_sequential(c: &mut Criterion) {
    let candles = generate_candles(2000);
    let parallel = EngineBuilder::new().with_all_defaults().build().unwrap();
    let sequential = EngineBuilder::new()
        .with_all_defaults()
        .parallel(false)
        .build()
        .unwrap();

    let mut group = c.benchmark_group("detector_fanout");
    group.bench_function("parallel", |b| {
        b.iter(|| black_box(parallel.scan(black_box(&candles))))
    });
    group.bench_function("sequential", |b| {
        b.iter(|| black_box(sequential.scan(black_box(&candles))))
    });
    group.finish();
}

fn bench_scaling(c: &mut Criterion) {
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    let mut group = c.benchmark_group("scaling");

    for size in [100, 500, 1000, 5000] {
        let candles = generate_candles(size);
        group.bench_with_input(BenchmarkId::new("scan", size), &candles, |b, candles| {
            b.iter(|| black_box(engine.scan(black_box(candles))))
        });
    }

    group.finish();
}

fn bench_multi_instrument(c: &mut Criterion) {
    let series: Vec<Vec<Candle>> = (0..4).map(|k| generate_candles(1000 + k * 50)).collect();
    let symbols = ["AAPL", "MSFT", "BTC-USD", "ETH-USD"];
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

    let instruments: Vec<(&str, &[Candle])> = symbols
        .iter()
        .zip(&series)
        .map(|(symbol, candles)| (*symbol, candles.as_slice()))
        .collect();

    c.bench_function("scan_parallel_4_instruments", |b| {
        b.iter(|| black_box(scan_parallel(&engine, black_box(instruments.clone()))))
    });
}

fn bench_context(c: &mut Criterion) {
    let candles = generate_candles(1000);
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

    c.bench_function("compute_context_1000_bars", |b| {
        b.iter(|| black_box(engine.compute_context(black_box(&candles))))
    });
}

criterion_group!(
    benches,
    bench_single_pattern,
    bench_all_patterns,
    bench_parallel_vs_sequential,
    bench_scaling,
    bench_multi_instrument,
    bench_context,
);

criterion_main!(benches);
