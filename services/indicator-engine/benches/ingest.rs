use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use indicator_engine::config::IndicatorParams;
use indicator_engine::{EngineConfig, SymbolPartition};
use rust_decimal::Decimal;
use types::ids::Symbol;
use types::trade::{Side, Tick};

const MS: i64 = 1_000_000;

/// A random-walk trade stream, ten ticks per second.
fn generate_ticks(count: usize) -> Vec<Tick> {
    let symbol = Symbol::new("BTC-USD");
    let mut price = 50_000i64 * 100;
    (0..count)
        .map(|i| {
            let step = ((i * 7919) % 11) as i64 - 5;
            price = (price + step).max(100);
            let side = if i % 3 == 0 { Side::SELL } else { Side::BUY };
            Tick::new(
                symbol.clone(),
                i as i64 * 100 * MS,
                Decimal::new(price, 2),
                Decimal::new(((i % 50) + 1) as i64, 3),
                side,
            )
            .with_trade_id(i as u64)
        })
        .collect()
}

fn bench_partition_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_ingest");

    for &count in &[1_000usize, 10_000, 100_000] {
        let ticks = generate_ticks(count);
        group.throughput(Throughput::Elements(count as u64));

        // Default catalog at 1s/1m/5m/1h.
        let full = Arc::new(EngineConfig::default().resolve().unwrap());
        group.bench_with_input(BenchmarkId::new("default_catalog", count), &ticks, |b, ticks| {
            b.iter(|| {
                let mut partition = SymbolPartition::standalone(Symbol::new("BTC-USD"), full.clone());
                for tick in ticks {
                    let _ = partition.ingest_tick(black_box(tick.clone()));
                }
                black_box(partition.stats())
            })
        });

        // Bars only.
        let bars_only = Arc::new(
            EngineConfig::default()
                .with_indicators(Vec::<(String, IndicatorParams)>::new())
                .resolve()
                .unwrap(),
        );
        group.bench_with_input(BenchmarkId::new("bars_only", count), &ticks, |b, ticks| {
            b.iter(|| {
                let mut partition =
                    SymbolPartition::standalone(Symbol::new("BTC-USD"), bars_only.clone());
                for tick in ticks {
                    let _ = partition.ingest_tick(black_box(tick.clone()));
                }
                black_box(partition.stats())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition_ingest);
criterion_main!(benches);
