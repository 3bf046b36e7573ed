//! Reconciliation Benchmarks
//!
//! ## Benchmark Groups
//!
//! - `batch_*`: single-threaded batch throughput (plan, apply, commit)
//! - `stale_*`: batches whose writes are all rejected by the ledger
//! - `contention_*`: concurrent batches racing on the same rows
//!
//! ## Deterministic Randomness
//!
//! Timestamps for shuffled batches come from a fixed-seed LCG so baselines
//! stay comparable between runs.
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench reconcile
//! cargo bench --bench reconcile -- "batch_updates"
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use upsync::{
    EngineConfig, Entity, EntityRegistry, EntitySchema, MutationRecord, ReconciliationEngine,
    RowId, Timestamp,
};

// =============================================================================
// Constants and Fixtures
// =============================================================================

/// Fixed seed for shuffled timestamps
const BENCH_SEED: u64 = 0x5EED_0F_0FF11E;

#[derive(Debug, Clone)]
struct Contact {
    id: RowId,
    name: String,
    phone: String,
    score: i64,
}

impl Entity for Contact {
    const NAME: &'static str = "Contact";

    fn new_row(row_id: RowId) -> Self {
        Contact {
            id: row_id,
            name: String::new(),
            phone: String::new(),
            score: 0,
        }
    }

    fn row_id(&self) -> RowId {
        self.id
    }
}

fn engine() -> ReconciliationEngine<upsync::MemoryStore> {
    let schema = EntitySchema::new()
        .column("Name", |c: &mut Contact, v: String| c.name = v)
        .column("Phone", |c: &mut Contact, v: String| c.phone = v)
        .column("Score", |c: &mut Contact, v: i64| c.score = v);
    let registry = EntityRegistry::builder().register(schema).unwrap().build();
    ReconciliationEngine::in_memory(Arc::new(registry), EngineConfig::default()).unwrap()
}

fn seed_rows(engine: &ReconciliationEngine<upsync::MemoryStore>, count: usize) -> Vec<RowId> {
    (0..count)
        .map(|_| {
            let row = RowId::new();
            engine.storage().seed(Contact::new_row(row));
            row
        })
        .collect()
}

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

/// `per_row` updates for each row, timestamps shuffled, all after `base`
fn shuffled_updates(rows: &[RowId], per_row: usize, base: u64) -> Vec<MutationRecord> {
    let mut state = BENCH_SEED;
    let mut records = Vec::with_capacity(rows.len() * per_row);
    for row in rows {
        for i in 0..per_row {
            let at = base + lcg_next(&mut state) % 1_000_000;
            records.push(MutationRecord::update(
                "Contact",
                *row,
                if i % 2 == 0 { "Name" } else { "Score" },
                at as i64,
                Timestamp::from_micros(at),
            ));
        }
    }
    records
}

// =============================================================================
// Batch Throughput
// =============================================================================

fn batch_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_creates");
    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let engine = engine();
            b.iter(|| {
                let records: Vec<MutationRecord> = (0..size)
                    .map(|_| MutationRecord::create("Contact", RowId::new(), Timestamp::from_secs(1)))
                    .collect();
                black_box(engine.process(records).unwrap())
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("batch_updates");
    for rows in [1usize, 10, 100] {
        let per_row = 10;
        group.throughput(Throughput::Elements((rows * per_row) as u64));
        group.bench_with_input(BenchmarkId::new("rows", rows), &rows, |b, &rows| {
            let engine = engine();
            let ids = seed_rows(&engine, rows);
            let epoch = AtomicU64::new(0);
            b.iter(|| {
                // Each iteration moves past the previous one so writes keep applying
                let base = epoch.fetch_add(2_000_000, Ordering::Relaxed);
                black_box(engine.process(shuffled_updates(&ids, per_row, base)).unwrap())
            });
        });
    }
    group.finish();
}

// =============================================================================
// Stale Batches
// =============================================================================
// Every record loses to the ledger; measures the cost of rejection alone.

fn stale_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("stale_replay");
    for rows in [10usize, 100] {
        let engine = engine();
        let ids = seed_rows(&engine, rows);
        let batch = shuffled_updates(&ids, 4, 0);
        engine.process(batch.clone()).unwrap();

        group.throughput(Throughput::Elements(batch.len() as u64));
        group.bench_with_input(BenchmarkId::new("rows", rows), &batch, |b, batch| {
            b.iter(|| black_box(engine.process(batch.clone()).unwrap()));
        });
    }
    group.finish();
}

// =============================================================================
// Contention
// =============================================================================
// Concurrent batches on the same rows; serializable validation plus retries.

fn contention_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention_same_rows");
    for threads in [2usize, 4] {
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            let engine = Arc::new(engine());
            let ids = Arc::new(seed_rows(&engine, 8));
            let clock = Arc::new(AtomicU64::new(1));
            b.iter(|| {
                let barrier = Arc::new(Barrier::new(threads));
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let engine = Arc::clone(&engine);
                        let ids = Arc::clone(&ids);
                        let clock = Arc::clone(&clock);
                        let barrier = Arc::clone(&barrier);
                        thread::spawn(move || {
                            let records: Vec<MutationRecord> = ids
                                .iter()
                                .map(|row| {
                                    let at = clock.fetch_add(1, Ordering::Relaxed);
                                    MutationRecord::update(
                                        "Contact",
                                        *row,
                                        "Phone",
                                        at.to_string(),
                                        Timestamp::from_micros(at),
                                    )
                                })
                                .collect();
                            barrier.wait();
                            // Exhausted retries are part of what is measured
                            let _ = engine.process(records);
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = batch;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = batch_benchmarks, stale_benchmarks
);

criterion_group!(
    name = contention;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(15))
        .sample_size(10);
    targets = contention_benchmarks
);

criterion_main!(batch, contention);
