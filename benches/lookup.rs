//! Store lookup benchmarks
//!
//! Run with: cargo bench --bench lookup

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::path::Path;
use std::time::Duration;
use molvault::{standard_registry, BuildOptions, MolStore, SmilesCodec, StoreBuilder};

const SCAFFOLDS: &[&str] = &["c1ccccc1", "c1ccncc1", "C1CCCCC1", "c1ccc2ccccc2c1", "CC(=O)O"];

fn synthetic_input(rows: usize) -> String {
    (0..rows)
        .map(|i| {
            format!(
                "{}{} mol{:07}\n",
                "C".repeat(i % 7),
                SCAFFOLDS[i % SCAFFOLDS.len()],
                i
            )
        })
        .collect()
}

fn build_store(rows: usize, dir: &Path) -> MolStore {
    let path = dir.join(format!("bench-{}", rows));
    StoreBuilder::new(
        BuildOptions::default().with_descriptors("Basic2D"),
        SmilesCodec,
        standard_registry().unwrap(),
    )
    .build_from_reader(synthetic_input(rows).as_bytes(), &path)
    .unwrap();
    MolStore::open(&path).unwrap()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_build");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for rows in [1_000, 10_000] {
        let input = synthetic_input(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| {
                let dir = tempfile::tempdir().unwrap();
                let report = StoreBuilder::new(BuildOptions::default(), SmilesCodec, standard_registry().unwrap())
                    .build_from_reader(input.as_bytes(), dir.path().join("store"))
                    .unwrap();
                black_box(report.rows)
            })
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("store_lookup");

    for rows in [10_000, 100_000] {
        let store = build_store(rows, dir.path());
        let mut rng = StdRng::seed_from_u64(rows as u64);
        let names: Vec<String> = (0..1024)
            .map(|_| format!("mol{:07}", rng.gen_range(0..rows)))
            .collect();

        group.bench_with_input(BenchmarkId::new("name", rows), &names, |b, names| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % names.len();
                black_box(store.lookup_name(&names[i]).unwrap())
            })
        });

        group.bench_with_input(BenchmarkId::new("name_then_row", rows), &names, |b, names| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % names.len();
                black_box(store.descriptors_for_name(&names[i]).unwrap()[0])
            })
        });

        let key = molvault_chem::structural_key(&store.entity_at(0, &SmilesCodec).unwrap());
        group.bench_function(BenchmarkId::new("structural_key", rows), |b| {
            b.iter(|| black_box(store.lookup_structural_key(&key).unwrap().len()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_lookup);
criterion_main!(benches);
