//! Benchmarks for the full reconciliation driver, across scenarios analogous
//! to the ones that used to exercise a standalone diff algorithm: identical
//! trees (no-op re-run), all-new trees (first sync), partial modification,
//! and a mix of renames, modifications, and deletions under mirror mode.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use driftsync::config::{Config, HashMode, Mode};
use driftsync::driver;
use driftsync::log::{ConsoleSink, Sink};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn sink() -> Arc<dyn Sink> {
    Arc::new(ConsoleSink::new(false))
}

fn config(src: &Path, dst: &Path, mirror: bool) -> Config {
    Config {
        mode: Mode::Dir,
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        ignore: vec![],
        mirror,
        dry_run: false,
        verbose: false,
        hash_mode: HashMode::Strong,
        max_copy_workers: 4,
        threads: None,
    }
}

fn populate(dir: &Path, file_count: usize, size: usize) {
    for i in 0..file_count {
        let data = vec![(i % 256) as u8; size];
        fs::write(dir.join(format!("file_{:05}.txt", i)), &data).unwrap();
    }
}

/// No-op re-run: destination already matches source exactly.
fn bench_reconcile_identical(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_identical");

    let file_counts = vec![("100_files", 100), ("1000_files", 1000)];

    for (name, count) in file_counts {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        populate(src.path(), count, 1024);
        driver::run(&config(src.path(), dst.path(), false), sink());

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &count, |b, _| {
            b.iter(|| {
                let summary = driver::run(black_box(&config(src.path(), dst.path(), false)), sink());
                black_box(summary);
            });
        });
    }

    group.finish();
}

/// First sync into an empty destination: every file is a fresh copy.
fn bench_reconcile_all_new(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_all_new");

    let file_counts = vec![("100_files", 100), ("1000_files", 1000)];

    for (name, count) in file_counts {
        let src = TempDir::new().unwrap();
        populate(src.path(), count, 1024);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &count, |b, _| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dst| {
                    let summary = driver::run(black_box(&config(src.path(), dst.path(), false)), sink());
                    black_box(summary);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// A fraction of files changed content since the last sync.
fn bench_reconcile_partial_modification(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_partial_modification");

    let configs = vec![
        ("1000_files_10pct", 1000, 10),
        ("1000_files_50pct", 1000, 50),
    ];

    for (name, count, percent) in configs {
        let modify_count = (count * percent) / 100;
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &count, |b, _| {
            b.iter_batched(
                || {
                    let src = TempDir::new().unwrap();
                    let dst = TempDir::new().unwrap();
                    populate(src.path(), count, 1024);
                    driver::run(&config(src.path(), dst.path(), false), sink());
                    for i in 0..modify_count {
                        fs::write(src.path().join(format!("file_{:05}.txt", i)), vec![0xAAu8; 2048]).unwrap();
                    }
                    (src, dst)
                },
                |(src, dst)| {
                    let summary = driver::run(black_box(&config(src.path(), dst.path(), false)), sink());
                    black_box(summary);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// A fraction of source files renamed in place; move detection should find
/// each via the destination fingerprint index rather than recopying.
fn bench_reconcile_renames(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_renames");

    let configs = vec![("1000_files_10pct", 1000, 10), ("1000_files_50pct", 1000, 50)];

    for (name, count, percent) in configs {
        let rename_count = (count * percent) / 100;
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &count, |b, _| {
            b.iter_batched(
                || {
                    let src = TempDir::new().unwrap();
                    let dst = TempDir::new().unwrap();
                    populate(src.path(), count, 1024);
                    driver::run(&config(src.path(), dst.path(), false), sink());
                    for i in 0..rename_count {
                        fs::rename(
                            src.path().join(format!("file_{:05}.txt", i)),
                            src.path().join(format!("renamed_{:05}.txt", i)),
                        )
                        .unwrap();
                    }
                    (src, dst)
                },
                |(src, dst)| {
                    let summary = driver::run(black_box(&config(src.path(), dst.path(), false)), sink());
                    black_box(summary);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// Mixed workload under mirror mode: a quarter unchanged, a quarter
/// modified, a quarter renamed, a quarter deleted from source.
fn bench_reconcile_mixed_mirror(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_mixed_mirror");

    let file_counts = vec![("1000_files", 1000)];

    for (name, count) in file_counts {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &count, |b, _| {
            b.iter_batched(
                || {
                    let src = TempDir::new().unwrap();
                    let dst = TempDir::new().unwrap();
                    populate(src.path(), count, 1024);
                    driver::run(&config(src.path(), dst.path(), true), sink());

                    let quarter = count / 4;
                    for i in quarter..quarter * 2 {
                        fs::write(src.path().join(format!("file_{:05}.txt", i)), vec![0xBBu8; 2048]).unwrap();
                    }
                    for i in quarter * 2..quarter * 3 {
                        fs::rename(
                            src.path().join(format!("file_{:05}.txt", i)),
                            src.path().join(format!("renamed_{:05}.txt", i)),
                        )
                        .unwrap();
                    }
                    for i in quarter * 3..quarter * 4 {
                        fs::remove_file(src.path().join(format!("file_{:05}.txt", i))).unwrap();
                    }
                    (src, dst)
                },
                |(src, dst)| {
                    let summary = driver::run(black_box(&config(src.path(), dst.path(), true)), sink());
                    black_box(summary);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reconcile_identical,
    bench_reconcile_all_new,
    bench_reconcile_partial_modification,
    bench_reconcile_renames,
    bench_reconcile_mixed_mirror
);
criterion_main!(benches);
