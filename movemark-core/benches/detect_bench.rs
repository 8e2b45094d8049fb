//! Criterion benchmarks for move detection.
//!
//! Benchmarks:
//! 1. Detection over growing series lengths (default threshold, top 5)
//! 2. Detection with no threshold, which ranks every run

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use movemark_core::data::PricePoint;
use movemark_core::moves::{detect_moves, DetectParams};

fn make_points(n: usize) -> Vec<PricePoint> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2000, 1, 3).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0 + (i as f64 * 0.013).cos() * 25.0;
            PricePoint::from_close(base_date + chrono::Duration::days(i as i64), close)
        })
        .collect()
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_moves");

    for &len in &[252usize, 1260, 6300] {
        let points = make_points(len);
        group.bench_with_input(BenchmarkId::new("default_params", len), &points, |b, pts| {
            b.iter(|| detect_moves(black_box(pts), &DetectParams::default()))
        });
    }

    let points = make_points(6300);
    let all = DetectParams {
        min_pct: 0.0,
        top_n: None,
    };
    group.bench_function("all_runs_6300", |b| {
        b.iter(|| detect_moves(black_box(&points), &all))
    });

    group.finish();
}

criterion_group!(benches, bench_detect);
criterion_main!(benches);
