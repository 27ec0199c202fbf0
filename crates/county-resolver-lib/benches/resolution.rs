//! Performance benchmarks for county-resolver-lib
//!
//! Run with: cargo bench --package county-resolver-lib

use county_resolver_lib::loader;
use county_resolver_lib::{
    CountyBoundary, Encoding, GeometryStore, NormalizedDataset, OfflineAuthority,
    ResolutionContext, ResolutionState, ResolverConfig, SpatialIndex,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::{LineString, MultiPolygon, Polygon};

/// Grid of counties shaped like slightly jagged cells, `vertices_per_side`
/// positions along each edge so containment tests do real work.
fn generate_counties(cols: usize, rows: usize, vertices_per_side: usize) -> NormalizedDataset {
    const CELL: f64 = 0.25;
    let mut records = Vec::with_capacity(cols * rows);

    for row in 0..rows {
        for col in 0..cols {
            let x0 = -124.0 + col as f64 * CELL;
            let y0 = 25.0 + row as f64 * CELL;
            let mut ring = Vec::with_capacity(vertices_per_side * 4 + 1);

            for i in 0..vertices_per_side {
                let t = i as f64 / vertices_per_side as f64 * CELL;
                ring.push((x0 + t, y0));
            }
            for i in 0..vertices_per_side {
                let t = i as f64 / vertices_per_side as f64 * CELL;
                ring.push((x0 + CELL, y0 + t));
            }
            for i in 0..vertices_per_side {
                let t = i as f64 / vertices_per_side as f64 * CELL;
                ring.push((x0 + CELL - t, y0 + CELL));
            }
            for i in 0..vertices_per_side {
                let t = i as f64 / vertices_per_side as f64 * CELL;
                ring.push((x0, y0 + CELL - t));
            }
            ring.push((x0, y0));

            let n = row * cols + col;
            records.push(CountyBoundary {
                state_code: format!("{:02}", n / 1000 + 1),
                county_code: format!("{:03}", n % 1000),
                name: format!("County {n}"),
                boundary: MultiPolygon::new(vec![Polygon::new(LineString::from(ring), vec![])]),
            });
        }
    }

    NormalizedDataset { records }
}

/// Deterministic query points spread over (and slightly beyond) the grid
fn generate_points(count: usize, cols: usize, rows: usize) -> Vec<(f64, f64)> {
    (0..count)
        .map(|i| {
            let t = i as f64 / count as f64;
            let lat = 24.9 + (t * 37.0).fract() * (rows as f64 * 0.25 + 0.2);
            let lon = -124.1 + (t * 53.0).fract() * (cols as f64 * 0.25 + 0.2);
            (lat, lon)
        })
        .collect()
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate");

    // ~3200 counties, comparable to the US county count
    let state = ResolutionState::from_dataset(generate_counties(80, 40, 16), &ResolverConfig::default());
    let points = generate_points(10_000, 80, 40);

    group.bench_function("single_point_3200", |b| {
        b.iter(|| state.locate(30.1, -110.3));
    });

    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("sequential_10k", |b| {
        b.iter(|| {
            points
                .iter()
                .map(|&(lat, lon)| state.locate(lat, lon))
                .filter(|r| matches!(r, Ok(Some(_))))
                .count()
        });
    });
    group.bench_function("parallel_10k", |b| {
        b.iter(|| state.locate_many(&points));
    });

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    let config = ResolverConfig {
        use_remote: false,
        ..Default::default()
    };
    let state = ResolutionState::from_dataset(generate_counties(80, 40, 16), &config);
    let ctx = ResolutionContext::with_state(config, OfflineAuthority, state);
    let runtime = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("bundled_hit", |b| {
        b.to_async(&runtime).iter(|| ctx.resolve(30.1, -110.3));
    });
    group.bench_function("degraded_miss", |b| {
        b.to_async(&runtime).iter(|| ctx.resolve(0.0, 0.0));
    });

    group.finish();
}

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");
    group.sample_size(20);

    for (cols, rows) in [(40, 20), (80, 40)] {
        let dataset = generate_counties(cols, rows, 16);
        let count = cols * rows;

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("store_and_index", count), &dataset, |b, dataset| {
            b.iter(|| {
                let store = GeometryStore::build(dataset.clone()).unwrap();
                SpatialIndex::build(&store)
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.sample_size(20);

    let dataset = generate_counties(80, 40, 16);
    for encoding in [Encoding::Columnar, Encoding::GeoJson] {
        let mut bytes = Vec::new();
        loader::write(&dataset, encoding, &mut bytes).unwrap();

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("read", format!("{encoding:?}")),
            &bytes,
            |b, bytes| {
                b.iter(|| loader::read(encoding, bytes.as_slice()).unwrap());
            },
        );
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_locate,
    bench_resolve,
    bench_construction,
    bench_decode,
);

criterion_main!(benches);
