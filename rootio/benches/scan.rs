//! Tree writing and scanning
//!
//! Run with: cargo bench --package rootio --bench scan

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rootio::{Algorithm, File, LeafValue, Scanner, Settings, TreeConfig};

const ENTRIES: i64 = 100_000;

fn write_tree(path: &std::path::Path, settings: Settings) {
    let mut file = File::create(path).unwrap();
    let config = TreeConfig::default()
        .with_basket_entries(8_000)
        .with_settings(settings);
    let mut w = file.tree_writer("events", config).unwrap();
    w.branch("id/L").unwrap();
    w.branch("px/D").unwrap();
    w.branch("n/I").unwrap();
    w.branch("hits[n]/F").unwrap();
    for i in 0..ENTRIES {
        let n = (i % 5) as i32;
        w.fill(&[
            LeafValue::I64(i),
            LeafValue::F64(i as f64 * 0.5),
            LeafValue::I32(n),
            LeafValue::Array((0..n).map(|k| LeafValue::F32(k as f32)).collect()),
        ])
        .unwrap();
    }
    w.close().unwrap();
    drop(w);
    file.close().unwrap();
}

fn bench_write(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("write");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ENTRIES as u64));

    for (label, settings) in [("raw", Settings::NONE), ("zstd", Settings::new(Algorithm::Zstd, 3))] {
        let path = dir.path().join(format!("write-{label}.root"));
        group.bench_function(label, |b| b.iter(|| write_tree(&path, settings)));
    }

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("scan");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ENTRIES as u64));

    for (label, settings) in [("raw", Settings::NONE), ("zstd", Settings::new(Algorithm::Zstd, 3))] {
        let path = dir.path().join(format!("scan-{label}.root"));
        write_tree(&path, settings);
        let file = File::open(&path).unwrap();

        group.bench_function(format!("{label}/px"), |b| {
            b.iter(|| {
                let mut sc = Scanner::with_vars(&file, file.tree("events").unwrap(), &["px"]).unwrap();
                let mut sum = 0.0;
                while sc.next() {
                    sc.scan().unwrap();
                    sum += sc.values()[0].as_f64().unwrap_or(0.0);
                }
                black_box(sum)
            })
        });

        group.bench_function(format!("{label}/all"), |b| {
            b.iter(|| {
                let mut sc = Scanner::new(&file, file.tree("events").unwrap()).unwrap();
                let mut n = 0usize;
                while sc.next() {
                    sc.scan().unwrap();
                    n += sc.values().len();
                }
                black_box(n)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write, bench_scan);
criterion_main!(benches);
