//! Block compression throughput per algorithm
//!
//! Run with: cargo bench --package rootio --bench compression

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::Rng;
use rootio::rcompress::{compress, decompress};
use rootio::{Algorithm, Settings};

/// Slowly varying doubles, the usual content of a basket
fn basket_payload(n: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut x = 0.0f64;
    let mut out = Vec::with_capacity(n * 8);
    for _ in 0..n {
        x += rng.gen_range(-0.5..0.5);
        out.extend_from_slice(&((x * 100.0).round() / 100.0).to_be_bytes());
    }
    out
}

const ALGORITHMS: [(Algorithm, u8); 4] = [
    (Algorithm::Zlib, 1),
    (Algorithm::Lz4, 4),
    (Algorithm::Lzma, 1),
    (Algorithm::Zstd, 5),
];

fn bench_compress(c: &mut Criterion) {
    let src = basket_payload(32 * 1024);
    let mut group = c.benchmark_group("compress");
    group.throughput(Throughput::Bytes(src.len() as u64));

    for (algorithm, level) in ALGORITHMS {
        let settings = Settings::new(algorithm, level);
        group.bench_function(format!("{algorithm:?}"), |b| {
            b.iter(|| black_box(compress(settings, black_box(&src)).unwrap().len()))
        });
    }

    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let src = basket_payload(32 * 1024);
    let mut group = c.benchmark_group("decompress");
    group.throughput(Throughput::Bytes(src.len() as u64));

    for (algorithm, level) in ALGORITHMS {
        let stored = compress(Settings::new(algorithm, level), &src).unwrap().into_owned();
        group.bench_function(format!("{algorithm:?}"), |b| {
            b.iter(|| black_box(decompress(black_box(&stored), src.len()).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress);
criterion_main!(benches);
