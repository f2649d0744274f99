//! Codec Performance Benchmarks
//!
//! Measures the hot path of checkpoint serialization: varint encode/decode
//! and full strata-vector pack/unpack. These run once per checkpoint during
//! indexing and once per checkpoint load during queries, so they sit under
//! every index build and every cold instant lookup.
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench -p tracehouse-core
//!
//! # Specific benchmark
//! cargo bench -p tracehouse-core --bench codec_bench varint
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tracehouse_core::varint::{self, Decoded};
use tracehouse_core::{Instant, StrataVector};

fn bench_varint(c: &mut Criterion) {
    let mut group = c.benchmark_group("varint");

    // A mix that exercises every encoded width.
    let values: Vec<u64> = (0..1000u64)
        .map(|i| (i * 0x9e37_79b9_7f4a) & varint::MAX)
        .collect();

    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("encode_1k_mixed", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(8 * values.len());
            for &v in &values {
                varint::write(black_box(v), &mut buf);
            }
            buf
        })
    });

    let mut encoded = Vec::new();
    for &v in &values {
        varint::write(v, &mut encoded);
    }

    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("decode_1k_mixed", |b| {
        b.iter(|| {
            let mut cursor = &encoded[..];
            let mut sum = 0u64;
            while let Decoded::Value { value, len } = varint::read(cursor) {
                sum = sum.wrapping_add(value);
                cursor = &cursor[len..];
            }
            black_box(sum)
        })
    });

    group.finish();
}

fn bench_strata(c: &mut Criterion) {
    let mut group = c.benchmark_group("strata");

    for count in [64usize, 1024] {
        let mut v = StrataVector::new(count);
        for i in 0..count {
            v.set(i, (i as u64 * 0x1234_5677) & varint::MAX);
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("pack", count), &v, |b, v| {
            b.iter(|| {
                let mut buf = Vec::with_capacity(v.packed_len());
                v.pack(&mut buf).unwrap();
                buf
            })
        });

        let mut packed = Vec::new();
        v.pack(&mut packed).unwrap();
        group.bench_with_input(BenchmarkId::new("unpack", count), &packed, |b, packed| {
            b.iter(|| StrataVector::unpack(black_box(packed), count).unwrap())
        });
    }

    group.finish();
}

fn bench_instant_blob(c: &mut Criterion) {
    let mut group = c.benchmark_group("instant_blob");

    let mut instant = Instant::new(1024);
    instant.time = 1 << 40;
    instant.log_offset = 1 << 30;
    instant.transfer_id = 1 << 20;
    for i in 0..1024 {
        instant.read_totals.set(i, (i as u64) << 20);
        instant.write_totals.set(i, (i as u64) << 10);
        instant.zero_totals.set(i, i as u64);
    }

    group.bench_function("pack_1024_strata", |b| {
        b.iter(|| black_box(&instant).pack().unwrap())
    });

    let blob = instant.pack().unwrap();
    group.bench_function("unpack_1024_strata", |b| {
        b.iter(|| Instant::unpack(black_box(&blob), 1024).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_varint, bench_strata, bench_instant_blob);
criterion_main!(benches);
