//! Benchmarks for sectorkv store operations

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use sectorkv::{MemFlash, Store, StoreConfig};

fn mounted(cache: usize) -> Store<MemFlash> {
    let config = StoreConfig::builder()
        .sector_count(8)
        .lookup_cache_size(cache)
        .build();
    Store::mount(MemFlash::nor(8 * 4096), config).unwrap()
}

fn populated(cache: usize, keys: u32) -> Store<MemFlash> {
    let store = mounted(cache);
    for key in 0..keys {
        store.write(key, &[key as u8; 32]).unwrap();
    }
    store
}

fn write_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    group.bench_function("inline_8b", |b| {
        b.iter_batched(
            || mounted(128),
            |store| {
                for key in 0..64u32 {
                    store.write(key, black_box(&key.to_le_bytes())).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("out_of_record_128b", |b| {
        let value = [0xA5u8; 128];
        b.iter_batched(
            || mounted(128),
            |store| {
                for key in 0..64u32 {
                    store.write(key, black_box(&value)).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("overwrite_with_gc", |b| {
        let store = mounted(128);
        let mut round = 0u8;
        b.iter(|| {
            round = round.wrapping_add(1);
            for key in 0..16u32 {
                store.write(key, &[round; 200]).unwrap();
            }
        })
    });

    group.finish();
}

fn read_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for (name, cache) in [("cached", 128usize), ("uncached", 0)] {
        let store = populated(cache, 200);
        group.bench_function(name, |b| {
            let mut buf = [0u8; 32];
            let mut key = 0u32;
            b.iter(|| {
                key = (key + 37) % 200;
                store.read(black_box(key), &mut buf).unwrap()
            })
        });
    }

    let store = populated(128, 200);
    group.bench_function("miss", |b| {
        let mut buf = [0u8; 32];
        b.iter(|| store.read(black_box(10_000), &mut buf).is_err())
    });

    group.finish();
}

criterion_group!(benches, write_benchmarks, read_benchmarks);
criterion_main!(benches);
