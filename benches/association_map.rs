//! Association map benchmarks
//!
//! Linear lookup over the boundary form versus building a local index first,
//! plus envelope tree release for both allocation strategies.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crossabi::core::{LayoutAlloc, Reclaim, VecAlloc};
use crossabi::envelope::release_boxed;
use crossabi::model::GetUserRequest;
use crossabi::producer::owned::owned_get_user_pages;
use crossabi::producer::raw::raw_get_user_pages;
use crossabi::{FfiMap, FfiString, OrderedMap};

fn generate_map(n: usize) -> FfiMap<FfiString, FfiString> {
    FfiMap::from_pairs((0..n).map(|i| {
        (
            FfiString::from_string(format!("key{}", i)),
            FfiString::from_string(format!("value{}", i)),
        )
    }))
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for size in [4, 16, 64, 256].iter() {
        let map = generate_map(*size);
        let last = format!("key{}", size - 1);

        group.bench_with_input(BenchmarkId::new("linear", size), size, |b, _| {
            b.iter(|| unsafe { black_box(map.get(last.as_str()).is_some()) });
        });

        // Index built once, then probed
        group.bench_with_input(BenchmarkId::new("indexed", size), size, |b, _| {
            let index = unsafe { map.index() };
            let key = FfiString::from_bytes(last.as_bytes());
            b.iter(|| black_box(index.get(&key).is_some()));
            unsafe { key.reclaim::<VecAlloc>() };
        });

        unsafe { map.reclaim::<VecAlloc>() };
    }

    group.finish();
}

fn bench_ordered_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordered_map");

    for size in [16, 256].iter() {
        let map: OrderedMap<String, String> = (0..*size)
            .map(|i| (format!("key{}", i % (size / 2)), format!("value{}", i)))
            .collect();

        group.bench_with_input(BenchmarkId::new("into_hash_map", size), size, |b, _| {
            b.iter(|| black_box(map.clone().into_hash_map().len()));
        });
    }

    group.finish();
}

fn bench_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("release");
    let local = GetUserRequest::new(1, "bench", false).to_local();

    for pages in [1u32, 16, 64].iter() {
        group.bench_with_input(BenchmarkId::new("owned", pages), pages, |b, &pages| {
            b.iter(|| unsafe {
                let root = owned_get_user_pages(*local, false, pages);
                black_box(release_boxed::<VecAlloc>(root))
            });
        });

        group.bench_with_input(BenchmarkId::new("raw", pages), pages, |b, &pages| {
            b.iter(|| unsafe {
                let root = raw_get_user_pages(local.as_ptr(), false, pages);
                black_box(release_boxed::<LayoutAlloc>(root))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lookup, bench_ordered_map, bench_release);
criterion_main!(benches);
