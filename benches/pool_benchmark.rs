//! Hot-path benchmarks for pools, the LRU cache and resource tracking
//!
//! Run with: `cargo bench`

#![allow(dead_code)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lifecore::{
    CacheConfiguration, FactoryPool, LruCache, ObjectPool, PoolConfiguration, Poolable,
    ResourceDescriptor, ResourceKind, ResourceTracker, SharedPool, TrackerConfiguration,
};

#[derive(Default)]
struct Vertex {
    position: [f32; 3],
    color: u32,
}

impl Poolable for Vertex {
    type Args = ();

    fn reset(&mut self) {
        self.position = [0.0; 3];
        self.color = 0;
    }
}

fn bench_object_pool(c: &mut Criterion) {
    let mut pool = ObjectPool::<Vertex>::new(PoolConfiguration::new().with_preallocate(100));

    c.bench_function("object_pool_get_release", |b| {
        b.iter(|| {
            let mut vertex = pool.get(());
            vertex.color = black_box(0xff00ff);
            pool.release(vertex);
        });
    });
}

fn bench_factory_pool_checkout(c: &mut Criterion) {
    let pool = SharedPool::new(FactoryPool::new(
        || Vec::<u8>::with_capacity(256),
        |buf: &mut Vec<u8>| buf.clear(),
        PoolConfiguration::new().with_preallocate(16),
    ));

    c.bench_function("factory_pool_checkout", |b| {
        b.iter(|| {
            let mut buf = pool.checkout();
            buf.extend_from_slice(black_box(b"frame"));
        });
    });
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_cache");

    for count in [100usize, 1_000] {
        let keys: Vec<String> = (0..count).map(|i| format!("doc-{i}.json")).collect();

        group.bench_with_input(BenchmarkId::new("insert", count), &keys, |b, keys| {
            b.iter(|| {
                let mut cache: LruCache<String> =
                    LruCache::new(CacheConfiguration::new().with_max_count(count / 2));
                for key in keys {
                    cache.cache(key.as_str(), "{}".to_string(), "doc");
                }
                cache.size()
            });
        });

        let mut cache: LruCache<String> = LruCache::new(CacheConfiguration::new());
        for key in &keys {
            cache.cache(key.as_str(), "{}".to_string(), "doc");
        }
        group.bench_with_input(BenchmarkId::new("get", count), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    black_box(cache.get(key));
                }
            });
        });
    }

    group.finish();
}

fn bench_tracker(c: &mut Criterion) {
    let tracker = ResourceTracker::new(TrackerConfiguration::default());

    c.bench_function("tracker_track_cleanup", |b| {
        b.iter(|| {
            let id = tracker.track_resource(ResourceDescriptor::new(ResourceKind::Listener, || {}));
            tracker.cleanup_resource(black_box(id))
        });
    });
}

criterion_group!(
    benches,
    bench_object_pool,
    bench_factory_pool_checkout,
    bench_cache,
    bench_tracker
);
criterion_main!(benches);
