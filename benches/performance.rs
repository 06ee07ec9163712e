use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use idempotent_api::idempotency::{
    CachedResponse, Fingerprint, IdempotencyStore, InMemoryCache, KeyValueCache,
};
use idempotent_api::observability::LatencyTimer;

fn sample_record(body_len: usize) -> CachedResponse {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("x-trace", HeaderValue::from_static("bench"));
    CachedResponse::new(StatusCode::CREATED, &headers, Bytes::from(vec![b'x'; body_len]))
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [64usize, 4 * 1024, 256 * 1024].iter() {
        let body = vec![b'a'; *size];
        group.bench_with_input(BenchmarkId::new("derive", size), &body, |b, body| {
            b.iter(|| {
                black_box(Fingerprint::derive(
                    black_box(&Method::POST),
                    black_box("/examples/"),
                    black_box(body),
                    black_box("abc123"),
                ))
            });
        });
    }

    group.finish();
}

fn benchmark_record_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_response");

    for size in [128usize, 64 * 1024].iter() {
        let record = sample_record(*size);
        let encoded = record.encode().unwrap();

        group.bench_with_input(BenchmarkId::new("encode", size), &record, |b, record| {
            b.iter(|| black_box(record.encode().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| black_box(CachedResponse::decode(encoded).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_in_memory_store(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let cache = Arc::new(InMemoryCache::new());
    let store = IdempotencyStore::new(cache.clone(), "request");
    let fingerprint = Fingerprint::derive(&Method::POST, "/examples/", b"{}", "bench");
    let record = sample_record(512);

    let (store, cache, fingerprint, record) = (&store, &cache, &fingerprint, &record);

    let mut group = c.benchmark_group("in_memory_store");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("put", |b| {
        b.to_async(&runtime).iter(|| async move {
            store
                .put(fingerprint, record, Duration::from_secs(120))
                .await
                .unwrap()
        });
    });

    group.bench_function("get_hit", |b| {
        b.to_async(&runtime)
            .iter(|| async move { black_box(store.get(fingerprint).await.unwrap()) });
    });

    group.bench_function("set_nx_contended", |b| {
        b.to_async(&runtime).iter(|| async move {
            black_box(
                cache
                    .set_nx("request:bench:lock", b"processing".to_vec(), Duration::from_secs(30))
                    .await
                    .unwrap(),
            )
        });
    });

    group.finish();
}

fn benchmark_latency_timer(c: &mut Criterion) {
    c.bench_function("latency_timer", |b| {
        b.iter(|| {
            let timer = LatencyTimer::new();
            black_box(timer.elapsed_ms())
        });
    });
}

criterion_group!(
    benches,
    benchmark_fingerprint,
    benchmark_record_codec,
    benchmark_in_memory_store,
    benchmark_latency_timer,
);
criterion_main!(benches);
