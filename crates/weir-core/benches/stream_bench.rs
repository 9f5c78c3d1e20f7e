//! Event stream benchmarks.
//!
//! Measures the hot paths of the publish/subscribe core: buffer append
//! (including head eviction) and interest-set filtering.
//!
//! Run with: cargo bench --bench stream_bench

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use weir_core::stream::{filter_events, Event, EventBuffer, SubscribeRequest, ALL_KEYS};

fn make_batch(n: u64) -> Vec<Event<u64>> {
    (0..n)
        .map(|i| {
            let topic = if i % 2 == 0 { "jobs" } else { "nodes" };
            Event::new(topic, format!("key-{i}"), i, i)
        })
        .collect()
}

fn bench_append(c: &mut Criterion) {
    c.bench_function("buffer_append", |b| {
        let buffer = EventBuffer::new(1024, Duration::from_secs(3600));
        let mut index = 0u64;
        b.iter(|| {
            index += 1;
            buffer.append(index, make_batch(4));
            black_box(buffer.len())
        });
    });
}

fn bench_append_with_eviction(c: &mut Criterion) {
    c.bench_function("buffer_append_evicting", |b| {
        // Tiny capacity so every append advances the head.
        let buffer = EventBuffer::new(1, Duration::from_secs(3600));
        let mut index = 0u64;
        b.iter(|| {
            index += 1;
            buffer.append(index, make_batch(4));
            black_box(buffer.len())
        });
    });
}

fn bench_filter_full_match(c: &mut Criterion) {
    let req = SubscribeRequest::new()
        .topic("jobs", [ALL_KEYS])
        .topic("nodes", [ALL_KEYS]);
    let events: Arc<[Event<u64>]> = make_batch(64).into();

    c.bench_function("filter_full_match", |b| {
        b.iter(|| black_box(filter_events(&req, &events)));
    });
}

fn bench_filter_partial_match(c: &mut Criterion) {
    let req = SubscribeRequest::new().topic("jobs", [ALL_KEYS]);
    let events: Arc<[Event<u64>]> = make_batch(64).into();

    c.bench_function("filter_partial_match", |b| {
        b.iter(|| black_box(filter_events(&req, &events)));
    });
}

fn bench_cursor_walk(c: &mut Criterion) {
    let buffer = EventBuffer::new(256, Duration::from_secs(3600));
    for index in 1..=256 {
        buffer.append(index, make_batch(1));
    }

    c.bench_function("cursor_walk_256", |b| {
        b.iter(|| {
            let mut item = buffer.head();
            let mut seen = 0u64;
            while let Some(next) = item.next_no_block() {
                seen += next.events().len() as u64;
                item = next;
            }
            black_box(seen)
        });
    });
}

criterion_group!(
    benches,
    bench_append,
    bench_append_with_eviction,
    bench_filter_full_match,
    bench_filter_partial_match,
    bench_cursor_walk
);
criterion_main!(benches);
