// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::semicolon_if_nothing_returned)] // Benchmark code formatting

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use sockwatch::{DeadlineList, DeferredQueue, NativeSocket, SocketRegistry, Tracked, TxnId};
use std::time::Duration;

#[derive(Clone, Copy)]
struct Probe(u64);

impl Tracked for Probe {
    fn txn_id(&self) -> TxnId {
        TxnId::from_raw(self.0)
    }
}

// ============================================================================
// DeferredQueue Benchmarks
// ============================================================================

/// Benchmark: enqueue + pop on an otherwise empty ring
fn bench_queue_enqueue_pop(c: &mut Criterion) {
    c.bench_function("queue_enqueue_pop", |b| {
        let mut q = DeferredQueue::new(1024).unwrap();
        let mut id = 0u64;
        b.iter(|| {
            id += 1;
            q.enqueue(Probe(id)).unwrap();
            black_box(q.pop());
        })
    });
}

/// Benchmark: requeue of an entry already waiting behind 255 others
fn bench_queue_requeue_pending(c: &mut Criterion) {
    c.bench_function("queue_requeue_pending_256", |b| {
        let mut q = DeferredQueue::new(1024).unwrap();
        for id in 0..256 {
            q.enqueue(Probe(id)).unwrap();
        }
        b.iter(|| black_box(q.requeue(Probe(255)).unwrap()))
    });
}

/// Benchmark: tombstoning then draining a half-cancelled ring
fn bench_queue_remove_drain(c: &mut Criterion) {
    c.bench_function("queue_remove_drain_128", |b| {
        b.iter_batched(
            || {
                let mut q = DeferredQueue::new(256).unwrap();
                for id in 0..128 {
                    q.enqueue(Probe(id)).unwrap();
                }
                q
            },
            |mut q| {
                for id in (0..128).step_by(2) {
                    q.remove(TxnId::from_raw(id));
                }
                while let Some(p) = q.pop() {
                    black_box(p);
                }
            },
            BatchSize::SmallInput,
        )
    });
}

// ============================================================================
// SocketRegistry / DeadlineList Benchmarks
// ============================================================================

/// Benchmark: register + deregister at the front of a 64-entry registry
fn bench_registry_churn(c: &mut Criterion) {
    c.bench_function("registry_churn_64", |b| {
        let mut reg = SocketRegistry::new(2);
        for id in 1..=64u64 {
            reg.register(Probe(id), NativeSocket::from_raw(1000 + id as _))
                .unwrap();
        }
        let socket = NativeSocket::from_raw(999 as _);
        b.iter(|| {
            reg.register(Probe(0), socket).unwrap();
            black_box(reg.deregister(&Probe(0), socket));
        })
    });
}

/// Benchmark: schedule 256 deadlines and expire them in one advance
fn bench_deadline_batch(c: &mut Criterion) {
    c.bench_function("deadline_add_advance_256", |b| {
        b.iter(|| {
            let mut list = DeadlineList::new();
            for id in 0..256u64 {
                list.add(Probe(id), Duration::from_millis(id % 50));
            }
            black_box(list.advance(Duration::from_millis(50)))
        })
    });
}

criterion_group!(
    benches,
    bench_queue_enqueue_pop,
    bench_queue_requeue_pending,
    bench_queue_remove_drain,
    bench_registry_churn,
    bench_deadline_batch
);
criterion_main!(benches);
