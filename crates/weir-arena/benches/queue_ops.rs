//! Benchmark: slot/queue churn on the request arena.
//!
//! Measures the O(1) enqueue/dequeue/detach paths that sit on the hot
//! dispatch loop: allocate-park-release cycles and mid-queue detach, the
//! operation the release scans lean on.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weir_arena::RequestPool;
use weir_types::{ChannelId, QueueId, SlotTag, WayId};

const SLOTS: u16 = 512;

fn nand_queue() -> QueueId {
    QueueId::Nand {
        channel: ChannelId(0),
        way: WayId(0),
    }
}

fn bench_alloc_release_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_release_cycle");

    group.bench_function("single_slot", |b| {
        let mut pool = RequestPool::new(SLOTS, 8, 8);
        b.iter(|| {
            let tag = pool.try_allocate().unwrap();
            pool.release(black_box(tag));
        });
    });

    group.bench_function("park_then_release", |b| {
        let mut pool = RequestPool::new(SLOTS, 8, 8);
        b.iter(|| {
            let tag = pool.try_allocate().unwrap();
            pool.push(nand_queue(), tag);
            pool.pop_head(nand_queue()).unwrap();
            pool.release(black_box(tag));
        });
    });

    group.finish();
}

fn bench_detach_middle(c: &mut Criterion) {
    c.bench_function("detach_middle_of_64", |b| {
        let mut pool = RequestPool::new(SLOTS, 8, 8);
        let tags: Vec<SlotTag> = (0..64).map(|_| pool.try_allocate().unwrap()).collect();
        for &tag in &tags {
            pool.push(QueueId::HostDma, tag);
        }
        let victim = tags[32];
        b.iter(|| {
            pool.detach(black_box(victim)).unwrap();
            pool.push(QueueId::HostDma, victim);
        });
    });
}

fn bench_full_churn(c: &mut Criterion) {
    c.bench_function("drain_and_refill_128", |b| {
        let mut pool = RequestPool::new(SLOTS, 8, 8);
        b.iter(|| {
            let mut tags = Vec::with_capacity(128);
            for _ in 0..128 {
                let tag = pool.try_allocate().unwrap();
                pool.push(QueueId::Slice, tag);
                tags.push(tag);
            }
            while let Some(tag) = pool.pop_head(QueueId::Slice) {
                pool.release(tag);
            }
            black_box(tags.len())
        });
    });
}

criterion_group!(
    benches,
    bench_alloc_release_cycle,
    bench_detach_middle,
    bench_full_churn,
);
criterion_main!(benches);
