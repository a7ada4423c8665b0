use std::collections::VecDeque;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use conq::CircularQueue;

const OPS_PER_ITER: u64 = 10_000;

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

fn make_u64_keys(count: usize, seed: u64) -> Vec<u64> {
    let mut rng = XorShift64::new(seed);
    (0..count).map(|_| rng.next_u64()).collect()
}

/// Steady-state FIFO cycling at fixed occupancy; no growth on this path.
fn bench_push_pop_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("circular_queue");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("push_pop_cycle_cap8", |b| {
        let mut queue = CircularQueue::with_capacity(8);
        for i in 0..7u64 {
            queue.push_back(i);
        }
        b.iter(|| {
            for i in 0..OPS_PER_ITER {
                queue.push_back(black_box(i));
                black_box(queue.pop_front());
            }
        })
    });

    group.bench_function("push_pop_cycle_cap64", |b| {
        let mut queue = CircularQueue::with_capacity(64);
        for i in 0..63u64 {
            queue.push_back(i);
        }
        b.iter(|| {
            for i in 0..OPS_PER_ITER {
                queue.push_back(black_box(i));
                black_box(queue.pop_front());
            }
        })
    });

    group.bench_function("push_pop_cycle_vecdeque_cap64", |b| {
        let mut queue: VecDeque<u64> = VecDeque::with_capacity(64);
        for i in 0..63u64 {
            queue.push_back(i);
        }
        b.iter(|| {
            for i in 0..OPS_PER_ITER {
                queue.push_back(black_box(i));
                black_box(queue.pop_front());
            }
        })
    });

    group.finish();
}

/// Fill from empty then drain, including the doubling growth path.
fn bench_fill_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("circular_queue");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("fill_drain_grow_from_empty", |b| {
        b.iter(|| {
            let mut queue = CircularQueue::new();
            for i in 0..OPS_PER_ITER {
                queue.push_back(black_box(i));
            }
            while queue.pop_front().is_some() {}
            queue
        })
    });

    group.bench_function("fill_drain_prereserved", |b| {
        b.iter(|| {
            let mut queue = CircularQueue::with_capacity(OPS_PER_ITER as usize);
            for i in 0..OPS_PER_ITER {
                queue.push_back(black_box(i));
            }
            while queue.pop_front().is_some() {}
            queue
        })
    });

    group.bench_function("fill_drain_vecdeque_grow", |b| {
        b.iter(|| {
            let mut queue: VecDeque<u64> = VecDeque::new();
            for i in 0..OPS_PER_ITER {
                queue.push_back(black_box(i));
            }
            while queue.pop_front().is_some() {}
            queue
        })
    });

    group.finish();
}

/// Random `get` over a wrapped queue exercising the mask-based index path.
fn bench_random_access(c: &mut Criterion) {
    let indices = make_u64_keys(OPS_PER_ITER as usize, 0xdead_beef_cafe_babe);

    let mut group = c.benchmark_group("circular_queue");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("random_get_cap64_wrapped", |b| {
        let mut queue = CircularQueue::with_capacity(64);
        for i in 0..64u64 {
            queue.push_back(i);
        }
        // Rotate halfway so the live window wraps the ring edge.
        for i in 0..32u64 {
            queue.pop_front();
            queue.push_back(i);
        }
        b.iter(|| {
            let mut sum = 0u64;
            for &idx in &indices {
                if let Some(&val) = queue.get((idx % 64) as usize) {
                    sum = sum.wrapping_add(val);
                }
            }
            black_box(sum)
        })
    });

    group.bench_function("random_get_vecdeque_cap64", |b| {
        let mut queue: VecDeque<u64> = VecDeque::with_capacity(64);
        for i in 0..64u64 {
            queue.push_back(i);
        }
        b.iter(|| {
            let mut sum = 0u64;
            for &idx in &indices {
                if let Some(&val) = queue.get((idx % 64) as usize) {
                    sum = sum.wrapping_add(val);
                }
            }
            black_box(sum)
        })
    });

    group.finish();
}

/// Front-to-back iteration over a wrapped window (two slice runs).
fn bench_iter(c: &mut Criterion) {
    let mut group = c.benchmark_group("circular_queue");
    group.throughput(Throughput::Elements(1024));

    group.bench_function("iter_wrapped_1024", |b| {
        let mut queue = CircularQueue::with_capacity(1024);
        for i in 0..1024u64 {
            queue.push_back(i);
        }
        for i in 0..512u64 {
            queue.pop_front();
            queue.push_back(i);
        }
        b.iter(|| {
            let mut sum = 0u64;
            for &val in queue.iter() {
                sum = sum.wrapping_add(val);
            }
            black_box(sum)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_push_pop_cycle,
    bench_fill_drain,
    bench_random_access,
    bench_iter,
);

criterion_main!(benches);
