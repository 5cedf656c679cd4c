use criterion::*;
use std::hint::black_box;

use sim_runtime::{ArenaAllocator, TlsfAllocator};

const ARENA_BYTES: usize = 8 * 1024 * 1024;

fn alloc_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc");

    group.bench_function("arena_bump_4096x64", |b| {
        b.iter_batched(
            || ArenaAllocator::with_capacity(ARENA_BYTES),
            |mut arena| {
                for _ in 0..4096 {
                    black_box(arena.allocate(64));
                }
                arena.reset();
                black_box(arena);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("tlsf_alloc_free_4096x64", |b| {
        b.iter_batched(
            || TlsfAllocator::with_capacity(ARENA_BYTES),
            |mut allocator| {
                let mut live = Vec::with_capacity(4096);
                for _ in 0..4096 {
                    live.push(allocator.allocate(64).expect("arena is large enough"));
                }
                for ptr in live {
                    unsafe { allocator.deallocate(ptr) };
                }
                black_box(allocator);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("tlsf_mixed_sizes", |b| {
        b.iter_batched(
            || TlsfAllocator::with_capacity(ARENA_BYTES),
            |mut allocator| {
                let mut live = Vec::new();
                for i in 0..2048usize {
                    let size = 32 << (i % 6);
                    if let Some(ptr) = allocator.allocate(size) {
                        live.push(ptr);
                    }
                    if i % 3 == 0 {
                        if let Some(ptr) = live.pop() {
                            unsafe { allocator.deallocate(ptr) };
                        }
                    }
                }
                for ptr in live {
                    unsafe { allocator.deallocate(ptr) };
                }
                black_box(allocator);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, alloc_benchmark);
criterion_main!(benches);
