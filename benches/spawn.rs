use criterion::*;
use std::hint::black_box;

mod common;
use common::*;

use sim_runtime::Registry;

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("create_with_components_10k", |b| {
        b.iter_batched(
            Registry::new,
            |mut registry| {
                for i in 0..AGENTS_SMALL {
                    let entity = registry.create();
                    registry.add(
                        entity,
                        Position {
                            x: i as f32,
                            y: 0.0,
                        },
                    );
                    registry.add(entity, Velocity { x: 1.0, y: 1.0 });
                }
                black_box(registry);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("destroy_all_10k", |b| {
        b.iter_batched(
            || populate(AGENTS_SMALL),
            |(mut registry, entities)| {
                for entity in entities {
                    registry.destroy(entity);
                }
                black_box(registry);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("recycle_churn_10k", |b| {
        b.iter_batched(
            || populate(AGENTS_SMALL),
            |(mut registry, mut entities)| {
                for _ in 0..AGENTS_SMALL {
                    let victim = entities.pop().unwrap();
                    registry.destroy(victim);
                    let fresh = registry.create();
                    registry.add(fresh, Position::default());
                    entities.insert(0, fresh);
                }
                black_box(registry);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
