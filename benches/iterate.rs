use criterion::*;
use std::hint::black_box;

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    group.bench_function("each_write_position_100k", |b| {
        b.iter_batched(
            || populate(AGENTS_MED),
            |(mut registry, _entities)| {
                registry.each::<Position>(|position| {
                    position.x *= 1.0001;
                });
                black_box(registry);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("view_position_velocity_100k", |b| {
        b.iter_batched(
            || populate(AGENTS_MED),
            |(mut registry, _entities)| {
                registry.view::<(Position, Velocity)>().each(|position, velocity| {
                    position.x += velocity.x;
                    position.y += velocity.y;
                });
                black_box(registry);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("group_position_velocity_100k", |b| {
        b.iter_batched(
            || {
                let (mut registry, entities) = populate(AGENTS_MED);
                let group = registry
                    .group::<(Position, Velocity)>()
                    .expect("no other group is bound");
                (registry, entities, group)
            },
            |(mut registry, _entities, group)| {
                group.each(&mut registry, |position, velocity| {
                    position.x += velocity.x;
                    position.y += velocity.y;
                });
                black_box(registry);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
