//! Shared fixtures for the benchmark suite.
#![allow(dead_code)]

use sim_runtime::{Entity, Registry};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

#[derive(Debug, Default, Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Wealth {
    pub value: f64,
}

/// Builds a registry where every entity has a Position, four in five have a
/// Velocity and one in five has a Wealth.
pub fn populate(count: usize) -> (Registry, Vec<Entity>) {
    let mut registry = Registry::new();
    registry.reserve::<Position>(count);
    registry.reserve::<Velocity>(count);

    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let entity = registry.create();
        registry.add(
            entity,
            Position {
                x: i as f32,
                y: 0.0,
            },
        );
        if i % 5 != 0 {
            registry.add(
                entity,
                Velocity {
                    x: 1.0,
                    y: -1.0,
                },
            );
        } else {
            registry.add(entity, Wealth { value: i as f64 });
        }
        entities.push(entity);
    }
    (registry, entities)
}
