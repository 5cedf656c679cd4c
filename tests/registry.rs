//! Registry behavior: entity lifecycle, component management, views.

use std::collections::HashSet;

use sim_runtime::{AccessError, Entity, Registry};

#[derive(Debug, Default, PartialEq)]
struct Health(i32);

#[derive(Debug, Default, PartialEq)]
struct Mass(f64);

#[derive(Debug, Default, PartialEq)]
struct Tag(char);

#[test]
fn entity_creation_and_destruction() {
    let mut registry = Registry::new();

    let entity = registry.create();
    assert_eq!(registry.active_entity_count(), 1);

    registry.destroy(entity);
    assert_eq!(registry.active_entity_count(), 0);

    let entities: Vec<Entity> = (0..1000).map(|_| registry.create()).collect();
    assert_eq!(registry.active_entity_count(), 1000);

    for entity in entities {
        registry.destroy(entity);
    }
    assert_eq!(registry.active_entity_count(), 0);
}

#[test]
fn component_management() {
    let mut registry = Registry::new();
    let entity = registry.create();

    registry.add(entity, Health(42));
    registry.add(entity, Mass(3.25));

    assert_eq!(registry.get::<Health>(entity).unwrap().0, 42);
    assert_eq!(registry.get::<Mass>(entity).unwrap().0, 3.25);
    assert_eq!(registry.len_of::<Health>(), 1);
    assert_eq!(registry.len_of::<Mass>(), 1);

    registry.get_mut::<Health>(entity).unwrap().0 = 100;
    assert_eq!(registry.get::<Health>(entity).unwrap().0, 100);
}

#[test]
fn component_round_trip() {
    let mut registry = Registry::new();
    let entity = registry.create();

    registry.add(entity, Health(7));
    assert_eq!(*registry.get::<Health>(entity).unwrap(), Health(7));

    registry.remove::<Health>(entity);
    assert!(!registry.contains::<Health>(entity));
    assert_eq!(registry.len_of::<Health>(), 0);
}

/// The scene workload: mixed component sets, bulk `each` passes, then a
/// two-component view that only touches the overlap.
#[test]
fn scene_each_and_view() {
    let mut registry = Registry::new();
    let entities: Vec<Entity> = (0..100).map(|_| registry.create()).collect();

    for (i, &entity) in entities.iter().enumerate() {
        registry.add(entity, 1i32);
        if i % 2 == 1 {
            registry.add(entity, 0.3f64);
        } else {
            registry.add(entity, 'a');
        }
    }

    registry.each::<i32>(|value| *value += 1);
    registry.each::<f64>(|value| *value += 2.0);
    registry.each::<char>(|value| {
        *value = char::from_u32(*value as u32 + 1).expect("still a char");
    });

    registry.each::<i32>(|value| assert_eq!(*value, 2));
    registry.each::<f64>(|value| assert_eq!(*value, 2.3));
    registry.each::<char>(|value| assert_eq!(*value, 'b'));

    registry
        .view::<(i32, f64)>()
        .each(|int_value, float_value| *int_value += *float_value as i32);

    for (i, &entity) in entities.iter().enumerate() {
        let expected = if i % 2 == 1 { 4 } else { 2 };
        assert_eq!(*registry.get::<i32>(entity).unwrap(), expected);
    }
}

#[test]
fn destroy_reuses_slot_with_new_generation() {
    let mut registry = Registry::new();

    let first = registry.create();
    registry.destroy(first);
    let second = registry.create();

    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);

    registry.add(second, Health(1));
    assert!(!registry.contains::<Health>(first));
    assert!(registry.contains::<Health>(second));
    assert!(registry.get::<Health>(first).is_err());
}

#[test]
fn destroy_cascades_across_stores() {
    let mut registry = Registry::new();
    let entity = registry.create();

    registry.add(entity, Health(1));
    registry.add(entity, Mass(2.0));
    registry.add(entity, Tag('a'));

    registry.destroy(entity);

    assert!(!registry.contains::<Health>(entity));
    assert!(!registry.contains::<Mass>(entity));
    assert!(!registry.contains::<Tag>(entity));
    assert_eq!(registry.len_of::<Health>(), 0);
    assert_eq!(registry.len_of::<Mass>(), 0);
    assert_eq!(registry.len_of::<Tag>(), 0);
}

#[test]
fn destroy_of_stale_handle_is_a_no_op() {
    let mut registry = Registry::new();

    registry.destroy(Entity::INVALID);
    assert_eq!(registry.active_entity_count(), 0);

    let entity = registry.create();
    registry.destroy(entity);
    registry.destroy(entity);
    assert_eq!(registry.active_entity_count(), 0);

    let reused = registry.create();
    assert_eq!(registry.active_entity_count(), 1);
    registry.destroy(entity);
    assert!(registry.is_alive(reused));
    assert_eq!(registry.active_entity_count(), 1);
}

#[test]
fn view_visits_exactly_the_overlap() {
    let mut registry = Registry::new();
    let mut expected = HashSet::new();

    for i in 0..100u32 {
        let entity = registry.create();
        registry.add(entity, Health(i as i32));
        if i % 2 == 0 {
            registry.add(entity, Mass(f64::from(i)));
        }
        if i % 3 == 0 {
            registry.add(entity, Tag('x'));
        }
        if i % 2 == 0 && i % 3 == 0 {
            expected.insert(entity);
        }
    }

    let mut visited = HashSet::new();
    registry
        .view::<(Health, Mass, Tag)>()
        .each_with_entity(|entity, _, _, _| {
            assert!(visited.insert(entity), "entity visited twice");
        });
    assert_eq!(visited, expected);
}

#[test]
fn view_exclusion_filters_owners() {
    let mut registry = Registry::new();
    let mut expected = HashSet::new();

    for i in 0..60u32 {
        let entity = registry.create();
        registry.add(entity, Health(0));
        if i % 4 == 0 {
            registry.add(entity, Tag('f'));
        } else {
            expected.insert(entity);
        }
    }

    let mut visited = HashSet::new();
    registry
        .view::<(Health,)>()
        .exclude::<(Tag,)>()
        .each_with_entity(|entity, _| {
            assert!(visited.insert(entity));
        });
    assert_eq!(visited, expected);
}

#[test]
fn view_over_unseen_types_is_empty() {
    struct NeverAdded;

    let mut registry = Registry::new();
    let entity = registry.create();
    registry.add(entity, Health(1));

    let mut count = 0;
    registry
        .view::<(Health, NeverAdded)>()
        .each(|_, _| count += 1);
    assert_eq!(count, 0);
}

#[test]
fn each_on_missing_store_is_a_no_op() {
    let mut registry = Registry::new();
    let mut count = 0;
    registry.each::<Health>(|_| count += 1);
    assert_eq!(count, 0);
}

#[test]
fn access_errors_carry_their_cause() {
    let mut registry = Registry::new();
    let entity = registry.create();

    assert!(matches!(
        registry.get::<Health>(entity),
        Err(AccessError::MissingStore(_))
    ));

    let other = registry.create();
    registry.add(other, Health(1));
    assert!(matches!(
        registry.get::<Health>(entity),
        Err(AccessError::InvalidEntity(_))
    ));
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "added twice")]
fn duplicate_component_addition_asserts() {
    let mut registry = Registry::new();
    let entity = registry.create();
    registry.add(entity, Health(1));
    registry.add(entity, Health(2));
}

#[test]
fn create_with_attaches_default_components() {
    let mut registry = Registry::new();
    let entity = registry.create_with::<(Health, Mass)>();

    assert_eq!(*registry.get::<Health>(entity).unwrap(), Health::default());
    assert_eq!(*registry.get::<Mass>(entity).unwrap(), Mass::default());
    assert!(!registry.contains::<Tag>(entity));
}

#[test]
fn active_count_tracks_interleaved_lifecycles() {
    let mut registry = Registry::new();
    let mut live = Vec::new();

    for round in 0..10 {
        for _ in 0..20 {
            live.push(registry.create());
        }
        for _ in 0..(round % 7) {
            registry.destroy(live.pop().unwrap());
        }
        assert_eq!(registry.active_entity_count(), live.len());
    }
}

#[test]
fn clear_empties_everything() {
    let mut registry = Registry::new();
    for i in 0..50 {
        let entity = registry.create();
        registry.add(entity, Health(i));
        if i % 2 == 0 {
            registry.add(entity, Mass(1.0));
        }
    }

    registry.clear();

    assert_eq!(registry.active_entity_count(), 0);
    assert_eq!(registry.len_of::<Health>(), 0);
    assert_eq!(registry.len_of::<Mass>(), 0);

    // The registry is fully usable again.
    let entity = registry.create();
    registry.add(entity, Health(9));
    assert_eq!(registry.len_of::<Health>(), 1);
}

#[test]
fn sort_reorders_packed_components() {
    let mut registry = Registry::new();
    let entities: Vec<Entity> = (0..8).map(|_| registry.create()).collect();
    for (i, &entity) in entities.iter().enumerate() {
        registry.add(entity, Health(7 - i as i32));
    }

    assert!(registry.sort_by::<Health>(|a, b| a.0.cmp(&b.0)));

    let mut seen = Vec::new();
    registry.each::<Health>(|health| seen.push(health.0));
    assert_eq!(seen, (0..8).collect::<Vec<_>>());

    // Entity→component mapping survives the permutation.
    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(registry.get::<Health>(entity).unwrap().0, 7 - i as i32);
    }
}

#[test]
fn entities_accessor_matches_each_order() {
    let mut registry = Registry::new();
    for i in 0..10 {
        let entity = registry.create();
        registry.add(entity, Health(i));
    }

    let handles: Vec<Entity> = registry.entities::<Health>().to_vec();
    let mut paired = Vec::new();
    registry.each_with_entity::<Health>(|entity, _| paired.push(entity));
    assert_eq!(handles, paired);
}

#[test]
fn dump_lists_every_store() {
    let mut registry = Registry::new();
    let entity = registry.create();
    registry.add(entity, Health(1));
    registry.add(entity, Mass(2.0));

    let dump = registry.dump();
    assert!(dump.contains("Health"));
    assert!(dump.contains("Mass"));
}

#[test]
fn reserve_does_not_disturb_contents() {
    let mut registry = Registry::new();
    let entity = registry.create();
    registry.add(entity, Health(3));

    registry.reserve::<Health>(1024);
    assert_eq!(registry.get::<Health>(entity).unwrap().0, 3);
    assert_eq!(registry.len_of::<Health>(), 1);
}
