//! Top-level entity–component store.
//!
//! ## Purpose
//! The [`Registry`] owns:
//!
//! - the entity slot table (generation per slot, liveness, FIFO free queue),
//! - one type-erased [`SparseSet`] per component type seen so far,
//! - the group table used to keep packed prefixes up to date.
//!
//! ## Entity lifecycle
//! `create` pops a recycled handle from the free queue (the stored handle
//! already carries the bumped generation) or extends the slot table.
//! `destroy` cascades component removal across every store, bumps the slot
//! generation, and enqueues the handle for reuse. Any lookup with a handle
//! whose generation no longer matches its slot is treated as "not present".
//!
//! ## Invariants
//! - `active_entity_count() == slot_count − free_queue_len` after every
//!   operation.
//! - A live handle's generation equals its slot's generation.
//! - Group prefixes are maintained across `add`/`remove`/`destroy`/`clear`.
//!
//! ## Concurrency
//! A `Registry` is single-threaded; concurrent mutation requires external
//! synchronization by the caller.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::rc::Rc;

use crate::ecs::entity::Entity;
use crate::ecs::error::{AccessResult, InvalidEntityError, MissingStoreError};
use crate::ecs::group::{Group, GroupMembers, GroupTable};
use crate::ecs::sparse_set::{ErasedSparseSet, SparseSet};
use crate::ecs::type_hash::{type_hash, type_label, TypeHash};
use crate::ecs::types::Generation;
use crate::ecs::view::{IncludeTuple, View};
use crate::profiling::profiler;

/// A set of default-constructible component types attached in one call by
/// [`Registry::create_with`].
pub trait ComponentBundle: 'static {
    /// Adds one default-constructed component per bundle member.
    fn attach(registry: &mut Registry, entity: Entity);
}

macro_rules! impl_component_bundle {
    ($($ty:ident),+) => {
        impl<$($ty: Default + 'static),+> ComponentBundle for ($($ty,)+) {
            fn attach(registry: &mut Registry, entity: Entity) {
                $(registry.add(entity, $ty::default());)+
            }
        }
    };
}

impl_component_bundle!(A);
impl_component_bundle!(A, B);
impl_component_bundle!(A, B, C);
impl_component_bundle!(A, B, C, D);

/// Top-level ECS store. See the module docs for the ownership model.
pub struct Registry {
    /// Current generation per slot index.
    generations: Vec<Generation>,
    /// Liveness per slot index.
    alive: Vec<bool>,
    /// Recycled handles, already carrying their next generation.
    free_entities: VecDeque<Entity>,
    /// Type hash → type-erased component store.
    stores: HashMap<TypeHash, Box<dyn ErasedSparseSet>>,
    /// Store creation order, for deterministic cascades and dumps.
    store_order: Vec<TypeHash>,
    /// Group records, shared with the [`Group`] handles.
    groups: Rc<RefCell<GroupTable>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            generations: Vec::new(),
            alive: Vec::new(),
            free_entities: VecDeque::new(),
            stores: HashMap::new(),
            store_order: Vec::new(),
            groups: Rc::new(RefCell::new(GroupTable::new())),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Entity lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Creates a new entity, recycling a destroyed slot when one is free.
    pub fn create(&mut self) -> Entity {
        if let Some(entity) = self.free_entities.pop_front() {
            let index = entity.index() as usize;
            debug_assert_eq!(self.generations[index], entity.generation());
            self.alive[index] = true;
            return entity;
        }

        let index = self.generations.len();
        assert!(
            index <= u32::MAX as usize,
            "entity index space exhausted ({} slots)",
            u32::MAX
        );
        self.generations.push(0);
        self.alive.push(true);
        Entity::from_parts(index as u32, 0)
    }

    /// Creates a new entity and attaches a default-constructed component for
    /// every type in the bundle tuple `B`.
    pub fn create_with<B: ComponentBundle>(&mut self) -> Entity {
        let entity = self.create();
        B::attach(self, entity);
        entity
    }

    /// Destroys `entity`: removes its components from every store, bumps the
    /// slot generation and enqueues the slot for reuse.
    ///
    /// No-op when the handle is stale, invalid, or already destroyed.
    pub fn destroy(&mut self, entity: Entity) {
        if !self.is_alive(entity) {
            return;
        }

        // Groups first: leaving entities must be swapped out of every packed
        // prefix while the member stores still contain them.
        let group_count = self.groups.borrow().records.len();
        for group_index in 0..group_count {
            self.swap_out_of_group(entity, group_index);
        }

        for hash in &self.store_order {
            let store = self
                .stores
                .get_mut(hash)
                .expect("store_order entries always resolve");
            store.remove(entity);
        }

        let index = entity.index() as usize;
        self.alive[index] = false;
        self.generations[index] = entity.generation().wrapping_add(1);
        self.free_entities.push_back(entity.with_next_generation());
    }

    /// Returns `true` if `entity` is live (slot generation matches).
    pub fn is_alive(&self, entity: Entity) -> bool {
        let index = entity.index() as usize;
        index < self.generations.len()
            && self.alive[index]
            && self.generations[index] == entity.generation()
    }

    /// Number of live entities.
    pub fn active_entity_count(&self) -> usize {
        self.generations.len() - self.free_entities.len()
    }

    /// Removes every component from every store, empties the free queue and
    /// resets the slot table. Group records survive with empty prefixes.
    pub fn clear(&mut self) {
        let _span = profiler::span("Registry::clear");

        for store in self.stores.values_mut() {
            store.clear();
        }
        self.free_entities.clear();
        self.generations.clear();
        self.alive.clear();
        self.groups.borrow_mut().reset_sizes();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Components
    // ─────────────────────────────────────────────────────────────────────

    /// Adds a component to `entity`, creating the store for `T` on first
    /// use, and returns a reference to the stored value.
    ///
    /// ## Contract
    /// `entity` must be live and must not already own a `T`; both are
    /// debug-asserted. If `T` participates in a group and the entity now
    /// qualifies, it is swapped into the group prefix.
    pub fn add<T: 'static>(&mut self, entity: Entity, value: T) -> &mut T {
        debug_assert!(
            self.is_alive(entity),
            "component added to dead or stale {entity:?}"
        );

        let hash = type_hash::<T>();
        self.ensure_store::<T>().emplace(entity, value);
        self.swap_into_group(entity, hash);

        self.store_mut::<T>()
            .and_then(|store| store.get_mut(entity))
            .expect("component present immediately after emplace")
    }

    /// Removes the `T` component of `entity`, if present.
    ///
    /// Group prefixes observing `T` are repaired before the structural
    /// removal.
    pub fn remove<T: 'static>(&mut self, entity: Entity) {
        let hash = type_hash::<T>();
        let bound_group = self.groups.borrow().bound.get(&hash).copied();
        if let Some(group_index) = bound_group {
            self.swap_out_of_group(entity, group_index);
        }
        if let Some(store) = self.stores.get_mut(&hash) {
            store.remove(entity);
        }
    }

    /// Shared reference to the `T` component of `entity`.
    pub fn get<T: 'static>(&self, entity: Entity) -> AccessResult<&T> {
        let store = self.store::<T>().ok_or(MissingStoreError {
            type_label: type_label::<T>(),
        })?;
        Ok(store.get(entity).ok_or(InvalidEntityError { entity })?)
    }

    /// Mutable reference to the `T` component of `entity`.
    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> AccessResult<&mut T> {
        let store = self.store_mut::<T>().ok_or(MissingStoreError {
            type_label: type_label::<T>(),
        })?;
        Ok(store.get_mut(entity).ok_or(InvalidEntityError { entity })?)
    }

    /// Returns `true` if `entity` owns a `T` with a matching generation.
    pub fn contains<T: 'static>(&self, entity: Entity) -> bool {
        self.store::<T>().is_some_and(|store| store.contains(entity))
    }

    /// Number of stored `T` components (zero when no store exists).
    pub fn len_of<T: 'static>(&self) -> usize {
        self.store::<T>().map_or(0, SparseSet::len)
    }

    /// Entity handles owning a `T`, in packed order.
    pub fn entities<T: 'static>(&self) -> &[Entity] {
        self.store::<T>().map_or(&[], SparseSet::entities)
    }

    /// Capacity hint for the `T` store, creating it if necessary.
    pub fn reserve<T: 'static>(&mut self, additional: usize) {
        self.ensure_store::<T>().reserve(additional);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Iteration
    // ─────────────────────────────────────────────────────────────────────

    /// Runs `f` over every `T` component in packed order.
    ///
    /// A missing store is treated as an empty set.
    pub fn each<T: 'static>(&mut self, f: impl FnMut(&mut T)) {
        if let Some(store) = self.store_mut::<T>() {
            store.each(f);
        }
    }

    /// Runs `f` over every `(entity, component)` pair in packed order.
    pub fn each_with_entity<T: 'static>(&mut self, f: impl FnMut(Entity, &mut T)) {
        if let Some(store) = self.store_mut::<T>() {
            store.each_with_entity(f);
        }
    }

    /// Builds a [`View`] over the include tuple `I`.
    ///
    /// Missing include stores are created empty so a view over unseen types
    /// is valid (and iterates nothing). Chain [`View::exclude`] to filter
    /// entities that own unwanted components.
    pub fn view<I: IncludeTuple>(&mut self) -> View<'_, I> {
        I::ensure_stores(self);
        View::new(self)
    }

    /// Builds a [`Group`] over the member tuple `M`, packing all qualifying
    /// entities into the leading positions of every member store.
    ///
    /// Returns `None` if any member type is already bound to another group.
    pub fn group<M: GroupMembers>(&mut self) -> Option<Group<M>> {
        let _span = profiler::span("Registry::group");

        M::ensure_stores(self);
        let members = M::hashes();
        debug_assert!(
            members
                .iter()
                .enumerate()
                .all(|(i, hash)| !members[..i].contains(hash)),
            "group member tuples must name distinct types"
        );

        let group_index = self.groups.borrow_mut().register(&members)?;

        // Initial packing: walk the smallest member store and swap every
        // qualifying entity into the prefix of all members.
        let driver = members
            .iter()
            .copied()
            .min_by_key(|hash| self.stores[hash].len())
            .expect("groups have at least one member");
        let candidates: Vec<Entity> = self.stores[&driver].dense_entities().to_vec();

        for entity in candidates {
            let qualifies = members
                .iter()
                .all(|hash| self.stores[hash].contains(entity));
            if qualifies {
                self.swap_into_group(entity, members[0]);
            }
        }

        Some(Group::new(Rc::clone(&self.groups), group_index))
    }

    /// Sorts the `T` store with `compare`.
    ///
    /// Returns `false` (and does nothing) when `T` is bound to a group
    /// (sorting would destroy the packed prefix) or when no store exists.
    pub fn sort_by<T: 'static>(
        &mut self,
        compare: impl FnMut(&T, &T) -> std::cmp::Ordering,
    ) -> bool {
        let hash = type_hash::<T>();
        if self.groups.borrow().bound.contains_key(&hash) {
            return false;
        }
        match self.store_mut::<T>() {
            Some(store) => {
                store.sort_by(compare);
                true
            }
            None => false,
        }
    }

    /// Debug introspection: per-store type labels and index tables, in store
    /// creation order.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for hash in &self.store_order {
            let store = &self.stores[hash];
            let _ = writeln!(
                out,
                "store `{}` (hash {:#018x}), {} components",
                store.stored_type_label(),
                store.stored_type_hash(),
                store.len()
            );
            store.dump_into(&mut out);
            out.push('\n');
        }
        out
    }

    // ─────────────────────────────────────────────────────────────────────
    // Store plumbing (crate-internal)
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn ensure_store<T: 'static>(&mut self) -> &mut SparseSet<T> {
        let hash = type_hash::<T>();
        let store = self.stores.entry(hash).or_insert_with(|| {
            self.store_order.push(hash);
            Box::new(SparseSet::<T>::new())
        });
        downcast_store::<T>(store.as_mut())
    }

    fn store<T: 'static>(&self) -> Option<&SparseSet<T>> {
        self.stores
            .get(&type_hash::<T>())
            .map(|store| downcast_store_ref::<T>(store.as_ref()))
    }

    fn store_mut<T: 'static>(&mut self) -> Option<&mut SparseSet<T>> {
        self.stores
            .get_mut(&type_hash::<T>())
            .map(|store| downcast_store::<T>(store.as_mut()))
    }

    pub(crate) fn store_by_hash(&self, hash: TypeHash) -> Option<&dyn ErasedSparseSet> {
        self.stores.get(&hash).map(Box::as_ref)
    }

    pub(crate) fn group_table(&self) -> &Rc<RefCell<GroupTable>> {
        &self.groups
    }

    /// Disjoint mutable access to several stores at once, used by views and
    /// groups. Panics if two keys alias; tuples must name distinct types.
    pub(crate) fn stores_disjoint_mut<const N: usize>(
        &mut self,
        hashes: [TypeHash; N],
    ) -> [Option<&mut Box<dyn ErasedSparseSet>>; N] {
        let keys: [&TypeHash; N] = std::array::from_fn(|i| &hashes[i]);
        self.stores.get_disjoint_mut(keys)
    }

    /// Entities a view over `includes` (minus `excludes`) would visit, in
    /// the driver's packed order. The driver is the smallest include store;
    /// the first include wins ties.
    pub(crate) fn collect_view_candidates(
        &self,
        includes: &[TypeHash],
        excludes: &[TypeHash],
    ) -> Vec<Entity> {
        let mut driver: Option<&dyn ErasedSparseSet> = None;
        for hash in includes {
            let Some(store) = self.store_by_hash(*hash) else {
                return Vec::new();
            };
            if driver.is_none_or(|current| store.len() < current.len()) {
                driver = Some(store);
            }
        }
        let Some(driver) = driver else {
            return Vec::new();
        };

        driver
            .dense_entities()
            .iter()
            .copied()
            .filter(|&entity| {
                includes
                    .iter()
                    .all(|hash| self.store_by_hash(*hash).is_some_and(|s| s.contains(entity)))
                    && !excludes
                        .iter()
                        .any(|hash| self.store_by_hash(*hash).is_some_and(|s| s.contains(entity)))
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Group maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// After a component of type `hash` was added to `entity`: if the type
    /// is group-bound and the entity now owns every member type, swap it
    /// into slot `size` of all member stores and grow the prefix.
    fn swap_into_group(&mut self, entity: Entity, hash: TypeHash) {
        let groups = Rc::clone(&self.groups);
        let (group_index, members, size) = {
            let table = groups.borrow();
            let Some(&group_index) = table.bound.get(&hash) else {
                return;
            };
            let record = &table.records[group_index];
            (group_index, record.members.clone(), record.size)
        };

        let qualifies = members
            .iter()
            .all(|member| self.store_by_hash(*member).is_some_and(|s| s.contains(entity)));
        if !qualifies {
            return;
        }

        // Already inside the prefix (re-entrant notification).
        let first = self
            .store_by_hash(members[0])
            .expect("group member stores exist while the group is bound");
        if first.position_of(entity).is_some_and(|p| p < size) {
            return;
        }

        for member in &members {
            let store = self
                .stores
                .get_mut(member)
                .expect("group member stores exist while the group is bound");
            let position = store
                .position_of(entity)
                .expect("qualifying entity is present in every member store");
            if position != size {
                let displaced = store.dense_entities()[size];
                store.swap_entities(displaced, entity);
            }
        }

        groups.borrow_mut().records[group_index].size = size + 1;
    }

    /// Before `entity` loses membership of group `group_index` (component
    /// removal or destruction): if it sits in the prefix, swap it to the
    /// last prefix slot of every member store and shrink the prefix.
    fn swap_out_of_group(&mut self, entity: Entity, group_index: usize) {
        let groups = Rc::clone(&self.groups);
        let (members, size) = {
            let table = groups.borrow();
            let record = &table.records[group_index];
            if !record.active || record.size == 0 {
                return;
            }
            (record.members.clone(), record.size)
        };

        let Some(first) = self.store_by_hash(members[0]) else {
            return;
        };
        if !first.position_of(entity).is_some_and(|p| p < size) {
            return;
        }

        let last = size - 1;
        for member in &members {
            let store = self
                .stores
                .get_mut(member)
                .expect("group member stores exist while the group is bound");
            let position = store
                .position_of(entity)
                .expect("grouped entity is present in every member store");
            if position != last {
                let boundary = store.dense_entities()[last];
                store.swap_entities(boundary, entity);
            }
        }

        groups.borrow_mut().records[group_index].size = last;
    }
}

/// Recovers the concrete store behind a type-erased box.
///
/// The stored hash is the downcast token; a mismatch means registry
/// bookkeeping is corrupt, which is unrecoverable.
pub(crate) fn downcast_store<T: 'static>(store: &mut dyn ErasedSparseSet) -> &mut SparseSet<T> {
    debug_assert_eq!(store.stored_type_hash(), type_hash::<T>());
    store
        .as_any_mut()
        .downcast_mut::<SparseSet<T>>()
        .expect("store type tag mismatch")
}

fn downcast_store_ref<T: 'static>(store: &dyn ErasedSparseSet) -> &SparseSet<T> {
    debug_assert_eq!(store.stored_type_hash(), type_hash::<T>());
    store
        .as_any()
        .downcast_ref::<SparseSet<T>>()
        .expect("store type tag mismatch")
}
