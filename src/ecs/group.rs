//! Packed-prefix iteration over jointly-owned components.
//!
//! ## Purpose
//! A [`Group`] persistently reorders the sparse sets of its member types so
//! that every entity owning *all* member components occupies the leading
//! positions (the same positions) of every member store. Joint iteration
//! then walks `[0, len)` of each packed vector directly, with no per-entity
//! membership checks.
//!
//! ## Maintenance
//! The registry notifies the group table on every structural change:
//! adding the last missing member component swaps the entity into slot
//! `len` of every member store and grows the prefix; removing a member
//! component (or destroying the entity) swaps it back to slot `len − 1`
//! and shrinks the prefix.
//!
//! ## Exclusivity
//! At most one group may observe any given component type;
//! [`Registry::group`] returns `None` when a member type is already bound.
//! Sorting a group-bound store is refused for the same reason.
//!
//! ## Lifetime
//! The handle shares the registry's group table through `Rc`; dropping it
//! deactivates the record and releases the member-type bindings. The
//! registry resolves the handle's record index on every call, so a handle
//! never holds store borrows.

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::ecs::entity::Entity;
use crate::ecs::registry::{downcast_store, Registry};
use crate::ecs::type_hash::{type_hash, TypeHash};
use crate::ecs::view::IncludeTuple;

/// Tuple of component types a [`Group`] packs. Arity 1 to 4, distinct types.
pub trait GroupMembers: IncludeTuple {}

impl<T: IncludeTuple> GroupMembers for T {}

/// One registered group: its member types and the current prefix length.
pub(crate) struct GroupRecord {
    pub members: Vec<TypeHash>,
    pub size: usize,
    pub active: bool,
}

/// Registry-owned table of group records, shared with [`Group`] handles.
pub(crate) struct GroupTable {
    pub records: Vec<GroupRecord>,
    /// Member type hash → record index; enforces one group per type.
    pub bound: HashMap<TypeHash, usize>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            bound: HashMap::new(),
        }
    }

    /// Registers a group over `members`, or `None` if any member type is
    /// already bound.
    pub fn register(&mut self, members: &[TypeHash]) -> Option<usize> {
        if members.iter().any(|hash| self.bound.contains_key(hash)) {
            return None;
        }
        let index = self.records.len();
        self.records.push(GroupRecord {
            members: members.to_vec(),
            size: 0,
            active: true,
        });
        for hash in members {
            self.bound.insert(*hash, index);
        }
        Some(index)
    }

    /// Deactivates a record and releases its member bindings.
    pub fn unregister(&mut self, index: usize) {
        let members = {
            let record = &mut self.records[index];
            if !record.active {
                return;
            }
            record.active = false;
            record.size = 0;
            record.members.clone()
        };
        for hash in members {
            self.bound.remove(&hash);
        }
    }

    /// Empties every prefix; called by `Registry::clear`.
    pub fn reset_sizes(&mut self) {
        for record in &mut self.records {
            record.size = 0;
        }
    }
}

/// Handle to a registered group over the member tuple `M`.
///
/// Built by [`Registry::group`]; unregisters itself on drop.
pub struct Group<M> {
    table: Rc<RefCell<GroupTable>>,
    index: usize,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Group<M> {
    pub(crate) fn new(table: Rc<RefCell<GroupTable>>, index: usize) -> Self {
        Self {
            table,
            index,
            _marker: PhantomData,
        }
    }

    /// Number of entities currently owning every member component.
    pub fn len(&self) -> usize {
        self.table.borrow().records[self.index].size
    }

    /// Returns `true` if no entity owns every member component.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_registry(&self, registry: &Registry) {
        debug_assert!(
            Rc::ptr_eq(&self.table, registry.group_table()),
            "group handle used with a registry it does not belong to"
        );
    }
}

impl<M> Drop for Group<M> {
    fn drop(&mut self) {
        self.table.borrow_mut().unregister(self.index);
    }
}

macro_rules! impl_group_each {
    ($(($ty:ident, $store:ident, $packed:ident)),+) => {
        impl<$($ty: 'static),+> Group<($($ty,)+)> {
            /// Invokes `f` with the member components of every grouped
            /// entity. Walks the packed prefixes directly; no per-entity
            /// membership checks.
            pub fn each(&self, registry: &mut Registry, mut f: impl FnMut($(&mut $ty),+)) {
                self.check_registry(registry);
                let size = self.len();

                let [$($store),+] =
                    registry.stores_disjoint_mut([$(type_hash::<$ty>()),+]);
                $(
                    let $store = downcast_store::<$ty>(
                        $store.expect("member stores exist while the group is bound").as_mut(),
                    );
                    let $packed = $store.packed_mut();
                )+

                for i in 0..size {
                    f($(&mut $packed[i]),+);
                }
            }

            /// Like [`each`](Self::each), with the entity handle as the
            /// first callback argument.
            pub fn each_with_entity(
                &self,
                registry: &mut Registry,
                mut f: impl FnMut(Entity, $(&mut $ty),+),
            ) {
                self.check_registry(registry);
                let size = self.len();

                let [$($store),+] =
                    registry.stores_disjoint_mut([$(type_hash::<$ty>()),+]);
                $(
                    let $store = downcast_store::<$ty>(
                        $store.expect("member stores exist while the group is bound").as_mut(),
                    );
                )+

                group_each_with_entity_body!(size, f, $(($store, $packed)),+);
            }
        }
    };
}

/// Splits the first member store into `(entities, packed)` so the handle
/// column and the component column can be borrowed together.
macro_rules! group_each_with_entity_body {
    ($size:ident, $f:ident, ($first_store:ident, $first_packed:ident) $(, ($store:ident, $packed:ident))*) => {
        let (entities, $first_packed) = $first_store.entities_and_packed_mut();
        $(let $packed = $store.packed_mut();)*

        for i in 0..$size {
            $f(entities[i], &mut $first_packed[i] $(, &mut $packed[i])*);
        }
    };
}

impl_group_each!((A, store_a, packed_a));
impl_group_each!((A, store_a, packed_a), (B, store_b, packed_b));
impl_group_each!(
    (A, store_a, packed_a),
    (B, store_b, packed_b),
    (C, store_c, packed_c)
);
impl_group_each!(
    (A, store_a, packed_a),
    (B, store_b, packed_b),
    (C, store_c, packed_c),
    (D, store_d, packed_d)
);
