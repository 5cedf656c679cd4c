//! Multi-component iteration.
//!
//! ## Purpose
//! A [`View`] is a transient iterator over the entities that own every
//! component type in an *include* tuple and none in an optional *exclude*
//! tuple:
//!
//! ```
//! # use sim_runtime::Registry;
//! # #[derive(Default)] struct Position(f32);
//! # #[derive(Default)] struct Velocity(f32);
//! # #[derive(Default)] struct Frozen;
//! # let mut registry = Registry::new();
//! registry.view::<(Position, Velocity)>()
//!     .exclude::<(Frozen,)>()
//!     .each(|p, v| p.0 += v.0);
//! ```
//!
//! ## Algorithm
//! The smallest include store is the *driver* (the first include wins ties).
//! The driver's packed entity order is walked once; entities missing any
//! include component or owning any exclude component are skipped, and the
//! callback receives mutable references to the resolved components.
//!
//! ## Validity
//! A view borrows the registry mutably, so structural mutation while a view
//! exists is rejected at compile time. Callbacks receive component
//! references only and cannot mutate structure mid-walk.
//!
//! Include tuples must name distinct component types; naming the same type
//! twice panics when the view iterates.

use std::marker::PhantomData;

use crate::ecs::entity::Entity;
use crate::ecs::registry::{downcast_store, Registry};
use crate::ecs::type_hash::{type_hash, TypeHash};

/// A tuple of component types a [`View`] resolves for each visited entity.
///
/// Implemented for tuples of arity 1 to 4.
pub trait IncludeTuple: 'static {
    /// Type hashes of the tuple members, in tuple order.
    fn hashes() -> Vec<TypeHash>;
    /// Creates any missing member store so an empty view is valid.
    fn ensure_stores(registry: &mut Registry);
}

/// A tuple of component types whose owners a [`View`] skips.
///
/// Implemented for `()` (no exclusion) and tuples of arity 1 to 3. A type
/// with no store excludes nothing.
pub trait ExcludeList: 'static {
    /// Type hashes of the excluded types.
    fn hashes() -> Vec<TypeHash>;
}

impl ExcludeList for () {
    fn hashes() -> Vec<TypeHash> {
        Vec::new()
    }
}

macro_rules! impl_exclude_list {
    ($($ty:ident),+) => {
        impl<$($ty: 'static),+> ExcludeList for ($($ty,)+) {
            fn hashes() -> Vec<TypeHash> {
                vec![$(type_hash::<$ty>()),+]
            }
        }
    };
}

impl_exclude_list!(A);
impl_exclude_list!(A, B);
impl_exclude_list!(A, B, C);

macro_rules! impl_include_tuple {
    ($($ty:ident),+) => {
        impl<$($ty: 'static),+> IncludeTuple for ($($ty,)+) {
            fn hashes() -> Vec<TypeHash> {
                vec![$(type_hash::<$ty>()),+]
            }

            fn ensure_stores(registry: &mut Registry) {
                $(registry.ensure_store::<$ty>();)+
            }
        }
    };
}

impl_include_tuple!(A);
impl_include_tuple!(A, B);
impl_include_tuple!(A, B, C);
impl_include_tuple!(A, B, C, D);

/// Transient iterator over entities owning the include tuple `I` and none of
/// the exclude tuple `X`. Built by [`Registry::view`].
pub struct View<'r, I, X = ()> {
    registry: &'r mut Registry,
    _marker: PhantomData<fn() -> (I, X)>,
}

impl<'r, I: IncludeTuple> View<'r, I, ()> {
    pub(crate) fn new(registry: &'r mut Registry) -> Self {
        Self {
            registry,
            _marker: PhantomData,
        }
    }

    /// Filters out every entity owning any component type in `E`.
    pub fn exclude<E: ExcludeList>(self) -> View<'r, I, E> {
        View {
            registry: self.registry,
            _marker: PhantomData,
        }
    }
}

macro_rules! impl_view_each {
    ($(($ty:ident, $store:ident)),+) => {
        impl<'r, $($ty: 'static,)+ X: ExcludeList> View<'r, ($($ty,)+), X> {
            /// Invokes `f` with the resolved components of every matching
            /// entity, in the driver's packed order.
            pub fn each(&mut self, mut f: impl FnMut($(&mut $ty),+)) {
                let includes = [$(type_hash::<$ty>()),+];
                let candidates = self
                    .registry
                    .collect_view_candidates(&includes, &X::hashes());

                let [$($store),+] = self.registry.stores_disjoint_mut(includes);
                $(
                    let $store = downcast_store::<$ty>(
                        $store.expect("include stores exist for live views").as_mut(),
                    );
                )+

                for entity in candidates {
                    f($($store
                        .get_mut(entity)
                        .expect("candidates resolve in every include store")),+);
                }
            }

            /// Like [`each`](Self::each), with the entity handle as the
            /// first callback argument.
            pub fn each_with_entity(&mut self, mut f: impl FnMut(Entity, $(&mut $ty),+)) {
                let includes = [$(type_hash::<$ty>()),+];
                let candidates = self
                    .registry
                    .collect_view_candidates(&includes, &X::hashes());

                let [$($store),+] = self.registry.stores_disjoint_mut(includes);
                $(
                    let $store = downcast_store::<$ty>(
                        $store.expect("include stores exist for live views").as_mut(),
                    );
                )+

                for entity in candidates {
                    f(entity, $($store
                        .get_mut(entity)
                        .expect("candidates resolve in every include store")),+);
                }
            }
        }
    };
}

impl_view_each!((A, store_a));
impl_view_each!((A, store_a), (B, store_b));
impl_view_each!((A, store_a), (B, store_b), (C, store_c));
impl_view_each!((A, store_a), (B, store_b), (C, store_c), (D, store_d));
