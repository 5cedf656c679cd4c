//! Entity handles.
//!
//! ## Purpose
//! An [`Entity`] is a lightweight, opaque identifier referencing rows in the
//! per-type component stores. This module is responsible for:
//!
//! - Packing and unpacking the index/generation bit fields
//! - Providing the invalid sentinel handle
//! - Generation arithmetic used when slots are recycled
//!
//! ## Entity Model
//! A handle is a packed 64-bit value: the low 32 bits are the slot *index*,
//! the high 32 bits the *generation*. Destroying an entity bumps the
//! generation of its slot, so any handle still carrying the old generation
//! compares unequal and is treated as "not present" by every lookup.
//!
//! ## Invariants
//! - Two handles with the same index but different generations are distinct
//!   entities.
//! - The all-ones bit pattern is never a live entity.
//!
//! ## Notes
//! Handles are cheap to copy and compare. Callers must treat the value as
//! opaque; the partitioning is an implementation detail of this crate.
//! After 2^32 recycles of one slot the generation wraps and a very stale
//! handle could alias a live one; that window is accepted for the intended
//! workloads.

use std::fmt;

use crate::ecs::types::{
    EntityId, EntityIndex, Generation, GENERATION_MASK, INDEX_BITS, INDEX_MASK,
    INVALID_ENTITY_BITS,
};

/// Opaque, generation-versioned identifier for an entity.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(EntityId);

#[inline]
const fn make_id(index: EntityIndex, generation: Generation) -> EntityId {
    ((generation as EntityId) << INDEX_BITS) | (index as EntityId)
}

impl Entity {
    /// The invalid entity handle (all bits set).
    pub const INVALID: Entity = Entity(INVALID_ENTITY_BITS);

    /// Builds a handle from its index and generation parts.
    #[inline]
    pub const fn from_parts(index: EntityIndex, generation: Generation) -> Self {
        Entity(make_id(index, generation))
    }

    /// Reconstructs a handle from its raw 64-bit value.
    #[inline]
    pub const fn from_bits(bits: EntityId) -> Self {
        Entity(bits)
    }

    /// Returns the raw 64-bit value of this handle.
    #[inline]
    pub const fn bits(self) -> EntityId {
        self.0
    }

    /// Returns the slot index encoded in this handle.
    #[inline]
    pub const fn index(self) -> EntityIndex {
        (self.0 & INDEX_MASK) as EntityIndex
    }

    /// Returns the generation encoded in this handle.
    #[inline]
    pub const fn generation(self) -> Generation {
        ((self.0 & GENERATION_MASK) >> INDEX_BITS) as Generation
    }

    /// Returns `true` if this is the invalid sentinel handle.
    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.0 == INVALID_ENTITY_BITS
    }

    /// Returns the handle for the same slot with the generation advanced by
    /// one (wrapping). Used when a destroyed slot is pushed to the free
    /// queue.
    #[inline]
    pub const fn with_next_generation(self) -> Self {
        Entity::from_parts(self.index(), self.generation().wrapping_add(1))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            return f.write_str("Entity(invalid)");
        }
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}
