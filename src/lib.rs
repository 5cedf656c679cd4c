//! # sim_runtime
//!
//! In-process runtime library for game- and simulation-style workloads.
//!
//! Three subsystems make up the crate:
//! - a sparse-set Entity-Component store ([`Registry`]) with generational
//!   entity handles, multi-component [`View`]s and packed [`Group`]s,
//! - a fixed-size [`JobPool`] executing closure jobs with parent→child
//!   dependency edges plus `parallel_for` helpers,
//! - two custom allocators: a bump [`ArenaAllocator`] and a two-level
//!   segregated-fit [`TlsfAllocator`], both usable through the
//!   [`MemorySource`] interface.
//!
//! ## Design Goals
//! - Dense, cache-friendly component storage
//! - O(1) structural operations (insert/remove/lookup, allocate/deallocate)
//! - Explicit threading model: the ECS and the allocators are
//!   single-threaded per instance, the job pool is the parallelism primitive
//!
//! ## Example
//!
//! ```
//! use sim_runtime::Registry;
//!
//! #[derive(Default)]
//! struct Position { x: f32, y: f32 }
//! #[derive(Default)]
//! struct Velocity { x: f32, y: f32 }
//!
//! let mut registry = Registry::new();
//! let e = registry.create();
//! registry.add(e, Position { x: 0.0, y: 0.0 });
//! registry.add(e, Velocity { x: 1.0, y: 2.0 });
//!
//! registry.view::<(Position, Velocity)>().each(|p, v| {
//!     p.x += v.x;
//!     p.y += v.y;
//! });
//!
//! assert_eq!(registry.get::<Position>(e).unwrap().y, 2.0);
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod ecs;
pub mod jobs;
pub mod memory;
pub mod profiling;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core ECS types

pub use ecs::entity::Entity;
pub use ecs::group::{Group, GroupMembers};
pub use ecs::registry::{ComponentBundle, Registry};
pub use ecs::sparse_set::SparseSet;
pub use ecs::view::{ExcludeList, IncludeTuple, View};

pub use ecs::type_hash::{type_hash, TypeHash};

pub use ecs::error::{AccessError, AccessResult, InvalidEntityError, MissingStoreError};

// Job pool

pub use jobs::parallel::{parallel_for, parallel_for_2d, parallel_for_2d_chunk, parallel_for_chunk};
pub use jobs::pool::{Job, JobPool};

// Allocators

pub use memory::arena::ArenaAllocator;
pub use memory::tlsf::{TlsfAllocator, TlsfStats};
pub use memory::{MemorySource, MAX_SCALAR_ALIGN};
