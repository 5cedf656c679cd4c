//! Error types for component access.
//!
//! This module declares focused, composable error types used across the
//! entity–component store. Each error carries enough context to make
//! failures actionable while remaining small and cheap to pass around or
//! convert into the aggregate [`AccessError`].
//!
//! ## Goals
//! * **Specificity:** each type models a single failure mode (stale entity
//!   handles, absent component stores).
//! * **Ergonomics:** all errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into the aggregate.
//! * **Actionability:** structured fields (the offending handle, the store's
//!   type label) make logs useful without reproducing the issue.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is optimized for operator logs (short, imperative
//!   phrasing).
//! * [`fmt::Debug`] (derived) retains full structure for diagnostics.

use std::fmt;

use crate::ecs::entity::Entity;

/// Returned when an [`Entity`] handle does not resolve to a component,
/// typically because the entity was destroyed (its generation no longer
/// matches the slot) or never owned a component of the requested type.
///
/// Use this to prevent use-after-free style logic errors at the API
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidEntityError {
    /// The handle that failed to resolve.
    pub entity: Entity,
}

impl fmt::Display for InvalidEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stale or absent entity reference: {:?}", self.entity)
    }
}

impl std::error::Error for InvalidEntityError {}

/// Returned when an operation names a component type for which no store
/// exists yet (nothing of that type was ever added to the registry).
///
/// Iteration treats a missing store as an empty set; direct access surfaces
/// this error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingStoreError {
    /// Human-readable label of the missing component type.
    pub type_label: &'static str,
}

impl fmt::Display for MissingStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no component store for type `{}`", self.type_label)
    }
}

impl std::error::Error for MissingStoreError {}

/// Aggregate error for direct component access through the registry.
///
/// `From<T>` conversions are implemented for the focused errors so callers
/// can write `?` and still return a single, expressive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The entity handle was stale or never owned the component.
    InvalidEntity(InvalidEntityError),

    /// No store exists for the requested component type.
    MissingStore(MissingStoreError),
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::InvalidEntity(e) => write!(f, "{e}"),
            AccessError::MissingStore(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AccessError {}

impl From<InvalidEntityError> for AccessError {
    fn from(e: InvalidEntityError) -> Self {
        AccessError::InvalidEntity(e)
    }
}

impl From<MissingStoreError> for AccessError {
    fn from(e: MissingStoreError) -> Self {
        AccessError::MissingStore(e)
    }
}

/// Result alias for component access operations.
pub type AccessResult<T> = Result<T, AccessError>;
