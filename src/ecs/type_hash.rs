//! Per-type stable hash identifiers.
//!
//! ## Purpose
//! The registry stores one type-erased sparse set per component type and
//! needs a compact integer key to find it again. [`type_hash`] produces a
//! `u64` that is:
//!
//! - deterministic within a single process run,
//! - equal for two calls iff they name the same concrete type.
//!
//! The value is *not* guaranteed stable across builds and must not be
//! persisted.
//!
//! ## Synonym detection
//! Hashing the 128-bit `TypeId` down to 64 bits makes a collision between
//! distinct types astronomically unlikely but not impossible. Debug builds
//! record the first observed type name per hash and panic loudly if a second
//! type ever maps to the same value; release builds skip the bookkeeping.

use std::any::{type_name, TypeId};
use std::hash::{Hash, Hasher};

/// Compact per-type identifier used as the store map key.
pub type TypeHash = u64;

/// Returns the stable in-process hash for the concrete type `T`.
pub fn type_hash<T: 'static>() -> TypeHash {
    let mut hasher = std::hash::DefaultHasher::new();
    TypeId::of::<T>().hash(&mut hasher);
    let hash = hasher.finish();

    #[cfg(debug_assertions)]
    synonym_check::record::<T>(hash);

    hash
}

/// Returns the human-readable label for `T` used in diagnostics and dumps.
pub fn type_label<T: 'static>() -> &'static str {
    type_name::<T>()
}

#[cfg(debug_assertions)]
mod synonym_check {
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};

    use super::TypeHash;

    static HISTORY: OnceLock<Mutex<HashMap<TypeHash, &'static str>>> = OnceLock::new();

    pub(super) fn record<T: 'static>(hash: TypeHash) {
        let name = super::type_name::<T>();
        let history = HISTORY.get_or_init(|| Mutex::new(HashMap::new()));
        let mut history = match history.lock() {
            Ok(guard) => guard,
            // A panic while holding the map only loses the check, never the hash.
            Err(poisoned) => poisoned.into_inner(),
        };
        let first = history.entry(hash).or_insert(name);
        assert!(
            *first == name,
            "type hash synonym: {:#018x} maps to both `{}` and `{}`",
            hash,
            first,
            name
        );
    }
}
