//! Type registry mapping TypeId to RuntimeType.
//!
//! Entries are weak: registering a type never extends its lifetime, so a
//! scope-bound type registered here is still reclaimed with its scope. Dead
//! entries are purged once the map grows past a threshold that doubles with
//! the live population.

use crate::types::{RuntimeType, TypeId, TypeRef};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Entry count that triggers the first purge on registration.
const PURGE_THRESHOLD: usize = 64;

/// Registry of live bean types, populated by the host.
pub struct TypeRegistry {
    /// Map from TypeId to a weak handle on the type.
    types: DashMap<TypeId, Weak<RuntimeType>>,
    purge_at: AtomicUsize,
}

impl TypeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            types: DashMap::new(),
            purge_at: AtomicUsize::new(PURGE_THRESHOLD),
        }
    }

    /// Register a type, purging dead entries when the map has grown.
    pub fn register(&self, ty: &TypeRef) {
        self.types.insert(ty.id(), Arc::downgrade(ty));
        if self.types.len() >= self.purge_at.load(Ordering::Relaxed) {
            self.purge();
        }
    }

    /// Look up a live type by ID.
    #[inline]
    pub fn get(&self, type_id: TypeId) -> Option<TypeRef> {
        let found = self.types.get(&type_id)?.upgrade();
        if found.is_none() {
            self.types.remove(&type_id);
        }
        found
    }

    /// Look up a live type by name. Names are not unique; the lowest id wins.
    pub fn find_by_name(&self, name: &str) -> Option<TypeRef> {
        self.types
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .filter(|ty| ty.name() == name)
            .min_by_key(|ty| ty.id())
    }

    /// Drop entries whose types have been reclaimed. Returns how many were
    /// removed.
    pub fn purge(&self) -> usize {
        let before = self.types.len();
        self.types.retain(|_, ty| ty.strong_count() > 0);
        let live = self.types.len();
        self.purge_at.store((live * 2).max(PURGE_THRESHOLD), Ordering::Relaxed);
        before.saturating_sub(live)
    }

    /// Get the number of registered entries, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
