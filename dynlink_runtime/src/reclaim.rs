//! Reclaim notifications for types and defining scopes.
//!
//! Caches that key on runtime types must not keep those types alive. They
//! hold weak handles instead and subscribe a [`ReclaimQueue`] to each type
//! they key on. When the type (or its defining scope) is dropped, its
//! [`ReclaimHooks`] push a [`Reclaimed`] record onto every live queue, and the
//! cache drains the queue the next time it is touched.
//!
//! ```text
//! RuntimeType ──drop──▶ ReclaimHooks::fire ──push──▶ ReclaimQueue
//!                                                      │
//!                              cache lookup/insert ◀──drain
//! ```

use crate::types::{ScopeId, TypeId};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::{Arc, Weak};

// =============================================================================
// Reclaimed Record
// =============================================================================

/// Identifies something that has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reclaimed {
    /// A runtime type was dropped.
    Type(TypeId),
    /// A defining scope was dropped.
    Scope(ScopeId),
}

// =============================================================================
// Reclaim Queue
// =============================================================================

/// Queue of reclaim notifications, drained by its owner.
#[derive(Debug, Default)]
pub struct ReclaimQueue {
    pending: Mutex<Vec<Reclaimed>>,
}

impl ReclaimQueue {
    /// Create a new shared queue.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, record: Reclaimed) {
        self.pending.lock().push(record);
    }

    /// Take every pending notification.
    pub fn drain(&self) -> Vec<Reclaimed> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Number of pending notifications.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

// =============================================================================
// Reclaim Hooks
// =============================================================================

/// Watchers attached to a reclaimable object.
///
/// Queues are held weakly so a watched object never keeps its watchers alive
/// either.
#[derive(Debug, Default)]
pub struct ReclaimHooks {
    watchers: Mutex<SmallVec<[Weak<ReclaimQueue>; 2]>>,
}

impl ReclaimHooks {
    /// Create hooks with no watchers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a queue. Subscribing the same queue twice is a no-op.
    pub fn register(&self, queue: &Arc<ReclaimQueue>) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|w| w.strong_count() > 0);
        let target = Arc::downgrade(queue);
        if !watchers.iter().any(|w| w.ptr_eq(&target)) {
            watchers.push(target);
        }
    }

    /// Number of live watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Notify every live watcher. Called from `Drop` of the owner.
    pub fn fire(&self, record: Reclaimed) {
        let watchers = std::mem::take(&mut *self.watchers.lock());
        for queue in watchers.iter().filter_map(Weak::upgrade) {
            queue.push(record);
        }
    }
}
