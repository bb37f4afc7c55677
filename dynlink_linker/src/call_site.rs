//! Relinkable call sites.
//!
//! A call site caches the targets linked for it and swaps them atomically as
//! receivers change shape.
//!
//! # State Machine
//!
//! ```text
//!                    ┌─────────────┐
//!                    │  Unlinked   │
//!                    └──────┬──────┘
//!                           │ initialize(dispatcher)
//!                    ╔══════▼══════╗
//!                    ║   Linked    ║
//!                    ╚══════╤══════╝
//!                           │ relink(gi)
//!                    ╔══════▼══════╗
//!                    ║  Relinked   ║◀──┐ relink(gi)
//!                    ╚══════╤══════╝───┘
//!                           │ reset_and_relink
//!                    ┌──────▼──────┐
//!                    │    Reset    │  (terminal, every call re-resolves)
//!                    └─────────────┘
//! ```
//!
//! # Performance Characteristics
//!
//! - **Hit**: one atomic load plus a guard test per cached target
//! - **Miss**: a chain walk through the installed dispatcher
//! - **Reset**: a chain walk on every call, nothing is cached
//!
//! # Thread Safety
//!
//! Sites are `Send + Sync`. The target is held in an [`ArcSwap`]; readers
//! never lock. Concurrent relinks resolve last-writer-wins, but a Reset target
//! is never replaced.

use crate::descriptor::CallSiteDescriptor;
use crate::error::{InvokeResult, LinkError, LinkResult};
use crate::guarded::GuardedInvocation;
use crate::invocation::Invocation;
use arc_swap::ArcSwap;
use dynlink_runtime::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

// =============================================================================
// Dispatcher
// =============================================================================

/// Slow path installed into a call site.
///
/// Called on every miss. It resolves a target for `args`, installs it through
/// [`RelinkableCallSite::relink`] or [`RelinkableCallSite::reset_and_relink`],
/// and invokes it.
pub trait RelinkDispatcher: Send + Sync {
    fn relink_and_invoke(self: Arc<Self>, site: &RelinkableCallSite, args: &[Value]) -> InvokeResult<Value>;
}

/// Shared dispatcher handle.
pub type DispatcherRef = Arc<dyn RelinkDispatcher>;

// =============================================================================
// Phase / Classification
// =============================================================================

/// Lifecycle phase of a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSitePhase {
    /// Created; no dispatcher installed yet.
    Unlinked,
    /// Dispatcher installed, with at most one target installed so far.
    Linked,
    /// Target replaced at least once.
    Relinked,
    /// Megamorphic; every call re-resolves.
    Reset,
}

/// Shape of the cached targets, for tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteClassification {
    Uninitialized,
    Monomorphic,
    Polymorphic,
    Megamorphic,
}

// =============================================================================
// Target
// =============================================================================

enum SiteTarget {
    Unlinked,
    Linked {
        /// Newest first.
        entries: SmallVec<[GuardedInvocation; 1]>,
        dispatcher: DispatcherRef,
    },
    Reset {
        dispatcher: DispatcherRef,
    },
}

/// Where a call goes once the target has been read.
enum Route {
    Target(Invocation),
    Dispatch(DispatcherRef),
}

// =============================================================================
// Call Site
// =============================================================================

/// A call site whose target can be replaced while it is being invoked.
pub struct RelinkableCallSite {
    descriptor: Arc<CallSiteDescriptor>,
    target: ArcSwap<SiteTarget>,
    /// Target installations, the first link included.
    relinks: AtomicU32,
    hits: AtomicU64,
    misses: AtomicU64,
    max_chain_length: usize,
}

impl RelinkableCallSite {
    /// A monomorphic call site.
    pub fn new(descriptor: impl Into<Arc<CallSiteDescriptor>>) -> Self {
        Self::chained(descriptor, 1)
    }

    /// A call site keeping up to `max_chain_length` guarded targets.
    pub fn chained(descriptor: impl Into<Arc<CallSiteDescriptor>>, max_chain_length: usize) -> Self {
        Self {
            descriptor: descriptor.into(),
            target: ArcSwap::from_pointee(SiteTarget::Unlinked),
            relinks: AtomicU32::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            max_chain_length: max_chain_length.max(1),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<CallSiteDescriptor> {
        &self.descriptor
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Install the relink dispatcher. Exactly one caller succeeds.
    pub fn initialize(&self, dispatcher: DispatcherRef) -> LinkResult<()> {
        let current = self.target.load_full();
        if !matches!(&*current, SiteTarget::Unlinked) {
            return Err(LinkError::AlreadyInitialized);
        }
        let next = Arc::new(SiteTarget::Linked {
            entries: SmallVec::new(),
            dispatcher,
        });
        let previous = self.target.compare_and_swap(&current, next);
        if !Arc::ptr_eq(&*previous, &current) {
            return Err(LinkError::AlreadyInitialized);
        }
        Ok(())
    }

    /// Install `gi` as the newest target.
    ///
    /// Returns `Ok(false)` if the site has been reset in the meantime.
    pub fn relink(&self, gi: GuardedInvocation, dispatcher: DispatcherRef) -> LinkResult<bool> {
        loop {
            let current = self.target.load_full();
            let entries = match &*current {
                SiteTarget::Unlinked => return Err(LinkError::Uninitialized),
                SiteTarget::Reset { .. } => return Ok(false),
                SiteTarget::Linked { entries, .. } => self.next_entries(&gi, entries),
            };
            let next = Arc::new(SiteTarget::Linked {
                entries,
                dispatcher: dispatcher.clone(),
            });
            let previous = self.target.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                self.relinks.fetch_add(1, Ordering::Relaxed);
                return Ok(true);
            }
        }
    }

    /// Drop every cached target and dispatch each later call through
    /// `dispatcher`. Returns `true` for the call that made the transition.
    pub fn reset_and_relink(&self, dispatcher: DispatcherRef) -> LinkResult<bool> {
        loop {
            let current = self.target.load_full();
            match &*current {
                SiteTarget::Unlinked => return Err(LinkError::Uninitialized),
                SiteTarget::Reset { .. } => return Ok(false),
                SiteTarget::Linked { .. } => {}
            }
            let next = Arc::new(SiteTarget::Reset {
                dispatcher: dispatcher.clone(),
            });
            let previous = self.target.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                return Ok(true);
            }
        }
    }

    fn next_entries(
        &self,
        gi: &GuardedInvocation,
        old: &[GuardedInvocation],
    ) -> SmallVec<[GuardedInvocation; 1]> {
        let mut entries = SmallVec::new();
        entries.push(gi.clone());
        if gi.is_unguarded() {
            return entries;
        }
        entries.extend(
            old.iter()
                .filter(|e| !e.has_been_invalidated() && e.guard() != gi.guard())
                .take(self.max_chain_length - 1)
                .cloned(),
        );
        entries
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Invoke the current target, relinking through the dispatcher on a miss.
    pub fn invoke(&self, args: &[Value]) -> InvokeResult<Value> {
        let route = {
            let target = self.target.load();
            match &**target {
                SiteTarget::Unlinked => return Err(LinkError::Uninitialized.into()),
                SiteTarget::Reset { dispatcher } => Route::Dispatch(dispatcher.clone()),
                SiteTarget::Linked {
                    entries,
                    dispatcher,
                } => match entries.iter().find(|e| e.is_valid_for(args)) {
                    Some(hit) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        Route::Target(hit.invocation().clone())
                    }
                    None => {
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        match entries.first().and_then(GuardedInvocation::fallback) {
                            Some(fallback) => Route::Target(fallback.clone()),
                            None => Route::Dispatch(dispatcher.clone()),
                        }
                    }
                },
            }
        };
        match route {
            Route::Target(invocation) => invocation.invoke(args),
            Route::Dispatch(dispatcher) => dispatcher.relink_and_invoke(self, args),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn phase(&self) -> CallSitePhase {
        match &**self.target.load() {
            SiteTarget::Unlinked => CallSitePhase::Unlinked,
            SiteTarget::Reset { .. } => CallSitePhase::Reset,
            SiteTarget::Linked { .. } => match self.relink_count() {
                0 | 1 => CallSitePhase::Linked,
                _ => CallSitePhase::Relinked,
            },
        }
    }

    /// Number of target installations, the first link included.
    #[inline]
    pub fn relink_count(&self) -> u32 {
        self.relinks.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of cached targets.
    pub fn entry_count(&self) -> usize {
        match &**self.target.load() {
            SiteTarget::Linked { entries, .. } => entries.len(),
            _ => 0,
        }
    }

    pub fn classification(&self) -> SiteClassification {
        match &**self.target.load() {
            SiteTarget::Unlinked => SiteClassification::Uninitialized,
            SiteTarget::Reset { .. } => SiteClassification::Megamorphic,
            SiteTarget::Linked { entries, .. } => match entries.len() {
                0 => SiteClassification::Uninitialized,
                1 => SiteClassification::Monomorphic,
                _ => SiteClassification::Polymorphic,
            },
        }
    }

    #[inline]
    pub fn max_chain_length(&self) -> usize {
        self.max_chain_length
    }

    #[inline]
    pub fn is_reset(&self) -> bool {
        matches!(&**self.target.load(), SiteTarget::Reset { .. })
    }
}

impl fmt::Debug for RelinkableCallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelinkableCallSite")
            .field("descriptor", &self.descriptor.to_string())
            .field("phase", &self.phase())
            .field("entries", &self.entry_count())
            .field("relinks", &self.relink_count())
            .finish()
    }
}
