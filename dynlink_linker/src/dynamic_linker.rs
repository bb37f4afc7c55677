//! The dynamic linker facade.
//!
//! A [`DynamicLinker`] owns the linker chain, the converter factory and the
//! relink policy. Linking a call site installs the linker's dispatcher; the
//! dispatcher then resolves, installs and invokes targets as the site misses.
//!
//! ```text
//! site.invoke(args) ── miss ──▶ dispatcher
//!                                 │ chain.link(request)
//!                                 │ prelink transform
//!                                 │ as_type(descriptor shape)
//!                                 ├── relinks < threshold ──▶ site.relink(gi)
//!                                 └── relinks ≥ threshold ──▶ site.reset_and_relink()
//!                                 ▼
//!                              gi.invoke(args)
//! ```

use crate::call_site::{RelinkDispatcher, RelinkableCallSite};
use crate::config::LinkerConfig;
use crate::descriptor::{CallSiteDescriptor, SourceLocation};
use crate::error::{InvokeResult, LinkError, LinkResult};
use crate::guarded::GuardedInvocation;
use crate::linker::LinkRequest;
use crate::services::LinkerServices;
use crate::stats::LinkerStats;
use dynlink_runtime::Value;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Rewrites the winning guarded invocation before it is installed.
pub type PrelinkTransformer =
    Arc<dyn Fn(GuardedInvocation, &LinkRequest, &LinkerServices) -> LinkResult<GuardedInvocation> + Send + Sync>;

// =============================================================================
// Relink Location Tracking
// =============================================================================

thread_local! {
    /// Locations of the call sites being linked on this thread, innermost last.
    static RELINKING: RefCell<SmallVec<[Option<SourceLocation>; 4]>> = RefCell::new(SmallVec::new());
}

/// Marks a call site as being linked for the lifetime of the guard.
struct RelinkScope;

impl RelinkScope {
    fn enter(location: Option<&SourceLocation>) -> Self {
        RELINKING.with(|stack| stack.borrow_mut().push(location.cloned()));
        RelinkScope
    }
}

impl Drop for RelinkScope {
    fn drop(&mut self) {
        RELINKING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

struct LinkerInner {
    services: LinkerServices,
    prelink: Option<PrelinkTransformer>,
    config: LinkerConfig,
    stats: Arc<LinkerStats>,
}

impl LinkerInner {
    /// Walk the chain for one call and adapt the result to the site's shape.
    fn resolve(&self, site: &RelinkableCallSite, args: &[Value], unstable: bool) -> LinkResult<GuardedInvocation> {
        let descriptor = site.descriptor();
        let request = LinkRequest::new(descriptor.clone(), args.to_vec(), unstable);

        let Some(gi) = self.services.guarded_invocation(&request)? else {
            self.stats.record_link_failure();
            let receiver = request
                .receiver()
                .map_or_else(|| "no receiver".to_string(), Value::type_name);
            return Err(LinkError::no_applicable(descriptor.operation(), receiver));
        };

        let gi = match &self.prelink {
            Some(transform) => transform(gi, &request, &self.services)?,
            None => gi,
        };

        gi.as_type(&self.services, descriptor.method_type())
            .map_err(|err| match err {
                LinkError::NoViableConversion { .. } => {
                    self.stats.record_link_failure();
                    LinkError::NoApplicableMethod {
                        operation: descriptor.operation().to_string(),
                        receiver: request
                            .receiver()
                            .map_or_else(|| "no receiver".to_string(), Value::type_name),
                        cause: Some(Box::new(err)),
                    }
                }
                other => other,
            })
    }
}

impl RelinkDispatcher for LinkerInner {
    fn relink_and_invoke(self: Arc<Self>, site: &RelinkableCallSite, args: &[Value]) -> InvokeResult<Value> {
        let _scope = RelinkScope::enter(site.descriptor().location());

        if site.is_reset() {
            self.stats.record_megamorphic_dispatch();
            let gi = self.resolve(site, args, true)?;
            return gi.invocation().invoke(args);
        }

        let relinks = site.relink_count();
        let unstable = self
            .config
            .unstable_relink_threshold
            .is_some_and(|threshold| relinks >= threshold);
        let gi = self.resolve(site, args, unstable)?;

        if unstable {
            if site.reset_and_relink(self.clone())? {
                self.stats.record_reset();
                info!(
                    site = %site.descriptor(),
                    relinks,
                    "call site went megamorphic"
                );
            }
            self.stats.record_megamorphic_dispatch();
        } else if site.relink(gi.clone(), self.clone())? {
            self.stats.record_link(relinks > 0);
            debug!(
                site = %site.descriptor(),
                target = gi.invocation().label(),
                relinks = relinks + 1,
                "installed call site target"
            );
        }

        gi.invocation().invoke(args)
    }
}

// =============================================================================
// Facade
// =============================================================================

/// Entry point for the host: links call sites and owns relink policy.
///
/// Created by [`DynamicLinkerFactory`](crate::factory::DynamicLinkerFactory).
#[derive(Clone)]
pub struct DynamicLinker {
    inner: Arc<LinkerInner>,
}

impl DynamicLinker {
    pub(crate) fn new(
        services: LinkerServices,
        prelink: Option<PrelinkTransformer>,
        config: LinkerConfig,
        stats: Arc<LinkerStats>,
    ) -> Self {
        Self {
            inner: Arc::new(LinkerInner {
                services,
                prelink,
                config,
                stats,
            }),
        }
    }

    /// Install this linker's dispatcher into `site`.
    ///
    /// The first invocation of the site resolves its initial target.
    pub fn link(&self, site: Arc<RelinkableCallSite>) -> LinkResult<Arc<RelinkableCallSite>> {
        site.initialize(self.inner.clone())?;
        debug!(site = %site.descriptor(), "linked call site");
        Ok(site)
    }

    /// Create a call site sized by this linker's configuration and link it.
    pub fn new_call_site(&self, descriptor: CallSiteDescriptor) -> LinkResult<Arc<RelinkableCallSite>> {
        let site = RelinkableCallSite::chained(descriptor, self.inner.config.max_chain_length);
        self.link(Arc::new(site))
    }

    #[inline]
    pub fn linker_services(&self) -> &LinkerServices {
        &self.inner.services
    }

    #[inline]
    pub fn stats(&self) -> &LinkerStats {
        &self.inner.stats
    }

    #[inline]
    pub fn config(&self) -> &LinkerConfig {
        &self.inner.config
    }

    /// Source location of the call site being linked on this thread, if any.
    ///
    /// Linkers and prelink transformers may call this while they run.
    pub fn linked_call_site_location() -> Option<SourceLocation> {
        RELINKING.with(|stack| stack.borrow().last().cloned().flatten())
    }
}

impl fmt::Debug for DynamicLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLinker")
            .field("services", &self.inner.services)
            .field("config", &self.inner.config)
            .finish()
    }
}
