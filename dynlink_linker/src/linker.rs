//! The linker interface.

use crate::descriptor::CallSiteDescriptor;
use crate::error::LinkResult;
use crate::guarded::GuardedInvocation;
use crate::services::LinkerServices;
use dynlink_runtime::{RuntimeType, TypeRef, Value};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Link Request
// =============================================================================

/// A request to link one call at one site.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    descriptor: Arc<CallSiteDescriptor>,
    arguments: Vec<Value>,
    /// Set once the site has relinked past the unstable threshold; linkers
    /// may then prefer a less specialized target.
    call_site_unstable: bool,
}

impl LinkRequest {
    pub fn new(descriptor: Arc<CallSiteDescriptor>, arguments: Vec<Value>, call_site_unstable: bool) -> Self {
        Self {
            descriptor,
            arguments,
            call_site_unstable,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<CallSiteDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Argument 0: the receiver, callee or class.
    #[inline]
    pub fn receiver(&self) -> Option<&Value> {
        self.arguments.first()
    }

    #[inline]
    pub fn is_call_site_unstable(&self) -> bool {
        self.call_site_unstable
    }

    /// Same request with a different descriptor and arguments.
    pub fn replace_arguments(&self, descriptor: Arc<CallSiteDescriptor>, arguments: Vec<Value>) -> Self {
        Self {
            descriptor,
            arguments,
            call_site_unstable: self.call_site_unstable,
        }
    }
}

// =============================================================================
// Linker Trait
// =============================================================================

/// A pluggable linker.
///
/// `link` returns `Ok(None)` to decline, letting the next linker in the chain
/// try. An `Err` aborts the whole link attempt.
pub trait GuardingDynamicLinker: Send + Sync + fmt::Debug {
    /// Stable name, used for deduplication and diagnostics.
    fn name(&self) -> &str;

    /// Pre-filter on the receiver type. Linkers that return `false` are not
    /// asked to link.
    fn can_link_type(&self, _ty: &RuntimeType) -> bool {
        true
    }

    fn link(&self, request: &LinkRequest, services: &LinkerServices) -> LinkResult<Option<GuardedInvocation>>;

    /// Whether this linker takes part in type conversion.
    fn offers_conversions(&self) -> bool {
        false
    }

    /// Produce a `(source)target` converter, or decline.
    fn convert(&self, _source: &TypeRef, _target: &TypeRef) -> LinkResult<Option<GuardedInvocation>> {
        Ok(None)
    }
}

/// Shared linker handle.
pub type LinkerRef = Arc<dyn GuardingDynamicLinker>;
