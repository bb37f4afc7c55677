//! Services handed to linkers while they link.

use crate::chain::LinkerChain;
use crate::conversion::TypeConverterFactory;
use crate::error::LinkResult;
use crate::guarded::GuardedInvocation;
use crate::invocation::Invocation;
use crate::linker::LinkRequest;
use crate::method_type::MethodType;
use dynlink_runtime::{TypeRef, Value};
use std::fmt;
use std::sync::Arc;

/// Wraps values crossing an engine boundary.
pub type InternalObjectsFilter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

struct ServicesInner {
    chain: LinkerChain,
    converters: TypeConverterFactory,
    internal_objects_filter: Option<InternalObjectsFilter>,
}

/// Linking services: type conversion, nested linking and object filtering.
#[derive(Clone)]
pub struct LinkerServices {
    inner: Arc<ServicesInner>,
}

impl LinkerServices {
    pub fn new(
        chain: LinkerChain,
        converters: TypeConverterFactory,
        internal_objects_filter: Option<InternalObjectsFilter>,
    ) -> Self {
        Self {
            inner: Arc::new(ServicesInner {
                chain,
                converters,
                internal_objects_filter,
            }),
        }
    }

    /// Adapt `invocation` to `method_type`, converting arguments and result.
    pub fn as_type(&self, invocation: &Invocation, method_type: &MethodType) -> LinkResult<Invocation> {
        self.inner.converters.as_type(invocation, method_type)
    }

    /// A `(source)target` converter.
    pub fn type_converter(&self, source: &TypeRef, target: &TypeRef) -> LinkResult<Invocation> {
        self.inner.converters.convert(source, target)
    }

    pub fn can_convert(&self, source: &TypeRef, target: &TypeRef) -> bool {
        self.inner.converters.can_convert(source, target)
    }

    /// Link `request` through the whole chain, as a call site would.
    pub fn guarded_invocation(&self, request: &LinkRequest) -> LinkResult<Option<GuardedInvocation>> {
        self.inner.chain.link(request, self)
    }

    /// Pass every argument and the result through the internal-objects
    /// filter. Without a filter, the invocation is returned unchanged.
    pub fn filter_internal_objects(&self, invocation: &Invocation) -> Invocation {
        let Some(filter) = self.inner.internal_objects_filter.clone() else {
            return invocation.clone();
        };
        let target = invocation.clone();
        Invocation::new(
            invocation.label().to_string(),
            invocation.method_type().clone(),
            move |args| {
                let filtered: Vec<Value> = args.iter().map(|a| filter(a)).collect();
                let result = target.invoke(&filtered)?;
                Ok(filter(&result))
            },
        )
    }

    #[inline]
    pub fn chain(&self) -> &LinkerChain {
        &self.inner.chain
    }

    #[inline]
    pub fn converter_factory(&self) -> &TypeConverterFactory {
        &self.inner.converters
    }
}

impl fmt::Debug for LinkerServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkerServices")
            .field("chain", &self.inner.chain.names())
            .field("internal_objects_filter", &self.inner.internal_objects_filter.is_some())
            .finish()
    }
}
