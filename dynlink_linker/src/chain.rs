//! Ordered linker chain.
//!
//! Linkers are consulted in registration order (prioritized, discovered,
//! fallback). The first linker to return a guarded invocation wins; a linker
//! error aborts the walk. Nothing is memoized across requests: every call
//! site owns its own cache.

use crate::error::LinkResult;
use crate::guarded::GuardedInvocation;
use crate::linker::{LinkRequest, LinkerRef};
use crate::services::LinkerServices;
use dynlink_runtime::Value;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default)]
pub struct LinkerChain {
    linkers: Vec<LinkerRef>,
}

impl LinkerChain {
    pub fn new(linkers: Vec<LinkerRef>) -> Self {
        Self { linkers }
    }

    #[inline]
    pub fn linkers(&self) -> &[LinkerRef] {
        &self.linkers
    }

    pub fn len(&self) -> usize {
        self.linkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.linkers.is_empty()
    }

    /// Linker names in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.linkers.iter().map(|l| l.name()).collect()
    }

    /// Linkers that take part in type conversion, in chain order.
    pub fn conversion_linkers(&self) -> Vec<LinkerRef> {
        self.linkers
            .iter()
            .filter(|l| l.offers_conversions())
            .cloned()
            .collect()
    }

    /// Ask each linker in turn until one produces a target.
    pub fn link(&self, request: &LinkRequest, services: &LinkerServices) -> LinkResult<Option<GuardedInvocation>> {
        let receiver_type = request.receiver().map(Value::runtime_type);
        let operation = request.descriptor().operation();

        for linker in &self.linkers {
            if let Some(ty) = &receiver_type
                && !linker.can_link_type(ty)
            {
                trace!(linker = linker.name(), receiver = %ty, "linker skips receiver type");
                continue;
            }
            trace!(linker = linker.name(), %operation, "trying linker");
            if let Some(gi) = linker.link(request, services)? {
                debug!(
                    linker = linker.name(),
                    %operation,
                    guarded = !gi.is_unguarded(),
                    "linked operation"
                );
                return Ok(Some(gi));
            }
        }
        trace!(%operation, "no linker applies");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::TypeConverterFactory;
    use crate::descriptor::{CallSiteDescriptor, Lookup};
    use crate::error::LinkError;
    use crate::guard::Guard;
    use crate::invocation::Invocation;
    use crate::method_type::MethodType;
    use crate::operation::{Operation, StandardOperation};
    use crate::stats::LinkerStats;
    use dynlink_runtime::{RuntimeType, TypeKind};
    use std::sync::Arc;

    /// Links only strings, answering with its own name.
    #[derive(Debug)]
    struct StrOnly(&'static str);

    impl crate::linker::GuardingDynamicLinker for StrOnly {
        fn name(&self) -> &str {
            self.0
        }

        fn can_link_type(&self, ty: &RuntimeType) -> bool {
            ty.kind() == TypeKind::Str
        }

        fn link(&self, _request: &LinkRequest, _services: &LinkerServices) -> LinkResult<Option<GuardedInvocation>> {
            let answer = Invocation::constant(RuntimeType::any(), Value::str(self.0));
            Ok(Some(GuardedInvocation::guarded(
                answer.drop_arguments(0, &[RuntimeType::any()]),
                Guard::KindIs {
                    position: 0,
                    kind: TypeKind::Str,
                },
            )))
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl crate::linker::GuardingDynamicLinker for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn link(&self, _request: &LinkRequest, _services: &LinkerServices) -> LinkResult<Option<GuardedInvocation>> {
            Err(LinkError::LinkerFailure {
                linker: "failing".into(),
                message: "boom".into(),
            })
        }
    }

    fn request(receiver: Value) -> LinkRequest {
        let descriptor = CallSiteDescriptor::new(
            Lookup::public("chain"),
            Operation::from(StandardOperation::Call),
            MethodType::generic(1),
        );
        LinkRequest::new(Arc::new(descriptor), vec![receiver], false)
    }

    fn services(chain: LinkerChain) -> LinkerServices {
        let converters = TypeConverterFactory::new(Vec::new(), Arc::new(LinkerStats::new()));
        LinkerServices::new(chain, converters, None)
    }

    #[test]
    fn test_first_producer_wins() {
        let chain = LinkerChain::new(vec![Arc::new(StrOnly("first")) as LinkerRef, Arc::new(StrOnly("second"))]);
        let services = services(chain.clone());
        let gi = chain.link(&request(Value::str("x")), &services).unwrap().unwrap();
        assert_eq!(gi.invocation().invoke(&[Value::str("x")]), Ok(Value::str("first")));
    }

    #[test]
    fn test_rejected_receiver_type_skips_linker() {
        let chain = LinkerChain::new(vec![Arc::new(StrOnly("strings")) as LinkerRef]);
        let services = services(chain.clone());
        assert_eq!(chain.link(&request(Value::Int(1)), &services).map(|gi| gi.is_none()), Ok(true));
    }

    #[test]
    fn test_linker_error_aborts_walk() {
        let chain = LinkerChain::new(vec![Arc::new(Failing) as LinkerRef, Arc::new(StrOnly("never"))]);
        let services = services(chain.clone());
        let err = chain.link(&request(Value::str("x")), &services).unwrap_err();
        assert!(matches!(err, LinkError::LinkerFailure { .. }));
    }
}
