//! Generic introspection linker.
//!
//! The beans linker is the default fallback of every chain. It links:
//!
//! - GET / SET / REMOVE over the PROPERTY, METHOD and ELEMENT namespaces, in
//!   the operation's namespace order
//! - CALL on function values, and `CALL:METHOD:name` on any receiver with a
//!   bean class
//! - NEW on constructible classes
//!
//! Every target is guarded on the identity of the receiver's type.

mod access;
mod element;
mod missing;

pub use missing::{DefaultMissingMemberHandler, MissingMemberHandler};

use crate::error::{LinkError, LinkResult};
use crate::guard::Guard;
use crate::guarded::GuardedInvocation;
use crate::invocation::Invocation;
use crate::linker::{GuardingDynamicLinker, LinkRequest};
use crate::method_type::MethodType;
use crate::operation::{Name, Namespace, StandardOperation};
use crate::services::LinkerServices;
use access::MemberQuery;
use dynlink_runtime::{RuntimeError, TypeKind, Value};
use smallvec::SmallVec;
use std::sync::Arc;

/// Which property accessor wins when a class declares both an explicit
/// accessor and a conventional `getX`/`isX`/`setX` method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessorPrecedence {
    /// Explicit accessors shadow conventional methods.
    #[default]
    OverrideFirst,
    /// Conventional methods shadow explicit accessors.
    ConventionFirst,
}

/// Fallback linker over bean classes, sequences and mappings.
#[derive(Debug, Clone)]
pub struct BeansLinker {
    precedence: AccessorPrecedence,
    missing: Arc<dyn MissingMemberHandler>,
}

impl Default for BeansLinker {
    fn default() -> Self {
        Self {
            precedence: AccessorPrecedence::default(),
            missing: Arc::new(DefaultMissingMemberHandler),
        }
    }
}

impl BeansLinker {
    pub fn with_precedence(mut self, precedence: AccessorPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_missing_member_handler(mut self, handler: Arc<dyn MissingMemberHandler>) -> Self {
        self.missing = handler;
        self
    }

    #[inline]
    pub fn precedence(&self) -> AccessorPrecedence {
        self.precedence
    }

    // =========================================================================
    // GET / SET / REMOVE
    // =========================================================================

    fn link_access(&self, request: &LinkRequest, receiver: &Value) -> LinkResult<Option<GuardedInvocation>> {
        let operation = request.descriptor().operation();
        let verb = operation.base_operation();
        if operation.namespaces().is_empty() {
            return Ok(None);
        }

        let argc = request.arguments().len();
        let expected = match (operation.is_named(), verb) {
            (true, StandardOperation::Set) => 2,
            (true, _) => 1,
            (false, StandardOperation::Set) => 3,
            (false, _) => 2,
        };
        if argc != expected {
            return Err(LinkError::InvalidOperation(format!(
                "{operation} takes {expected} arguments, got {argc}"
            )));
        }

        let privileged = request.descriptor().lookup().is_privileged();
        let guard = Guard::type_of(0, receiver);
        let ty = MethodType::generic(argc);
        let label = operation.to_string();

        let Some(name) = operation.name() else {
            return Ok(Some(GuardedInvocation::guarded(
                self.unnamed_access(label, ty, verb, operation.namespaces(), privileged),
                guard,
            )));
        };

        let key = name.to_value();
        let query = MemberQuery {
            verb,
            receiver,
            key: &key,
            privileged,
            precedence: self.precedence,
        };
        let resolution = access::resolve(operation.namespaces(), &query);
        if resolution.components.is_empty() {
            if resolution.denied {
                return Err(denied(name, receiver));
            }
            return self.missing.missing_member(request, name);
        }

        let (components, handler) = (resolution.components, self.missing.clone());
        let invocation = Invocation::from_runtime(label, ty, move |args| {
            let (receiver, value) = (&args[0], args.get(1));
            access::apply(&components, receiver, value)
                .unwrap_or_else(|| handler.missing_element(verb, receiver, &key, value))
        });
        Ok(Some(GuardedInvocation::guarded(invocation, guard)))
    }

    /// The key is argument 1, so members are resolved on every call.
    fn unnamed_access(
        &self,
        label: String,
        ty: MethodType,
        verb: StandardOperation,
        namespaces: &[Namespace],
        privileged: bool,
    ) -> Invocation {
        let namespaces: SmallVec<[Namespace; 3]> = namespaces.iter().copied().collect();
        let (precedence, handler) = (self.precedence, self.missing.clone());
        Invocation::new(label, ty, move |args| {
            let (receiver, key, value) = (&args[0], &args[1], args.get(2));
            let query = MemberQuery {
                verb,
                receiver,
                key,
                privileged,
                precedence,
            };
            let resolution = access::resolve(&namespaces, &query);
            if resolution.components.is_empty()
                && resolution.denied
                && let Some(name) = Name::from_value(key)
            {
                return Err(denied(&name, receiver).into());
            }
            let result = access::apply(&resolution.components, receiver, value)
                .unwrap_or_else(|| handler.missing_element(verb, receiver, key, value));
            Ok(result?)
        })
    }

    // =========================================================================
    // CALL / NEW
    // =========================================================================

    fn link_call(&self, request: &LinkRequest, receiver: &Value) -> LinkResult<Option<GuardedInvocation>> {
        let operation = request.descriptor().operation();
        let argc = request.arguments().len();

        if let Some(name) = operation.name() {
            if !operation.namespaces().contains(&Namespace::METHOD) {
                return Ok(None);
            }
            let (Some(method_name), Some(class)) = (name.as_str(), receiver.bean_class()) else {
                return Ok(None);
            };
            let Some(method) = class.find_method(method_name, argc - 1) else {
                return self.missing.missing_member(request, name);
            };
            if !request.descriptor().lookup().is_privileged() && !class.is_accessible(&method) {
                return Err(denied(name, receiver));
            }
            let invocation = Invocation::from_runtime(operation.to_string(), MethodType::generic(argc), move |args| {
                method.invoke(&args[0], &args[1..])
            });
            return Ok(Some(GuardedInvocation::guarded(invocation, Guard::type_of(0, receiver))));
        }

        if !matches!(receiver, Value::Function(_)) {
            return Ok(None);
        }
        let invocation = Invocation::from_runtime("call", MethodType::generic(argc), |args| match &args[0] {
            Value::Function(f) => f.call(&args[1..]),
            other => Err(RuntimeError::NotCallable(other.type_name())),
        });
        Ok(Some(GuardedInvocation::guarded(
            invocation,
            Guard::KindIs {
                position: 0,
                kind: TypeKind::Function,
            },
        )))
    }

    fn link_new(&self, request: &LinkRequest, receiver: &Value) -> LinkResult<Option<GuardedInvocation>> {
        let Value::Class(class) = receiver else {
            return Ok(None);
        };
        if !class.is_constructible() {
            return Ok(None);
        }
        if !class.is_public() && !request.descriptor().lookup().is_privileged() {
            return Err(LinkError::AccessDenied(format!("constructor of {}", class.name())));
        }
        let argc = request.arguments().len();
        let invocation = Invocation::from_runtime(format!("new {}", class.name()), MethodType::generic(argc), |args| {
            match &args[0] {
                Value::Class(class) => class.instantiate(&args[1..]),
                other => Err(RuntimeError::type_mismatch("Class", other.type_name())),
            }
        });
        Ok(Some(GuardedInvocation::guarded(
            invocation,
            Guard::ClassIs {
                position: 0,
                type_id: class.type_id(),
            },
        )))
    }
}

fn denied(name: &Name, receiver: &Value) -> LinkError {
    LinkError::AccessDenied(format!("{name} on {}", receiver.type_name()))
}

impl GuardingDynamicLinker for BeansLinker {
    fn name(&self) -> &str {
        "beans"
    }

    fn link(&self, request: &LinkRequest, _services: &LinkerServices) -> LinkResult<Option<GuardedInvocation>> {
        let Some(receiver) = request.receiver() else {
            return Ok(None);
        };
        match request.descriptor().operation().base_operation() {
            StandardOperation::Get | StandardOperation::Set | StandardOperation::Remove => {
                self.link_access(request, receiver)
            }
            StandardOperation::Call => self.link_call(request, receiver),
            StandardOperation::New => self.link_new(request, receiver),
        }
    }
}
