//! Typed, shareable invocations and their combinators.
//!
//! An [`Invocation`] is a reference-counted callable with a [`MethodType`].
//! Combinators build new invocations around existing ones; the original is
//! shared, never copied.
//!
//! ```text
//! filter_argument(i, f):   args[i] ──f──▶ args[i]' ──▶ target
//! filter_return(f):        target ──▶ result ──f──▶ result'
//! insert_argument(i, v):   args ──insert v at i──▶ target
//! drop_arguments(i, ts):   args ──remove i..i+len(ts)──▶ target
//! guard_with_test(g, t, f): g(args) ? t(args) : f(args)
//! ```

use crate::error::{InvokeError, InvokeResult, LinkError, LinkResult};
use crate::guard::Guard;
use crate::method_type::MethodType;
use dynlink_runtime::{RuntimeError, TypeRef, Value};
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, Weak};

/// Invocation body. Argument count is validated before the body runs.
pub type InvocationBody = dyn Fn(&[Value]) -> InvokeResult<Value> + Send + Sync;

type ArgVec = SmallVec<[Value; 4]>;

struct InvocationInner {
    label: Arc<str>,
    ty: MethodType,
    body: Box<InvocationBody>,
}

/// Shared typed callable.
#[derive(Clone)]
pub struct Invocation(Arc<InvocationInner>);

/// Non-owning handle to an [`Invocation`].
#[derive(Clone, Default)]
pub struct WeakInvocation(Weak<InvocationInner>);

impl WeakInvocation {
    pub fn upgrade(&self) -> Option<Invocation> {
        self.0.upgrade().map(Invocation)
    }

    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Invocation {
    pub fn new(
        label: impl Into<Arc<str>>,
        ty: MethodType,
        body: impl Fn(&[Value]) -> InvokeResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(InvocationInner {
            label: label.into(),
            ty,
            body: Box::new(body),
        }))
    }

    /// Invocation whose body only raises runtime errors.
    pub fn from_runtime(
        label: impl Into<Arc<str>>,
        ty: MethodType,
        body: impl Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(label, ty, move |args| Ok(body(args)?))
    }

    /// `(T)T` pass-through.
    pub fn identity(ty: TypeRef) -> Self {
        Self::new("identity", MethodType::new(ty.clone(), [ty]), |args| {
            Ok(args[0].clone())
        })
    }

    /// `()R` returning a fixed value.
    pub fn constant(ret: TypeRef, value: Value) -> Self {
        Self::new("constant", MethodType::new(ret, []), move |_| Ok(value.clone()))
    }

    /// Invocation that always fails with `error`.
    pub fn throwing(ty: MethodType, error: RuntimeError) -> Self {
        Self::new("throwing", ty, move |_| Err(error.clone().into()))
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.0.label
    }

    #[inline]
    pub fn method_type(&self) -> &MethodType {
        &self.0.ty
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.0.ty.parameter_count()
    }

    /// Invoke with argument count validation.
    #[inline]
    pub fn invoke(&self, args: &[Value]) -> InvokeResult<Value> {
        let expected = self.arity();
        if args.len() != expected {
            return Err(InvokeError::Arity {
                label: self.label().to_string(),
                expected,
                found: args.len(),
            });
        }
        (self.0.body)(args)
    }

    pub fn downgrade(&self) -> WeakInvocation {
        WeakInvocation(Arc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Invocation) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // =========================================================================
    // Combinators
    // =========================================================================

    /// Same behavior under a different shape with the same arity.
    pub fn with_type(&self, ty: MethodType) -> LinkResult<Self> {
        if ty.parameter_count() != self.arity() {
            return Err(LinkError::TypeMismatch(format!(
                "cannot retype {} {} as {ty}",
                self.label(),
                self.method_type()
            )));
        }
        let target = self.clone();
        Ok(Self::new(self.0.label.clone(), ty, move |args| (target.0.body)(args)))
    }

    /// Pass argument `index` through `filter` (a `(S)T` invocation) first.
    pub fn filter_argument(&self, index: usize, filter: &Invocation) -> LinkResult<Self> {
        let filter_param = filter.method_type().parameter(0).cloned();
        let (Some(param), 1) = (filter_param, filter.arity()) else {
            return Err(LinkError::TypeMismatch(format!(
                "argument filter {} must take one parameter",
                filter.label()
            )));
        };
        if index >= self.arity() {
            return Err(LinkError::TypeMismatch(format!(
                "argument {index} out of range for {}",
                self.method_type()
            )));
        }
        let ty = self.method_type().change_parameter(index, param);
        let (target, filter) = (self.clone(), filter.clone());
        Ok(Self::new(self.0.label.clone(), ty, move |args| {
            let mut filtered: ArgVec = args.iter().cloned().collect();
            filtered[index] = (filter.0.body)(&args[index..=index])?;
            (target.0.body)(&filtered)
        }))
    }

    /// Pass the result through `filter` (a `(R)T` invocation).
    pub fn filter_return(&self, filter: &Invocation) -> LinkResult<Self> {
        if filter.arity() != 1 {
            return Err(LinkError::TypeMismatch(format!(
                "return filter {} must take one parameter",
                filter.label()
            )));
        }
        let ty = self
            .method_type()
            .change_return_type(filter.method_type().return_type().clone());
        let (target, filter) = (self.clone(), filter.clone());
        Ok(Self::new(self.0.label.clone(), ty, move |args| {
            let result = (target.0.body)(args)?;
            (filter.0.body)(std::slice::from_ref(&result))
        }))
    }

    /// Bind `value` as argument `index`; the result takes one fewer argument.
    pub fn insert_argument(&self, index: usize, value: Value) -> LinkResult<Self> {
        if index >= self.arity() {
            return Err(LinkError::TypeMismatch(format!(
                "cannot bind argument {index} of {}",
                self.method_type()
            )));
        }
        let ty = self.method_type().drop_parameters(index..index + 1);
        let target = self.clone();
        Ok(Self::new(self.0.label.clone(), ty, move |args| {
            let mut bound: ArgVec = SmallVec::with_capacity(args.len() + 1);
            bound.extend(args[..index].iter().cloned());
            bound.push(value.clone());
            bound.extend(args[index..].iter().cloned());
            (target.0.body)(&bound)
        }))
    }

    /// Accept extra arguments of `types` at `index` and ignore them.
    pub fn drop_arguments(&self, index: usize, types: &[TypeRef]) -> Self {
        let index = index.min(self.arity());
        let mut ty = self.method_type().clone();
        for (offset, t) in types.iter().enumerate() {
            ty = ty.insert_parameter(index + offset, t.clone());
        }
        let count = types.len();
        let target = self.clone();
        Self::new(self.0.label.clone(), ty, move |args| {
            let kept: ArgVec = args[..index]
                .iter()
                .chain(&args[index + count..])
                .cloned()
                .collect();
            (target.0.body)(&kept)
        })
    }

    /// `guard(args) ? target(args) : fallback(args)`. Both branches must have
    /// the same arity.
    pub fn guard_with_test(guard: Guard, target: &Invocation, fallback: &Invocation) -> LinkResult<Self> {
        if target.arity() != fallback.arity() {
            return Err(LinkError::TypeMismatch(format!(
                "guarded target {} and fallback {} differ in arity",
                target.method_type(),
                fallback.method_type()
            )));
        }
        let (t, f) = (target.clone(), fallback.clone());
        Ok(Self::new(
            target.0.label.clone(),
            target.method_type().clone(),
            move |args| {
                if guard.test(args) {
                    (t.0.body)(args)
                } else {
                    (f.0.body)(args)
                }
            },
        ))
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invocation({}{})", self.label(), self.method_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynlink_runtime::{RuntimeType, TypeKind};

    fn add() -> Invocation {
        Invocation::from_runtime("add", MethodType::generic(2), |args| {
            match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                (a, _) => Err(RuntimeError::type_mismatch("Int", a.type_name())),
            }
        })
    }

    fn double() -> Invocation {
        Invocation::from_runtime("double", MethodType::generic(1), |args| {
            Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))
        })
    }

    #[test]
    fn test_arity_is_validated() {
        let err = add().invoke(&[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, InvokeError::Arity { expected: 2, found: 1, .. }));
    }

    #[test]
    fn test_filters() {
        let f = add().filter_argument(1, &double()).unwrap();
        assert_eq!(f.invoke(&[Value::Int(1), Value::Int(10)]), Ok(Value::Int(21)));

        let g = add().filter_return(&double()).unwrap();
        assert_eq!(g.invoke(&[Value::Int(1), Value::Int(2)]), Ok(Value::Int(6)));
    }

    #[test]
    fn test_insert_and_drop() {
        let inc = add().insert_argument(0, Value::Int(1)).unwrap();
        assert_eq!(inc.arity(), 1);
        assert_eq!(inc.invoke(&[Value::Int(41)]), Ok(Value::Int(42)));

        let ignoring = inc.drop_arguments(0, &[RuntimeType::str()]);
        assert_eq!(ignoring.method_type().to_string(), "(Str, Any)Any");
        assert_eq!(ignoring.invoke(&[Value::str("x"), Value::Int(1)]), Ok(Value::Int(2)));
    }

    #[test]
    fn test_guard_with_test() {
        let guard = Guard::KindIs {
            position: 0,
            kind: TypeKind::Int,
        };
        let fallback = Invocation::constant(RuntimeType::any(), Value::str("other"))
            .drop_arguments(0, &[RuntimeType::any()]);
        let g = Invocation::guard_with_test(guard, &double(), &fallback).unwrap();
        assert_eq!(g.invoke(&[Value::Int(4)]), Ok(Value::Int(8)));
        assert_eq!(g.invoke(&[Value::Null]), Ok(Value::str("other")));
    }

    #[test]
    fn test_weak_handle_does_not_retain() {
        let inv = double();
        let weak = inv.downgrade();
        assert!(weak.upgrade().is_some_and(|i| i.ptr_eq(&inv)));
        drop(inv);
        assert!(!weak.is_live());
    }
}
