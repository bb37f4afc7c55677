//! Native function values.

use crate::error::{Result, RuntimeError};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Body of a native function.
pub type FunctionBody = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A callable value: a host function or a method bound to its receiver.
pub struct NativeFunction {
    name: Arc<str>,
    /// Required argument count, `None` for variadic.
    arity: Option<usize>,
    body: Arc<FunctionBody>,
}

impl NativeFunction {
    /// Create a function with a fixed arity.
    pub fn new(
        name: impl Into<Arc<str>>,
        arity: usize,
        body: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity: Some(arity),
            body: Arc::new(body),
        }
    }

    /// Create a function accepting any number of arguments.
    pub fn variadic(
        name: impl Into<Arc<str>>,
        body: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity: None,
            body: Arc::new(body),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Call with argument count validation.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        if let Some(expected) = self.arity
            && expected != args.len()
        {
            return Err(RuntimeError::Arity {
                name: self.name.to_string(),
                expected,
                found: args.len(),
            });
        }
        (self.body)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}
