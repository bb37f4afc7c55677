//! Calling-convention shapes.
//!
//! A [`MethodType`] is a return type plus an ordered parameter list. Position
//! 0 is the receiver for GET/SET/REMOVE, the callee for CALL and the class for
//! NEW. Shapes compare by type id.

use dynlink_runtime::{RuntimeType, TypeRef};
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;

/// Return type plus ordered parameter types.
#[derive(Clone)]
pub struct MethodType {
    ret: TypeRef,
    params: SmallVec<[TypeRef; 4]>,
}

impl MethodType {
    pub fn new(ret: TypeRef, params: impl IntoIterator<Item = TypeRef>) -> Self {
        Self {
            ret,
            params: params.into_iter().collect(),
        }
    }

    /// `n` parameters of type `Any`, returning `Any`.
    pub fn generic(n: usize) -> Self {
        Self::new(RuntimeType::any(), (0..n).map(|_| RuntimeType::any()))
    }

    #[inline]
    pub fn return_type(&self) -> &TypeRef {
        &self.ret
    }

    #[inline]
    pub fn parameters(&self) -> &[TypeRef] {
        &self.params
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn parameter(&self, index: usize) -> Option<&TypeRef> {
        self.params.get(index)
    }

    pub fn change_return_type(&self, ret: TypeRef) -> Self {
        Self {
            ret,
            params: self.params.clone(),
        }
    }

    /// Replace parameter `index`. Out-of-range indices leave the shape as is.
    pub fn change_parameter(&self, index: usize, ty: TypeRef) -> Self {
        let mut params = self.params.clone();
        if let Some(slot) = params.get_mut(index) {
            *slot = ty;
        }
        Self {
            ret: self.ret.clone(),
            params,
        }
    }

    /// Insert a parameter at `index`, clamped to the parameter count.
    pub fn insert_parameter(&self, index: usize, ty: TypeRef) -> Self {
        let mut params = self.params.clone();
        params.insert(index.min(params.len()), ty);
        Self {
            ret: self.ret.clone(),
            params,
        }
    }

    /// Remove the parameters in `range`, clamped to the parameter count.
    pub fn drop_parameters(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.params.len());
        let start = range.start.min(end);
        let mut params = self.params.clone();
        params.drain(start..end);
        Self {
            ret: self.ret.clone(),
            params,
        }
    }

    /// Check if a call with shape `self` may invoke a target of shape
    /// `target` without conversion: same arity, every argument assignable to
    /// the target's parameter and the target's result assignable to the
    /// expected result.
    pub fn is_call_compatible(&self, target: &MethodType) -> bool {
        self.params.len() == target.params.len()
            && self
                .params
                .iter()
                .zip(&target.params)
                .all(|(arg, param)| param.is_assignable_from(arg))
            && self.ret.is_assignable_from(&target.ret)
    }
}

impl PartialEq for MethodType {
    fn eq(&self, other: &Self) -> bool {
        self.ret.id() == other.ret.id()
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.id() == b.id())
    }
}

impl Eq for MethodType {}

impl Hash for MethodType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ret.id().hash(state);
        for p in &self.params {
            p.id().hash(state);
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, "){}", self.ret)
    }
}

impl fmt::Debug for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodType{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_edits() {
        let mt = MethodType::generic(2);
        assert_eq!(mt.to_string(), "(Any, Any)Any");

        let narrowed = mt.change_parameter(1, RuntimeType::str());
        assert_eq!(narrowed.to_string(), "(Any, Str)Any");
        assert_ne!(narrowed, mt);

        let inserted = narrowed.insert_parameter(9, RuntimeType::int());
        assert_eq!(inserted.parameter_count(), 3);
        assert_eq!(inserted.drop_parameters(1..3), MethodType::generic(1));
    }

    #[test]
    fn test_call_compatibility() {
        let site = MethodType::new(RuntimeType::any(), [RuntimeType::int()]);
        let target = MethodType::new(RuntimeType::int(), [RuntimeType::any()]);
        assert!(site.is_call_compatible(&target));
        assert!(!target.is_call_compatible(&site));
    }
}
