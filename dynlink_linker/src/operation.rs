//! Operation model.
//!
//! An operation is what a call site asks for: a verb, optionally restricted
//! to an ordered list of namespaces, optionally bound to a fixed name.
//!
//! ```text
//! Named { base: Namespace { base: Standard(Get), [PROPERTY, ELEMENT] }, "color" }
//!   displays as  GET:PROPERTY|ELEMENT:color
//! ```
//!
//! Namespace order is significant: `GET:ELEMENT|PROPERTY` and
//! `GET:PROPERTY|ELEMENT` are distinct operations that resolve differently.

use crate::error::{LinkError, LinkResult};
use dynlink_runtime::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Verbs
// =============================================================================

/// The standard verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardOperation {
    Get,
    Set,
    Remove,
    Call,
    New,
}

impl StandardOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            StandardOperation::Get => "GET",
            StandardOperation::Set => "SET",
            StandardOperation::Remove => "REMOVE",
            StandardOperation::Call => "CALL",
            StandardOperation::New => "NEW",
        }
    }
}

impl fmt::Display for StandardOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Namespaces
// =============================================================================

/// Partition of named members. Hosts may define their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace(&'static str);

impl Namespace {
    pub const PROPERTY: Self = Self("PROPERTY");
    pub const METHOD: Self = Self("METHOD");
    pub const ELEMENT: Self = Self("ELEMENT");

    /// Define a host-specific namespace.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[inline]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

// =============================================================================
// Names
// =============================================================================

/// Fixed qualifier of a named operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Name {
    Str(Arc<str>),
    Index(i64),
}

impl Name {
    /// The qualifier as a value, as it would be passed to an unnamed operation.
    pub fn to_value(&self) -> Value {
        match self {
            Name::Str(s) => Value::Str(s.clone()),
            Name::Index(i) => Value::Int(*i),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Name::Str(s) => Some(s),
            Name::Index(_) => None,
        }
    }

    /// Convert a call argument into a qualifier.
    pub fn from_value(value: &Value) -> Option<Name> {
        match value {
            Value::Str(s) => Some(Name::Str(s.clone())),
            Value::Int(i) => Some(Name::Index(*i)),
            _ => None,
        }
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::Str(s.into())
    }
}

impl From<i64> for Name {
    fn from(i: i64) -> Self {
        Name::Index(i)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Str(s) => f.write_str(s),
            Name::Index(i) => write!(f, "{i}"),
        }
    }
}

// =============================================================================
// Operation
// =============================================================================

/// What a call site requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Standard(StandardOperation),
    Namespace {
        base: StandardOperation,
        namespaces: SmallVec<[Namespace; 3]>,
    },
    Named {
        base: Box<Operation>,
        name: Name,
    },
}

impl From<StandardOperation> for Operation {
    fn from(op: StandardOperation) -> Self {
        Operation::Standard(op)
    }
}

impl Operation {
    /// Restrict to a single namespace.
    pub fn with_namespace(self, namespace: Namespace) -> Self {
        self.rebase(&[namespace])
    }

    /// Restrict to an ordered list of namespaces. The name, if any, is kept.
    pub fn with_namespaces(self, namespaces: &[Namespace]) -> LinkResult<Self> {
        if namespaces.is_empty() {
            return Err(LinkError::InvalidOperation(format!(
                "{self} composed with zero namespaces"
            )));
        }
        Ok(self.rebase(namespaces))
    }

    fn rebase(self, namespaces: &[Namespace]) -> Self {
        match self {
            Operation::Named { base, name } => Operation::Named {
                base: Box::new(base.rebase(namespaces)),
                name,
            },
            other => Operation::Namespace {
                base: other.base_operation(),
                namespaces: namespaces.iter().copied().collect(),
            },
        }
    }

    /// Bind a fixed name, replacing any existing one.
    pub fn named(self, name: impl Into<Name>) -> Self {
        Operation::Named {
            base: Box::new(self.unnamed()),
            name: name.into(),
        }
    }

    /// Remove the fixed name, if any.
    pub fn unnamed(self) -> Self {
        match self {
            Operation::Named { base, .. } => *base,
            other => other,
        }
    }

    pub fn base_operation(&self) -> StandardOperation {
        match self {
            Operation::Standard(op) => *op,
            Operation::Namespace { base, .. } => *base,
            Operation::Named { base, .. } => base.base_operation(),
        }
    }

    pub fn name(&self) -> Option<&Name> {
        match self {
            Operation::Named { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Namespaces in resolution order. Empty for a bare verb.
    pub fn namespaces(&self) -> &[Namespace] {
        match self {
            Operation::Standard(_) => &[],
            Operation::Namespace { namespaces, .. } => namespaces,
            Operation::Named { base, .. } => base.namespaces(),
        }
    }

    /// Check if this is `verb` over a namespace list containing `namespace`.
    pub fn contains(&self, verb: StandardOperation, namespace: Namespace) -> bool {
        self.base_operation() == verb && self.namespaces().contains(&namespace)
    }

    pub fn is_named(&self) -> bool {
        self.name().is_some()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Standard(op) => write!(f, "{op}"),
            Operation::Namespace { base, namespaces } => {
                write!(f, "{base}:")?;
                for (i, ns) in namespaces.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{ns}")?;
                }
                Ok(())
            }
            Operation::Named { base, name } => write!(f, "{base}:{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StandardOperation::*;

    #[test]
    fn test_composition_and_introspection() {
        let op = Operation::from(Get)
            .with_namespaces(&[Namespace::PROPERTY, Namespace::ELEMENT])
            .unwrap()
            .named("color");
        assert_eq!(op.base_operation(), Get);
        assert_eq!(op.name(), Some(&Name::from("color")));
        assert_eq!(op.namespaces(), &[Namespace::PROPERTY, Namespace::ELEMENT]);
        assert!(op.contains(Get, Namespace::ELEMENT));
        assert!(!op.contains(Set, Namespace::ELEMENT));
        assert_eq!(op.to_string(), "GET:PROPERTY|ELEMENT:color");

        let unnamed = op.clone().unnamed();
        assert_eq!(unnamed.name(), None);
        assert_eq!(unnamed.clone().named("color"), op);
    }

    #[test]
    fn test_namespace_order_is_significant() {
        let a = Operation::from(Get)
            .with_namespaces(&[Namespace::ELEMENT, Namespace::PROPERTY])
            .unwrap();
        let b = Operation::from(Get)
            .with_namespaces(&[Namespace::PROPERTY, Namespace::ELEMENT])
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_namespaces_is_invalid() {
        let err = Operation::from(Call).with_namespaces(&[]).unwrap_err();
        assert!(matches!(err, LinkError::InvalidOperation(_)));
    }

    #[test]
    fn test_renaming_keeps_namespaces() {
        let op = Operation::from(Set)
            .with_namespace(Namespace::ELEMENT)
            .named(3i64)
            .named("x");
        assert_eq!(op.to_string(), "SET:ELEMENT:x");
        let custom = Namespace::new("SLOT");
        let rebased = op.with_namespaces(&[custom]).unwrap();
        assert_eq!(rebased.to_string(), "SET:SLOT:x");
    }
}
