//! Dynamic values.
//!
//! Scalars are stored inline; sequences, mappings, functions, classes and
//! bean instances are shared handles. Equality is structural for scalars and
//! collections and by identity for functions, classes and beans.

use crate::bean::{BeanClass, BeanObject};
use crate::builtins;
use crate::collections::{Key, MapObject, SeqObject};
use crate::function::NativeFunction;
use crate::types::{RuntimeType, TypeId, TypeKind, TypeRef};
use std::fmt;
use std::sync::Arc;

/// A value flowing through call sites.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Seq(Arc<SeqObject>),
    Map(Arc<MapObject>),
    Function(Arc<NativeFunction>),
    Class(Arc<BeanClass>),
    Bean(Arc<BeanObject>),
}

impl Value {
    // =========================================================================
    // Construction
    // =========================================================================

    pub fn str(s: &str) -> Self {
        Value::Str(s.into())
    }

    pub fn seq(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Seq(Arc::new(SeqObject::new(items.into_iter().collect())))
    }

    pub fn map(entries: impl IntoIterator<Item = (Key, Value)>) -> Self {
        Value::Map(Arc::new(entries.into_iter().collect()))
    }

    pub fn function(f: NativeFunction) -> Self {
        Value::Function(Arc::new(f))
    }

    // =========================================================================
    // Type Queries
    // =========================================================================

    /// Coarse kind of this value.
    pub fn kind(&self) -> TypeKind {
        match self {
            Value::Null => TypeKind::Null,
            Value::Bool(_) => TypeKind::Bool,
            Value::Int(_) => TypeKind::Int,
            Value::Float(_) => TypeKind::Float,
            Value::Str(_) => TypeKind::Str,
            Value::Seq(_) => TypeKind::Seq,
            Value::Map(_) => TypeKind::Map,
            Value::Function(_) => TypeKind::Function,
            Value::Class(_) => TypeKind::Class,
            Value::Bean(_) => TypeKind::Bean,
        }
    }

    /// Id of this value's runtime type, without touching the type itself.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Null => TypeId::NULL,
            Value::Bool(_) => TypeId::BOOL,
            Value::Int(_) => TypeId::INT,
            Value::Float(_) => TypeId::FLOAT,
            Value::Str(_) => TypeId::STR,
            Value::Seq(_) => TypeId::SEQ,
            Value::Map(_) => TypeId::MAP,
            Value::Function(_) => TypeId::FUNCTION,
            Value::Class(_) => TypeId::CLASS,
            Value::Bean(obj) => obj.class().type_id(),
        }
    }

    /// Runtime type of this value.
    pub fn runtime_type(&self) -> TypeRef {
        match self {
            Value::Bean(obj) => obj.class().runtime_type().clone(),
            other => RuntimeType::builtin(other.kind()),
        }
    }

    /// Check if this value conforms to the type with the given id.
    pub fn conforms_to(&self, id: TypeId) -> bool {
        match self {
            Value::Bean(obj) => obj.class().runtime_type().conforms_to(id),
            other => id == TypeId::ANY || other.type_id() == id,
        }
    }

    /// Introspection class describing this value's members, if it has one.
    pub fn bean_class(&self) -> Option<Arc<BeanClass>> {
        match self {
            Value::Seq(_) => Some(builtins::seq_class()),
            Value::Map(_) => Some(builtins::map_class()),
            Value::Str(_) => Some(builtins::str_class()),
            Value::Bean(obj) => Some(obj.class().clone()),
            _ => None,
        }
    }

    /// Name of this value's type, for diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Value::Bean(obj) => obj.class().name().to_string(),
            other => RuntimeType::builtin(other.kind()).name().to_string(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&Arc<SeqObject>> {
        match self {
            Value::Seq(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Arc<MapObject>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bean(&self) -> Option<&Arc<BeanObject>> {
        match self {
            Value::Bean(b) => Some(b),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => Arc::ptr_eq(a, b) || a.snapshot() == b.snapshot(),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || a.snapshot() == b.snapshot(),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Bean(a), Value::Bean(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Seq(seq) => {
                f.write_str("[")?;
                for (i, item) in seq.snapshot().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.snapshot().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Function(func) => write!(f, "<function {}>", func.name()),
            Value::Class(class) => write!(f, "<class {}>", class.name()),
            Value::Bean(obj) => write!(f, "<{} instance>", obj.class().name()),
        }
    }
}
