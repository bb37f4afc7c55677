//! Sequence and mapping objects.
//!
//! Sequences are bounds-checked over `0..len`; mappings are partial over
//! key presence. Both are shared and interior-mutable so the linker can
//! hand out invocations that mutate a receiver through a `&Value`.

use crate::error::{Result, RuntimeError};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Key
// =============================================================================

/// Hashable mapping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
}

impl Key {
    /// Convert a value to a key. Floats, collections and objects are not
    /// valid keys.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Str(s) => Some(Key::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.into())
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write!(f, "{s:?}"),
        }
    }
}

// =============================================================================
// Sequence
// =============================================================================

/// Growable, indexable sequence of values.
#[derive(Debug, Default)]
pub struct SeqObject {
    items: RwLock<Vec<Value>>,
}

impl SeqObject {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    /// Convert a signed index to a position inside `0..len`.
    #[inline]
    fn position(index: i64, len: usize) -> Option<usize> {
        usize::try_from(index).ok().filter(|&i| i < len)
    }

    /// Element at `index`, or `None` when out of range.
    pub fn get(&self, index: i64) -> Option<Value> {
        let items = self.items.read();
        Self::position(index, items.len()).map(|i| items[i].clone())
    }

    /// Check if `index` is within `0..len`.
    pub fn in_range(&self, index: i64) -> bool {
        Self::position(index, self.len()).is_some()
    }

    /// Replace the element at `index`, returning the previous value.
    pub fn set(&self, index: i64, value: Value) -> Result<Value> {
        let mut items = self.items.write();
        let len = items.len();
        let i = Self::position(index, len).ok_or(RuntimeError::IndexOutOfRange { index, len })?;
        Ok(std::mem::replace(&mut items[i], value))
    }

    /// Remove the element at `index`, shifting later elements down.
    pub fn remove(&self, index: i64) -> Result<Value> {
        let mut items = self.items.write();
        let len = items.len();
        let i = Self::position(index, len).ok_or(RuntimeError::IndexOutOfRange { index, len })?;
        Ok(items.remove(i))
    }

    pub fn push(&self, value: Value) {
        self.items.write().push(value);
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.items.read().iter().any(|v| v == value)
    }
}

// =============================================================================
// Mapping
// =============================================================================

/// Insertion-ordered mapping from keys to values.
#[derive(Debug, Default)]
pub struct MapObject {
    entries: RwLock<IndexMap<Key, Value>>,
}

impl MapObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&self, key: Key, value: Value) -> Option<Value> {
        self.entries.write().insert(key, value)
    }

    /// Remove preserving the order of the remaining entries.
    pub fn remove(&self, key: &Key) -> Option<Value> {
        self.entries.write().shift_remove(key)
    }

    /// Copy of the current entries in insertion order.
    pub fn snapshot(&self) -> Vec<(Key, Value)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl FromIterator<(Key, Value)> for MapObject {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        Self {
            entries: RwLock::new(iter.into_iter().collect()),
        }
    }
}
