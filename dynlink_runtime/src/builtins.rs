//! Introspection classes for built-in receivers.
//!
//! Sequences, mappings and strings expose a small method surface to the
//! beans linker in addition to their element access.

use crate::bean::BeanClass;
use crate::collections::Key;
use crate::error::RuntimeError;
use crate::types::RuntimeType;
use crate::value::Value;
use std::sync::{Arc, OnceLock};

static SEQ_CLASS: OnceLock<Arc<BeanClass>> = OnceLock::new();
static MAP_CLASS: OnceLock<Arc<BeanClass>> = OnceLock::new();
static STR_CLASS: OnceLock<Arc<BeanClass>> = OnceLock::new();

fn receiver_mismatch(expected: &str, receiver: &Value) -> RuntimeError {
    RuntimeError::type_mismatch(expected, receiver.type_name())
}

fn key_of(receiver: &Value, value: &Value) -> Result<Key, RuntimeError> {
    Key::from_value(value).ok_or_else(|| RuntimeError::InvalidKey {
        receiver: receiver.type_name(),
        key: value.to_string(),
    })
}

fn index_of(value: &Value) -> Result<i64, RuntimeError> {
    value
        .as_int()
        .ok_or_else(|| RuntimeError::type_mismatch("Int", value.type_name()))
}

/// Methods of `Seq`.
pub fn seq_class() -> Arc<BeanClass> {
    SEQ_CLASS
        .get_or_init(|| {
            let seq = |v: &Value| v.as_seq().cloned().ok_or_else(|| receiver_mismatch("Seq", v));
            BeanClass::builder_for(RuntimeType::seq())
                .method("size", 0, move |r, _| Ok(Value::Int(seq(r)?.len() as i64)))
                .method("isEmpty", 0, move |r, _| Ok(Value::Bool(seq(r)?.is_empty())))
                .method("get", 1, move |r, a| {
                    let s = seq(r)?;
                    let index = index_of(&a[0])?;
                    s.get(index).ok_or(RuntimeError::IndexOutOfRange {
                        index,
                        len: s.len(),
                    })
                })
                .method("set", 2, move |r, a| seq(r)?.set(index_of(&a[0])?, a[1].clone()))
                .method("add", 1, move |r, a| {
                    seq(r)?.push(a[0].clone());
                    Ok(Value::Bool(true))
                })
                .method("contains", 1, move |r, a| Ok(Value::Bool(seq(r)?.contains(&a[0]))))
                .build()
        })
        .clone()
}

/// Methods of `Map`.
pub fn map_class() -> Arc<BeanClass> {
    MAP_CLASS
        .get_or_init(|| {
            let map = |v: &Value| v.as_map().cloned().ok_or_else(|| receiver_mismatch("Map", v));
            BeanClass::builder_for(RuntimeType::map())
                .method("size", 0, move |r, _| Ok(Value::Int(map(r)?.len() as i64)))
                .method("isEmpty", 0, move |r, _| Ok(Value::Bool(map(r)?.is_empty())))
                .method("get", 1, move |r, a| {
                    Ok(map(r)?.get(&key_of(r, &a[0])?).unwrap_or_default())
                })
                .method("put", 2, move |r, a| {
                    Ok(map(r)?
                        .insert(key_of(r, &a[0])?, a[1].clone())
                        .unwrap_or_default())
                })
                .method("containsKey", 1, move |r, a| {
                    Ok(Value::Bool(map(r)?.contains_key(&key_of(r, &a[0])?)))
                })
                .method("remove", 1, move |r, a| {
                    Ok(map(r)?.remove(&key_of(r, &a[0])?).unwrap_or_default())
                })
                .build()
        })
        .clone()
}

/// Methods of `Str`.
pub fn str_class() -> Arc<BeanClass> {
    STR_CLASS
        .get_or_init(|| {
            let text = |v: &Value| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| receiver_mismatch("Str", v))
            };
            BeanClass::builder_for(RuntimeType::str())
                .method("length", 0, move |r, _| Ok(Value::Int(text(r)?.chars().count() as i64)))
                .method("isEmpty", 0, move |r, _| Ok(Value::Bool(text(r)?.is_empty())))
                .method("toUpperCase", 0, move |r, _| Ok(Value::str(&text(r)?.to_uppercase())))
                .method("concat", 1, move |r, a| {
                    let tail = a[0]
                        .as_str()
                        .ok_or_else(|| RuntimeError::type_mismatch("Str", a[0].type_name()))?;
                    Ok(Value::str(&format!("{}{tail}", text(r)?)))
                })
                .build()
        })
        .clone()
}
