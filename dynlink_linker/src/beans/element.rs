//! Element access on sequences and mappings.
//!
//! Sequence components only apply to in-range integer indices. Mapping GET
//! applies to present keys; SET and REMOVE always apply. Misses fall through
//! to the next namespace and finally to the missing-member handler.

use super::access::{Action, Component, action, presence};
use crate::operation::StandardOperation;
use dynlink_runtime::{Key, MapObject, RuntimeError, SeqObject, Value};
use std::sync::Arc;

/// Element component for `verb` on `receiver` at `key`.
pub(crate) fn component(verb: StandardOperation, receiver: &Value, key: &Value) -> Option<Component> {
    match receiver {
        Value::Seq(_) => seq_component(verb, key),
        Value::Map(_) => map_component(verb, key),
        _ => None,
    }
}

/// Component that never applies; the access falls through.
fn absent() -> Component {
    Component::WhenPresent {
        present: presence(|_| false),
        action: action(|_, _| Ok(Value::Null)),
    }
}

fn seq_of(receiver: &Value) -> Result<&Arc<SeqObject>, RuntimeError> {
    receiver
        .as_seq()
        .ok_or_else(|| RuntimeError::type_mismatch("Seq", receiver.type_name()))
}

fn map_of(receiver: &Value) -> Result<&Arc<MapObject>, RuntimeError> {
    receiver
        .as_map()
        .ok_or_else(|| RuntimeError::type_mismatch("Map", receiver.type_name()))
}

fn seq_component(verb: StandardOperation, key: &Value) -> Option<Component> {
    let Some(index) = key.as_int() else {
        return Some(absent());
    };
    let run: Action = match verb {
        StandardOperation::Get => action(move |r, _| {
            let seq = seq_of(r)?;
            seq.get(index).ok_or(RuntimeError::IndexOutOfRange {
                index,
                len: seq.len(),
            })
        }),
        StandardOperation::Set => {
            action(move |r, v| seq_of(r)?.set(index, v.cloned().unwrap_or_default()))
        }
        StandardOperation::Remove => action(move |r, _| seq_of(r)?.remove(index)),
        _ => return None,
    };
    Some(Component::WhenPresent {
        present: presence(move |r| r.as_seq().is_some_and(|s| s.in_range(index))),
        action: run,
    })
}

fn map_component(verb: StandardOperation, key: &Value) -> Option<Component> {
    let Some(key) = Key::from_value(key) else {
        return Some(absent());
    };
    match verb {
        StandardOperation::Get => {
            let wanted = key.clone();
            Some(Component::WhenPresent {
                present: presence(move |r| r.as_map().is_some_and(|m| m.contains_key(&wanted))),
                action: action(move |r, _| Ok(map_of(r)?.get(&key).unwrap_or_default())),
            })
        }
        StandardOperation::Set => Some(Component::Always(action(move |r, v| {
            let previous = map_of(r)?.insert(key.clone(), v.cloned().unwrap_or_default());
            Ok(previous.unwrap_or_default())
        }))),
        StandardOperation::Remove => Some(Component::Always(action(move |r, _| {
            Ok(map_of(r)?.remove(&key).unwrap_or_default())
        }))),
        _ => None,
    }
}
