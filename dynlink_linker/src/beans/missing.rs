//! Missing-member handling for the beans linker.

use crate::error::LinkResult;
use crate::guarded::GuardedInvocation;
use crate::linker::LinkRequest;
use crate::operation::{Name, StandardOperation};
use dynlink_runtime::{Key, RuntimeError, Value};
use std::fmt;

/// Decides what happens when a member or element cannot be found.
pub trait MissingMemberHandler: Send + Sync + fmt::Debug {
    /// Called at link time when a named member resolves to nothing. Returning
    /// `Ok(None)` lets the linker decline.
    fn missing_member(&self, _request: &LinkRequest, _name: &Name) -> LinkResult<Option<GuardedInvocation>> {
        Ok(None)
    }

    /// Called at call time when element access misses, or when an unnamed
    /// operation finds no member for its key.
    fn missing_element(
        &self,
        verb: StandardOperation,
        receiver: &Value,
        key: &Value,
        value: Option<&Value>,
    ) -> Result<Value, RuntimeError>;
}

/// Sequences raise range errors, mappings treat absent keys as null.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMissingMemberHandler;

impl MissingMemberHandler for DefaultMissingMemberHandler {
    fn missing_element(
        &self,
        verb: StandardOperation,
        receiver: &Value,
        key: &Value,
        value: Option<&Value>,
    ) -> Result<Value, RuntimeError> {
        let invalid_key = || RuntimeError::InvalidKey {
            receiver: receiver.type_name(),
            key: key.to_string(),
        };
        match receiver {
            Value::Seq(seq) => match key.as_int() {
                Some(index) => Err(RuntimeError::IndexOutOfRange {
                    index,
                    len: seq.len(),
                }),
                None => Err(invalid_key()),
            },
            Value::Map(map) => {
                let key = Key::from_value(key).ok_or_else(invalid_key)?;
                if verb == StandardOperation::Set {
                    map.insert(key, value.cloned().unwrap_or_default());
                }
                Ok(Value::Null)
            }
            other => Err(RuntimeError::MissingMember {
                receiver: other.type_name(),
                name: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_element_misses() {
        let h = DefaultMissingMemberHandler;
        let seq = Value::seq([Value::Int(1)]);
        let err = h
            .missing_element(StandardOperation::Get, &seq, &Value::Int(4), None)
            .unwrap_err();
        assert_eq!(err, RuntimeError::IndexOutOfRange { index: 4, len: 1 });
        assert!(matches!(
            h.missing_element(StandardOperation::Get, &seq, &Value::str("x"), None),
            Err(RuntimeError::InvalidKey { .. })
        ));

        let map = Value::map([]);
        assert_eq!(
            h.missing_element(StandardOperation::Remove, &map, &Value::str("k"), None),
            Ok(Value::Null)
        );
        h.missing_element(StandardOperation::Set, &map, &Value::str("k"), Some(&Value::Int(1)))
            .unwrap();
        assert_eq!(map.as_map().unwrap().get(&Key::from("k")), Some(Value::Int(1)));

        assert!(matches!(
            h.missing_element(StandardOperation::Get, &Value::Int(1), &Value::str("x"), None),
            Err(RuntimeError::MissingMember { .. })
        ));
    }
}
