//! Member resolution over namespaces.
//!
//! Each namespace of an operation contributes at most one [`Component`]. A
//! component either always applies (properties, methods, mapping writes) or
//! applies only when the receiver holds the member at call time (sequence
//! indices, mapping reads). Resolution stops at the first component that
//! always applies; later namespaces are unreachable.
//!
//! ```text
//! GET:ELEMENT|PROPERTY:empty on a Map
//!   ELEMENT  → WhenPresent(contains "empty")
//!   PROPERTY → Always(isEmpty())            ← stop
//! ```

use super::AccessorPrecedence;
use super::element;
use crate::operation::{Namespace, StandardOperation};
use dynlink_runtime::{BeanClass, MethodBody, MethodDef, NativeFunction, RuntimeError, Value};
use smallvec::SmallVec;
use std::sync::Arc;

/// `(receiver, value to store) -> result`.
pub(crate) type Action = Arc<dyn Fn(&Value, Option<&Value>) -> Result<Value, RuntimeError> + Send + Sync>;

/// Call-time presence test on the receiver.
pub(crate) type Presence = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub(crate) fn action(
    f: impl Fn(&Value, Option<&Value>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
) -> Action {
    Arc::new(f)
}

pub(crate) fn presence(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Presence {
    Arc::new(f)
}

/// What one namespace contributes to an access.
#[derive(Clone)]
pub(crate) enum Component {
    Always(Action),
    WhenPresent { present: Presence, action: Action },
}

/// Inputs to member resolution.
pub(crate) struct MemberQuery<'a> {
    pub verb: StandardOperation,
    pub receiver: &'a Value,
    pub key: &'a Value,
    pub privileged: bool,
    pub precedence: AccessorPrecedence,
}

/// Components in namespace order, and whether an inaccessible member was
/// skipped along the way.
#[derive(Default)]
pub(crate) struct Resolution {
    pub components: SmallVec<[Component; 2]>,
    pub denied: bool,
}

pub(crate) fn resolve(namespaces: &[Namespace], query: &MemberQuery<'_>) -> Resolution {
    let mut resolution = Resolution::default();
    for &namespace in namespaces {
        let found = if namespace == Namespace::PROPERTY {
            property(query, &mut resolution.denied)
        } else if namespace == Namespace::METHOD {
            method(query, &mut resolution.denied)
        } else if namespace == Namespace::ELEMENT {
            element::component(query.verb, query.receiver, query.key)
        } else {
            None
        };
        if let Some(component) = found {
            let always = matches!(component, Component::Always(_));
            resolution.components.push(component);
            if always {
                break;
            }
        }
    }
    resolution
}

/// Run the first applicable component. `None` is a miss.
pub(crate) fn apply(components: &[Component], receiver: &Value, value: Option<&Value>) -> Option<Result<Value, RuntimeError>> {
    for component in components {
        match component {
            Component::Always(action) => return Some(action(receiver, value)),
            Component::WhenPresent { present, action } => {
                if present(receiver) {
                    return Some(action(receiver, value));
                }
            }
        }
    }
    None
}

// =============================================================================
// Properties
// =============================================================================

fn property(query: &MemberQuery<'_>, denied: &mut bool) -> Option<Component> {
    let name = query.key.as_str()?;
    let class = query.receiver.bean_class()?;

    let accessor = match query.precedence {
        AccessorPrecedence::OverrideFirst => match explicit_accessor(&class, query, name, denied) {
            Some(found) => Some(found),
            None => conventional_accessor(&class, query, name, denied),
        },
        AccessorPrecedence::ConventionFirst => match conventional_accessor(&class, query, name, denied) {
            Some(found) => Some(found),
            None => explicit_accessor(&class, query, name, denied),
        },
    };
    accessor.or_else(|| field(&class, query, name, denied))
}

fn explicit_accessor(class: &BeanClass, query: &MemberQuery<'_>, name: &str, denied: &mut bool) -> Option<Component> {
    let property = class.property(name)?;
    let body: MethodBody = match query.verb {
        StandardOperation::Get => property.getter()?.clone(),
        StandardOperation::Set => property.setter()?.clone(),
        _ => return None,
    };
    if !query.privileged && !class.declares_property_publicly(name) {
        *denied = true;
        return None;
    }
    Some(accessor_component(query.verb, body))
}

fn conventional_accessor(class: &BeanClass, query: &MemberQuery<'_>, name: &str, denied: &mut bool) -> Option<Component> {
    let capitalized = capitalize(name);
    let candidates: SmallVec<[(String, usize); 2]> = match query.verb {
        StandardOperation::Get => [(format!("get{capitalized}"), 0), (format!("is{capitalized}"), 0)].into(),
        StandardOperation::Set => [(format!("set{capitalized}"), 1)].into_iter().collect(),
        _ => return None,
    };
    for (method_name, arity) in candidates {
        let Some(method) = class.find_method(&method_name, arity) else {
            continue;
        };
        if query.privileged || class.is_accessible(&method) {
            return Some(accessor_component(query.verb, method.body().clone()));
        }
        *denied = true;
    }
    None
}

fn accessor_component(verb: StandardOperation, body: MethodBody) -> Component {
    Component::Always(match verb {
        StandardOperation::Set => action(move |r, v| {
            body(r, std::slice::from_ref(&v.cloned().unwrap_or_default()))?;
            Ok(Value::Null)
        }),
        _ => action(move |r, _| body(r, &[])),
    })
}

fn field(class: &BeanClass, query: &MemberQuery<'_>, name: &str, denied: &mut bool) -> Option<Component> {
    if !matches!(query.receiver, Value::Bean(_)) {
        return None;
    }
    let field = class.field(name)?;
    if !query.privileged && !(field.is_public() && class.is_public()) {
        *denied = true;
        return None;
    }
    let name: Arc<str> = name.into();
    let missing = |r: &Value, name: &str| RuntimeError::MissingMember {
        receiver: r.type_name(),
        name: name.to_string(),
    };
    match query.verb {
        StandardOperation::Get => Some(Component::Always(action(move |r, _| {
            r.as_bean()
                .and_then(|obj| obj.get_field(&name))
                .ok_or_else(|| missing(r, &name))
        }))),
        StandardOperation::Set => Some(Component::Always(action(move |r, v| {
            let obj = r.as_bean().ok_or_else(|| missing(r, &name))?;
            obj.set_field(&name, v.cloned().unwrap_or_default())?;
            Ok(Value::Null)
        }))),
        _ => None,
    }
}

// =============================================================================
// Methods
// =============================================================================

/// GET on METHOD yields the overloads bound to the receiver as a function.
fn method(query: &MemberQuery<'_>, denied: &mut bool) -> Option<Component> {
    if query.verb != StandardOperation::Get {
        return None;
    }
    let name = query.key.as_str()?;
    let class = query.receiver.bean_class()?;
    let overloads = class.methods_named(name);
    if overloads.is_empty() {
        return None;
    }
    let visible: SmallVec<[Arc<MethodDef>; 2]> = overloads
        .into_iter()
        .filter(|m| query.privileged || class.is_accessible(m))
        .collect();
    if visible.is_empty() {
        *denied = true;
        return None;
    }
    let name: Arc<str> = name.into();
    Some(Component::Always(action(move |r, _| {
        Ok(bind_overloads(r.clone(), name.clone(), visible.clone()))
    })))
}

fn bind_overloads(receiver: Value, name: Arc<str>, overloads: SmallVec<[Arc<MethodDef>; 2]>) -> Value {
    Value::function(NativeFunction::variadic(name.clone(), move |args| {
        match overloads.iter().find(|m| m.arity() == args.len()) {
            Some(method) => method.invoke(&receiver, args),
            None => Err(RuntimeError::Arity {
                name: name.to_string(),
                expected: overloads.first().map_or(0, |m| m.arity()),
                found: args.len(),
            }),
        }
    }))
}

/// `color` → `Color`.
pub(crate) fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
