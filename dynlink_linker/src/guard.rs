//! Guards and switch points.
//!
//! A guard is data: a pure predicate over call arguments plus the receiver
//! shape captured when the target was resolved. Guards capture type *ids*,
//! never type handles, so an installed guard does not keep a type (or its
//! defining scope) alive.

use dynlink_runtime::{TypeId, TypeKind, Value};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// =============================================================================
// Switch Point
// =============================================================================

/// Shared invalidation flag.
///
/// Once invalidated, every guarded invocation carrying the switch point fails
/// its guard and the owning call sites relink.
#[derive(Clone)]
pub struct SwitchPoint(Arc<AtomicBool>);

impl SwitchPoint {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Invalidate. Irreversible.
    pub fn invalidate(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Invalidate every switch point in `points`.
    pub fn invalidate_all(points: &[SwitchPoint]) {
        for p in points {
            p.invalidate();
        }
    }
}

impl Default for SwitchPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SwitchPoint {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SwitchPoint {}

impl fmt::Debug for SwitchPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SwitchPoint").field(&self.is_valid()).finish()
    }
}

// =============================================================================
// Guard
// =============================================================================

/// Host-supplied guard predicate.
pub type GuardPredicate = fn(&[Value]) -> bool;

/// Validity predicate over call arguments.
#[derive(Clone)]
pub enum Guard {
    /// Argument has exactly this runtime type.
    TypeIs { position: usize, type_id: TypeId },
    /// Argument has this kind.
    KindIs { position: usize, kind: TypeKind },
    /// Argument conforms to this type (itself or a subtype).
    InstanceOf { position: usize, type_id: TypeId },
    IsNull(usize),
    NotNull(usize),
    /// Argument is the class value with this type id.
    ClassIs { position: usize, type_id: TypeId },
    SwitchPoint(SwitchPoint),
    /// Conjunction.
    All(Arc<[Guard]>),
    Predicate {
        label: &'static str,
        test: GuardPredicate,
    },
}

impl Guard {
    /// Exact-type guard on the argument at `position`, captured from `value`.
    pub fn type_of(position: usize, value: &Value) -> Self {
        Guard::TypeIs {
            position,
            type_id: value.type_id(),
        }
    }

    /// Evaluate against call arguments. A guard over a missing position fails.
    pub fn test(&self, args: &[Value]) -> bool {
        match self {
            Guard::TypeIs { position, type_id } => {
                args.get(*position).is_some_and(|v| v.type_id() == *type_id)
            }
            Guard::KindIs { position, kind } => args.get(*position).is_some_and(|v| v.kind() == *kind),
            Guard::InstanceOf { position, type_id } => {
                args.get(*position).is_some_and(|v| v.conforms_to(*type_id))
            }
            Guard::IsNull(position) => args.get(*position).is_some_and(Value::is_null),
            Guard::NotNull(position) => args.get(*position).is_some_and(|v| !v.is_null()),
            Guard::ClassIs { position, type_id } => matches!(
                args.get(*position),
                Some(Value::Class(class)) if class.type_id() == *type_id
            ),
            Guard::SwitchPoint(sp) => sp.is_valid(),
            Guard::All(guards) => guards.iter().all(|g| g.test(args)),
            Guard::Predicate { test, .. } => test(args),
        }
    }

    /// Conjunction of two guards, flattening nested conjunctions.
    pub fn and(self, other: Guard) -> Guard {
        let mut parts: Vec<Guard> = Vec::new();
        for g in [self, other] {
            match g {
                Guard::All(inner) => parts.extend(inner.iter().cloned()),
                single => parts.push(single),
            }
        }
        Guard::All(parts.into())
    }

    /// Combine an optional guard with another.
    pub fn and_optional(guard: Option<Guard>, other: Guard) -> Guard {
        match guard {
            Some(g) => g.and(other),
            None => other,
        }
    }
}

impl PartialEq for Guard {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::TypeIs { position: a, type_id: x },
                Self::TypeIs { position: b, type_id: y },
            )
            | (
                Self::InstanceOf { position: a, type_id: x },
                Self::InstanceOf { position: b, type_id: y },
            )
            | (
                Self::ClassIs { position: a, type_id: x },
                Self::ClassIs { position: b, type_id: y },
            ) => a == b && x == y,
            (Self::KindIs { position: a, kind: x }, Self::KindIs { position: b, kind: y }) => {
                a == b && x == y
            }
            (Self::IsNull(a), Self::IsNull(b)) | (Self::NotNull(a), Self::NotNull(b)) => a == b,
            (Self::SwitchPoint(a), Self::SwitchPoint(b)) => a == b,
            (Self::All(a), Self::All(b)) => a == b,
            (Self::Predicate { label: a, .. }, Self::Predicate { label: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::TypeIs { position, type_id } => write!(f, "TypeIs(#{position}, {})", type_id.raw()),
            Guard::KindIs { position, kind } => write!(f, "KindIs(#{position}, {kind:?})"),
            Guard::InstanceOf { position, type_id } => {
                write!(f, "InstanceOf(#{position}, {})", type_id.raw())
            }
            Guard::IsNull(position) => write!(f, "IsNull(#{position})"),
            Guard::NotNull(position) => write!(f, "NotNull(#{position})"),
            Guard::ClassIs { position, type_id } => write!(f, "ClassIs(#{position}, {})", type_id.raw()),
            Guard::SwitchPoint(sp) => write!(f, "{sp:?}"),
            Guard::All(guards) => f.debug_list().entries(guards.iter()).finish(),
            Guard::Predicate { label, .. } => write!(f, "Predicate({label})"),
        }
    }
}
