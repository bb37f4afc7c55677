//! Runtime type descriptors.
//!
//! Every value has a [`RuntimeType`]. Built-in types are process-wide
//! singletons; bean types are created on demand and may be bound to a
//! [`DefiningScope`], which they keep alive. Types are compared and hashed by
//! their [`TypeId`], so guards and caches can key on the id alone without
//! holding the type.
//!
//! # Subtyping
//!
//! ```text
//!                  Any
//!   ┌────┬────┬────┼────┬────┬─────────┬──────┐
//!  Null Bool Int Float Str  Seq  Map  Function Class
//!                                   │
//!                        bean types (declared contracts)
//! ```

use crate::reclaim::{ReclaimHooks, ReclaimQueue, Reclaimed};
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

// =============================================================================
// Type ID
// =============================================================================

/// Unique identifier for a runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub const ANY: Self = Self(0);
    pub const NULL: Self = Self(1);
    pub const BOOL: Self = Self(2);
    pub const INT: Self = Self(3);
    pub const FLOAT: Self = Self(4);
    pub const STR: Self = Self(5);
    pub const SEQ: Self = Self(6);
    pub const MAP: Self = Self(7);
    pub const FUNCTION: Self = Self(8);
    pub const CLASS: Self = Self(9);

    /// First id handed out to bean types.
    pub const FIRST_USER_TYPE: u32 = 256;

    /// Create from a raw value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check if this is a built-in type.
    #[inline]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER_TYPE
    }
}

static NEXT_TYPE_ID: AtomicU32 = AtomicU32::new(TypeId::FIRST_USER_TYPE);

fn allocate_type_id() -> TypeId {
    TypeId(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
}

// =============================================================================
// Type Kind
// =============================================================================

/// Coarse classification of a runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    Seq,
    Map,
    Function,
    Class,
    Bean,
}

impl TypeKind {
    /// Check if values of this kind are references that may be null.
    #[inline]
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            TypeKind::Any
                | TypeKind::Str
                | TypeKind::Seq
                | TypeKind::Map
                | TypeKind::Function
                | TypeKind::Class
                | TypeKind::Bean
        )
    }
}

// =============================================================================
// Defining Scope
// =============================================================================

/// Unique identifier for a defining scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ScopeId(u32);

impl ScopeId {
    /// Get raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

static NEXT_SCOPE_ID: AtomicU32 = AtomicU32::new(1);

/// The unit that defines scope-bound types, such as a plugin or module.
///
/// Types defined in a scope hold it strongly; the scope holds nothing back.
/// Once the last type and the last external handle are gone the scope is
/// dropped and its watchers are notified.
#[derive(Debug)]
pub struct DefiningScope {
    id: ScopeId,
    name: Box<str>,
    hooks: ReclaimHooks,
}

impl DefiningScope {
    /// Create a new scope.
    pub fn new(name: impl Into<Box<str>>) -> Arc<Self> {
        Arc::new(Self {
            id: ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            hooks: ReclaimHooks::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe a queue to this scope's reclamation.
    pub fn watch(&self, queue: &Arc<ReclaimQueue>) {
        self.hooks.register(queue);
    }
}

impl Drop for DefiningScope {
    fn drop(&mut self) {
        self.hooks.fire(Reclaimed::Scope(self.id));
    }
}

// =============================================================================
// Runtime Type
// =============================================================================

/// Shared handle to a runtime type.
pub type TypeRef = Arc<RuntimeType>;

/// Describes the type of a value.
pub struct RuntimeType {
    id: TypeId,
    name: Box<str>,
    kind: TypeKind,
    scope: Option<Arc<DefiningScope>>,
    supertypes: SmallVec<[TypeRef; 2]>,
    hooks: ReclaimHooks,
}

struct BuiltinTypes {
    any: TypeRef,
    null: TypeRef,
    bool: TypeRef,
    int: TypeRef,
    float: TypeRef,
    str: TypeRef,
    seq: TypeRef,
    map: TypeRef,
    function: TypeRef,
    class: TypeRef,
}

static BUILTINS: OnceLock<BuiltinTypes> = OnceLock::new();

fn builtins() -> &'static BuiltinTypes {
    BUILTINS.get_or_init(|| {
        let mk = |id: TypeId, name: &str, kind: TypeKind| {
            Arc::new(RuntimeType {
                id,
                name: name.into(),
                kind,
                scope: None,
                supertypes: SmallVec::new(),
                hooks: ReclaimHooks::new(),
            })
        };
        BuiltinTypes {
            any: mk(TypeId::ANY, "Any", TypeKind::Any),
            null: mk(TypeId::NULL, "Null", TypeKind::Null),
            bool: mk(TypeId::BOOL, "Bool", TypeKind::Bool),
            int: mk(TypeId::INT, "Int", TypeKind::Int),
            float: mk(TypeId::FLOAT, "Float", TypeKind::Float),
            str: mk(TypeId::STR, "Str", TypeKind::Str),
            seq: mk(TypeId::SEQ, "Seq", TypeKind::Seq),
            map: mk(TypeId::MAP, "Map", TypeKind::Map),
            function: mk(TypeId::FUNCTION, "Function", TypeKind::Function),
            class: mk(TypeId::CLASS, "Class", TypeKind::Class),
        }
    })
}

impl RuntimeType {
    /// The built-in type of the given kind. `Bean` has no built-in type and
    /// maps to `Any`.
    pub fn builtin(kind: TypeKind) -> TypeRef {
        let b = builtins();
        match kind {
            TypeKind::Any | TypeKind::Bean => b.any.clone(),
            TypeKind::Null => b.null.clone(),
            TypeKind::Bool => b.bool.clone(),
            TypeKind::Int => b.int.clone(),
            TypeKind::Float => b.float.clone(),
            TypeKind::Str => b.str.clone(),
            TypeKind::Seq => b.seq.clone(),
            TypeKind::Map => b.map.clone(),
            TypeKind::Function => b.function.clone(),
            TypeKind::Class => b.class.clone(),
        }
    }

    pub fn any() -> TypeRef {
        builtins().any.clone()
    }

    pub fn null() -> TypeRef {
        builtins().null.clone()
    }

    pub fn bool() -> TypeRef {
        builtins().bool.clone()
    }

    pub fn int() -> TypeRef {
        builtins().int.clone()
    }

    pub fn float() -> TypeRef {
        builtins().float.clone()
    }

    pub fn str() -> TypeRef {
        builtins().str.clone()
    }

    pub fn seq() -> TypeRef {
        builtins().seq.clone()
    }

    pub fn map() -> TypeRef {
        builtins().map.clone()
    }

    pub fn function() -> TypeRef {
        builtins().function.clone()
    }

    pub fn class() -> TypeRef {
        builtins().class.clone()
    }

    /// Create a new bean type.
    ///
    /// `supertypes` are the contracts the type conforms to. A scope, when
    /// given, is kept alive for as long as the type is.
    pub fn new_bean(
        name: impl Into<Box<str>>,
        scope: Option<Arc<DefiningScope>>,
        supertypes: impl IntoIterator<Item = TypeRef>,
    ) -> TypeRef {
        Arc::new(Self {
            id: allocate_type_id(),
            name: name.into(),
            kind: TypeKind::Bean,
            scope,
            supertypes: supertypes.into_iter().collect(),
            hooks: ReclaimHooks::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// The scope this type was defined in, if any.
    #[inline]
    pub fn scope(&self) -> Option<&Arc<DefiningScope>> {
        self.scope.as_ref()
    }

    #[inline]
    pub fn supertypes(&self) -> &[TypeRef] {
        &self.supertypes
    }

    /// Check if a value of type `other` can be used where `self` is expected
    /// without conversion.
    pub fn is_assignable_from(&self, other: &RuntimeType) -> bool {
        self.kind == TypeKind::Any || other.conforms_to(self.id)
    }

    /// Check if this type is `id` or has it as a transitive supertype.
    pub fn conforms_to(&self, id: TypeId) -> bool {
        self.id == id
            || id == TypeId::ANY
            || self.supertypes.iter().any(|s| s.conforms_to(id))
    }

    /// Subscribe a queue to this type's reclamation.
    pub fn watch(&self, queue: &Arc<ReclaimQueue>) {
        self.hooks.register(queue);
    }
}

impl Drop for RuntimeType {
    fn drop(&mut self) {
        self.hooks.fire(Reclaimed::Type(self.id));
    }
}

impl PartialEq for RuntimeType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RuntimeType {}

impl Hash for RuntimeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeType")
            .field("id", &self.id.raw())
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
