//! Introspectable bean classes.
//!
//! A [`BeanClass`] describes the members a receiver exposes to generic
//! introspection: methods (overloaded by arity), explicit property accessors,
//! fields, declared contracts and an optional constructor. Access flags
//! decide which members a public lookup may reach; a non-public member is
//! still reachable when a public contract declares it.
//!
//! # Architecture
//!
//! ```text
//! BeanClass
//! ├── ty: TypeRef            (identity, scope, supertypes)
//! ├── access: Access
//! ├── methods: name → [MethodDef; by arity]
//! ├── properties: name → PropertyDef (explicit getter/setter)
//! ├── fields: [FieldDef]
//! ├── contracts: [BeanClass]  (publicly declared interfaces)
//! └── constructor
//! ```

use crate::error::{Result, RuntimeError};
use crate::types::{DefiningScope, RuntimeType, TypeId, TypeRef};
use crate::value::Value;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Access Flags
// =============================================================================

bitflags::bitflags! {
    /// Member and class access flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        /// Reachable from a public lookup.
        const PUBLIC = 1 << 0;
        /// Member does not use its receiver.
        const STATIC = 1 << 1;
    }
}

impl Default for Access {
    fn default() -> Self {
        Self::PUBLIC
    }
}

// =============================================================================
// Members
// =============================================================================

/// Method implementation: `(receiver, arguments) -> result`.
pub type MethodBody = Arc<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;

/// Constructor implementation: `(class, arguments) -> instance`.
pub type ConstructorBody = Arc<dyn Fn(&Arc<BeanClass>, &[Value]) -> Result<Value> + Send + Sync>;

/// A method declared by a bean class.
pub struct MethodDef {
    name: Arc<str>,
    arity: usize,
    access: Access,
    body: MethodBody,
}

impl MethodDef {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    #[inline]
    pub fn access(&self) -> Access {
        self.access
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        self.access.contains(Access::PUBLIC)
    }

    #[inline]
    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    /// Invoke on `receiver` with argument count validation.
    pub fn invoke(&self, receiver: &Value, args: &[Value]) -> Result<Value> {
        if args.len() != self.arity {
            return Err(RuntimeError::Arity {
                name: self.name.to_string(),
                expected: self.arity,
                found: args.len(),
            });
        }
        (self.body)(receiver, args)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

/// Explicitly declared property accessors.
///
/// The getter body is called with no arguments, the setter with one.
pub struct PropertyDef {
    name: Arc<str>,
    getter: Option<MethodBody>,
    setter: Option<MethodBody>,
}

impl PropertyDef {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn getter(&self) -> Option<&MethodBody> {
        self.getter.as_ref()
    }

    #[inline]
    pub fn setter(&self) -> Option<&MethodBody> {
        self.setter.as_ref()
    }
}

impl fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDef")
            .field("name", &self.name)
            .field("readable", &self.getter.is_some())
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

/// An instance field with its initial value.
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: Arc<str>,
    access: Access,
    initial: Value,
}

impl FieldDef {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        self.access.contains(Access::PUBLIC)
    }
}

// =============================================================================
// Bean Class
// =============================================================================

/// Describes the introspectable members of a receiver type.
pub struct BeanClass {
    ty: TypeRef,
    access: Access,
    fields: Vec<FieldDef>,
    methods: FxHashMap<Arc<str>, SmallVec<[Arc<MethodDef>; 1]>>,
    properties: FxHashMap<Arc<str>, Arc<PropertyDef>>,
    contracts: Vec<Arc<BeanClass>>,
    constructor: Option<ConstructorBody>,
}

impl BeanClass {
    /// Start building a new bean class with a fresh type.
    pub fn builder(name: impl Into<Box<str>>) -> BeanClassBuilder {
        BeanClassBuilder::new(TypeSource::Fresh {
            name: name.into(),
            scope: None,
        })
    }

    /// Start building a class describing an existing (built-in) type.
    pub fn builder_for(ty: TypeRef) -> BeanClassBuilder {
        BeanClassBuilder::new(TypeSource::Existing(ty))
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.ty.name()
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.ty.id()
    }

    #[inline]
    pub fn runtime_type(&self) -> &TypeRef {
        &self.ty
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        self.access.contains(Access::PUBLIC)
    }

    #[inline]
    pub fn contracts(&self) -> &[Arc<BeanClass>] {
        &self.contracts
    }

    /// Methods reachable under `name`: own overloads first, then overloads
    /// inherited from contracts for arities the class does not define.
    pub fn methods_named(&self, name: &str) -> SmallVec<[Arc<MethodDef>; 2]> {
        let mut found: SmallVec<[Arc<MethodDef>; 2]> = self
            .methods
            .get(name)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        for contract in &self.contracts {
            for inherited in contract.methods_named(name) {
                if !found.iter().any(|m| m.arity == inherited.arity) {
                    found.push(inherited);
                }
            }
        }
        found
    }

    /// Find the implementation of `name` with the given arity.
    pub fn find_method(&self, name: &str, arity: usize) -> Option<Arc<MethodDef>> {
        self.methods_named(name)
            .into_iter()
            .find(|m| m.arity == arity)
    }

    /// Check if this class, or one of its contracts, publicly declares
    /// `name` with the given arity.
    pub fn declares_publicly(&self, name: &str, arity: usize) -> bool {
        let own = self.is_public()
            && self
                .methods
                .get(name)
                .is_some_and(|ms| ms.iter().any(|m| m.arity == arity && m.is_public()));
        own || self
            .contracts
            .iter()
            .any(|c| c.declares_publicly(name, arity))
    }

    /// Check if `method` is reachable from a public lookup on this class,
    /// either directly or through a public contract.
    pub fn is_accessible(&self, method: &MethodDef) -> bool {
        self.declares_publicly(&method.name, method.arity)
    }

    /// Explicit property accessors declared for `name`, own or inherited.
    pub fn property(&self, name: &str) -> Option<Arc<PropertyDef>> {
        self.properties
            .get(name)
            .cloned()
            .or_else(|| self.contracts.iter().find_map(|c| c.property(name)))
    }

    /// Check if a public class along the contract hierarchy declares the
    /// property `name`.
    pub fn declares_property_publicly(&self, name: &str) -> bool {
        (self.is_public() && self.properties.contains_key(name))
            || self.contracts.iter().any(|c| c.declares_property_publicly(name))
    }

    /// Field declared under `name`.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Names of all own and inherited methods.
    pub fn method_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.methods.keys().cloned().collect();
        for contract in &self.contracts {
            for name in contract.method_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names.sort();
        names
    }

    /// Check if the class has a constructor.
    pub fn is_constructible(&self) -> bool {
        self.constructor.is_some()
    }

    /// Construct a new instance.
    pub fn instantiate(self: &Arc<Self>, args: &[Value]) -> Result<Value> {
        match &self.constructor {
            Some(body) => body(self, args),
            None => Err(RuntimeError::MissingMember {
                receiver: self.name().to_string(),
                name: "<constructor>".to_string(),
            }),
        }
    }
}

impl fmt::Debug for BeanClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanClass")
            .field("name", &self.name())
            .field("type_id", &self.type_id().raw())
            .field("access", &self.access)
            .field("methods", &self.methods.len())
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Bean Object
// =============================================================================

/// An instance of a bean class.
#[derive(Debug)]
pub struct BeanObject {
    class: Arc<BeanClass>,
    fields: RwLock<FxHashMap<Arc<str>, Value>>,
}

impl BeanObject {
    /// Create an instance with every field at its initial value.
    pub fn new(class: Arc<BeanClass>) -> Arc<Self> {
        let fields = class
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.initial.clone()))
            .collect();
        Arc::new(Self {
            class,
            fields: RwLock::new(fields),
        })
    }

    #[inline]
    pub fn class(&self) -> &Arc<BeanClass> {
        &self.class
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    /// Store into a declared field.
    pub fn set_field(&self, name: &str, value: Value) -> Result<()> {
        let mut fields = self.fields.write();
        match fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::MissingMember {
                receiver: self.class.name().to_string(),
                name: name.to_string(),
            }),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

enum TypeSource {
    Fresh {
        name: Box<str>,
        scope: Option<Arc<DefiningScope>>,
    },
    Existing(TypeRef),
}

/// Builder for [`BeanClass`].
pub struct BeanClassBuilder {
    source: TypeSource,
    access: Access,
    fields: Vec<FieldDef>,
    methods: FxHashMap<Arc<str>, SmallVec<[Arc<MethodDef>; 1]>>,
    properties: FxHashMap<Arc<str>, Arc<PropertyDef>>,
    contracts: Vec<Arc<BeanClass>>,
    constructor: Option<ConstructorBody>,
}

impl BeanClassBuilder {
    fn new(source: TypeSource) -> Self {
        Self {
            source,
            access: Access::PUBLIC,
            fields: Vec::new(),
            methods: FxHashMap::default(),
            properties: FxHashMap::default(),
            contracts: Vec::new(),
            constructor: None,
        }
    }

    /// Bind the new type to a defining scope.
    pub fn scope(mut self, scope: Arc<DefiningScope>) -> Self {
        if let TypeSource::Fresh { scope: slot, .. } = &mut self.source {
            *slot = Some(scope);
        }
        self
    }

    /// Make the class itself non-public.
    pub fn non_public(mut self) -> Self {
        self.access.remove(Access::PUBLIC);
        self
    }

    /// Declare a contract the class conforms to.
    pub fn implements(mut self, contract: Arc<BeanClass>) -> Self {
        self.contracts.push(contract);
        self
    }

    pub fn field(self, name: &str, initial: Value) -> Self {
        self.field_with_access(name, Access::PUBLIC, initial)
    }

    pub fn private_field(self, name: &str, initial: Value) -> Self {
        self.field_with_access(name, Access::empty(), initial)
    }

    fn field_with_access(mut self, name: &str, access: Access, initial: Value) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            access,
            initial,
        });
        self
    }

    pub fn method(
        self,
        name: &str,
        arity: usize,
        body: impl Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.method_with_access(name, arity, Access::PUBLIC, Arc::new(body))
    }

    pub fn private_method(
        self,
        name: &str,
        arity: usize,
        body: impl Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.method_with_access(name, arity, Access::empty(), Arc::new(body))
    }

    fn method_with_access(mut self, name: &str, arity: usize, access: Access, body: MethodBody) -> Self {
        let name: Arc<str> = name.into();
        let overloads = self.methods.entry(name.clone()).or_default();
        overloads.retain(|m| m.arity != arity);
        overloads.push(Arc::new(MethodDef {
            name,
            arity,
            access,
            body,
        }));
        self
    }

    /// Declare explicit accessors for a property.
    pub fn property(mut self, name: &str, getter: Option<MethodBody>, setter: Option<MethodBody>) -> Self {
        let name: Arc<str> = name.into();
        self.properties.insert(
            name.clone(),
            Arc::new(PropertyDef {
                name,
                getter,
                setter,
            }),
        );
        self
    }

    pub fn constructor(
        mut self,
        body: impl Fn(&Arc<BeanClass>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.constructor = Some(Arc::new(body));
        self
    }

    /// Constructor that creates an instance with default field values.
    pub fn default_constructor(self) -> Self {
        self.constructor(|class, _| Ok(Value::Bean(BeanObject::new(class.clone()))))
    }

    pub fn build(self) -> Arc<BeanClass> {
        let ty = match self.source {
            TypeSource::Existing(ty) => ty,
            TypeSource::Fresh { name, scope } => {
                let supertypes = self.contracts.iter().map(|c| c.ty.clone());
                RuntimeType::new_bean(name, scope, supertypes.collect::<Vec<_>>())
            }
        };
        Arc::new(BeanClass {
            ty,
            access: self.access,
            fields: self.fields,
            methods: self.methods,
            properties: self.properties,
            contracts: self.contracts,
            constructor: self.constructor,
        })
    }
}
