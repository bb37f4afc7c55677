//! Host object model for the dynlink call-site linker.
//!
//! This crate provides:
//! - Runtime type descriptors with stable ids and subtype relations
//! - Defining scopes that own scope-bound types
//! - Reclaim notifications fired when types and scopes are dropped
//! - Dynamic values (scalars, sequences, mappings, functions, beans)
//! - Introspectable bean classes with properties, methods and fields
//! - Built-in bean classes describing sequences, mappings and strings

#![deny(unsafe_op_in_unsafe_fn)]

pub mod bean;
pub mod builtins;
pub mod collections;
pub mod error;
pub mod function;
pub mod reclaim;
pub mod registry;
pub mod types;
pub mod value;

pub use bean::{Access, BeanClass, BeanClassBuilder, BeanObject, MethodBody, MethodDef, PropertyDef};
pub use collections::{Key, MapObject, SeqObject};
pub use error::RuntimeError;
pub use function::NativeFunction;
pub use reclaim::{ReclaimHooks, ReclaimQueue, Reclaimed};
pub use registry::TypeRegistry;
pub use types::{DefiningScope, RuntimeType, ScopeId, TypeId, TypeKind, TypeRef};
pub use value::Value;
