//! Call-site descriptors.
//!
//! A descriptor is the immutable description of one call site: who is
//! asking ([`Lookup`]), what they ask for ([`Operation`]) and with which
//! calling convention ([`MethodType`]). An optional [`SourceLocation`] is
//! carried for diagnostics only and does not take part in equality.

use crate::method_type::MethodType;
use crate::operation::Operation;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// =============================================================================
// Lookup
// =============================================================================

/// Access context of the code that owns a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lookup {
    origin: Arc<str>,
    privileged: bool,
}

impl Lookup {
    /// A lookup that only reaches public members.
    pub fn public(origin: &str) -> Self {
        Self {
            origin: origin.into(),
            privileged: false,
        }
    }

    /// A lookup that may reach non-public members.
    pub fn privileged(origin: &str) -> Self {
        Self {
            origin: origin.into(),
            privileged: true,
        }
    }

    #[inline]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[inline]
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }
}

// =============================================================================
// Source Location
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: Arc<str>,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: &str, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Immutable description of a call site.
#[derive(Debug, Clone)]
pub struct CallSiteDescriptor {
    lookup: Lookup,
    operation: Operation,
    method_type: MethodType,
    location: Option<SourceLocation>,
}

impl CallSiteDescriptor {
    pub fn new(lookup: Lookup, operation: Operation, method_type: MethodType) -> Self {
        Self {
            lookup,
            operation,
            method_type,
            location: None,
        }
    }

    #[inline]
    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    #[inline]
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    #[inline]
    pub fn method_type(&self) -> &MethodType {
        &self.method_type
    }

    #[inline]
    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub fn change_method_type(&self, method_type: MethodType) -> Self {
        Self {
            method_type,
            ..self.clone()
        }
    }

    pub fn change_operation(&self, operation: Operation) -> Self {
        Self {
            operation,
            ..self.clone()
        }
    }

    pub fn with_location(self, location: SourceLocation) -> Self {
        Self {
            location: Some(location),
            ..self
        }
    }
}

impl PartialEq for CallSiteDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.lookup == other.lookup
            && self.operation == other.operation
            && self.method_type == other.method_type
    }
}

impl Eq for CallSiteDescriptor {}

impl Hash for CallSiteDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lookup.hash(state);
        self.operation.hash(state);
        self.method_type.hash(state);
    }
}

impl fmt::Display for CallSiteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operation, self.method_type)?;
        if let Some(location) = &self.location {
            write!(f, " @ {location}")?;
        }
        Ok(())
    }
}
