//! Logical attribute types.
//!
//! The expression language works on named attributes drawn from an external
//! type system. This module consumes that system: the five base kinds, the
//! per-attribute formatter and native-caster seams, and the resolver interface
//! through which the planner asks for attribute metadata.

pub mod column;
pub mod transfer;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CoercionError;

/// The base logical kind of an attribute.
///
/// BOOL's canonical raw representation is `"0"` / `"1"`. DATE's canonical
/// representation is `yyyy-MM-dd` in UTC, optionally extended to
/// `yyyy-MM-dd HH:mm:ss` when a timestamp column is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Free text.
    String,
    /// 64-bit signed integer.
    Integer,
    /// Double-precision decimal.
    Decimal,
    /// Canonical `"0"` / `"1"`.
    Bool,
    /// Calendar date in UTC.
    Date,
}

impl AttributeKind {
    /// Returns the kind's display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Decimal => "DECIMAL",
            Self::Bool => "BOOL",
            Self::Date => "DATE",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Normalises a raw attribute value before coercion.
pub trait ValueFormatter: fmt::Debug + Send + Sync {
    /// Formats `raw` into its normalised string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoercionError::Format`] when the raw value is unacceptable.
    fn format(&self, attribute: &str, raw: &str) -> Result<String, CoercionError>;
}

/// Produces SQL fragments that coerce a raw column expression to a requested
/// logical kind at query time.
pub trait NativeTypeCaster: fmt::Debug + Send + Sync {
    /// Returns the cast fragment for `column`, or `None` when the caster does
    /// not support the requested kind.
    fn cast(&self, column: &str, target: AttributeKind) -> Option<String>;
}

/// An attribute's type: a base kind plus an optional formatter and an optional
/// native type caster.
///
/// Two attribute types are equal iff they have the same base kind, formatter
/// identity, and caster identity.
#[derive(Debug, Clone)]
pub struct AttributeType {
    kind: AttributeKind,
    formatter: Option<Arc<dyn ValueFormatter>>,
    caster: Option<Arc<dyn NativeTypeCaster>>,
}

impl AttributeType {
    /// Creates a plain attribute type with no formatter and no caster.
    #[must_use]
    pub const fn new(kind: AttributeKind) -> Self {
        Self {
            kind,
            formatter: None,
            caster: None,
        }
    }

    /// Attaches a formatter.
    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn ValueFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Attaches a native type caster.
    #[must_use]
    pub fn with_caster(mut self, caster: Arc<dyn NativeTypeCaster>) -> Self {
        self.caster = Some(caster);
        self
    }

    /// Returns the base kind.
    #[must_use]
    pub const fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// Returns the caster, if any.
    #[must_use]
    pub fn caster(&self) -> Option<&Arc<dyn NativeTypeCaster>> {
        self.caster.as_ref()
    }

    /// Runs the formatter on `raw`, or passes the value through unchanged when
    /// no formatter is attached.
    ///
    /// # Errors
    ///
    /// Propagates [`CoercionError::Format`] from the formatter.
    pub fn format(&self, attribute: &str, raw: &str) -> Result<String, CoercionError> {
        match &self.formatter {
            Some(f) => f.format(attribute, raw),
            None => Ok(raw.to_string()),
        }
    }
}

impl PartialEq for AttributeType {
    fn eq(&self, other: &Self) -> bool {
        fn same_identity<T: ?Sized>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
            match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
        }
        self.kind == other.kind
            && same_identity(self.formatter.as_ref(), other.formatter.as_ref())
            && same_identity(self.caster.as_ref(), other.caster.as_ref())
    }
}

impl Eq for AttributeType {}

/// Interface to the external attribute type registry.
pub trait AttributeTypeResolver: fmt::Debug + Send + Sync {
    /// Returns the type of `attribute`, or `None` when the registry does not
    /// know it.
    fn resolve(&self, attribute: &str) -> Option<AttributeType>;
}

/// A map-backed [`AttributeTypeResolver`] with an optional fallback kind.
#[derive(Debug, Default)]
pub struct AttributeTypeMap {
    entries: HashMap<String, AttributeType>,
    fallback: Option<AttributeType>,
}

impl AttributeTypeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the type of `attribute`.
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, ty: AttributeType) -> Self {
        self.entries.insert(attribute.into(), ty);
        self
    }

    /// Sets a fallback type returned for unregistered attributes.
    #[must_use]
    pub fn with_fallback(mut self, ty: AttributeType) -> Self {
        self.fallback = Some(ty);
        self
    }
}

impl AttributeTypeResolver for AttributeTypeMap {
    fn resolve(&self, attribute: &str) -> Option<AttributeType> {
        self.entries
            .get(attribute)
            .or(self.fallback.as_ref())
            .cloned()
    }
}
