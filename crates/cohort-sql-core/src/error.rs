//! Error types for cohort-sql-core.
//!
//! Every failure is reported as a value, never retried and never panicked.
//! The planner emits no SQL on failure; callers receive the error and no
//! template.

use thiserror::Error;

use crate::binding::context::Directive;
use crate::types::transfer::TransferTag;
use crate::types::AttributeKind;

/// Configuration errors, rejected before any SQL is emitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An attribute resolves to more than one table/column pair.
    #[error("attribute '{attribute}' maps to both '{first}' and '{second}'")]
    AmbiguousMapping {
        /// The attribute that was looked up.
        attribute: String,
        /// First accepted mapping (`table.column`).
        first: String,
        /// Conflicting second mapping (`table.column`).
        second: String,
    },

    /// A table or column name violates the identifier grammar.
    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A parameter id violates the id grammar.
    #[error("invalid parameter id '{id}': {reason}")]
    InvalidParameterId {
        /// The rejected id.
        id: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A parameter value's runtime type does not match the column kind's
    /// transfer type.
    #[error("value of type {actual:?} does not match transfer type {expected:?} of {kind}")]
    IncompatibleTransferType {
        /// Name of the SQL column kind.
        kind: String,
        /// The transfer tag the kind demands.
        expected: TransferTag,
        /// The tag actually supplied.
        actual: TransferTag,
    },

    /// More than one table in a binding is tagged primary.
    #[error("binding declares two primary tables: '{first}' and '{second}'")]
    DuplicatePrimaryTable {
        /// First table tagged primary.
        first: String,
        /// Second table tagged primary.
        second: String,
    },
}

/// Failures while coercing a raw attribute value into a transfer value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoercionError {
    /// The attribute's formatter rejected the raw value.
    #[error("formatter rejected value '{value}' of attribute '{attribute}': {detail}")]
    Format {
        /// Attribute name.
        attribute: String,
        /// The offending raw value.
        value: String,
        /// Formatter-supplied detail.
        detail: String,
    },

    /// A numeric or date value lies outside the target column's range.
    #[error("value '{value}' of attribute '{attribute}' is out of range for {target}")]
    ValueRange {
        /// Attribute name.
        attribute: String,
        /// The offending literal.
        value: String,
        /// Name of the target SQL kind.
        target: String,
    },

    /// The value cannot be parsed for the target kind.
    #[error("cannot parse value '{value}' of attribute '{attribute}' for {target}")]
    ValueFormat {
        /// Attribute name.
        attribute: String,
        /// The offending literal.
        value: String,
        /// Name of the target SQL kind.
        target: String,
    },

    /// The value is not a canonical boolean.
    #[error("value '{value}' of attribute '{attribute}' is not a boolean (expected '0' or '1')")]
    ValueFormatBool {
        /// Attribute name.
        attribute: String,
        /// The offending literal.
        value: String,
    },

    /// The value is not a valid date (or date-time) in UTC.
    #[error("value '{value}' of attribute '{attribute}' is not a valid date")]
    ValueFormatDate {
        /// Attribute name.
        attribute: String,
        /// The offending literal.
        value: String,
    },

    /// The compatibility matrix refused the source/target pairing.
    #[error("{kind:?} attribute '{attribute}' cannot target {target}")]
    TypeMismatch {
        /// Attribute name.
        attribute: String,
        /// The attribute's base logical kind.
        kind: AttributeKind,
        /// Name of the refused target SQL kind.
        target: String,
    },

    /// Early configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Template linker failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `${` with no closing `}`.
    #[error("unclosed placeholder starting at offset {offset}")]
    Unclosed {
        /// Byte offset of the `${`.
        offset: usize,
    },

    /// A `${}` with nothing inside.
    #[error("empty placeholder at offset {offset}")]
    Empty {
        /// Byte offset of the `${`.
        offset: usize,
    },

    /// A placeholder references an id no parameter carries.
    #[error("placeholder '{id}' has no matching parameter")]
    Unknown {
        /// The unmatched id.
        id: String,
    },

    /// Two parameters that are not value-equal share one id.
    #[error("two distinct parameters share the id '{id}'")]
    Duplicate {
        /// The contested id.
        id: String,
    },
}

/// Failures while converting an expression into a query template.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    /// The expression is statically true; no query is needed.
    #[error("the expression always evaluates to true")]
    AlwaysTrue,

    /// The expression is statically false; no query is needed.
    #[error("the expression always evaluates to false")]
    AlwaysFalse,

    /// The data binding could not resolve an attribute.
    #[error("no mapping for attribute '{attribute}'")]
    MappingFailed {
        /// The unresolved attribute.
        attribute: String,
    },

    /// An active directive prohibits a construct the expression requires.
    #[error("directive {directive:?} prohibits {construct}")]
    Directive {
        /// The violated directive.
        directive: Directive,
        /// The prohibited construct.
        construct: String,
    },

    /// The conversion hit an unsatisfiable shape.
    #[error("{detail}")]
    Conversion {
        /// Stable user-facing code.
        code: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// The time budget of the conversion was exhausted.
    #[error("conversion aborted: time budget exhausted")]
    TimeOut,

    /// A `${var}` in a filter predicate has no value in the process context.
    #[error("variable '${{{name}}}' is not defined in the process context")]
    UnresolvedVariable {
        /// The missing variable name.
        name: String,
    },

    /// Configuration failure surfaced during planning.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Value coercion failure surfaced during planning.
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// Template linking failure surfaced during planning.
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl PlanError {
    /// Returns the stable user-facing code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlwaysTrue => "ERR_ALWAYS_TRUE",
            Self::AlwaysFalse => "ERR_ALWAYS_FALSE",
            Self::MappingFailed { .. } => "ERR_MAPPING_FAILED",
            Self::Directive { .. } => "ERR_DIRECTIVE",
            Self::Conversion { code, .. } => code,
            Self::TimeOut => "ERR_TIMEOUT",
            Self::UnresolvedVariable { .. } => "ERR_UNRESOLVED_VARIABLE",
            Self::Config(_) => "ERR_CONFIG",
            Self::Coercion(_) => "ERR_COERCION",
            Self::Template(_) => "ERR_TEMPLATE",
        }
    }
}

/// Result type alias for conversions.
pub type Result<T, E = PlanError> = std::result::Result<T, E>;
