//! Query parameters.
//!
//! A query parameter carries a typed transfer value from the planner to the
//! execution layer, identified by an id that the template linker later turns
//! into a positional `?`.

pub mod creator;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ConfigError;
use crate::expr::MatchOperator;
use crate::render::LiteralDialect;
use crate::types::column::SqlKind;
use crate::types::transfer::TransferValue;
use crate::types::AttributeType;

/// First value issued by the auto id sequence.
const PARAM_SEQ_START: u64 = 1001;

static PARAM_SEQ: AtomicU64 = AtomicU64::new(PARAM_SEQ_START);

/// Issues process-wide unique parameter ids of the form `P_<seq>`.
#[derive(Debug)]
pub struct ParameterIdSequence;

impl ParameterIdSequence {
    /// Returns the next id.
    #[must_use]
    pub fn next() -> String {
        format!("P_{}", PARAM_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Resets the sequence to its start value.
    ///
    /// For deterministic tests only; resetting while conversions are running
    /// can produce colliding ids.
    pub fn reset_for_tests() {
        PARAM_SEQ.store(PARAM_SEQ_START, Ordering::Relaxed);
    }
}

/// Validates a parameter id: non-empty, no whitespace, none of `$`, `{`, `}`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidParameterId`] when the id violates the
/// grammar.
pub fn validate_parameter_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::InvalidParameterId {
            id: id.to_string(),
            reason: "id must not be empty",
        });
    }
    if id.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidParameterId {
            id: id.to_string(),
            reason: "id must not contain whitespace",
        });
    }
    if id.contains(['$', '{', '}']) {
        return Err(ConfigError::InvalidParameterId {
            id: id.to_string(),
            reason: "id must not contain '$', '{' or '}'",
        });
    }
    Ok(())
}

/// A validated query parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    id: String,
    kind: SqlKind,
    value: TransferValue,
    operator: MatchOperator,
}

impl QueryParameter {
    /// Creates a parameter, validating the id grammar and that the value's
    /// variant matches the kind's transfer type (or is absent for NULL).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameterId`] or
    /// [`ConfigError::IncompatibleTransferType`].
    pub fn new(
        id: impl Into<String>,
        kind: SqlKind,
        value: TransferValue,
        operator: MatchOperator,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        validate_parameter_id(&id)?;
        if let Some(tag) = value.tag() {
            if tag != kind.transfer_tag() {
                return Err(ConfigError::IncompatibleTransferType {
                    kind: kind.name().to_string(),
                    expected: kind.transfer_tag(),
                    actual: tag,
                });
            }
        }
        Ok(Self {
            id,
            kind,
            value,
            operator,
        })
    }

    /// Returns the parameter id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the target column kind.
    #[must_use]
    pub const fn kind(&self) -> &SqlKind {
        &self.kind
    }

    /// Returns the transfer value.
    #[must_use]
    pub const fn value(&self) -> &TransferValue {
        &self.value
    }

    /// Returns the match operator this parameter was created for. This is
    /// context only, consumed by the unsafe debug renderer.
    #[must_use]
    pub const fn operator(&self) -> MatchOperator {
        self.operator
    }
}

/// Everything a creator needs to produce one parameter.
#[derive(Debug)]
pub struct ParameterRequest<'a> {
    /// Caller-supplied id; auto-issued when absent.
    pub id: Option<&'a str>,
    /// Attribute name, carried into error messages.
    pub attribute: &'a str,
    /// The attribute's logical type.
    pub attribute_type: &'a AttributeType,
    /// The raw value as written in the expression.
    pub raw: &'a str,
    /// The operator of the enclosing match.
    pub operator: MatchOperator,
    /// The target column kind.
    pub target: &'a SqlKind,
}

/// Produces validated parameters from raw attribute values.
pub trait ParameterCreator: fmt::Debug + Send + Sync {
    /// Creates a parameter for `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`CoercionError`](crate::error::CoercionError) when the value
    /// cannot be carried to the target kind.
    fn create(
        &self,
        request: &ParameterRequest<'_>,
    ) -> Result<QueryParameter, crate::error::CoercionError>;
}

/// Renders parameters for the unsafe debug surface.
///
/// Production execution binds parameters positionally on a prepared statement
/// and never goes through this trait.
pub trait ParameterApplicator: fmt::Debug + Send + Sync {
    /// Renders `parameter` as an inline SQL literal.
    ///
    /// # Errors
    ///
    /// Returns a [`CoercionError`](crate::error::CoercionError) when the value
    /// cannot be rendered.
    fn render_unsafe(
        &self,
        parameter: &QueryParameter,
        dialect: LiteralDialect,
    ) -> Result<String, crate::error::CoercionError>;
}
