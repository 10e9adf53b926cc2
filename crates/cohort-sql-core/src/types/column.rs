//! SQL column kinds.
//!
//! A column kind identifies a JDBC-style type: a transfer type, capability
//! flags, and the creator/applicator pair used for its parameters. Kinds are
//! decorable: a decoration layers a new name over an existing kind and may
//! override the formatter, caster, creator, or applicator, while capability
//! flags and all switch-on-kind logic follow the innermost base kind.
//!
//! Column kinds model physical columns only. As logical-data-model types they
//! are incompatible with everything, themselves included; attributes are typed
//! by [`AttributeKind`](super::AttributeKind), never by a column kind.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::param::{ParameterApplicator, ParameterCreator};
use crate::types::transfer::TransferTag;
use crate::types::{NativeTypeCaster, ValueFormatter};

/// The 19 built-in SQL column kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseSqlKind {
    /// Single bit, boolean transfer.
    Bit,
    /// Boolean.
    Boolean,
    /// Unsigned byte 0..=255.
    TinyInt,
    /// Signed 16-bit integer.
    SmallInt,
    /// Signed 32-bit integer.
    Integer,
    /// Signed 64-bit integer.
    BigInt,
    /// Decimal, double transfer.
    Decimal,
    /// Double precision.
    Double,
    /// Real, double transfer.
    Real,
    /// Float, single-precision transfer.
    Float,
    /// Fixed-point, scale 7, rounding half-up.
    Numeric,
    /// Calendar date (UTC).
    Date,
    /// Instant, milliseconds since epoch.
    Timestamp,
    /// Fixed-length character.
    Char,
    /// Fixed-length national character.
    NChar,
    /// Variable-length character.
    Varchar,
    /// Variable-length national character.
    NVarchar,
    /// Long variable-length character.
    LongVarchar,
    /// Long variable-length national character.
    LongNVarchar,
}

impl BaseSqlKind {
    /// All built-in kinds.
    pub const ALL: [Self; 19] = [
        Self::Bit,
        Self::Boolean,
        Self::TinyInt,
        Self::SmallInt,
        Self::Integer,
        Self::BigInt,
        Self::Decimal,
        Self::Double,
        Self::Real,
        Self::Float,
        Self::Numeric,
        Self::Date,
        Self::Timestamp,
        Self::Char,
        Self::NChar,
        Self::Varchar,
        Self::NVarchar,
        Self::LongVarchar,
        Self::LongNVarchar,
    ];

    /// Returns the kind's canonical name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bit => "SQL_BIT",
            Self::Boolean => "SQL_BOOLEAN",
            Self::TinyInt => "SQL_TINYINT",
            Self::SmallInt => "SQL_SMALLINT",
            Self::Integer => "SQL_INTEGER",
            Self::BigInt => "SQL_BIGINT",
            Self::Decimal => "SQL_DECIMAL",
            Self::Double => "SQL_DOUBLE",
            Self::Real => "SQL_REAL",
            Self::Float => "SQL_FLOAT",
            Self::Numeric => "SQL_NUMERIC",
            Self::Date => "SQL_DATE",
            Self::Timestamp => "SQL_TIMESTAMP",
            Self::Char => "SQL_CHAR",
            Self::NChar => "SQL_NCHAR",
            Self::Varchar => "SQL_VARCHAR",
            Self::NVarchar => "SQL_NVARCHAR",
            Self::LongVarchar => "SQL_LONGVARCHAR",
            Self::LongNVarchar => "SQL_LONGNVARCHAR",
        }
    }

    /// Returns the transfer type this kind demands.
    #[must_use]
    pub const fn transfer_tag(&self) -> TransferTag {
        match self {
            Self::Bit | Self::Boolean => TransferTag::Bool,
            Self::TinyInt => TransferTag::U8,
            Self::SmallInt => TransferTag::I16,
            Self::Integer => TransferTag::I32,
            Self::BigInt => TransferTag::I64,
            Self::Decimal | Self::Double | Self::Real => TransferTag::F64,
            Self::Float => TransferTag::F32,
            Self::Numeric => TransferTag::Decimal7,
            Self::Date => TransferTag::Date,
            Self::Timestamp => TransferTag::Timestamp,
            Self::Char
            | Self::NChar
            | Self::Varchar
            | Self::NVarchar
            | Self::LongVarchar
            | Self::LongNVarchar => TransferTag::Str,
        }
    }

    /// Whether CONTAINS matches are expressible against this kind.
    #[must_use]
    pub const fn supports_contains(&self) -> bool {
        self.is_character()
    }

    /// Whether `<` / `>` matches are expressible against this kind.
    #[must_use]
    pub const fn supports_less_than_greater_than(&self) -> bool {
        !matches!(self, Self::Bit | Self::Boolean)
    }

    /// Whether this is one of the character kinds.
    #[must_use]
    pub const fn is_character(&self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::NChar
                | Self::Varchar
                | Self::NVarchar
                | Self::LongVarchar
                | Self::LongNVarchar
        )
    }

    /// Whether this is one of the integer kinds.
    #[must_use]
    pub const fn is_integer_family(&self) -> bool {
        matches!(
            self,
            Self::TinyInt | Self::SmallInt | Self::Integer | Self::BigInt
        )
    }

    /// Whether this is one of the decimal kinds.
    #[must_use]
    pub const fn is_decimal_family(&self) -> bool {
        matches!(
            self,
            Self::Decimal | Self::Double | Self::Real | Self::Float | Self::Numeric
        )
    }

    /// Whether this is one of the boolean kinds.
    #[must_use]
    pub const fn is_boolean_family(&self) -> bool {
        matches!(self, Self::Bit | Self::Boolean)
    }
}

impl fmt::Display for BaseSqlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Overridable behaviour of a decorated kind.
#[derive(Debug, Clone, Default)]
pub struct KindOverrides {
    /// Replacement value formatter.
    pub formatter: Option<Arc<dyn ValueFormatter>>,
    /// Replacement native type caster.
    pub caster: Option<Arc<dyn NativeTypeCaster>>,
    /// Replacement parameter creator.
    pub creator: Option<Arc<dyn ParameterCreator>>,
    /// Replacement parameter applicator.
    pub applicator: Option<Arc<dyn ParameterApplicator>>,
}

impl KindOverrides {
    /// Merges `outer` over `self`: outer entries win where present.
    fn layered(&self, outer: &Self) -> Self {
        Self {
            formatter: outer.formatter.clone().or_else(|| self.formatter.clone()),
            caster: outer.caster.clone().or_else(|| self.caster.clone()),
            creator: outer.creator.clone().or_else(|| self.creator.clone()),
            applicator: outer.applicator.clone().or_else(|| self.applicator.clone()),
        }
    }
}

/// A SQL column kind: a base kind plus optional decoration.
///
/// Equality compares name and base kind, so a decorated kind keeps its
/// identity regardless of how its overrides were layered.
#[derive(Debug, Clone)]
pub struct SqlKind {
    name: String,
    base: BaseSqlKind,
    overrides: KindOverrides,
}

impl SqlKind {
    /// Wraps a built-in kind without decoration.
    #[must_use]
    pub fn builtin(base: BaseSqlKind) -> Self {
        Self {
            name: base.name().to_string(),
            base,
            overrides: KindOverrides::default(),
        }
    }

    /// Returns the kind's name (decorated kinds carry their decoration name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the innermost base kind.
    #[must_use]
    pub const fn base(&self) -> BaseSqlKind {
        self.base
    }

    /// Returns the effective formatter override, if any.
    #[must_use]
    pub fn formatter(&self) -> Option<&Arc<dyn ValueFormatter>> {
        self.overrides.formatter.as_ref()
    }

    /// Returns the effective caster override, if any.
    #[must_use]
    pub fn caster(&self) -> Option<&Arc<dyn NativeTypeCaster>> {
        self.overrides.caster.as_ref()
    }

    /// Returns the effective creator override, if any.
    #[must_use]
    pub fn creator(&self) -> Option<&Arc<dyn ParameterCreator>> {
        self.overrides.creator.as_ref()
    }

    /// Returns the effective applicator override, if any.
    #[must_use]
    pub fn applicator(&self) -> Option<&Arc<dyn ParameterApplicator>> {
        self.overrides.applicator.as_ref()
    }

    /// Whether CONTAINS matches are expressible; inherited from the base kind.
    #[must_use]
    pub const fn supports_contains(&self) -> bool {
        self.base.supports_contains()
    }

    /// Whether `<` / `>` matches are expressible; inherited from the base
    /// kind.
    #[must_use]
    pub const fn supports_less_than_greater_than(&self) -> bool {
        self.base.supports_less_than_greater_than()
    }

    /// Returns the transfer type this kind demands; inherited from the base
    /// kind.
    #[must_use]
    pub const fn transfer_tag(&self) -> TransferTag {
        self.base.transfer_tag()
    }
}

impl PartialEq for SqlKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.base == other.base
    }
}

impl Eq for SqlKind {}

impl fmt::Display for SqlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Registry of column kinds: the 19 built-ins plus any decorations layered on
/// top of them.
#[derive(Debug)]
pub struct SqlKindRegistry {
    kinds: HashMap<String, SqlKind>,
    decoration_seq: u64,
}

impl SqlKindRegistry {
    /// Creates a registry holding the 19 built-in kinds.
    #[must_use]
    pub fn new() -> Self {
        let mut kinds = HashMap::new();
        for base in BaseSqlKind::ALL {
            kinds.insert(base.name().to_string(), SqlKind::builtin(base));
        }
        Self {
            kinds,
            decoration_seq: 1,
        }
    }

    /// Looks up a kind by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlKind> {
        self.kinds.get(name)
    }

    /// Decorates `inner` with `overrides`, auto-assigning a unique name by
    /// appending a monotonically increasing suffix to the innermost name.
    ///
    /// Decoration composes: decorating an already decorated kind layers the
    /// new overrides over the existing ones while the base kind stays the
    /// innermost one.
    pub fn decorate(&mut self, inner: &SqlKind, overrides: KindOverrides) -> SqlKind {
        let name = loop {
            let candidate = format!("{}_{}", inner.base.name(), self.decoration_seq);
            self.decoration_seq += 1;
            if !self.kinds.contains_key(&candidate) {
                break candidate;
            }
        };
        let kind = SqlKind {
            name,
            base: inner.base,
            overrides: inner.overrides.layered(&overrides),
        };
        self.kinds.insert(kind.name.clone(), kind.clone());
        kind
    }
}

impl Default for SqlKindRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoercionError;

    #[test]
    fn test_builtin_count_and_names() {
        let registry = SqlKindRegistry::new();
        for base in BaseSqlKind::ALL {
            assert!(registry.get(base.name()).is_some(), "{}", base.name());
        }
        assert_eq!(BaseSqlKind::ALL.len(), 19);
    }

    #[test]
    fn test_capability_flags() {
        assert!(BaseSqlKind::Varchar.supports_contains());
        assert!(BaseSqlKind::LongNVarchar.supports_contains());
        assert!(!BaseSqlKind::Integer.supports_contains());
        assert!(!BaseSqlKind::Bit.supports_less_than_greater_than());
        assert!(!BaseSqlKind::Boolean.supports_less_than_greater_than());
        assert!(BaseSqlKind::Timestamp.supports_less_than_greater_than());
    }

    #[derive(Debug)]
    struct Trim;

    impl crate::types::ValueFormatter for Trim {
        fn format(&self, _attribute: &str, raw: &str) -> Result<String, CoercionError> {
            Ok(raw.trim().to_string())
        }
    }

    #[test]
    fn test_decoration_auto_names_and_inherits_capabilities() {
        let mut registry = SqlKindRegistry::new();
        let varchar = registry.get("SQL_VARCHAR").cloned().unwrap();

        let first = registry.decorate(
            &varchar,
            KindOverrides {
                formatter: Some(Arc::new(Trim)),
                ..KindOverrides::default()
            },
        );
        let second = registry.decorate(&first, KindOverrides::default());

        assert_eq!(first.name(), "SQL_VARCHAR_1");
        assert_eq!(second.name(), "SQL_VARCHAR_2");
        assert_eq!(second.base(), BaseSqlKind::Varchar);
        assert!(second.supports_contains());
        // The inner formatter survives re-decoration.
        assert!(second.formatter().is_some());
        assert!(registry.get("SQL_VARCHAR_1").is_some());
    }

    #[test]
    fn test_kind_equality_is_name_and_base() {
        let a = SqlKind::builtin(BaseSqlKind::Varchar);
        let b = SqlKind::builtin(BaseSqlKind::Varchar);
        let c = SqlKind::builtin(BaseSqlKind::NVarchar);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
