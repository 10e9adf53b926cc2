//! Data bindings.
//!
//! A data binding maps logical attribute names onto physical
//! `(table, column)` pairs, together with the filter predicates that must
//! accompany every appearance of a column and the nature of each table's id
//! coverage. Bindings are built once by the configuration surface and shared
//! across conversions.

pub mod context;

use std::fmt;
use std::sync::Arc;

use crate::binding::context::ProcessContext;
use crate::error::{ConfigError, PlanError, Result};
use crate::types::column::SqlKind;

/// Which ids a table's rows cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdCoverage {
    /// Every id of the universe has at least one row.
    AllIds,
    /// A subset of ids, one row each at most.
    IdSubset,
    /// A sparse subset; absence of a row is meaningful.
    Sparse,
}

/// The nature of a bound table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableNature {
    coverage: IdCoverage,
    unique_ids: bool,
    primary: bool,
}

impl TableNature {
    /// A table covering every id.
    #[must_use]
    pub const fn all_ids() -> Self {
        Self {
            coverage: IdCoverage::AllIds,
            unique_ids: false,
            primary: false,
        }
    }

    /// A table covering a subset of ids.
    #[must_use]
    pub const fn id_subset() -> Self {
        Self {
            coverage: IdCoverage::IdSubset,
            unique_ids: false,
            primary: false,
        }
    }

    /// A sparse table.
    #[must_use]
    pub const fn sparse() -> Self {
        Self {
            coverage: IdCoverage::Sparse,
            unique_ids: false,
            primary: false,
        }
    }

    /// Marks ids as unique within the table (at most one row per id).
    #[must_use]
    pub const fn unique_ids(mut self) -> Self {
        self.unique_ids = true;
        self
    }

    /// Marks the table as primary: its ids are the reference universe.
    #[must_use]
    pub const fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Returns the id coverage.
    #[must_use]
    pub const fn coverage(&self) -> IdCoverage {
        self.coverage
    }

    /// Whether ids are unique within the table.
    #[must_use]
    pub const fn has_unique_ids(&self) -> bool {
        self.unique_ids
    }

    /// Whether the table is the primary table.
    #[must_use]
    pub const fn is_primary(&self) -> bool {
        self.primary
    }
}

/// A literal column-equals filter, ANDed into every reference to its table or
/// column.
///
/// The value may reference process-context variables via `${var}`; it is
/// resolved at plan time.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    /// The filter column.
    pub column: String,
    /// The filter column's kind.
    pub kind: SqlKind,
    /// The literal value, possibly containing `${var}` references.
    pub value: String,
}

impl FilterPredicate {
    /// Creates a filter predicate.
    #[must_use]
    pub fn new(column: impl Into<String>, kind: SqlKind, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind,
            value: value.into(),
        }
    }
}

/// One attribute-to-column mapping within a table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataColumn {
    /// Physical column name.
    pub column: String,
    /// The column's kind.
    pub kind: SqlKind,
    /// The mapped attribute.
    pub attribute: String,
    /// Whether the column may carry multiple rows per id. A `false` here
    /// guarantees at most one row per id in this table and licenses
    /// row-pinning of sibling columns in the same condition.
    pub multi_row: bool,
    /// Per-column filter predicates.
    pub filters: Vec<FilterPredicate>,
}

impl DataColumn {
    /// Creates a single-row mapping without filters.
    #[must_use]
    pub fn new(
        column: impl Into<String>,
        kind: SqlKind,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            kind,
            attribute: attribute.into(),
            multi_row: false,
            filters: Vec::new(),
        }
    }

    /// Marks the column as multi-row.
    #[must_use]
    pub fn multi_row(mut self) -> Self {
        self.multi_row = true;
        self
    }

    /// Adds a filter predicate.
    #[must_use]
    pub fn filter(mut self, filter: FilterPredicate) -> Self {
        self.filters.push(filter);
        self
    }
}

/// Derives a column mapping from an attribute name.
///
/// Rule-based mappings are evaluated after explicit entries; the first
/// acceptance wins.
pub trait AutoMappingPolicy: fmt::Debug + Send + Sync {
    /// Returns the mapping for `attribute`, or `None` when this table does
    /// not accept it.
    fn derive(&self, attribute: &str) -> Option<DataColumn>;
}

/// A key/value auto-mapping: attributes of the form
/// `<prefix><key>[<suffix>]` map to a shared value column, with the key
/// pinned by a filter predicate on the key column.
#[derive(Debug)]
pub struct KeyValueMappingPolicy {
    prefix: String,
    suffix: Option<String>,
    key_column: String,
    key_kind: SqlKind,
    value_column: String,
    value_kind: SqlKind,
    multi_row: bool,
}

impl KeyValueMappingPolicy {
    /// Creates a policy mapping `<prefix><key>` attributes.
    #[must_use]
    pub fn new(
        prefix: impl Into<String>,
        key_column: impl Into<String>,
        key_kind: SqlKind,
        value_column: impl Into<String>,
        value_kind: SqlKind,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: None,
            key_column: key_column.into(),
            key_kind,
            value_column: value_column.into(),
            value_kind,
            multi_row: true,
        }
    }

    /// Additionally strips `suffix` from the attribute when deriving the key.
    #[must_use]
    pub fn strip_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Marks derived columns as single-row.
    #[must_use]
    pub fn single_row(mut self) -> Self {
        self.multi_row = false;
        self
    }
}

impl AutoMappingPolicy for KeyValueMappingPolicy {
    fn derive(&self, attribute: &str) -> Option<DataColumn> {
        let key = attribute.strip_prefix(&self.prefix)?;
        let key = match &self.suffix {
            Some(suffix) => key.strip_suffix(suffix.as_str())?,
            None => key,
        };
        if key.is_empty() {
            return None;
        }
        let mut column = DataColumn::new(&self.value_column, self.value_kind.clone(), attribute)
            .filter(FilterPredicate::new(
                &self.key_column,
                self.key_kind.clone(),
                key,
            ));
        if self.multi_row {
            column = column.multi_row();
        }
        Some(column)
    }
}

/// One bound table.
#[derive(Debug, Clone)]
pub struct TableBinding {
    table: String,
    id_column: String,
    nature: TableNature,
    filters: Vec<FilterPredicate>,
    columns: Vec<DataColumn>,
    auto_mapping: Option<Arc<dyn AutoMappingPolicy>>,
}

impl TableBinding {
    /// Creates a binding for `table` keyed by `id_column`.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        id_column: impl Into<String>,
        nature: TableNature,
    ) -> Self {
        Self {
            table: table.into(),
            id_column: id_column.into(),
            nature,
            filters: Vec::new(),
            columns: Vec::new(),
            auto_mapping: None,
        }
    }

    /// Adds a table-level filter predicate.
    #[must_use]
    pub fn filter(mut self, filter: FilterPredicate) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds an explicit column mapping.
    #[must_use]
    pub fn column(mut self, column: DataColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Installs a rule-based mapping policy.
    #[must_use]
    pub fn auto_mapping(mut self, policy: Arc<dyn AutoMappingPolicy>) -> Self {
        self.auto_mapping = Some(policy);
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the id column name.
    #[must_use]
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Returns the table's nature.
    #[must_use]
    pub const fn nature(&self) -> TableNature {
        self.nature
    }

    /// Returns the table-level filter predicates.
    #[must_use]
    pub fn filters(&self) -> &[FilterPredicate] {
        &self.filters
    }

    /// Returns the explicit column mappings.
    #[must_use]
    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    fn explicit(&self, attribute: &str) -> Option<&DataColumn> {
        self.columns.iter().find(|c| c.attribute == attribute)
    }

    fn derived(&self, attribute: &str) -> Option<DataColumn> {
        self.auto_mapping.as_ref()?.derive(attribute)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_table_name(&self.table)?;
        validate_column_name(&self.id_column)?;
        for filter in &self.filters {
            validate_column_name(&filter.column)?;
        }
        for column in &self.columns {
            validate_column_name(&column.column)?;
            for filter in &column.filters {
                validate_column_name(&filter.column)?;
            }
        }
        Ok(())
    }
}

/// An attribute resolved to its physical location.
#[derive(Debug, Clone)]
pub struct ResolvedColumn<'a> {
    /// The table the attribute lives in.
    pub table: &'a TableBinding,
    /// The column mapping (owned; rule-based mappings are derived on the
    /// fly).
    pub column: DataColumn,
}

/// A validated set of table bindings.
#[derive(Debug, Clone)]
pub struct DataBinding {
    tables: Vec<TableBinding>,
    primary: Option<usize>,
}

impl DataBinding {
    /// Builds a binding from `tables`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on invalid identifiers or more than one
    /// primary table.
    pub fn new(tables: Vec<TableBinding>) -> Result<Self, ConfigError> {
        let mut primary = None;
        for (index, table) in tables.iter().enumerate() {
            table.validate()?;
            if table.nature.is_primary() {
                if let Some(first) = primary {
                    let first: &TableBinding = &tables[first];
                    return Err(ConfigError::DuplicatePrimaryTable {
                        first: first.table.clone(),
                        second: table.table.clone(),
                    });
                }
                primary = Some(index);
            }
        }
        Ok(Self { tables, primary })
    }

    /// Returns all bound tables.
    #[must_use]
    pub fn tables(&self) -> &[TableBinding] {
        &self.tables
    }

    /// Returns the primary table, if one is configured.
    #[must_use]
    pub fn primary_table(&self) -> Option<&TableBinding> {
        self.primary.map(|i| &self.tables[i])
    }

    /// Resolves `attribute` to exactly one `(table, column)` pair.
    ///
    /// Explicit entries win over rule-based mappings; within each class an
    /// acceptance by a second table is a configuration error.
    ///
    /// # Errors
    ///
    /// [`PlanError::MappingFailed`] when nothing accepts the attribute,
    /// [`ConfigError::AmbiguousMapping`] (wrapped) on double acceptance.
    pub fn resolve(&self, attribute: &str, _context: &ProcessContext) -> Result<ResolvedColumn<'_>> {
        let mut explicit: Option<ResolvedColumn<'_>> = None;
        for table in &self.tables {
            if let Some(column) = table.explicit(attribute) {
                if let Some(first) = &explicit {
                    return Err(ConfigError::AmbiguousMapping {
                        attribute: attribute.to_string(),
                        first: format!("{}.{}", first.table.table, first.column.column),
                        second: format!("{}.{}", table.table, column.column),
                    }
                    .into());
                }
                explicit = Some(ResolvedColumn {
                    table,
                    column: column.clone(),
                });
            }
        }
        if let Some(found) = explicit {
            return Ok(found);
        }

        let mut derived: Option<ResolvedColumn<'_>> = None;
        for table in &self.tables {
            if let Some(column) = table.derived(attribute) {
                if let Some(first) = &derived {
                    return Err(ConfigError::AmbiguousMapping {
                        attribute: attribute.to_string(),
                        first: format!("{}.{}", first.table.table, first.column.column),
                        second: format!("{}.{}", table.table, column.column),
                    }
                    .into());
                }
                derived = Some(ResolvedColumn { table, column });
            }
        }
        derived.ok_or_else(|| PlanError::MappingFailed {
            attribute: attribute.to_string(),
        })
    }
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '$' || c == '_')
}

fn is_backtick_quoted(name: &str) -> bool {
    name.len() >= 3
        && name.starts_with('`')
        && name.ends_with('`')
        && !name[1..name.len() - 1].contains('`')
}

/// Validates a table name: plain `[A-Za-z0-9$_]` with at most a single `.`,
/// or backtick-quoted with no embedded backticks.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidIdentifier`] when the name violates the
/// grammar.
pub fn validate_table_name(name: &str) -> Result<(), ConfigError> {
    if is_backtick_quoted(name) {
        return Ok(());
    }
    let valid = match name.split_once('.') {
        Some((schema, table)) => is_plain_identifier(schema) && is_plain_identifier(table),
        None => is_plain_identifier(name),
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            name: name.to_string(),
            reason: "table names are plain [A-Za-z0-9$_] with at most one '.', or backtick-quoted",
        })
    }
}

/// Validates a column name: plain `[A-Za-z0-9$_]` or backtick-quoted with no
/// embedded backticks.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidIdentifier`] when the name violates the
/// grammar.
pub fn validate_column_name(name: &str) -> Result<(), ConfigError> {
    if is_backtick_quoted(name) || is_plain_identifier(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            name: name.to_string(),
            reason: "column names are plain [A-Za-z0-9$_] or backtick-quoted",
        })
    }
}
