//! # cohort-sql-core
//!
//! Compiles a cohort-definition expression — a boolean tree over typed, named
//! attributes — into a safely parameterised SQL query.
//!
//! The crate covers the core of that pipeline:
//! - typed value coercion from logical attribute kinds into the transfer
//!   types of physical SQL columns, with range, format and compatibility
//!   enforcement;
//! - a planner that turns the expression DAG into a `SELECT DISTINCT` over
//!   the id universe, honouring multi-table bindings, multi-row attributes,
//!   NULL/unknown semantics, reference matches and negation;
//! - a positional parameter linker that decouples parameter creation order
//!   from parameter positions in the final SQL.
//!
//! ## Quick start
//!
//! ```rust
//! use cohort_sql_core::binding::{DataBinding, DataColumn, TableBinding, TableNature};
//! use cohort_sql_core::binding::context::ProcessContext;
//! use cohort_sql_core::expr::{ExpressionTree, MatchOperator};
//! use cohort_sql_core::planner::QueryPlanner;
//! use cohort_sql_core::types::column::{BaseSqlKind, SqlKind};
//! use cohort_sql_core::types::{AttributeKind, AttributeType, AttributeTypeMap};
//!
//! let binding = DataBinding::new(vec![TableBinding::new(
//!     "TBL",
//!     "ID",
//!     TableNature::all_ids().primary(),
//! )
//! .column(DataColumn::new(
//!     "COLOR",
//!     SqlKind::builtin(BaseSqlKind::Varchar),
//!     "color",
//! ))])
//! .unwrap();
//! let types = AttributeTypeMap::new().with("color", AttributeType::new(AttributeKind::String));
//! let context = ProcessContext::new();
//!
//! let mut tree = ExpressionTree::new();
//! let root = tree.match_value("color", MatchOperator::Equals, "red");
//!
//! let template = QueryPlanner::new(&binding, &types, &context)
//!     .plan(&tree, root)
//!     .unwrap();
//! assert_eq!(template.sql(), "SELECT DISTINCT ID FROM TBL WHERE COLOR = ?");
//! assert_eq!(template.parameters().len(), 1);
//! ```
//!
//! Execution happens downstream: the template binds its parameters
//! positionally onto a prepared statement. The textual renderer in
//! [`render`] exists only for debugging and is explicitly unsafe.

pub mod binding;
pub mod error;
pub mod expr;
pub mod logic;
pub mod param;
pub mod planner;
pub mod render;
pub mod template;
pub mod types;

pub use binding::context::{Directive, ProcessContext};
pub use binding::{
    AutoMappingPolicy, DataBinding, DataColumn, FilterPredicate, IdCoverage,
    KeyValueMappingPolicy, TableBinding, TableNature,
};
pub use error::{CoercionError, ConfigError, PlanError, TemplateError};
pub use expr::{CombineOp, ExprNode, ExpressionTree, MatchOperator, NodeId, Operand, SpecialSet};
pub use param::creator::{accepts, default_creator, DefaultParameterCreator};
pub use param::{
    ParameterApplicator, ParameterCreator, ParameterIdSequence, ParameterRequest, QueryParameter,
};
pub use planner::{PlannerOptions, QueryPlanner, QueryShape};
pub use render::{
    default_applicator, render_unsafe, AugmentationListener, AugmentationPoint, LiteralDialect,
};
pub use template::{link, QueryTemplateWithParameters};
pub use types::column::{BaseSqlKind, KindOverrides, SqlKind, SqlKindRegistry};
pub use types::transfer::{TransferTag, TransferValue};
pub use types::{
    AttributeKind, AttributeType, AttributeTypeMap, AttributeTypeResolver, NativeTypeCaster,
    ValueFormatter,
};
