//! Expression-to-SQL planner.
//!
//! Converts a normalised core expression plus a data binding and a process
//! context into a [`QueryTemplateWithParameters`]: a SELECT over the id
//! universe with positional `?` placeholders and the ordered parameter list.
//!
//! A conversion is single-threaded and owns all of its state; the only gate
//! inside it is the time budget of the logical-equivalence helper, which
//! aborts the conversion on exhaustion. On failure no SQL is emitted.

pub mod base;
pub(crate) mod coalesce;
pub mod stats;
pub(crate) mod translate;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::binding::context::ProcessContext;
use crate::binding::{DataBinding, IdCoverage};
use crate::error::{PlanError, Result};
use crate::expr::{CombineOp, ExprNode, ExpressionTree, MatchOperator, NodeId, SpecialSet};
use crate::logic::TimeOut;
use crate::planner::base::BaseQuery;
use crate::planner::stats::ExpressionStats;
use crate::planner::translate::{Emitter, JoinKind};
use crate::render::{augmentation_comment, AugmentationListener, AugmentationPoint};
use crate::template::{link, QueryTemplateWithParameters};
use crate::types::{AttributeType, AttributeTypeResolver};

/// Top-level shape of the emitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryShape {
    /// `SELECT DISTINCT <id>`.
    #[default]
    SelectDistinctId,
    /// `SELECT DISTINCT <id> … ORDER BY <id>`.
    SelectDistinctIdOrdered,
    /// `SELECT COUNT(DISTINCT <id>)`.
    SelectDistinctCount,
}

/// Planner options of one conversion.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// The query shape.
    pub shape: QueryShape,
    /// Time budget of the conversion's combinatoric searches.
    pub time_budget: Duration,
    /// Optional decorative comment listener.
    pub listener: Option<Arc<dyn AugmentationListener>>,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            shape: QueryShape::SelectDistinctId,
            time_budget: Duration::from_millis(500),
            listener: None,
        }
    }
}

impl PlannerOptions {
    /// Sets the query shape.
    #[must_use]
    pub fn shape(mut self, shape: QueryShape) -> Self {
        self.shape = shape;
        self
    }

    /// Sets the time budget.
    #[must_use]
    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    /// Installs an augmentation listener.
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn AugmentationListener>) -> Self {
        self.listener = Some(listener);
        self
    }
}

/// Static truth value of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tri {
    True,
    False,
    Dynamic,
}

impl Tri {
    pub(crate) const fn negated(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Dynamic => Self::Dynamic,
        }
    }
}

/// Shared read-only state of one conversion.
pub(crate) struct PlanEnv<'a> {
    pub(crate) tree: &'a ExpressionTree,
    pub(crate) binding: &'a DataBinding,
    pub(crate) types: &'a dyn AttributeTypeResolver,
    pub(crate) context: &'a ProcessContext,
    pub(crate) stats: &'a ExpressionStats,
    pub(crate) timeout: TimeOut,
}

impl PlanEnv<'_> {
    /// Resolves the logical type of `attribute` from the external registry.
    pub(crate) fn attribute_type(&self, attribute: &str) -> Result<AttributeType> {
        self.types
            .resolve(attribute)
            .ok_or_else(|| PlanError::Conversion {
                code: "ERR_ATTRIBUTE_TYPE",
                detail: format!("no type registered for attribute '{attribute}'"),
            })
    }

    /// Whether matches on `attribute` expand to a timestamp interval.
    pub(crate) fn is_date_aligned(&self, attribute: &str) -> Result<bool> {
        if self.attribute_type(attribute)?.kind() != crate::types::AttributeKind::Date {
            return Ok(false);
        }
        let resolved = self.binding.resolve(attribute, self.context)?;
        Ok(resolved.column.kind.base() == crate::types::column::BaseSqlKind::Timestamp)
    }

    pub(crate) fn tri(&self, node: NodeId) -> Result<Tri> {
        static_truth(self.tree, node, self.binding, self.context)
    }
}

/// Evaluates the statically decidable truth of a node.
fn static_truth(
    tree: &ExpressionTree,
    node: NodeId,
    binding: &DataBinding,
    context: &ProcessContext,
) -> Result<Tri> {
    match tree.node(node) {
        ExprNode::Special(SpecialSet::All) => Ok(Tri::True),
        ExprNode::Special(SpecialSet::None) => Ok(Tri::False),
        ExprNode::Negation { inner, .. } => {
            Ok(static_truth(tree, *inner, binding, context)?.negated())
        }
        ExprNode::Combined { op, members } => {
            let mut all_decided = true;
            for &member in members {
                match (static_truth(tree, member, binding, context)?, op) {
                    (Tri::False, CombineOp::And) => return Ok(Tri::False),
                    (Tri::True, CombineOp::Or) => return Ok(Tri::True),
                    (Tri::Dynamic, _) => all_decided = false,
                    _ => {}
                }
            }
            Ok(if all_decided {
                match op {
                    CombineOp::And => Tri::True,
                    CombineOp::Or => Tri::False,
                }
            } else {
                Tri::Dynamic
            })
        }
        ExprNode::Match {
            attribute,
            operator: MatchOperator::IsUnknown,
            ..
        } => {
            // The id column of a table covering every id is always known.
            let resolved = binding.resolve(attribute, context)?;
            let always_known = resolved.column.column == resolved.table.id_column()
                && resolved.table.nature().coverage() == IdCoverage::AllIds
                && !resolved.column.multi_row;
            Ok(if always_known { Tri::False } else { Tri::Dynamic })
        }
        ExprNode::Match { .. } => Ok(Tri::Dynamic),
    }
}

/// Plans conversions of expressions over one binding.
#[derive(Debug)]
pub struct QueryPlanner<'a> {
    binding: &'a DataBinding,
    types: &'a dyn AttributeTypeResolver,
    context: &'a ProcessContext,
    options: PlannerOptions,
}

impl<'a> QueryPlanner<'a> {
    /// Creates a planner with default options.
    #[must_use]
    pub fn new(
        binding: &'a DataBinding,
        types: &'a dyn AttributeTypeResolver,
        context: &'a ProcessContext,
    ) -> Self {
        Self {
            binding,
            types,
            context,
            options: PlannerOptions::default(),
        }
    }

    /// Replaces the planner options.
    #[must_use]
    pub fn with_options(mut self, options: PlannerOptions) -> Self {
        self.options = options;
        self
    }

    /// Converts the expression under `root` into a linked query template.
    ///
    /// # Errors
    ///
    /// All planning failure modes: static short-circuits
    /// ([`PlanError::AlwaysTrue`] / [`PlanError::AlwaysFalse`]), mapping and
    /// type failures, directive violations, time-budget exhaustion, and
    /// template linking errors. On failure nothing is emitted.
    pub fn plan(
        &self,
        tree: &ExpressionTree,
        root: NodeId,
    ) -> Result<QueryTemplateWithParameters> {
        match static_truth(tree, root, self.binding, self.context)? {
            Tri::True => return Err(PlanError::AlwaysTrue),
            Tri::False => return Err(PlanError::AlwaysFalse),
            Tri::Dynamic => {}
        }

        let timeout = TimeOut::after(self.options.time_budget);
        let stats = stats::collect(tree, root, self.binding, self.context)?;
        let env = PlanEnv {
            tree,
            binding: self.binding,
            types: self.types,
            context: self.context,
            stats: &stats,
            timeout,
        };

        let base = base::choose(&env, root)?;
        // Unqualified rendering is only safe when the whole query lives on
        // one table and that table is the base.
        let qualify = !(stats.simple_condition
            && matches!(&base, BaseQuery::InlineTable { table, .. }
                if stats.tables.len() == 1 && stats.tables.contains(table)));
        let mut emitter = Emitter::new(&env, &base, qualify)?;
        let where_fragment = emitter.condition_root(root)?;
        let sql = self.assemble(&emitter, where_fragment.as_deref());
        debug!(
            shape = ?self.options.shape,
            withs = emitter.withs.len(),
            joins = emitter.joins.len(),
            parameters = emitter.params.len(),
            "assembled query fragment"
        );
        Ok(link(&sql, &emitter.params)?)
    }

    fn assemble(&self, emitter: &Emitter<'_>, where_fragment: Option<&str>) -> String {
        let listener = self.options.listener.as_deref();
        let comment =
            |point: AugmentationPoint| -> Option<String> { augmentation_comment(listener, point) };
        let (from, base_id) = emitter.base_sql();
        let mut parts: Vec<String> = Vec::new();

        if let Some(c) = comment(AugmentationPoint::BeforeScript) {
            parts.push(c);
        }
        if !emitter.withs.is_empty() {
            let clauses: Vec<String> = emitter
                .withs
                .iter()
                .map(|w| {
                    let mut body = w.body.clone();
                    if let Some(c) = comment(AugmentationPoint::BeforeWithSelect) {
                        body = format!("{c} {body}");
                    }
                    if let Some(c) = comment(AugmentationPoint::AfterWithSelect) {
                        body = format!("{body} {c}");
                    }
                    format!("{} AS ({body})", w.alias)
                })
                .collect();
            parts.push(format!("WITH {}", clauses.join(", ")));
        }
        if let Some(c) = comment(AugmentationPoint::BeforeMainSelect) {
            parts.push(c);
        }
        let select = match self.options.shape {
            QueryShape::SelectDistinctId | QueryShape::SelectDistinctIdOrdered => {
                format!("SELECT DISTINCT {base_id}")
            }
            QueryShape::SelectDistinctCount => format!("SELECT COUNT(DISTINCT {base_id})"),
        };
        parts.push(select);
        if let Some(c) = comment(AugmentationPoint::AfterMainSelect) {
            parts.push(c);
        }
        parts.push(format!("FROM {from}"));
        for join in &emitter.joins {
            let keyword = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::LeftOuter => "LEFT OUTER JOIN",
            };
            let mut on = join.on.clone();
            if let Some(c) = comment(AugmentationPoint::BeforeOnConditions) {
                on = format!("{c} {on}");
            }
            if let Some(c) = comment(AugmentationPoint::AfterOnConditions) {
                on = format!("{on} {c}");
            }
            parts.push(format!("{keyword} {} ON ({on})", join.target));
        }
        if let Some(where_fragment) = where_fragment {
            parts.push(format!("WHERE {where_fragment}"));
        }
        if self.options.shape == QueryShape::SelectDistinctIdOrdered {
            parts.push(format!("ORDER BY {base_id}"));
        }
        if let Some(c) = comment(AugmentationPoint::AfterScript) {
            parts.push(c);
        }
        parts.join(" ")
    }
}
