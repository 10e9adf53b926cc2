//! Expression stats pre-pass.
//!
//! One walk over the expression collects everything the planner needs before
//! it commits to a base query: the attributes in play, their multi-row
//! sensitivity, the involved tables, and the conversion hints. Directive and
//! capability violations are rejected here, before any SQL is emitted.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::binding::context::{Directive, ProcessContext};
use crate::binding::DataBinding;
use crate::error::{PlanError, Result};
use crate::expr::{ExprNode, ExpressionTree, MatchOperator, NodeId, Operand};

/// How one attribute is used across the expression.
#[derive(Debug, Clone, Default)]
pub struct AttributeUse {
    /// The attribute sits on a multi-row column, or participates in a
    /// reference match with one.
    pub multi_row_sensitive: bool,
    /// Tables the attribute resolves into.
    pub tables: BTreeSet<String>,
}

/// Everything the pre-pass learns about an expression.
#[derive(Debug, Clone, Default)]
pub struct ExpressionStats {
    /// Per-attribute usage, reference-match aware.
    pub attributes: BTreeMap<String, AttributeUse>,
    /// All involved tables.
    pub tables: BTreeSet<String>,
    /// No multi-row attribute, no negation, no reference match, no
    /// IS UNKNOWN, and a single involved table.
    pub simple_condition: bool,
    /// The expression contains a negation.
    pub has_negation: bool,
    /// The expression contains a reference match.
    pub has_reference_match: bool,
    /// The expression contains an IS UNKNOWN match.
    pub has_is_unknown: bool,
}

impl ExpressionStats {
    /// Whether `attribute` is multi-row sensitive.
    #[must_use]
    pub fn is_multi_row_sensitive(&self, attribute: &str) -> bool {
        self.attributes
            .get(attribute)
            .is_some_and(|a| a.multi_row_sensitive)
    }
}

/// Collects stats for the expression under `root`.
///
/// # Errors
///
/// Fails with [`PlanError::MappingFailed`] for unresolvable attributes,
/// [`PlanError::Directive`] when an active directive prohibits a construct
/// the expression requires, and [`PlanError::Conversion`] when a column kind
/// lacks a required capability.
pub fn collect(
    tree: &ExpressionTree,
    root: NodeId,
    binding: &DataBinding,
    context: &ProcessContext,
) -> Result<ExpressionStats> {
    let mut stats = ExpressionStats::default();
    visit(tree, root, binding, context, &mut stats)?;
    stats.simple_condition = !stats.has_negation
        && !stats.has_reference_match
        && !stats.has_is_unknown
        && stats.tables.len() <= 1
        && stats.attributes.values().all(|a| !a.multi_row_sensitive);
    debug!(
        attributes = stats.attributes.len(),
        tables = stats.tables.len(),
        simple = stats.simple_condition,
        "collected expression stats"
    );
    Ok(stats)
}

fn visit(
    tree: &ExpressionTree,
    id: NodeId,
    binding: &DataBinding,
    context: &ProcessContext,
    stats: &mut ExpressionStats,
) -> Result<()> {
    match tree.node(id) {
        ExprNode::Special(_) => Ok(()),
        ExprNode::Negation { inner, .. } => {
            stats.has_negation = true;
            visit(tree, *inner, binding, context, stats)
        }
        ExprNode::Combined { members, .. } => {
            for &member in members {
                visit(tree, member, binding, context, stats)?;
            }
            Ok(())
        }
        ExprNode::Match {
            attribute,
            operator,
            operand,
        } => {
            check_operator(context, *operator)?;
            let resolved = binding.resolve(attribute, context)?;
            if *operator == MatchOperator::Contains && !resolved.column.kind.supports_contains() {
                return Err(PlanError::Conversion {
                    code: "ERR_CONTAINS_UNSUPPORTED",
                    detail: format!(
                        "column kind {} of attribute '{attribute}' does not support CONTAINS",
                        resolved.column.kind.name()
                    ),
                });
            }
            if matches!(
                operator,
                MatchOperator::GreaterThan | MatchOperator::LessThan
            ) && !resolved.column.kind.supports_less_than_greater_than()
            {
                return Err(PlanError::Conversion {
                    code: "ERR_LESS_GREATER_UNSUPPORTED",
                    detail: format!(
                        "column kind {} of attribute '{attribute}' does not support ordered matches",
                        resolved.column.kind.name()
                    ),
                });
            }
            if *operator == MatchOperator::IsUnknown {
                stats.has_is_unknown = true;
            }

            let mut multi_row = resolved.column.multi_row;
            stats.tables.insert(resolved.table.table().to_string());

            if let Some(Operand::Reference(other)) = operand {
                stats.has_reference_match = true;
                if context.has_directive(Directive::DisableReferenceMatching) {
                    return Err(PlanError::Directive {
                        directive: Directive::DisableReferenceMatching,
                        construct: format!("reference match '{attribute}' vs '{other}'"),
                    });
                }
                let other_resolved = binding.resolve(other, context)?;
                stats.tables.insert(other_resolved.table.table().to_string());
                // Either side on a multi-row column makes both sides
                // sensitive.
                let other_multi = other_resolved.column.multi_row;
                multi_row = multi_row || other_multi;
                let entry = stats.attributes.entry(other.clone()).or_default();
                entry.multi_row_sensitive |= multi_row;
                entry
                    .tables
                    .insert(other_resolved.table.table().to_string());
            }

            let entry = stats.attributes.entry(attribute.clone()).or_default();
            entry.multi_row_sensitive |= multi_row;
            entry.tables.insert(resolved.table.table().to_string());
            Ok(())
        }
    }
}

fn check_operator(context: &ProcessContext, operator: MatchOperator) -> Result<()> {
    match operator {
        MatchOperator::Contains if context.has_directive(Directive::DisableContains) => {
            Err(PlanError::Directive {
                directive: Directive::DisableContains,
                construct: String::from("CONTAINS match"),
            })
        }
        MatchOperator::GreaterThan | MatchOperator::LessThan
            if context.has_directive(Directive::DisableLessThanGreaterThan) =>
        {
            Err(PlanError::Directive {
                directive: Directive::DisableLessThanGreaterThan,
                construct: String::from("ordered match"),
            })
        }
        _ => Ok(()),
    }
}
