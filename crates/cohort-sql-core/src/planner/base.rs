//! Base-query selection.
//!
//! The base query supplies the id universe of the overall SELECT. The planner
//! must stay correct even when no single table contains all ids, so selection
//! works through three tiers: a subexpression that is logically a superset of
//! the root, then the primary table, then a synthetic UNION over every
//! involved table. Among eligible subexpressions the one with the highest
//! estimated complexity wins; it is already cost anyway, so reusing its
//! records minimises duplicated work.

use tracing::debug;

use crate::binding::context::Directive;
use crate::binding::IdCoverage;
use crate::error::{PlanError, Result};
use crate::expr::{CombineOp, ExprNode, MatchOperator, NodeId, Operand};
use crate::logic::{left_implies_right, minimal_or_superset};
use crate::planner::PlanEnv;

/// Cap on the OR-combination search size.
const MAX_OR_COMBINATION: usize = 4;

/// The chosen base query.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseQuery {
    /// `FROM <table>`; `node` records the subexpression that justified the
    /// choice, if any.
    InlineTable {
        /// The base table name.
        table: String,
        /// The justifying subexpression.
        node: Option<NodeId>,
    },
    /// The base is the with-alias of `node`'s id-select; the node's condition
    /// is satisfied by the universe itself.
    AliasNode {
        /// The materialised subexpression.
        node: NodeId,
    },
    /// A UNION over the id-selects of several subexpressions.
    OrCombination {
        /// The member subexpressions.
        members: Vec<NodeId>,
    },
    /// A synthetic UNION over every involved table's id column.
    Union {
        /// The involved tables, in deterministic order.
        tables: Vec<String>,
    },
}

/// Estimates the evaluation cost of a subexpression.
///
/// # Errors
///
/// Propagates binding resolution failures.
pub(crate) fn complexity(env: &PlanEnv<'_>, id: NodeId) -> Result<f64> {
    match env.tree.node(id) {
        ExprNode::Special(_) => Ok(0.0),
        ExprNode::Negation { inner, .. } => Ok(1.5 * complexity(env, *inner)?),
        ExprNode::Combined { op, members } => {
            let mut sum = 0.0;
            for &member in members {
                sum += complexity(env, member)?;
            }
            Ok(match op {
                CombineOp::And => sum,
                CombineOp::Or => 1.1 * sum,
            })
        }
        ExprNode::Match {
            attribute,
            operator,
            operand,
        } => {
            let op_factor = match operator {
                MatchOperator::LessThan | MatchOperator::GreaterThan => 1.2,
                MatchOperator::Contains => 1.8,
                MatchOperator::Equals | MatchOperator::IsUnknown => 1.0,
            };
            let multi_row = env
                .binding
                .resolve(attribute, env.context)?
                .column
                .multi_row;
            let db_penalty = match operand {
                Some(Operand::Reference(other)) => {
                    let other_multi = env
                        .binding
                        .resolve(other, env.context)?
                        .column
                        .multi_row;
                    match (multi_row, other_multi) {
                        (true, true) => 19.0,
                        (true, false) | (false, true) => 11.0,
                        (false, false) => 2.0,
                    }
                }
                _ if multi_row => 7.0,
                _ => 1.0,
            };
            Ok(op_factor * db_penalty)
        }
    }
}

/// What makes a node renderable as a standalone id-select.
struct CandidateInfo {
    table: String,
    multi_row: bool,
}

/// Checks base-query eligibility of one node.
///
/// Eligible shapes: a positive match against a non-null value; a negation
/// over an always-present, unfiltered single-row column; a combination that
/// is not itself sub-nested (an OR of same-attribute equals). `IS_UNKNOWN`
/// qualifies only when the column sits on a table covering all ids and the
/// attribute is not multi-row.
fn candidate_info(env: &PlanEnv<'_>, id: NodeId) -> Result<Option<CandidateInfo>> {
    match env.tree.node(id) {
        ExprNode::Match {
            attribute,
            operator: MatchOperator::IsUnknown,
            ..
        } => {
            let resolved = env.binding.resolve(attribute, env.context)?;
            let eligible = resolved.table.nature().coverage() == IdCoverage::AllIds
                && !resolved.column.multi_row
                && resolved.table.filters().is_empty()
                && resolved.column.filters.is_empty();
            Ok(eligible.then(|| CandidateInfo {
                table: resolved.table.table().to_string(),
                multi_row: false,
            }))
        }
        ExprNode::Match {
            attribute,
            operand: Some(Operand::Value(_)),
            ..
        } => {
            let resolved = env.binding.resolve(attribute, env.context)?;
            Ok(Some(CandidateInfo {
                table: resolved.table.table().to_string(),
                multi_row: resolved.column.multi_row,
            }))
        }
        ExprNode::Match { .. } => Ok(None),
        ExprNode::Negation { inner, .. } => {
            let ExprNode::Match {
                attribute,
                operand: Some(Operand::Value(_)),
                operator,
            } = env.tree.node(*inner)
            else {
                return Ok(None);
            };
            if *operator == MatchOperator::IsUnknown {
                return Ok(None);
            }
            let resolved = env.binding.resolve(attribute, env.context)?;
            let eligible = resolved.table.nature().coverage() == IdCoverage::AllIds
                && !resolved.column.multi_row
                && resolved.table.filters().is_empty()
                && resolved.column.filters.is_empty();
            Ok(eligible.then(|| CandidateInfo {
                table: resolved.table.table().to_string(),
                multi_row: false,
            }))
        }
        ExprNode::Combined {
            op: CombineOp::Or,
            members,
        } => {
            // An OR of same-attribute equals renders as one IN id-select;
            // date-aligned attributes expand to intervals and stay out.
            let mut attribute: Option<&str> = None;
            for &member in members {
                let ExprNode::Match {
                    attribute: a,
                    operator: MatchOperator::Equals,
                    operand: Some(Operand::Value(_)),
                } = env.tree.node(member)
                else {
                    return Ok(None);
                };
                match attribute {
                    None => attribute = Some(a),
                    Some(seen) if seen == a => {}
                    Some(_) => return Ok(None),
                }
            }
            let Some(attribute) = attribute else {
                return Ok(None);
            };
            if env.is_date_aligned(attribute)? {
                return Ok(None);
            }
            let resolved = env.binding.resolve(attribute, env.context)?;
            Ok(Some(CandidateInfo {
                table: resolved.table.table().to_string(),
                multi_row: resolved.column.multi_row,
            }))
        }
        ExprNode::Combined { .. } | ExprNode::Special(_) => Ok(None),
    }
}

fn reachable(env: &PlanEnv<'_>, root: NodeId) -> Vec<NodeId> {
    let mut seen = vec![false; env.tree.len()];
    let mut order = Vec::new();
    env.tree.walk(root, &mut |id, _| {
        if !seen[id] {
            seen[id] = true;
            order.push(id);
        }
    });
    order
}

/// Chooses the base query for `root`.
///
/// # Errors
///
/// Fails when a directive forbids the only workable base
/// (`ENFORCE_PRIMARY_TABLE` without a primary table, `DISABLE_UNION` when a
/// union is required) or when the time budget runs out.
pub(crate) fn choose(env: &PlanEnv<'_>, root: NodeId) -> Result<BaseQuery> {
    if env.context.has_directive(Directive::EnforcePrimaryTable) {
        let Some(primary) = env.binding.primary_table() else {
            return Err(PlanError::Conversion {
                code: "ERR_NO_PRIMARY_TABLE",
                detail: String::from(
                    "ENFORCE_PRIMARY_TABLE is active but the binding has no primary table",
                ),
            });
        };
        return Ok(BaseQuery::InlineTable {
            table: primary.table().to_string(),
            node: None,
        });
    }

    // Tier 1: a subexpression implied by the root.
    let mut atoms = Vec::new();
    let mut best: Option<(NodeId, CandidateInfo, f64)> = None;
    for id in reachable(env, root) {
        let Some(info) = candidate_info(env, id)? else {
            continue;
        };
        atoms.push(id);
        if !left_implies_right(env.tree, root, id, &env.timeout)? {
            continue;
        }
        let score = complexity(env, id)?;
        if best.as_ref().map_or(true, |(_, _, s)| score > *s) {
            best = Some((id, info, score));
        }
    }
    if let Some((node, info, score)) = best {
        debug!(node, score, table = %info.table, "base query from subexpression");
        return Ok(if info.multi_row {
            BaseQuery::AliasNode { node }
        } else {
            BaseQuery::InlineTable {
                table: info.table,
                node: Some(node),
            }
        });
    }

    // Tier 1b: the minimum OR-combination of atoms the root implies.
    if let Some(members) =
        minimal_or_superset(env.tree, root, &atoms, MAX_OR_COMBINATION, &env.timeout)?
    {
        if members.len() == 1 {
            // Atoms are candidate-shaped by construction.
            if let Some(info) = candidate_info(env, members[0])? {
                return Ok(if info.multi_row {
                    BaseQuery::AliasNode { node: members[0] }
                } else {
                    BaseQuery::InlineTable {
                        table: info.table,
                        node: Some(members[0]),
                    }
                });
            }
        } else {
            debug!(members = members.len(), "base query from OR-combination");
            return Ok(BaseQuery::OrCombination { members });
        }
    }

    // Tier 2: the primary table.
    if let Some(primary) = env.binding.primary_table() {
        debug!(table = primary.table(), "base query from primary table");
        return Ok(BaseQuery::InlineTable {
            table: primary.table().to_string(),
            node: None,
        });
    }

    // Tier 3: a synthetic UNION over every involved table.
    if env.context.has_directive(Directive::DisableUnion) {
        return Err(PlanError::Directive {
            directive: Directive::DisableUnion,
            construct: String::from("synthetic UNION base query"),
        });
    }
    let tables: Vec<String> = env.stats.tables.iter().cloned().collect();
    if tables.is_empty() {
        return Err(PlanError::Conversion {
            code: "ERR_NO_BASE_QUERY",
            detail: String::from("the expression involves no table"),
        });
    }
    debug!(tables = tables.len(), "base query from table union");
    Ok(BaseQuery::Union { tables })
}
