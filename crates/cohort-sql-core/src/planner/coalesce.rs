//! IN-clause coalescing.
//!
//! When converting a combination the planner flattens same-connective
//! nesting (De Morgan included), groups equality members of one attribute
//! into `IN` / `NOT IN` sets, and prunes members subsumed by more or less
//! restrictive siblings. The pass is deterministic and reaches its fixed
//! point in one application: flattening exposes every groupable member at one
//! level, so regrouping the output changes nothing.

use std::collections::BTreeSet;

use tracing::trace;

use crate::error::Result;
use crate::expr::{CombineOp, ExprNode, MatchOperator, NodeId, Operand};
use crate::logic::left_implies_right;
use crate::planner::PlanEnv;

/// One member of a combination after coalescing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CoalescedMember {
    /// An uncoalesced member with its effective polarity.
    Node {
        /// The member node.
        node: NodeId,
        /// Effective negation after De Morgan flattening.
        negated: bool,
        /// Strictness of the effective negation.
        strict: bool,
    },
    /// A coalesced equality group.
    InSet {
        /// The shared attribute.
        attribute: String,
        /// Member values, sorted and deduped.
        values: Vec<String>,
        /// `true` renders `NOT IN`.
        negated: bool,
        /// Strictness of the negation when `negated`.
        strict: bool,
    },
}

const fn swap(op: CombineOp) -> CombineOp {
    match op {
        CombineOp::And => CombineOp::Or,
        CombineOp::Or => CombineOp::And,
    }
}

/// A member view after flattening: the node with its effective polarity.
#[derive(Debug, Clone, Copy)]
struct View {
    node: NodeId,
    negated: bool,
    strict: bool,
}

fn flatten(env: &PlanEnv<'_>, node: NodeId, negated: bool, strict: bool, effective: CombineOp, out: &mut Vec<View>) {
    match env.tree.node(node) {
        ExprNode::Negation {
            inner,
            strict: node_strict,
        } => {
            if negated {
                // Double negation: normalised input should not carry these,
                // but flattening stays correct if it does.
                flatten(env, *inner, false, false, effective, out);
            } else {
                flatten(env, *inner, true, *node_strict, effective, out);
            }
        }
        ExprNode::Combined { op, members } => {
            let member_effective = if negated { swap(*op) } else { *op };
            if member_effective == effective {
                for &member in members {
                    flatten(env, member, negated, strict, effective, out);
                }
            } else {
                out.push(View {
                    node,
                    negated,
                    strict,
                });
            }
        }
        ExprNode::Match { .. } | ExprNode::Special(_) => out.push(View {
            node,
            negated,
            strict,
        }),
    }
}

/// Whether a view is an equality-group candidate, returning the attribute and
/// value.
fn group_key<'a>(
    env: &'a PlanEnv<'_>,
    view: &View,
    effective: CombineOp,
) -> Result<Option<(&'a str, &'a str, bool)>> {
    let ExprNode::Match {
        attribute,
        operator: MatchOperator::Equals,
        operand: Some(Operand::Value(value)),
    } = env.tree.node(view.node)
    else {
        return Ok(None);
    };
    let groupable = match effective {
        CombineOp::Or => !view.negated,
        CombineOp::And => view.negated,
    };
    // Date-typed arguments needing range alignment stay out of IN groups.
    if !groupable || env.is_date_aligned(attribute)? {
        return Ok(None);
    }
    Ok(Some((attribute.as_str(), value.as_str(), view.negated)))
}

/// Coalesces the members of a combination.
///
/// Returns the effective connective (after De Morgan on a negated context)
/// and the coalesced member list.
///
/// # Errors
///
/// Propagates binding/type resolution failures and time-budget exhaustion
/// from the subsumption checks.
pub(crate) fn coalesce_members(
    env: &PlanEnv<'_>,
    op: CombineOp,
    members: &[NodeId],
    ctx_negated: bool,
    ctx_strict: bool,
) -> Result<(CombineOp, Vec<CoalescedMember>)> {
    let effective = if ctx_negated { swap(op) } else { op };
    let mut views = Vec::new();
    for &member in members {
        flatten(env, member, ctx_negated, ctx_strict, effective, &mut views);
    }

    // Subsumption: under AND the more restrictive member survives, under OR
    // the less restrictive one. Only derivable for positive members.
    let mut dropped = vec![false; views.len()];
    for i in 0..views.len() {
        if dropped[i] || views[i].negated {
            continue;
        }
        for j in (i + 1)..views.len() {
            if dropped[j] || views[j].negated || views[i].node == views[j].node {
                continue;
            }
            let i_implies_j =
                left_implies_right(env.tree, views[i].node, views[j].node, &env.timeout)?;
            let j_implies_i =
                left_implies_right(env.tree, views[j].node, views[i].node, &env.timeout)?;
            match effective {
                CombineOp::And => {
                    if i_implies_j {
                        dropped[j] = true;
                    } else if j_implies_i {
                        dropped[i] = true;
                    }
                }
                CombineOp::Or => {
                    if i_implies_j {
                        dropped[i] = true;
                    } else if j_implies_i {
                        dropped[j] = true;
                    }
                }
            }
            if dropped[i] {
                break;
            }
        }
    }

    // Group equality members by attribute (and strictness, for NOT IN).
    let mut out: Vec<CoalescedMember> = Vec::new();
    let mut grouped = vec![false; views.len()];
    for i in 0..views.len() {
        if dropped[i] || grouped[i] {
            continue;
        }
        let view = views[i];
        let Some((attribute, value, negated)) = group_key(env, &view, effective)? else {
            out.push(CoalescedMember::Node {
                node: view.node,
                negated: view.negated,
                strict: view.strict,
            });
            continue;
        };
        let mut values = BTreeSet::new();
        values.insert(value.to_string());
        for j in (i + 1)..views.len() {
            if dropped[j] || grouped[j] {
                continue;
            }
            if let Some((other_attribute, other_value, other_negated)) =
                group_key(env, &views[j], effective)?
            {
                let same_strictness = !negated || views[j].strict == view.strict;
                if other_attribute == attribute && other_negated == negated && same_strictness {
                    values.insert(other_value.to_string());
                    grouped[j] = true;
                }
            }
        }
        if values.len() == 1 {
            out.push(CoalescedMember::Node {
                node: view.node,
                negated: view.negated,
                strict: view.strict,
            });
        } else {
            trace!(attribute, size = values.len(), negated, "coalesced IN group");
            out.push(CoalescedMember::InSet {
                attribute: attribute.to_string(),
                values: values.into_iter().collect(),
                negated,
                strict: view.strict,
            });
        }
    }

    Ok((effective, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::context::ProcessContext;
    use crate::binding::{DataBinding, DataColumn, TableBinding, TableNature};
    use crate::expr::ExpressionTree;
    use crate::logic::TimeOut;
    use crate::planner::stats;
    use crate::types::column::{BaseSqlKind, SqlKind};
    use crate::types::{AttributeKind, AttributeType, AttributeTypeMap};
    use std::time::Duration;

    fn binding() -> DataBinding {
        DataBinding::new(vec![TableBinding::new(
            "TBL",
            "ID",
            TableNature::all_ids().primary(),
        )
        .column(DataColumn::new(
            "COLOR",
            SqlKind::builtin(BaseSqlKind::Varchar),
            "color",
        ))
        .column(DataColumn::new(
            "N",
            SqlKind::builtin(BaseSqlKind::Integer),
            "n",
        ))
        .column(DataColumn::new(
            "UPDATED",
            SqlKind::builtin(BaseSqlKind::Timestamp),
            "updated",
        ))])
        .unwrap()
    }

    fn types() -> AttributeTypeMap {
        AttributeTypeMap::new()
            .with("color", AttributeType::new(AttributeKind::String))
            .with("n", AttributeType::new(AttributeKind::Integer))
            .with("updated", AttributeType::new(AttributeKind::Date))
    }

    fn coalesce(
        tree: &ExpressionTree,
        root: NodeId,
        op: CombineOp,
        members: &[NodeId],
        negated: bool,
    ) -> (CombineOp, Vec<CoalescedMember>) {
        let binding = binding();
        let types = types();
        let context = ProcessContext::new();
        let stats = stats::collect(tree, root, &binding, &context).unwrap();
        let env = PlanEnv {
            tree,
            binding: &binding,
            types: &types,
            context: &context,
            stats: &stats,
            timeout: TimeOut::after(Duration::from_secs(5)),
        };
        coalesce_members(&env, op, members, negated, false).unwrap()
    }

    #[test]
    fn test_or_equalities_group_into_sorted_in_set() {
        let mut tree = ExpressionTree::new();
        let red = tree.match_value("color", MatchOperator::Equals, "red");
        let blue = tree.match_value("color", MatchOperator::Equals, "blue");
        let black = tree.match_value("color", MatchOperator::Equals, "black");
        let root = tree.or(vec![red, blue, black]);

        let (effective, members) =
            coalesce(&tree, root, CombineOp::Or, &[red, blue, black], false);
        assert_eq!(effective, CombineOp::Or);
        assert_eq!(
            members,
            vec![CoalescedMember::InSet {
                attribute: String::from("color"),
                values: vec![
                    String::from("black"),
                    String::from("blue"),
                    String::from("red")
                ],
                negated: false,
                strict: false,
            }]
        );
    }

    #[test]
    fn test_negated_equalities_group_under_and() {
        let mut tree = ExpressionTree::new();
        let red = tree.match_value("color", MatchOperator::Equals, "red");
        let blue = tree.match_value("color", MatchOperator::Equals, "blue");
        let not_red = tree.negate(red);
        let not_blue = tree.negate(blue);
        let root = tree.and(vec![not_red, not_blue]);

        let (_, members) = coalesce(&tree, root, CombineOp::And, &[not_red, not_blue], false);
        assert_eq!(
            members,
            vec![CoalescedMember::InSet {
                attribute: String::from("color"),
                values: vec![String::from("blue"), String::from("red")],
                negated: true,
                strict: false,
            }]
        );
    }

    #[test]
    fn test_de_morgan_flattening_groups_negated_or() {
        // NOT (color = red OR color = blue) under a positive AND context.
        let mut tree = ExpressionTree::new();
        let red = tree.match_value("color", MatchOperator::Equals, "red");
        let blue = tree.match_value("color", MatchOperator::Equals, "blue");
        let inner = tree.or(vec![red, blue]);
        let root = tree.negate(inner);

        // The negated context swaps the connective; the ORed equalities
        // arrive negated and group as NOT IN.
        let (effective, members) = coalesce(&tree, root, CombineOp::Or, &[red, blue], true);
        assert_eq!(effective, CombineOp::And);
        assert!(matches!(
            members.as_slice(),
            [CoalescedMember::InSet { negated: true, .. }]
        ));
    }

    #[test]
    fn test_single_member_groups_stay_plain() {
        let mut tree = ExpressionTree::new();
        let red = tree.match_value("color", MatchOperator::Equals, "red");
        let n = tree.match_value("n", MatchOperator::GreaterThan, "5");
        let root = tree.or(vec![red, n]);

        let (_, members) = coalesce(&tree, root, CombineOp::Or, &[red, n], false);
        assert_eq!(members.len(), 2);
        assert!(members
            .iter()
            .all(|m| matches!(m, CoalescedMember::Node { .. })));
    }

    #[test]
    fn test_date_aligned_attributes_are_excluded() {
        let mut tree = ExpressionTree::new();
        let a = tree.match_value("updated", MatchOperator::Equals, "2024-12-13");
        let b = tree.match_value("updated", MatchOperator::Equals, "2024-12-14");
        let root = tree.or(vec![a, b]);

        let (_, members) = coalesce(&tree, root, CombineOp::Or, &[a, b], false);
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn test_subsumption_under_and_keeps_more_restrictive() {
        let mut tree = ExpressionTree::new();
        let gt10 = tree.match_value("n", MatchOperator::GreaterThan, "10");
        let gt5 = tree.match_value("n", MatchOperator::GreaterThan, "5");
        let root = tree.and(vec![gt10, gt5]);

        let (_, members) = coalesce(&tree, root, CombineOp::And, &[gt10, gt5], false);
        assert_eq!(
            members,
            vec![CoalescedMember::Node {
                node: gt10,
                negated: false,
                strict: false
            }]
        );
    }

    #[test]
    fn test_subsumption_under_or_keeps_less_restrictive() {
        let mut tree = ExpressionTree::new();
        let gt10 = tree.match_value("n", MatchOperator::GreaterThan, "10");
        let gt5 = tree.match_value("n", MatchOperator::GreaterThan, "5");
        let root = tree.or(vec![gt10, gt5]);

        let (_, members) = coalesce(&tree, root, CombineOp::Or, &[gt10, gt5], false);
        assert_eq!(
            members,
            vec![CoalescedMember::Node {
                node: gt5,
                negated: false,
                strict: false
            }]
        );
    }

    #[test]
    fn test_nested_same_connective_is_flattened() {
        let mut tree = ExpressionTree::new();
        let red = tree.match_value("color", MatchOperator::Equals, "red");
        let blue = tree.match_value("color", MatchOperator::Equals, "blue");
        let green = tree.match_value("color", MatchOperator::Equals, "green");
        let inner = tree.or(vec![blue, green]);
        let root = tree.or(vec![red, inner]);

        let (_, members) = coalesce(&tree, root, CombineOp::Or, &[red, inner], false);
        assert_eq!(
            members,
            vec![CoalescedMember::InSet {
                attribute: String::from("color"),
                values: vec![
                    String::from("blue"),
                    String::from("green"),
                    String::from("red")
                ],
                negated: false,
                strict: false,
            }]
        );
    }
}
