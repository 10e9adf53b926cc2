//! Logical-equivalence helper.
//!
//! Decides conservative propositional implication between expression nodes.
//! This is how the planner recognises that a subexpression is a superset of
//! the root (base-query selection) and that a clause is redundant
//! (IN-coalescing). All checks run on interned node ids, so equality is id
//! comparison and member sets are sorted integer arrays.
//!
//! Every entry point is gated by a [`TimeOut`]; exhaustion aborts the whole
//! conversion, it never yields.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::error::{PlanError, Result};
use crate::expr::{CombineOp, ExprNode, ExpressionTree, MatchOperator, NodeId, Operand, SpecialSet};

/// A cooperative time budget.
#[derive(Debug, Clone, Copy)]
pub struct TimeOut {
    deadline: Instant,
}

impl TimeOut {
    /// Creates a budget expiring `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }

    /// Aborts with [`PlanError::TimeOut`] once the budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::TimeOut`] past the deadline.
    pub fn assert_have_time(&self) -> Result<()> {
        if Instant::now() > self.deadline {
            Err(PlanError::TimeOut)
        } else {
            Ok(())
        }
    }
}

/// Decides whether `left` implies `right`: every id satisfying `left` also
/// satisfies `right`.
///
/// The check is conservative; `false` means "not derivable", not "refuted".
///
/// # Errors
///
/// Returns [`PlanError::TimeOut`] when the budget runs out mid-search.
pub fn left_implies_right(
    tree: &ExpressionTree,
    left: NodeId,
    right: NodeId,
    timeout: &TimeOut,
) -> Result<bool> {
    timeout.assert_have_time()?;
    if left == right {
        return Ok(true);
    }

    match (tree.node(left), tree.node(right)) {
        (ExprNode::Special(SpecialSet::None), _) | (_, ExprNode::Special(SpecialSet::All)) => {
            return Ok(true);
        }
        (ExprNode::Special(SpecialSet::All), _) | (_, ExprNode::Special(SpecialSet::None)) => {
            return Ok(false);
        }
        _ => {}
    }

    // Decompose the right-hand side first: implying one OR-member or all
    // AND-members settles it.
    if let ExprNode::Combined { op, members } = tree.node(right) {
        match op {
            CombineOp::Or => {
                for &member in members {
                    if left_implies_right(tree, left, member, timeout)? {
                        return Ok(true);
                    }
                }
            }
            CombineOp::And => {
                let mut all = true;
                for &member in members {
                    if !left_implies_right(tree, left, member, timeout)? {
                        all = false;
                        break;
                    }
                }
                if all {
                    return Ok(true);
                }
            }
        }
    }

    match tree.node(left) {
        ExprNode::Combined {
            op: CombineOp::And,
            members,
        } => {
            for &member in members {
                if left_implies_right(tree, member, right, timeout)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ExprNode::Combined {
            op: CombineOp::Or,
            members,
        } => {
            for &member in members {
                if !left_implies_right(tree, member, right, timeout)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ExprNode::Negation {
            inner: left_inner,
            strict: left_strict,
        } => match tree.node(right) {
            ExprNode::Negation {
                inner: right_inner,
                strict: right_strict,
            } => negation_implies(
                tree,
                (*left_inner, *left_strict),
                (*right_inner, *right_strict),
                timeout,
            ),
            _ => Ok(false),
        },
        ExprNode::Match {
            attribute,
            operator,
            operand,
        } => Ok(match_implies(
            tree,
            (attribute, *operator, operand.as_ref()),
            right,
        )),
        ExprNode::Special(_) => Ok(false),
    }
}

/// Complement-side implication.
///
/// With `b ⇒ a` the complement of `a` is contained in the complement of `b`.
/// The strict complement is always contained in the lenient one; between
/// complements of equal strictness the containment additionally needs the two
/// unknown-domains to coincide, approximated by equal attribute sets.
fn negation_implies(
    tree: &ExpressionTree,
    (left_inner, left_strict): (NodeId, bool),
    (right_inner, right_strict): (NodeId, bool),
    timeout: &TimeOut,
) -> Result<bool> {
    if !left_implies_right(tree, right_inner, left_inner, timeout)? {
        return Ok(false);
    }
    if left_strict && !right_strict {
        return Ok(true);
    }
    if left_strict == right_strict {
        return Ok(attributes_of(tree, left_inner) == attributes_of(tree, right_inner));
    }
    Ok(false)
}

/// Leaf-level implication between two literal matches of the same attribute.
fn match_implies(
    tree: &ExpressionTree,
    (attribute, operator, operand): (&str, MatchOperator, Option<&Operand>),
    right: NodeId,
) -> bool {
    let ExprNode::Match {
        attribute: right_attribute,
        operator: right_operator,
        operand: right_operand,
    } = tree.node(right)
    else {
        return false;
    };
    if attribute != right_attribute {
        return false;
    }
    let (Some(Operand::Value(left_value)), Some(Operand::Value(right_value))) =
        (operand, right_operand.as_ref())
    else {
        return false;
    };

    use MatchOperator::{Contains, Equals, GreaterThan, LessThan};
    match (operator, right_operator) {
        (Equals, Equals) => left_value == right_value,
        (Equals, GreaterThan) => compare_literals(left_value, right_value) == Ordering::Greater,
        (Equals, LessThan) => compare_literals(left_value, right_value) == Ordering::Less,
        (GreaterThan, GreaterThan) => compare_literals(left_value, right_value) != Ordering::Less,
        (LessThan, LessThan) => compare_literals(left_value, right_value) != Ordering::Greater,
        (Equals | Contains, Contains) => left_value.contains(right_value.as_str()),
        _ => false,
    }
}

/// Compares two literals numerically when both parse, ordinally otherwise
/// (ISO dates sort chronologically either way).
fn compare_literals(a: &str, b: &str) -> Ordering {
    if let (Ok(x), Ok(y)) = (a.parse::<f64>(), b.parse::<f64>()) {
        if let Some(ordering) = x.partial_cmp(&y) {
            return ordering;
        }
    }
    a.cmp(b)
}

/// Collects every attribute `id` touches, reference targets included.
#[must_use]
pub fn attributes_of(tree: &ExpressionTree, id: NodeId) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    tree.walk(id, &mut |_, node| {
        if let ExprNode::Match {
            attribute, operand, ..
        } = node
        {
            set.insert(attribute.clone());
            if let Some(Operand::Reference(other)) = operand {
                set.insert(other.clone());
            }
        }
    });
    set
}

/// Decides whether `root` implies the OR of `set`.
///
/// # Errors
///
/// Returns [`PlanError::TimeOut`] when the budget runs out mid-search.
pub fn or_implied_by(
    tree: &ExpressionTree,
    root: NodeId,
    set: &[NodeId],
    timeout: &TimeOut,
) -> Result<bool> {
    timeout.assert_have_time()?;
    for &candidate in set {
        if left_implies_right(tree, root, candidate, timeout)? {
            return Ok(true);
        }
    }
    match tree.node(root) {
        ExprNode::Combined {
            op: CombineOp::Or,
            members,
        } => {
            for &member in members {
                if !or_implied_by(tree, member, set, timeout)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ExprNode::Combined {
            op: CombineOp::And,
            members,
        } => {
            for &member in members {
                if or_implied_by(tree, member, set, timeout)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Ok(false),
    }
}

/// Searches for the minimum OR-combination of `candidates` that the root
/// implies, enumerating combinations in ascending size and stopping at the
/// first match.
///
/// # Errors
///
/// Returns [`PlanError::TimeOut`] when the budget runs out mid-search.
pub fn minimal_or_superset(
    tree: &ExpressionTree,
    root: NodeId,
    candidates: &[NodeId],
    max_size: usize,
    timeout: &TimeOut,
) -> Result<Option<Vec<NodeId>>> {
    let mut combination = Vec::new();
    for size in 1..=max_size.min(candidates.len()) {
        if let Some(found) = search_combination(
            tree,
            root,
            candidates,
            size,
            0,
            &mut combination,
            timeout,
        )? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn search_combination(
    tree: &ExpressionTree,
    root: NodeId,
    candidates: &[NodeId],
    size: usize,
    from: usize,
    combination: &mut Vec<NodeId>,
    timeout: &TimeOut,
) -> Result<Option<Vec<NodeId>>> {
    if combination.len() == size {
        return Ok(if or_implied_by(tree, root, combination, timeout)? {
            Some(combination.clone())
        } else {
            None
        });
    }
    for index in from..candidates.len() {
        combination.push(candidates[index]);
        let found = search_combination(
            tree,
            root,
            candidates,
            size,
            index + 1,
            combination,
            timeout,
        )?;
        combination.pop();
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}
