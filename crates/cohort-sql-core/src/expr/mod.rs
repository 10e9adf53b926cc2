//! Core expression model.
//!
//! Expressions arrive already normalised from an upstream parser; this module
//! only represents them. Nodes live in an interned arena addressed by integer
//! ids, so structurally equal subtrees share one id and equality checks are
//! id comparisons. Members of a combined node are kept as a sorted, deduped
//! id array.

use std::collections::HashMap;
use std::fmt;

/// Index of a node in an [`ExpressionTree`].
pub type NodeId = usize;

/// Leaf match operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOperator {
    /// `=`
    Equals,
    /// `>`
    GreaterThan,
    /// `<`
    LessThan,
    /// Substring containment.
    Contains,
    /// The attribute has no value.
    IsUnknown,
}

impl MatchOperator {
    /// Returns the operator's display form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::Contains => "CONTAINS",
            Self::IsUnknown => "IS UNKNOWN",
        }
    }
}

impl fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A literal value in its raw string form.
    Value(String),
    /// A reference to another attribute.
    Reference(String),
}

/// Combination operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombineOp {
    /// All members must hold.
    And,
    /// At least one member must hold.
    Or,
}

/// Statically decided member sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialSet {
    /// Every id.
    All,
    /// No id.
    None,
}

/// One node of the expression DAG.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprNode {
    /// A leaf match of one attribute against a literal or another attribute.
    Match {
        /// The matched attribute.
        attribute: String,
        /// The operator.
        operator: MatchOperator,
        /// The operand; absent for [`MatchOperator::IsUnknown`].
        operand: Option<Operand>,
    },
    /// A negation; `strict` selects the set-theoretic complement that
    /// excludes unknowns, lenient negation includes them.
    Negation {
        /// The negated node.
        inner: NodeId,
        /// Strict (complement) vs lenient semantics.
        strict: bool,
    },
    /// A combination of two or more members.
    Combined {
        /// The combinator.
        op: CombineOp,
        /// Member ids, sorted and deduped.
        members: Vec<NodeId>,
    },
    /// A statically decided set.
    Special(SpecialSet),
}

/// An interned arena of expression nodes.
#[derive(Debug, Default)]
pub struct ExpressionTree {
    nodes: Vec<ExprNode>,
    interned: HashMap<ExprNode, NodeId>,
}

impl ExpressionTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, node: ExprNode) -> NodeId {
        if let Some(&id) = self.interned.get(&node) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(node.clone());
        self.interned.insert(node, id);
        id
    }

    /// Returns the node behind `id`.
    ///
    /// # Panics
    ///
    /// Panics when `id` was not issued by this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &ExprNode {
        &self.nodes[id]
    }

    /// Number of distinct nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Interns a literal match `attribute <operator> value`.
    pub fn match_value(
        &mut self,
        attribute: impl Into<String>,
        operator: MatchOperator,
        value: impl Into<String>,
    ) -> NodeId {
        self.intern(ExprNode::Match {
            attribute: attribute.into(),
            operator,
            operand: Some(Operand::Value(value.into())),
        })
    }

    /// Interns a reference match `attribute <operator> @other`.
    pub fn match_reference(
        &mut self,
        attribute: impl Into<String>,
        operator: MatchOperator,
        other: impl Into<String>,
    ) -> NodeId {
        self.intern(ExprNode::Match {
            attribute: attribute.into(),
            operator,
            operand: Some(Operand::Reference(other.into())),
        })
    }

    /// Interns `attribute IS UNKNOWN`.
    pub fn is_unknown(&mut self, attribute: impl Into<String>) -> NodeId {
        self.intern(ExprNode::Match {
            attribute: attribute.into(),
            operator: MatchOperator::IsUnknown,
            operand: None,
        })
    }

    /// Interns an AND combination.
    pub fn and(&mut self, members: Vec<NodeId>) -> NodeId {
        self.combined(CombineOp::And, members)
    }

    /// Interns an OR combination.
    pub fn or(&mut self, members: Vec<NodeId>) -> NodeId {
        self.combined(CombineOp::Or, members)
    }

    /// Interns a combination; a single surviving member collapses to itself.
    pub fn combined(&mut self, op: CombineOp, mut members: Vec<NodeId>) -> NodeId {
        members.sort_unstable();
        members.dedup();
        if members.len() == 1 {
            return members[0];
        }
        self.intern(ExprNode::Combined { op, members })
    }

    /// Interns a lenient negation (unknowns satisfy it).
    pub fn negate(&mut self, inner: NodeId) -> NodeId {
        self.intern(ExprNode::Negation {
            inner,
            strict: false,
        })
    }

    /// Interns a strict negation (set complement, unknowns excluded).
    pub fn negate_strict(&mut self, inner: NodeId) -> NodeId {
        self.intern(ExprNode::Negation {
            inner,
            strict: true,
        })
    }

    /// Interns the all-ids set.
    pub fn all(&mut self) -> NodeId {
        self.intern(ExprNode::Special(SpecialSet::All))
    }

    /// Interns the empty set.
    pub fn none(&mut self) -> NodeId {
        self.intern(ExprNode::Special(SpecialSet::None))
    }

    /// Calls `visit` for `root` and every node reachable from it, parents
    /// before children.
    pub fn walk<F: FnMut(NodeId, &ExprNode)>(&self, root: NodeId, visit: &mut F) {
        let node = self.node(root);
        visit(root, node);
        match node {
            ExprNode::Negation { inner, .. } => self.walk(*inner, visit),
            ExprNode::Combined { members, .. } => {
                for &m in members {
                    self.walk(m, visit);
                }
            }
            ExprNode::Match { .. } | ExprNode::Special(_) => {}
        }
    }
}
