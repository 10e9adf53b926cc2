//! Node-to-fragment translation.
//!
//! Every expression node becomes a condition over a table or alias. Simple
//! single-row conditions inline against a joined table; everything that must
//! exclude ids not present in a table (multi-row attributes, negations,
//! faithful IS UNKNOWN) materialises a with-clause alias
//! `sq__<n> AS (SELECT DISTINCT <idcol> AS ID FROM …)` and joins it to the
//! base query.

use std::collections::HashMap;

use tracing::trace;

use crate::binding::{DataColumn, IdCoverage, ResolvedColumn, TableBinding};
use crate::error::{CoercionError, PlanError, Result};
use crate::expr::{CombineOp, ExprNode, MatchOperator, NodeId, Operand};
use crate::param::creator::{create_for, parse_iso_date};
use crate::param::{ParameterRequest, QueryParameter};
use crate::planner::base::BaseQuery;
use crate::planner::coalesce::{coalesce_members, CoalescedMember};
use crate::planner::{PlanEnv, Tri};
use crate::types::column::{BaseSqlKind, SqlKind};
use crate::types::{AttributeKind, AttributeType};

/// Translation context of one node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ctx {
    negated: bool,
    strict: bool,
    connective: CombineOp,
}

impl Ctx {
    pub(crate) const ROOT: Self = Self {
        negated: false,
        strict: false,
        connective: CombineOp::And,
    };

    fn negate(self, strict: bool) -> Self {
        if self.negated {
            Self {
                negated: false,
                strict: false,
                ..self
            }
        } else {
            Self {
                negated: true,
                strict,
                ..self
            }
        }
    }
}

/// One registered with-clause.
#[derive(Debug)]
pub(crate) struct WithClause {
    pub alias: String,
    pub body: String,
}

/// Join style of a registered join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinKind {
    Inner,
    LeftOuter,
}

/// One registered join against the base query.
#[derive(Debug)]
pub(crate) struct Join {
    pub kind: JoinKind,
    pub target: String,
    pub on: String,
}

/// How the base query appears in FROM.
#[derive(Debug)]
pub(crate) enum BaseFrom {
    Table(String),
    Alias(String),
    SubSelect { alias: String, body: String },
}

/// Accumulates fragments, aliases, joins and parameters of one conversion.
pub(crate) struct Emitter<'a> {
    env: &'a PlanEnv<'a>,
    qualify: bool,
    base_from: BaseFrom,
    base_id_expr: String,
    base_table: Option<String>,
    base_satisfied: Option<NodeId>,
    alias_seq: usize,
    self_seq: usize,
    pub(crate) withs: Vec<WithClause>,
    pub(crate) joins: Vec<Join>,
    pub(crate) params: Vec<QueryParameter>,
    alias_cache: HashMap<String, String>,
    table_joins: HashMap<String, String>,
}

fn join_and(conditions: Vec<String>) -> String {
    conditions.join(" AND ")
}

impl<'a> Emitter<'a> {
    /// Sets up the emitter for the chosen base query.
    pub(crate) fn new(env: &'a PlanEnv<'a>, base: &BaseQuery, qualify: bool) -> Result<Self> {
        let mut emitter = Self {
            env,
            qualify,
            base_from: BaseFrom::Table(String::new()),
            base_id_expr: String::new(),
            base_table: None,
            base_satisfied: None,
            alias_seq: 0,
            self_seq: 0,
            withs: Vec::new(),
            joins: Vec::new(),
            params: Vec::new(),
            alias_cache: HashMap::new(),
            table_joins: HashMap::new(),
        };
        match base {
            BaseQuery::InlineTable { table, .. } => {
                let binding = emitter.table_binding(table)?;
                let id_column = binding.id_column().to_string();
                emitter.base_id_expr = if qualify {
                    format!("{table}.{id_column}")
                } else {
                    id_column
                };
                emitter.base_table = Some(table.clone());
                emitter.base_from = BaseFrom::Table(table.clone());
            }
            BaseQuery::AliasNode { node } => {
                let body = emitter.node_id_select(*node)?;
                let alias = emitter.register_with(body);
                emitter.base_id_expr = format!("{alias}.ID");
                emitter.base_satisfied = Some(*node);
                emitter.base_from = BaseFrom::Alias(alias);
            }
            BaseQuery::OrCombination { members } => {
                let mut branches = Vec::new();
                for &member in members {
                    let body = emitter.node_id_select(member)?;
                    let key = format!("N|{member}|{:?}", JoinKind::LeftOuter);
                    let alias = emitter.register_cached(key, body);
                    branches.push(format!("SELECT ID FROM {alias}"));
                }
                emitter.base_id_expr = String::from("bq.ID");
                emitter.base_from = BaseFrom::SubSelect {
                    alias: String::from("bq"),
                    body: branches.join(" UNION "),
                };
            }
            BaseQuery::Union { tables } => {
                let mut branches = Vec::new();
                for table in tables {
                    let binding = emitter.table_binding(table)?.clone();
                    let mut conditions = Vec::new();
                    for (column, kind, value) in emitter.table_filters(&binding, "")? {
                        conditions.push(emitter.filter_condition(None, &column, &kind, &value)?);
                    }
                    let select = id_select_head(binding.id_column(), table);
                    branches.push(if conditions.is_empty() {
                        select
                    } else {
                        format!("{select} WHERE {}", join_and(conditions))
                    });
                }
                emitter.base_id_expr = String::from("bq.ID");
                emitter.base_from = BaseFrom::SubSelect {
                    alias: String::from("bq"),
                    body: branches.join(" UNION "),
                };
            }
        }
        Ok(emitter)
    }

    /// Returns the FROM rendering of the base and the id expression.
    pub(crate) fn base_sql(&self) -> (String, &str) {
        let from = match &self.base_from {
            BaseFrom::Table(table) | BaseFrom::Alias(table) => table.clone(),
            BaseFrom::SubSelect { alias, body } => format!("({body}) {alias}"),
        };
        (from, &self.base_id_expr)
    }

    /// Translates the root expression into the global WHERE fragment.
    pub(crate) fn condition_root(&mut self, root: NodeId) -> Result<Option<String>> {
        self.condition(root, Ctx::ROOT)
    }

    fn condition(&mut self, node: NodeId, ctx: Ctx) -> Result<Option<String>> {
        if !ctx.negated && self.base_satisfied == Some(node) {
            return Ok(None);
        }
        match self.env.tree.node(node) {
            ExprNode::Special(_) => Err(PlanError::Conversion {
                code: "ERR_STATIC_SET",
                detail: String::from("a statically decided set reached translation"),
            }),
            ExprNode::Negation { inner, strict } => {
                let (inner, strict) = (*inner, *strict);
                self.condition(inner, ctx.negate(strict))
            }
            ExprNode::Combined { op, members } => {
                let (op, members) = (*op, members.clone());
                self.combined(op, &members, ctx)
            }
            ExprNode::Match {
                attribute,
                operator,
                operand,
            } => {
                let (attribute, operator, operand) =
                    (attribute.clone(), *operator, operand.clone());
                match operand {
                    None => self.unknown_condition(&attribute, ctx),
                    Some(Operand::Value(value)) => {
                        self.value_condition(node, &attribute, operator, &value, ctx)
                    }
                    Some(Operand::Reference(other)) => {
                        self.reference_condition(node, &attribute, operator, &other, ctx)
                    }
                }
            }
        }
    }

    fn combined(&mut self, op: CombineOp, members: &[NodeId], ctx: Ctx) -> Result<Option<String>> {
        let (effective, coalesced) =
            coalesce_members(self.env, op, members, ctx.negated, ctx.strict)?;
        let mut fragments = Vec::new();
        for member in coalesced {
            let fragment = match member {
                CoalescedMember::Node {
                    node,
                    negated,
                    strict,
                } => {
                    // Statically decided members vanish from their
                    // combination.
                    let tri = self.env.tri(node)?;
                    let tri = if negated { tri.negated() } else { tri };
                    match (tri, effective) {
                        (Tri::True, CombineOp::And) | (Tri::False, CombineOp::Or) => continue,
                        (Tri::True, CombineOp::Or) | (Tri::False, CombineOp::And) => {
                            return Err(PlanError::Conversion {
                                code: "ERR_STATIC_SET",
                                detail: String::from(
                                    "a statically decided member reached translation",
                                ),
                            });
                        }
                        (Tri::Dynamic, _) => {}
                    }
                    self.condition(
                        node,
                        Ctx {
                            negated,
                            strict,
                            connective: effective,
                        },
                    )?
                }
                CoalescedMember::InSet {
                    attribute,
                    values,
                    negated,
                    strict,
                } => self.in_set(&attribute, &values, negated, strict, effective)?,
            };
            if let Some(fragment) = fragment {
                fragments.push(fragment);
            }
        }
        let connective = match effective {
            CombineOp::And => " AND ",
            CombineOp::Or => " OR ",
        };
        Ok(match fragments.len() {
            0 => None,
            1 => fragments.into_iter().next(),
            _ => Some(
                fragments
                    .iter()
                    .map(|f| format!("({f})"))
                    .collect::<Vec<_>>()
                    .join(connective),
            ),
        })
    }

    fn value_condition(
        &mut self,
        node: NodeId,
        attribute: &str,
        operator: MatchOperator,
        value: &str,
        ctx: Ctx,
    ) -> Result<Option<String>> {
        let env = self.env;
        let resolved = env.binding.resolve(attribute, env.context)?;
        let attr_type = env.attribute_type(attribute)?;
        let multi = resolved.column.multi_row;
        let all_ids = resolved.table.nature().coverage() == IdCoverage::AllIds;
        let filtered = !resolved.table.filters().is_empty() || !resolved.column.filters.is_empty();

        if ctx.negated {
            if !multi && all_ids && !filtered {
                if let Some(qualifier) = self.table_qualifier(resolved.table)? {
                    let column_qualifier = self.column_qualifier(&qualifier);
                    let fragment = self.comparison(
                        column_qualifier,
                        &resolved.column,
                        attribute,
                        &attr_type,
                        operator,
                        value,
                        Some(ctx.strict),
                    )?;
                    return Ok(Some(fragment));
                }
            }
            let eq_alias = self.positive_alias(node, JoinKind::LeftOuter)?;
            let has_value = self.exists_alias(&resolved, attribute)?;
            return Ok(Some(negation_template(&has_value, &eq_alias, ctx.strict)));
        }

        if !multi && (self.is_base_table(resolved.table.table()) || all_ids) {
            if let Some(qualifier) = self.table_qualifier(resolved.table)? {
                let column_qualifier = self.column_qualifier(&qualifier);
                let mut conditions =
                    self.filter_conditions(column_qualifier.as_deref(), &resolved, attribute)?;
                conditions.push(self.comparison(
                    column_qualifier,
                    &resolved.column,
                    attribute,
                    &attr_type,
                    operator,
                    value,
                    None,
                )?);
                return Ok(Some(join_and(conditions)));
            }
        }

        let kind = if ctx.connective == CombineOp::And {
            JoinKind::Inner
        } else {
            JoinKind::LeftOuter
        };
        let alias = self.positive_alias(node, kind)?;
        Ok(match kind {
            JoinKind::Inner => None,
            JoinKind::LeftOuter => Some(format!("{alias}.ID IS NOT NULL")),
        })
    }

    fn in_set(
        &mut self,
        attribute: &str,
        values: &[String],
        negated: bool,
        strict: bool,
        connective: CombineOp,
    ) -> Result<Option<String>> {
        let env = self.env;
        let resolved = env.binding.resolve(attribute, env.context)?;
        let attr_type = env.attribute_type(attribute)?;
        let multi = resolved.column.multi_row;
        let all_ids = resolved.table.nature().coverage() == IdCoverage::AllIds;
        let filtered = !resolved.table.filters().is_empty() || !resolved.column.filters.is_empty();

        if negated {
            if !multi && all_ids && !filtered {
                if let Some(qualifier) = self.table_qualifier(resolved.table)? {
                    let column_qualifier = self.column_qualifier(&qualifier);
                    let fragment = self.set_comparison(
                        column_qualifier,
                        &resolved,
                        attribute,
                        &attr_type,
                        values,
                        true,
                        strict,
                    )?;
                    return Ok(Some(fragment));
                }
            }
            let in_alias = self.in_set_alias(&resolved, attribute, &attr_type, values)?;
            self.join_alias(&in_alias, JoinKind::LeftOuter);
            let has_value = self.exists_alias(&resolved, attribute)?;
            return Ok(Some(negation_template(&has_value, &in_alias, strict)));
        }

        if !multi && (self.is_base_table(resolved.table.table()) || all_ids) {
            if let Some(qualifier) = self.table_qualifier(resolved.table)? {
                let column_qualifier = self.column_qualifier(&qualifier);
                let mut conditions =
                    self.filter_conditions(column_qualifier.as_deref(), &resolved, attribute)?;
                conditions.push(self.set_comparison(
                    column_qualifier,
                    &resolved,
                    attribute,
                    &attr_type,
                    values,
                    false,
                    false,
                )?);
                return Ok(Some(join_and(conditions)));
            }
        }

        let alias = self.in_set_alias(&resolved, attribute, &attr_type, values)?;
        Ok(if connective == CombineOp::And {
            self.join_alias(&alias, JoinKind::Inner);
            None
        } else {
            self.join_alias(&alias, JoinKind::LeftOuter);
            Some(format!("{alias}.ID IS NOT NULL"))
        })
    }

    fn unknown_condition(&mut self, attribute: &str, ctx: Ctx) -> Result<Option<String>> {
        let env = self.env;
        let resolved = env.binding.resolve(attribute, env.context)?;
        let multi = resolved.column.multi_row;
        let all_ids = resolved.table.nature().coverage() == IdCoverage::AllIds;
        let filtered = !resolved.table.filters().is_empty() || !resolved.column.filters.is_empty();
        // Negated IS UNKNOWN demands a value either way; unknowns cannot
        // satisfy their own absence.
        let wants_unknown = !ctx.negated;

        if !multi && all_ids && !filtered {
            if let Some(qualifier) = self.table_qualifier(resolved.table)? {
                let column = qualify(
                    self.column_qualifier(&qualifier).as_deref(),
                    &resolved.column.column,
                );
                return Ok(Some(if wants_unknown {
                    format!("{column} IS NULL")
                } else {
                    format!("{column} IS NOT NULL")
                }));
            }
        }
        let has_value = self.exists_alias(&resolved, attribute)?;
        Ok(Some(if wants_unknown {
            format!("{has_value}.ID IS NULL")
        } else {
            format!("{has_value}.ID IS NOT NULL")
        }))
    }

    fn reference_condition(
        &mut self,
        node: NodeId,
        attribute: &str,
        operator: MatchOperator,
        other: &str,
        ctx: Ctx,
    ) -> Result<Option<String>> {
        if matches!(operator, MatchOperator::Contains | MatchOperator::IsUnknown) {
            return Err(PlanError::Conversion {
                code: "ERR_REFERENCE_OPERATOR",
                detail: format!("operator {operator} cannot take an attribute reference"),
            });
        }
        let env = self.env;
        let left = env.binding.resolve(attribute, env.context)?;
        let right = env.binding.resolve(other, env.context)?;
        let left_type = env.attribute_type(attribute)?;
        let right_type = env.attribute_type(other)?;
        let multi_sensitive = left.column.multi_row || right.column.multi_row;
        let same_table = left.table.table() == right.table.table();

        if ctx.negated {
            let pair = self.reference_alias(node, JoinKind::LeftOuter)?;
            let left_has = self.exists_alias(&left, attribute)?;
            let right_has = self.exists_alias(&right, other)?;
            let strict_core = format!(
                "{left_has}.ID IS NOT NULL AND {right_has}.ID IS NOT NULL AND {pair}.ID IS NULL"
            );
            return Ok(Some(if ctx.strict {
                format!("({strict_core})")
            } else {
                format!(
                    "(({strict_core}) OR {left_has}.ID IS NULL OR {right_has}.ID IS NULL)"
                )
            }));
        }

        if !multi_sensitive && ctx.connective == CombineOp::And {
            if same_table {
                if let Some(qualifier) = self.table_qualifier(left.table)? {
                    let self_alias = self.next_self_alias();
                    let id_column = left.table.id_column();
                    let left_expr = column_expr(Some(qualifier.as_str()), &left.column, &left_type);
                    let right_expr =
                        column_expr(Some(self_alias.as_str()), &right.column, &right_type);
                    let mut on = vec![format!(
                        "{self_alias}.{id_column} = {}",
                        self.base_id_expr
                    )];
                    on.extend(self.column_filter_conditions(
                        Some(self_alias.as_str()),
                        &right,
                        other,
                    )?);
                    on.push(format!(
                        "{left_expr} {} {right_expr}",
                        operator_symbol(operator)
                    ));
                    let table = left.table.table().to_string();
                    self.joins.push(Join {
                        kind: JoinKind::Inner,
                        target: format!("{table} {self_alias}"),
                        on: join_and(on),
                    });
                    let residual =
                        self.filter_conditions(Some(qualifier.as_str()), &left, attribute)?;
                    return Ok(if residual.is_empty() {
                        None
                    } else {
                        Some(join_and(residual))
                    });
                }
            } else if let (Some(left_qualifier), Some(right_qualifier)) = (
                self.table_qualifier(left.table)?,
                self.table_qualifier(right.table)?,
            ) {
                let mut conditions =
                    self.filter_conditions(Some(left_qualifier.as_str()), &left, attribute)?;
                conditions.extend(self.filter_conditions(
                    Some(right_qualifier.as_str()),
                    &right,
                    other,
                )?);
                let left_expr =
                    column_expr(Some(left_qualifier.as_str()), &left.column, &left_type);
                let right_expr =
                    column_expr(Some(right_qualifier.as_str()), &right.column, &right_type);
                conditions.push(format!(
                    "{left_expr} {} {right_expr}",
                    operator_symbol(operator)
                ));
                return Ok(Some(join_and(conditions)));
            }
        }

        let kind = if ctx.connective == CombineOp::And {
            JoinKind::Inner
        } else {
            JoinKind::LeftOuter
        };
        let alias = self.reference_alias(node, kind)?;
        Ok(match kind {
            JoinKind::Inner => None,
            JoinKind::LeftOuter => Some(format!("{alias}.ID IS NOT NULL")),
        })
    }

    // ------------------------------------------------------------------
    // Aliases and id-selects
    // ------------------------------------------------------------------

    /// Renders the standalone id-select of a base-eligible node.
    pub(crate) fn node_id_select(&mut self, node: NodeId) -> Result<String> {
        match self.env.tree.node(node) {
            ExprNode::Match {
                attribute,
                operator,
                operand,
            } => {
                let (attribute, operator, operand) =
                    (attribute.clone(), *operator, operand.clone());
                match operand {
                    Some(Operand::Value(value)) => {
                        self.match_id_select(&attribute, operator, &value, None)
                    }
                    Some(Operand::Reference(other)) => {
                        self.reference_id_select(&attribute, operator, &other)
                    }
                    None => self.unknown_id_select(&attribute),
                }
            }
            ExprNode::Negation { inner, strict } => {
                let (inner, strict) = (*inner, *strict);
                let ExprNode::Match {
                    attribute,
                    operator,
                    operand: Some(Operand::Value(value)),
                } = self.env.tree.node(inner)
                else {
                    return Err(internal_shape_error());
                };
                let (attribute, operator, value) = (attribute.clone(), *operator, value.clone());
                self.match_id_select(&attribute, operator, &value, Some(strict))
            }
            ExprNode::Combined {
                op: CombineOp::Or,
                members,
            } => {
                let members = members.clone();
                let mut attribute = None;
                let mut values = Vec::new();
                for member in members {
                    let ExprNode::Match {
                        attribute: a,
                        operand: Some(Operand::Value(v)),
                        ..
                    } = self.env.tree.node(member)
                    else {
                        return Err(internal_shape_error());
                    };
                    attribute.get_or_insert_with(|| a.clone());
                    values.push(v.clone());
                }
                let Some(attribute) = attribute else {
                    return Err(internal_shape_error());
                };
                values.sort_unstable();
                values.dedup();
                let env = self.env;
                let resolved = env.binding.resolve(&attribute, env.context)?;
                let attr_type = env.attribute_type(&attribute)?;
                self.select_for(&resolved, &attribute, |emitter, resolved| {
                    emitter.set_comparison(
                        None,
                        resolved,
                        &attribute,
                        &attr_type,
                        &values,
                        false,
                        false,
                    )
                })
            }
            ExprNode::Combined { .. } | ExprNode::Special(_) => Err(internal_shape_error()),
        }
    }

    fn match_id_select(
        &mut self,
        attribute: &str,
        operator: MatchOperator,
        value: &str,
        inverted: Option<bool>,
    ) -> Result<String> {
        let env = self.env;
        let resolved = env.binding.resolve(attribute, env.context)?;
        let attr_type = env.attribute_type(attribute)?;
        self.select_for(&resolved, attribute, |emitter, resolved| {
            emitter.comparison(
                None,
                &resolved.column,
                attribute,
                &attr_type,
                operator,
                value,
                inverted,
            )
        })
    }

    fn unknown_id_select(&mut self, attribute: &str) -> Result<String> {
        let env = self.env;
        let resolved = env.binding.resolve(attribute, env.context)?;
        self.select_for(&resolved, attribute, |_, resolved| {
            Ok(format!("{} IS NULL", resolved.column.column))
        })
    }

    fn reference_id_select(
        &mut self,
        attribute: &str,
        operator: MatchOperator,
        other: &str,
    ) -> Result<String> {
        let env = self.env;
        let left = env.binding.resolve(attribute, env.context)?;
        let right = env.binding.resolve(other, env.context)?;
        let left_type = env.attribute_type(attribute)?;
        let right_type = env.attribute_type(other)?;
        let same_table = left.table.table() == right.table.table();

        let (right_table, right_alias) = if same_table {
            (left.table.table().to_string(), self.next_self_alias())
        } else {
            (right.table.table().to_string(), String::from("t1"))
        };
        let left_table = left.table.table();
        let left_id = left.table.id_column();
        let right_id = right.table.id_column();

        let mut conditions = self.filter_conditions(Some("t0"), &left, attribute)?;
        conditions.extend(self.filter_conditions(Some(right_alias.as_str()), &right, other)?);
        let left_expr = column_expr(Some("t0"), &left.column, &left_type);
        let right_expr = column_expr(Some(right_alias.as_str()), &right.column, &right_type);
        conditions.push(format!(
            "{left_expr} {} {right_expr}",
            operator_symbol(operator)
        ));
        Ok(format!(
            "SELECT DISTINCT t0.{left_id} AS ID FROM {left_table} t0 INNER JOIN {right_table} {right_alias} ON {right_alias}.{right_id} = t0.{left_id} WHERE {}",
            join_and(conditions)
        ))
    }

    /// Builds `SELECT DISTINCT <idcol> AS ID FROM <table> WHERE <filters AND
    /// predicate>` with unqualified column references.
    fn select_for<F>(
        &mut self,
        resolved: &ResolvedColumn<'_>,
        attribute: &str,
        predicate: F,
    ) -> Result<String>
    where
        F: FnOnce(&mut Self, &ResolvedColumn<'_>) -> Result<String>,
    {
        let mut conditions = self.filter_conditions(None, resolved, attribute)?;
        conditions.push(predicate(self, resolved)?);
        Ok(format!(
            "{} WHERE {}",
            id_select_head(resolved.table.id_column(), resolved.table.table()),
            join_and(conditions)
        ))
    }

    /// Returns (creating on first use) the positive id-set alias of a node,
    /// joined with `kind`.
    fn positive_alias(&mut self, node: NodeId, kind: JoinKind) -> Result<String> {
        let key = format!("N|{node}|{kind:?}");
        let alias = match self.alias_cache.get(&key) {
            Some(alias) => alias.clone(),
            None => {
                let body = self.node_id_select(node)?;
                self.register_cached(key, body)
            }
        };
        self.join_alias(&alias, kind);
        Ok(alias)
    }

    fn reference_alias(&mut self, node: NodeId, kind: JoinKind) -> Result<String> {
        self.positive_alias(node, kind)
    }

    /// Returns (creating on first use) the has-any-value alias of a column.
    fn exists_alias(
        &mut self,
        resolved: &ResolvedColumn<'_>,
        attribute: &str,
    ) -> Result<String> {
        let filters = self.resolved_filters(resolved, attribute)?;
        let key = format!(
            "E|{}|{}|{filters:?}",
            resolved.table.table(),
            resolved.column.column
        );
        if let Some(alias) = self.alias_cache.get(&key) {
            return Ok(alias.clone());
        }
        let mut conditions = Vec::new();
        for (column, kind, value) in &filters {
            conditions.push(self.filter_condition(None, column, kind, value)?);
        }
        conditions.push(format!("{} IS NOT NULL", resolved.column.column));
        let body = format!(
            "{} WHERE {}",
            id_select_head(resolved.table.id_column(), resolved.table.table()),
            join_and(conditions)
        );
        let alias = self.register_cached(key, body);
        self.join_alias(&alias, JoinKind::LeftOuter);
        Ok(alias)
    }

    /// Returns (creating on first use) the id-set alias of an IN group.
    fn in_set_alias(
        &mut self,
        resolved: &ResolvedColumn<'_>,
        attribute: &str,
        attr_type: &AttributeType,
        values: &[String],
    ) -> Result<String> {
        let key = format!(
            "IN|{}|{}|{values:?}",
            resolved.table.table(),
            resolved.column.column
        );
        if let Some(alias) = self.alias_cache.get(&key) {
            return Ok(alias.clone());
        }
        let mut conditions = self.filter_conditions(None, resolved, attribute)?;
        conditions.push(self.set_comparison(
            None,
            resolved,
            attribute,
            attr_type,
            values,
            false,
            false,
        )?);
        let body = format!(
            "{} WHERE {}",
            id_select_head(resolved.table.id_column(), resolved.table.table()),
            join_and(conditions)
        );
        Ok(self.register_cached(key, body))
    }

    // ------------------------------------------------------------------
    // Comparisons
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn comparison(
        &mut self,
        qualifier: Option<String>,
        column: &DataColumn,
        attribute: &str,
        attr_type: &AttributeType,
        operator: MatchOperator,
        value: &str,
        inverted: Option<bool>,
    ) -> Result<String> {
        let aligned = attr_type.kind() == AttributeKind::Date
            && column.kind.base() == BaseSqlKind::Timestamp;
        if aligned {
            return self.date_aligned_comparison(
                qualifier.as_deref(),
                column,
                attribute,
                attr_type,
                operator,
                value,
                inverted,
            );
        }
        let expr = column_expr(qualifier.as_deref(), column, attr_type);
        let placeholder = self.make_param(attribute, attr_type, value, operator, &column.kind)?;
        Ok(match (operator, inverted) {
            (MatchOperator::Equals, None) => format!("{expr} = {placeholder}"),
            (MatchOperator::Equals, Some(true)) => format!("{expr} <> {placeholder}"),
            (MatchOperator::Equals, Some(false)) => {
                format!("({expr} <> {placeholder} OR {expr} IS NULL)")
            }
            (MatchOperator::GreaterThan | MatchOperator::LessThan, None) => {
                format!("{expr} {} {placeholder}", operator_symbol(operator))
            }
            (MatchOperator::GreaterThan | MatchOperator::LessThan, Some(true)) => {
                format!("NOT {expr} {} {placeholder}", operator_symbol(operator))
            }
            (MatchOperator::GreaterThan | MatchOperator::LessThan, Some(false)) => format!(
                "(NOT {expr} {} {placeholder} OR {expr} IS NULL)",
                operator_symbol(operator)
            ),
            (MatchOperator::Contains, None) => format!("{expr} LIKE {placeholder}"),
            (MatchOperator::Contains, Some(true)) => {
                format!("NOT {expr} LIKE {placeholder}")
            }
            (MatchOperator::Contains, Some(false)) => {
                format!("(NOT {expr} LIKE {placeholder} OR {expr} IS NULL)")
            }
            (MatchOperator::IsUnknown, _) => {
                return Err(PlanError::Conversion {
                    code: "ERR_STATIC_SET",
                    detail: String::from("IS UNKNOWN has no value comparison"),
                })
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn date_aligned_comparison(
        &mut self,
        qualifier: Option<&str>,
        column: &DataColumn,
        attribute: &str,
        attr_type: &AttributeType,
        operator: MatchOperator,
        value: &str,
        inverted: Option<bool>,
    ) -> Result<String> {
        let date = parse_iso_date(value).ok_or_else(|| {
            PlanError::Coercion(CoercionError::ValueFormatDate {
                attribute: attribute.to_string(),
                value: value.to_string(),
            })
        })?;
        let next_day = (date + chrono::Days::new(1)).format("%Y-%m-%d").to_string();
        let expr = qualify(qualifier, &column.column);
        trace!(attribute, value, "aligning DATE match to timestamp interval");
        Ok(match (operator, inverted) {
            (MatchOperator::Equals, None) => {
                let lo = self.make_param(attribute, attr_type, value, operator, &column.kind)?;
                let hi = self.make_param(attribute, attr_type, &next_day, operator, &column.kind)?;
                format!("({expr} >= {lo} AND {expr} < {hi})")
            }
            (MatchOperator::Equals, Some(strict)) => {
                let lo = self.make_param(attribute, attr_type, value, operator, &column.kind)?;
                let hi = self.make_param(attribute, attr_type, &next_day, operator, &column.kind)?;
                if strict {
                    format!("({expr} < {lo} OR {expr} >= {hi})")
                } else {
                    format!("({expr} < {lo} OR {expr} >= {hi} OR {expr} IS NULL)")
                }
            }
            (MatchOperator::GreaterThan, None) => {
                let hi = self.make_param(attribute, attr_type, &next_day, operator, &column.kind)?;
                format!("{expr} >= {hi}")
            }
            (MatchOperator::GreaterThan, Some(strict)) => {
                let hi = self.make_param(attribute, attr_type, &next_day, operator, &column.kind)?;
                if strict {
                    format!("{expr} < {hi}")
                } else {
                    format!("({expr} < {hi} OR {expr} IS NULL)")
                }
            }
            (MatchOperator::LessThan, None) => {
                let lo = self.make_param(attribute, attr_type, value, operator, &column.kind)?;
                format!("{expr} < {lo}")
            }
            (MatchOperator::LessThan, Some(strict)) => {
                let lo = self.make_param(attribute, attr_type, value, operator, &column.kind)?;
                if strict {
                    format!("{expr} >= {lo}")
                } else {
                    format!("({expr} >= {lo} OR {expr} IS NULL)")
                }
            }
            (MatchOperator::Contains | MatchOperator::IsUnknown, _) => {
                return Err(PlanError::Conversion {
                    code: "ERR_CONTAINS_UNSUPPORTED",
                    detail: String::from("CONTAINS cannot align to a timestamp interval"),
                })
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn set_comparison(
        &mut self,
        qualifier: Option<String>,
        resolved: &ResolvedColumn<'_>,
        attribute: &str,
        attr_type: &AttributeType,
        values: &[String],
        negated: bool,
        strict: bool,
    ) -> Result<String> {
        let expr = column_expr(qualifier.as_deref(), &resolved.column, attr_type);
        let mut placeholders = Vec::with_capacity(values.len());
        for value in values {
            placeholders.push(self.make_param(
                attribute,
                attr_type,
                value,
                MatchOperator::Equals,
                &resolved.column.kind,
            )?);
        }
        let list = placeholders.join(", ");
        Ok(if !negated {
            format!("{expr} IN ({list})")
        } else if strict {
            format!("{expr} NOT IN ({list})")
        } else {
            format!("({expr} NOT IN ({list}) OR {expr} IS NULL)")
        })
    }

    // ------------------------------------------------------------------
    // Parameters and filters
    // ------------------------------------------------------------------

    fn make_param(
        &mut self,
        attribute: &str,
        attr_type: &AttributeType,
        raw: &str,
        operator: MatchOperator,
        kind: &SqlKind,
    ) -> Result<String> {
        let raw = if operator == MatchOperator::Contains {
            format!("%{raw}%")
        } else {
            raw.to_string()
        };
        let parameter = create_for(&ParameterRequest {
            id: None,
            attribute,
            attribute_type: attr_type,
            raw: &raw,
            operator,
            target: kind,
        })?;
        let placeholder = format!("${{{}}}", parameter.id());
        self.params.push(parameter);
        Ok(placeholder)
    }

    /// Resolves the table- and column-level filter values of a resolved
    /// column against the process context.
    fn resolved_filters(
        &self,
        resolved: &ResolvedColumn<'_>,
        attribute: &str,
    ) -> Result<Vec<(String, SqlKind, String)>> {
        let mut filters = self.table_filters(resolved.table, attribute)?;
        for filter in &resolved.column.filters {
            let value = self
                .env
                .context
                .resolve_filter_value(&filter.value, attribute)?;
            filters.push((filter.column.clone(), filter.kind.clone(), value));
        }
        Ok(filters)
    }

    fn table_filters(
        &self,
        table: &TableBinding,
        attribute: &str,
    ) -> Result<Vec<(String, SqlKind, String)>> {
        let mut filters = Vec::new();
        for filter in table.filters() {
            let value = self
                .env
                .context
                .resolve_filter_value(&filter.value, attribute)?;
            filters.push((filter.column.clone(), filter.kind.clone(), value));
        }
        Ok(filters)
    }

    /// Emits every filter predicate accompanying a column appearance.
    fn filter_conditions(
        &mut self,
        qualifier: Option<&str>,
        resolved: &ResolvedColumn<'_>,
        attribute: &str,
    ) -> Result<Vec<String>> {
        let filters = self.resolved_filters(resolved, attribute)?;
        let mut conditions = Vec::with_capacity(filters.len());
        for (column, kind, value) in &filters {
            conditions.push(self.filter_condition(qualifier, column, kind, value)?);
        }
        Ok(conditions)
    }

    /// Emits the column-level filter predicates only (for the right-hand side
    /// of a self-join, whose table filters sit on the left qualifier).
    fn column_filter_conditions(
        &mut self,
        qualifier: Option<&str>,
        resolved: &ResolvedColumn<'_>,
        attribute: &str,
    ) -> Result<Vec<String>> {
        let mut conditions = Vec::new();
        for filter in &resolved.column.filters {
            let value = self
                .env
                .context
                .resolve_filter_value(&filter.value, attribute)?;
            conditions.push(self.filter_condition(qualifier, &filter.column, &filter.kind, &value)?);
        }
        Ok(conditions)
    }

    fn filter_condition(
        &mut self,
        qualifier: Option<&str>,
        column: &str,
        kind: &SqlKind,
        value: &str,
    ) -> Result<String> {
        let filter_type = AttributeType::new(AttributeKind::String);
        let placeholder =
            self.make_param(column, &filter_type, value, MatchOperator::Equals, kind)?;
        Ok(format!("{} = {placeholder}", qualify(qualifier, column)))
    }

    // ------------------------------------------------------------------
    // Base and join bookkeeping
    // ------------------------------------------------------------------

    fn is_base_table(&self, table: &str) -> bool {
        self.base_table.as_deref() == Some(table)
    }

    /// Returns the qualifier under which `table` is reachable from the main
    /// query, inline-joining it when legitimate, or `None` when only an alias
    /// can represent it.
    fn table_qualifier(&mut self, table: &TableBinding) -> Result<Option<String>> {
        if self.is_base_table(table.table()) {
            return Ok(Some(table.table().to_string()));
        }
        if let Some(existing) = self.table_joins.get(table.table()) {
            return Ok(Some(existing.clone()));
        }
        // Joining a table that covers every id never drops rows, so an inner
        // join is safe under any connective.
        if table.nature().coverage() != IdCoverage::AllIds {
            return Ok(None);
        }
        let name = table.table().to_string();
        self.joins.push(Join {
            kind: JoinKind::Inner,
            target: name.clone(),
            on: format!("{name}.{} = {}", table.id_column(), self.base_id_expr),
        });
        self.table_joins.insert(name.clone(), name.clone());
        Ok(Some(name))
    }

    fn column_qualifier(&self, qualifier: &str) -> Option<String> {
        self.qualify.then(|| qualifier.to_string())
    }

    fn next_alias(&mut self) -> String {
        self.alias_seq += 1;
        format!("sq__{}", self.alias_seq)
    }

    fn next_self_alias(&mut self) -> String {
        self.self_seq += 1;
        if self.self_seq == 1 {
            String::from("sq__self")
        } else {
            format!("sq__self{}", self.self_seq)
        }
    }

    fn register_with(&mut self, body: String) -> String {
        let alias = self.next_alias();
        self.withs.push(WithClause {
            alias: alias.clone(),
            body,
        });
        alias
    }

    fn register_cached(&mut self, key: String, body: String) -> String {
        if let Some(alias) = self.alias_cache.get(&key) {
            return alias.clone();
        }
        let alias = self.register_with(body);
        self.alias_cache.insert(key, alias.clone());
        alias
    }

    fn join_alias(&mut self, alias: &str, kind: JoinKind) {
        if self.joins.iter().any(|j| j.target == alias) {
            return;
        }
        self.joins.push(Join {
            kind,
            target: alias.to_string(),
            on: format!("{alias}.ID = {}", self.base_id_expr),
        });
    }

    fn table_binding(&self, table: &str) -> Result<&'a TableBinding> {
        self.env
            .binding
            .tables()
            .iter()
            .find(|t| t.table() == table)
            .ok_or_else(|| PlanError::MappingFailed {
                attribute: table.to_string(),
            })
    }
}

/// The negation decomposition template over the has-value and predicate
/// aliases.
fn negation_template(has_value: &str, predicate: &str, strict: bool) -> String {
    if strict {
        format!("({has_value}.ID IS NOT NULL AND {predicate}.ID IS NULL)")
    } else {
        format!(
            "(({has_value}.ID IS NOT NULL AND {predicate}.ID IS NULL) OR {has_value}.ID IS NULL)"
        )
    }
}

fn id_select_head(id_column: &str, table: &str) -> String {
    if id_column == "ID" {
        format!("SELECT DISTINCT ID FROM {table}")
    } else {
        format!("SELECT DISTINCT {id_column} AS ID FROM {table}")
    }
}

fn qualify(qualifier: Option<&str>, column: &str) -> String {
    match qualifier {
        Some(q) => format!("{q}.{column}"),
        None => column.to_string(),
    }
}

/// Renders a column reference, routed through the attribute's native type
/// caster when a text column carries date-typed data.
fn column_expr(
    qualifier: Option<&str>,
    column: &DataColumn,
    attr_type: &AttributeType,
) -> String {
    let expr = qualify(qualifier, &column.column);
    if attr_type.kind() == AttributeKind::Date && column.kind.base().is_character() {
        if let Some(caster) = attr_type.caster() {
            if let Some(cast) = caster.cast(&expr, AttributeKind::Date) {
                return cast;
            }
        }
    }
    expr
}

fn operator_symbol(operator: MatchOperator) -> &'static str {
    match operator {
        MatchOperator::Equals => "=",
        MatchOperator::GreaterThan => ">",
        MatchOperator::LessThan => "<",
        MatchOperator::Contains => "LIKE",
        MatchOperator::IsUnknown => "IS NULL",
    }
}

fn internal_shape_error() -> PlanError {
    PlanError::Conversion {
        code: "ERR_BASE_SHAPE",
        detail: String::from("node is not renderable as a standalone id-select"),
    }
}
