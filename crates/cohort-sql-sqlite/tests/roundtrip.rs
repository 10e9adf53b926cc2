//! End-to-end soundness and completeness: every id a plan returns must
//! satisfy a naive in-memory interpreter of the same expression, and vice
//! versa.

use std::collections::BTreeSet;
use std::sync::Arc;

use cohort_sql_core::binding::context::ProcessContext;
use cohort_sql_core::binding::{
    DataBinding, DataColumn, KeyValueMappingPolicy, TableBinding, TableNature,
};
use cohort_sql_core::expr::{CombineOp, ExprNode, ExpressionTree, MatchOperator, NodeId, Operand};
use cohort_sql_core::planner::{PlannerOptions, QueryPlanner, QueryShape};
use cohort_sql_core::types::column::{BaseSqlKind, SqlKind};
use cohort_sql_core::types::{AttributeKind, AttributeType, AttributeTypeMap};
use cohort_sql_sqlite::{fetch_count, fetch_ids};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

fn varchar() -> SqlKind {
    SqlKind::builtin(BaseSqlKind::Varchar)
}

fn integer() -> SqlKind {
    SqlKind::builtin(BaseSqlKind::Integer)
}

fn binding() -> DataBinding {
    DataBinding::new(vec![
        TableBinding::new("TBL", "ID", TableNature::all_ids().unique_ids().primary())
            .column(DataColumn::new("COLOR", varchar(), "color"))
            .column(DataColumn::new("N", integer(), "n"))
            .column(DataColumn::new("M", integer(), "m")),
        TableBinding::new("FACTS", "ID", TableNature::sparse()).auto_mapping(Arc::new(
            KeyValueMappingPolicy::new("fact.", "F_KEY", varchar(), "F_VALUE", varchar())
                .strip_suffix(".flg"),
        )),
    ])
    .unwrap()
}

fn types() -> AttributeTypeMap {
    AttributeTypeMap::new()
        .with("n", AttributeType::new(AttributeKind::Integer))
        .with("m", AttributeType::new(AttributeKind::Integer))
        .with("fact.hasDog.flg", AttributeType::new(AttributeKind::Bool))
        .with("fact.hasCat.flg", AttributeType::new(AttributeKind::Bool))
        .with_fallback(AttributeType::new(AttributeKind::String))
}

async fn seeded_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::raw_sql(
        "CREATE TABLE TBL (ID INTEGER PRIMARY KEY, COLOR TEXT, N INTEGER, M INTEGER);
         CREATE TABLE FACTS (ID INTEGER, F_KEY TEXT, F_VALUE TEXT);
         INSERT INTO TBL (ID, COLOR, N, M) VALUES
            (1, 'red', 5, 3),
            (2, 'blue', 10, 20),
            (3, NULL, 7, 1),
            (4, 'red', NULL, NULL);
         INSERT INTO FACTS (ID, F_KEY, F_VALUE) VALUES
            (1, 'hasDog', '1'),
            (1, 'hasCat', '0'),
            (2, 'hasDog', '0'),
            (3, 'hasDog', '1'),
            (3, 'hasDog', '0');",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool
}

// ---------------------------------------------------------------------
// Naive in-memory interpreter, the oracle for the executed plans.
// ---------------------------------------------------------------------

const UNIVERSE: [i64; 4] = [1, 2, 3, 4];

fn values(id: i64, attribute: &str) -> Vec<String> {
    let row = |color: Option<&str>, n: Option<i64>, m: Option<i64>| match attribute {
        "color" => color.map(str::to_string).into_iter().collect(),
        "n" => n.map(|v| v.to_string()).into_iter().collect(),
        "m" => m.map(|v| v.to_string()).into_iter().collect(),
        _ => Vec::new(),
    };
    if let Some(fact) = attribute
        .strip_prefix("fact.")
        .and_then(|rest| rest.strip_suffix(".flg"))
    {
        let facts: &[(i64, &str, &str)] = &[
            (1, "hasDog", "1"),
            (1, "hasCat", "0"),
            (2, "hasDog", "0"),
            (3, "hasDog", "1"),
            (3, "hasDog", "0"),
        ];
        return facts
            .iter()
            .filter(|(fid, key, _)| *fid == id && *key == fact)
            .map(|(_, _, value)| (*value).to_string())
            .collect();
    }
    match id {
        1 => row(Some("red"), Some(5), Some(3)),
        2 => row(Some("blue"), Some(10), Some(20)),
        3 => row(None, Some(7), Some(1)),
        4 => row(Some("red"), None, None),
        _ => Vec::new(),
    }
}

fn compare(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn holds(tree: &ExpressionTree, node: NodeId, id: i64) -> bool {
    match tree.node(node) {
        ExprNode::Special(set) => {
            matches!(set, cohort_sql_core::expr::SpecialSet::All)
        }
        ExprNode::Combined { op, members } => match op {
            CombineOp::And => members.iter().all(|&m| holds(tree, m, id)),
            CombineOp::Or => members.iter().any(|&m| holds(tree, m, id)),
        },
        ExprNode::Negation { inner, strict } => {
            let satisfied = holds(tree, *inner, id);
            if *strict {
                // Set complement: a value must exist on every touched
                // attribute.
                let known = attributes(tree, *inner)
                    .iter()
                    .all(|a| !values(id, a).is_empty());
                known && !satisfied
            } else {
                !satisfied
            }
        }
        ExprNode::Match {
            attribute,
            operator,
            operand,
        } => {
            let lhs = values(id, attribute);
            match (operator, operand) {
                (MatchOperator::IsUnknown, _) => lhs.is_empty(),
                (op, Some(Operand::Value(value))) => lhs.iter().any(|v| matches(op, v, value)),
                (op, Some(Operand::Reference(other))) => {
                    let rhs = values(id, other);
                    lhs.iter()
                        .any(|l| rhs.iter().any(|r| matches(op, l, r)))
                }
                (_, None) => false,
            }
        }
    }
}

fn matches(op: &MatchOperator, left: &str, right: &str) -> bool {
    match op {
        MatchOperator::Equals => left == right,
        MatchOperator::GreaterThan => compare(left, right) == std::cmp::Ordering::Greater,
        MatchOperator::LessThan => compare(left, right) == std::cmp::Ordering::Less,
        MatchOperator::Contains => left.contains(right),
        MatchOperator::IsUnknown => false,
    }
}

fn attributes(tree: &ExpressionTree, node: NodeId) -> Vec<String> {
    let mut out = Vec::new();
    tree.walk(node, &mut |_, n| {
        if let ExprNode::Match {
            attribute, operand, ..
        } = n
        {
            out.push(attribute.clone());
            if let Some(Operand::Reference(other)) = operand {
                out.push(other.clone());
            }
        }
    });
    out
}

fn expected(tree: &ExpressionTree, root: NodeId) -> BTreeSet<i64> {
    UNIVERSE
        .iter()
        .copied()
        .filter(|&id| holds(tree, root, id))
        .collect()
}

async fn check(tree: &ExpressionTree, root: NodeId) {
    let binding = binding();
    let types = types();
    let context = ProcessContext::new();
    let template = QueryPlanner::new(&binding, &types, &context)
        .plan(tree, root)
        .unwrap_or_else(|e| panic!("conversion failed: {e}"));

    let pool = seeded_pool().await;
    let actual: BTreeSet<i64> = fetch_ids(&pool, &template).await.unwrap().into_iter().collect();
    let oracle = expected(tree, root);
    assert_eq!(actual, oracle, "sql was: {}", template.sql());
}

// ---------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------

#[tokio::test]
async fn positive_equality() {
    let mut tree = ExpressionTree::new();
    let root = tree.match_value("color", MatchOperator::Equals, "red");
    check(&tree, root).await;
}

#[tokio::test]
async fn lenient_negation_includes_unknowns() {
    let mut tree = ExpressionTree::new();
    let eq = tree.match_value("color", MatchOperator::Equals, "red");
    let root = tree.negate(eq);
    check(&tree, root).await;
}

#[tokio::test]
async fn strict_negation_excludes_unknowns() {
    let mut tree = ExpressionTree::new();
    let eq = tree.match_value("color", MatchOperator::Equals, "red");
    let root = tree.negate_strict(eq);
    check(&tree, root).await;
}

#[tokio::test]
async fn any_of_in_clause() {
    let mut tree = ExpressionTree::new();
    let red = tree.match_value("color", MatchOperator::Equals, "red");
    let blue = tree.match_value("color", MatchOperator::Equals, "blue");
    let root = tree.or(vec![red, blue]);
    check(&tree, root).await;
}

#[tokio::test]
async fn multi_row_fact_conjunction() {
    let mut tree = ExpressionTree::new();
    let dog = tree.match_value("fact.hasDog.flg", MatchOperator::Equals, "1");
    let cat = tree.match_value("fact.hasCat.flg", MatchOperator::Equals, "0");
    let root = tree.and(vec![dog, cat]);
    check(&tree, root).await;
}

#[tokio::test]
async fn lenient_negated_fact() {
    let mut tree = ExpressionTree::new();
    let dog = tree.match_value("fact.hasDog.flg", MatchOperator::Equals, "1");
    let root = tree.negate(dog);
    check(&tree, root).await;
}

#[tokio::test]
async fn ordered_match() {
    let mut tree = ExpressionTree::new();
    let root = tree.match_value("n", MatchOperator::GreaterThan, "6");
    check(&tree, root).await;
}

#[tokio::test]
async fn reference_match_between_columns() {
    let mut tree = ExpressionTree::new();
    let root = tree.match_reference("n", MatchOperator::GreaterThan, "m");
    check(&tree, root).await;
}

#[tokio::test]
async fn is_unknown_finds_missing_values() {
    let mut tree = ExpressionTree::new();
    let root = tree.is_unknown("color");
    check(&tree, root).await;
}

#[tokio::test]
async fn mixed_expression_over_both_tables() {
    let mut tree = ExpressionTree::new();
    let dog = tree.match_value("fact.hasDog.flg", MatchOperator::Equals, "1");
    let blue = tree.match_value("color", MatchOperator::Equals, "blue");
    let root = tree.or(vec![dog, blue]);
    check(&tree, root).await;
}

#[tokio::test]
async fn count_shape_counts_the_id_set() {
    let binding = binding();
    let types = types();
    let context = ProcessContext::new();
    let mut tree = ExpressionTree::new();
    let root = tree.match_value("color", MatchOperator::Equals, "red");
    let template = QueryPlanner::new(&binding, &types, &context)
        .with_options(PlannerOptions::default().shape(QueryShape::SelectDistinctCount))
        .plan(&tree, root)
        .unwrap();

    let pool = seeded_pool().await;
    assert_eq!(fetch_count(&pool, &template).await.unwrap(), 2);
}
