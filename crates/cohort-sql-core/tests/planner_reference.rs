//! Reference matches: self-joins, cross-table joins, negated references.

mod common;
use common::*;

use cohort_sql_core::binding::{DataBinding, DataColumn, TableBinding, TableNature};
use cohort_sql_core::expr::{ExpressionTree, MatchOperator};
use cohort_sql_core::types::{AttributeKind, AttributeType, AttributeTypeMap};

fn two_table_binding() -> DataBinding {
    DataBinding::new(vec![
        TableBinding::new("TBL", "ID", TableNature::all_ids().unique_ids().primary())
            .column(DataColumn::new("COLOR", varchar(), "color")),
        TableBinding::new("DIM", "D_ID", TableNature::all_ids().unique_ids())
            .column(DataColumn::new("SHADE", varchar(), "shade")),
    ])
    .unwrap()
}

#[test]
fn same_table_reference_uses_a_self_join() {
    let binding = single_row_binding();
    let types = standard_types();
    let mut tree = ExpressionTree::new();
    let root = tree.match_reference("sCode", MatchOperator::GreaterThan, "tntCode");

    let template = plan_ok(&binding, &types, &tree, root);
    assert_eq!(
        template.sql(),
        "SELECT DISTINCT TBL.ID FROM TBL \
         INNER JOIN TBL sq__self ON (sq__self.ID = TBL.ID AND TBL.S_CODE > sq__self.TNT_CODE)"
    );
    assert!(template.parameters().is_empty());
}

#[test]
fn cross_table_reference_joins_both_tables() {
    let binding = two_table_binding();
    let types = standard_types();
    let mut tree = ExpressionTree::new();
    let root = tree.match_reference("color", MatchOperator::Equals, "shade");

    let template = plan_ok(&binding, &types, &tree, root);
    assert_eq!(
        template.sql(),
        "SELECT DISTINCT TBL.ID FROM TBL \
         INNER JOIN DIM ON (DIM.D_ID = TBL.ID) \
         WHERE TBL.COLOR = DIM.SHADE"
    );
}

#[test]
fn negated_reference_needs_witnesses_for_both_sides() {
    let binding = single_row_binding();
    let types = standard_types();
    let mut tree = ExpressionTree::new();
    let reference = tree.match_reference("sCode", MatchOperator::LessThan, "tntCode");
    let root = tree.negate(reference);

    let template = plan_ok(&binding, &types, &tree, root);
    let sql = template.sql();
    // Pair set plus one existence witness per side.
    assert_eq!(sql.matches(" AS (").count(), 3, "{sql}");
    assert!(sql.contains("S_CODE IS NOT NULL"));
    assert!(sql.contains("TNT_CODE IS NOT NULL"));
    assert!(sql.contains("sq__1.ID IS NULL"));
    assert!(sql.contains("OR sq__2.ID IS NULL OR sq__3.ID IS NULL"));
    assert_linked(&template);
}

#[test]
fn strict_negated_reference_drops_the_unknown_arms() {
    let binding = single_row_binding();
    let types = standard_types();
    let mut tree = ExpressionTree::new();
    let reference = tree.match_reference("sCode", MatchOperator::LessThan, "tntCode");
    let root = tree.negate_strict(reference);

    let template = plan_ok(&binding, &types, &tree, root);
    let sql = template.sql();
    assert!(sql.contains("IS NOT NULL AND sq__3.ID IS NOT NULL AND sq__1.ID IS NULL"));
    assert!(!sql.contains("OR sq__2.ID IS NULL"));
}

#[test]
fn multi_row_reference_materialises_an_alias() {
    let binding = DataBinding::new(vec![TableBinding::new(
        "EVENTS",
        "ID",
        TableNature::all_ids().primary(),
    )
    .column(DataColumn::new("FIRST_SEEN", varchar(), "firstSeen"))
    .column(DataColumn::new("LAST_SEEN", varchar(), "lastSeen").multi_row())])
    .unwrap();
    let types = AttributeTypeMap::new().with_fallback(AttributeType::new(AttributeKind::String));
    let mut tree = ExpressionTree::new();
    let root = tree.match_reference("firstSeen", MatchOperator::LessThan, "lastSeen");

    let template = plan_ok(&binding, &types, &tree, root);
    let sql = template.sql();
    // Multi-row sensitivity forces the pair set into a with-alias.
    assert!(sql.starts_with("WITH sq__1 AS (SELECT DISTINCT t0.ID AS ID FROM EVENTS t0"));
    assert!(sql.contains("INNER JOIN EVENTS sq__self ON sq__self.ID = t0.ID"));
    assert!(sql.contains("t0.FIRST_SEEN < sq__self.LAST_SEEN"));
}
