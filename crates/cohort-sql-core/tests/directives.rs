//! Configuration directives reject constructs hard; nothing degrades
//! silently.

mod common;
use common::*;

use cohort_sql_core::binding::context::{Directive, ProcessContext};
use cohort_sql_core::binding::{DataBinding, DataColumn, TableBinding, TableNature};
use cohort_sql_core::error::PlanError;
use cohort_sql_core::expr::{ExpressionTree, MatchOperator};

#[test]
fn disable_contains_rejects_contains_matches() {
    let binding = single_row_binding();
    let types = standard_types();
    let context = ProcessContext::new().with_directive(Directive::DisableContains);
    let mut tree = ExpressionTree::new();
    let root = tree.match_value("color", MatchOperator::Contains, "re");

    let err = plan_with_context(&binding, &types, &context, &tree, root).unwrap_err();
    assert!(matches!(
        err,
        PlanError::Directive {
            directive: Directive::DisableContains,
            ..
        }
    ));
}

#[test]
fn disable_less_than_greater_than_rejects_ordered_matches() {
    let binding = single_row_binding();
    let types = standard_types();
    let context = ProcessContext::new().with_directive(Directive::DisableLessThanGreaterThan);
    let mut tree = ExpressionTree::new();
    let root = tree.match_value("n", MatchOperator::LessThan, "5");

    let err = plan_with_context(&binding, &types, &context, &tree, root).unwrap_err();
    assert!(matches!(err, PlanError::Directive { .. }));
}

#[test]
fn disable_reference_matching_rejects_references() {
    let binding = single_row_binding();
    let types = standard_types();
    let context = ProcessContext::new().with_directive(Directive::DisableReferenceMatching);
    let mut tree = ExpressionTree::new();
    let root = tree.match_reference("sCode", MatchOperator::Equals, "tntCode");

    let err = plan_with_context(&binding, &types, &context, &tree, root).unwrap_err();
    assert!(matches!(
        err,
        PlanError::Directive {
            directive: Directive::DisableReferenceMatching,
            ..
        }
    ));
}

#[test]
fn disable_union_rejects_the_union_fallback() {
    // Sparse multi-row data, no primary table: only a UNION can supply the
    // universe for a lenient negation.
    let binding = fact_binding();
    let types = fact_types();
    let context = ProcessContext::new().with_directive(Directive::DisableUnion);
    let mut tree = ExpressionTree::new();
    let dog = tree.match_value("fact.hasDog.flg", MatchOperator::Equals, "1");
    let root = tree.negate(dog);

    let err = plan_with_context(&binding, &types, &context, &tree, root).unwrap_err();
    assert!(matches!(
        err,
        PlanError::Directive {
            directive: Directive::DisableUnion,
            ..
        }
    ));

    // Without the directive the same expression converts.
    assert!(plan(&binding, &types, &tree, root).is_ok());
}

#[test]
fn enforce_primary_table_pins_the_base_query() {
    let binding = DataBinding::new(vec![
        TableBinding::new("TBL", "ID", TableNature::all_ids().unique_ids().primary()),
        TableBinding::new("DIM", "ID", TableNature::all_ids().unique_ids())
            .column(DataColumn::new("SHADE", varchar(), "shade")),
    ])
    .unwrap();
    let types = standard_types();
    let mut tree = ExpressionTree::new();
    let root = tree.match_value("shade", MatchOperator::Equals, "dark");

    // Unconstrained, the subexpression's own table seeds the query.
    let free = plan(&binding, &types, &tree, root).unwrap();
    assert!(free.sql().contains("FROM DIM"));

    let context = ProcessContext::new().with_directive(Directive::EnforcePrimaryTable);
    let pinned = plan_with_context(&binding, &types, &context, &tree, root).unwrap();
    assert!(pinned.sql().contains("FROM TBL"));
    assert!(pinned.sql().contains("INNER JOIN DIM ON (DIM.ID = TBL.ID)"));
}

#[test]
fn enforce_primary_table_without_primary_fails() {
    let binding = fact_binding();
    let types = fact_types();
    let context = ProcessContext::new().with_directive(Directive::EnforcePrimaryTable);
    let mut tree = ExpressionTree::new();
    let root = tree.match_value("fact.hasDog.flg", MatchOperator::Equals, "1");

    let err = plan_with_context(&binding, &types, &context, &tree, root).unwrap_err();
    assert_eq!(err.code(), "ERR_NO_PRIMARY_TABLE");
}
