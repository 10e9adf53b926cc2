//! Compatibility matrix and coercion behaviour across every legal pairing.

mod common;
use common::*;

use cohort_sql_core::error::CoercionError;
use cohort_sql_core::expr::MatchOperator;
use cohort_sql_core::param::creator::accepts;
use cohort_sql_core::param::{ParameterCreator, ParameterRequest};
use cohort_sql_core::types::column::{BaseSqlKind, SqlKind};
use cohort_sql_core::types::{AttributeKind, AttributeType};
use cohort_sql_core::DefaultParameterCreator;

const SOURCES: [AttributeKind; 5] = [
    AttributeKind::String,
    AttributeKind::Integer,
    AttributeKind::Decimal,
    AttributeKind::Bool,
    AttributeKind::Date,
];

/// A value of the source kind a given target can plausibly carry.
fn friendly_value(source: AttributeKind, target: BaseSqlKind) -> &'static str {
    match source {
        AttributeKind::String => {
            if target.is_boolean_family() {
                "1"
            } else if target.is_integer_family() {
                "42"
            } else if target.is_decimal_family() {
                "1.25"
            } else if matches!(target, BaseSqlKind::Date | BaseSqlKind::Timestamp) {
                "2024-12-13"
            } else {
                "plain text"
            }
        }
        AttributeKind::Integer => {
            if target.is_boolean_family() {
                "1"
            } else {
                "42"
            }
        }
        AttributeKind::Decimal => {
            if target.is_integer_family() {
                "42"
            } else {
                "1.25"
            }
        }
        AttributeKind::Bool => "1",
        // Epoch keeps the derived second count inside every integer range.
        AttributeKind::Date => "1970-01-01",
    }
}

#[test]
fn every_accepted_pairing_produces_a_matching_transfer_value() {
    let creator = DefaultParameterCreator;
    for source in SOURCES {
        let ty = AttributeType::new(source);
        for target in BaseSqlKind::ALL {
            if !accepts(source, target) {
                continue;
            }
            let kind = SqlKind::builtin(target);
            let parameter = creator
                .create(&ParameterRequest {
                    id: Some("p"),
                    attribute: "attr",
                    attribute_type: &ty,
                    raw: friendly_value(source, target),
                    operator: MatchOperator::Equals,
                    target: &kind,
                })
                .unwrap_or_else(|e| panic!("{source:?} -> {target:?}: {e}"));
            // The value's variant must match the kind's transfer type.
            assert_eq!(
                parameter.value().tag(),
                Some(target.transfer_tag()),
                "{source:?} -> {target:?}"
            );
        }
    }
}

#[test]
fn every_rejected_pairing_reports_a_type_mismatch() {
    let creator = DefaultParameterCreator;
    for source in SOURCES {
        let ty = AttributeType::new(source);
        for target in BaseSqlKind::ALL {
            if accepts(source, target) {
                continue;
            }
            let kind = SqlKind::builtin(target);
            let err = creator
                .create(&ParameterRequest {
                    id: Some("p"),
                    attribute: "attr",
                    attribute_type: &ty,
                    raw: friendly_value(source, target),
                    operator: MatchOperator::Equals,
                    target: &kind,
                })
                .unwrap_err();
            assert!(
                matches!(err, CoercionError::TypeMismatch { .. }),
                "{source:?} -> {target:?}: {err}"
            );
        }
    }
}

#[test]
fn planner_rejects_incompatible_attribute_column_pairs() {
    use cohort_sql_core::binding::{DataBinding, DataColumn, TableBinding, TableNature};
    use cohort_sql_core::expr::ExpressionTree;
    use cohort_sql_core::types::AttributeTypeMap;

    // A BOOL attribute bound to a DOUBLE column is outside the matrix.
    let binding = DataBinding::new(vec![TableBinding::new(
        "TBL",
        "ID",
        TableNature::all_ids().primary(),
    )
    .column(DataColumn::new(
        "WEIGHT",
        SqlKind::builtin(BaseSqlKind::Double),
        "flag",
    ))])
    .unwrap();
    let types = AttributeTypeMap::new().with("flag", AttributeType::new(AttributeKind::Bool));
    let mut tree = ExpressionTree::new();
    let root = tree.match_value("flag", MatchOperator::Equals, "1");

    let err = plan(&binding, &types, &tree, root).unwrap_err();
    assert_eq!(err.code(), "ERR_COERCION");
}
