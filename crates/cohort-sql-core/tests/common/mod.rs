#![allow(dead_code)]

use std::sync::Arc;

use cohort_sql_core::binding::context::ProcessContext;
use cohort_sql_core::binding::{
    DataBinding, DataColumn, KeyValueMappingPolicy, TableBinding, TableNature,
};
use cohort_sql_core::error::PlanError;
use cohort_sql_core::expr::{ExpressionTree, NodeId};
use cohort_sql_core::planner::{PlannerOptions, QueryPlanner};
use cohort_sql_core::template::QueryTemplateWithParameters;
use cohort_sql_core::types::column::{BaseSqlKind, SqlKind};
use cohort_sql_core::types::transfer::TransferValue;
use cohort_sql_core::types::{AttributeKind, AttributeType, AttributeTypeMap};

pub fn varchar() -> SqlKind {
    SqlKind::builtin(BaseSqlKind::Varchar)
}

pub fn integer() -> SqlKind {
    SqlKind::builtin(BaseSqlKind::Integer)
}

pub fn timestamp() -> SqlKind {
    SqlKind::builtin(BaseSqlKind::Timestamp)
}

pub fn bigint() -> SqlKind {
    SqlKind::builtin(BaseSqlKind::BigInt)
}

/// One table covering all ids, one row per id.
pub fn single_row_binding() -> DataBinding {
    DataBinding::new(vec![TableBinding::new(
        "TBL",
        "ID",
        TableNature::all_ids().unique_ids().primary(),
    )
    .column(DataColumn::new("ID", bigint(), "id"))
    .column(DataColumn::new("COLOR", varchar(), "color"))
    .column(DataColumn::new("BRAND", varchar(), "brand"))
    .column(DataColumn::new("N", integer(), "n"))
    .column(DataColumn::new("UPDATED", timestamp(), "dateUpdated"))
    .column(DataColumn::new("S_CODE", varchar(), "sCode"))
    .column(DataColumn::new("TNT_CODE", varchar(), "tntCode"))])
    .unwrap()
}

/// Same table, but the color column may carry several rows per id.
pub fn multi_row_binding() -> DataBinding {
    DataBinding::new(vec![TableBinding::new(
        "TBL",
        "ID",
        TableNature::all_ids().primary(),
    )
    .column(DataColumn::new("COLOR", varchar(), "color").multi_row())])
    .unwrap()
}

/// A lone multi-row fact table with a filter column per fact name.
pub fn fact_binding() -> DataBinding {
    DataBinding::new(vec![TableBinding::new("FACTS", "ID", TableNature::sparse())
        .auto_mapping(Arc::new(
            KeyValueMappingPolicy::new("fact.", "F_KEY", varchar(), "F_VALUE", varchar())
                .strip_suffix(".flg"),
        ))])
    .unwrap()
}

/// Primary base table plus the sparse fact table.
pub fn combined_binding() -> DataBinding {
    DataBinding::new(vec![
        TableBinding::new("TBL", "ID", TableNature::all_ids().unique_ids().primary())
            .column(DataColumn::new("COLOR", varchar(), "color")),
        TableBinding::new("FACTS", "ID", TableNature::sparse()).auto_mapping(Arc::new(
            KeyValueMappingPolicy::new("fact.", "F_KEY", varchar(), "F_VALUE", varchar())
                .strip_suffix(".flg"),
        )),
    ])
    .unwrap()
}

pub fn standard_types() -> AttributeTypeMap {
    AttributeTypeMap::new()
        .with("id", AttributeType::new(AttributeKind::Integer))
        .with("n", AttributeType::new(AttributeKind::Integer))
        .with("dateUpdated", AttributeType::new(AttributeKind::Date))
        .with_fallback(AttributeType::new(AttributeKind::String))
}

pub fn fact_types() -> AttributeTypeMap {
    AttributeTypeMap::new().with_fallback(AttributeType::new(AttributeKind::Bool))
}

pub fn plan(
    binding: &DataBinding,
    types: &AttributeTypeMap,
    tree: &ExpressionTree,
    root: NodeId,
) -> Result<QueryTemplateWithParameters, PlanError> {
    let context = ProcessContext::new();
    QueryPlanner::new(binding, types, &context).plan(tree, root)
}

pub fn plan_with_context(
    binding: &DataBinding,
    types: &AttributeTypeMap,
    context: &ProcessContext,
    tree: &ExpressionTree,
    root: NodeId,
) -> Result<QueryTemplateWithParameters, PlanError> {
    QueryPlanner::new(binding, types, context).plan(tree, root)
}

pub fn plan_with_options(
    binding: &DataBinding,
    types: &AttributeTypeMap,
    options: PlannerOptions,
    tree: &ExpressionTree,
    root: NodeId,
) -> Result<QueryTemplateWithParameters, PlanError> {
    let context = ProcessContext::new();
    QueryPlanner::new(binding, types, &context)
        .with_options(options)
        .plan(tree, root)
}

pub fn plan_ok(
    binding: &DataBinding,
    types: &AttributeTypeMap,
    tree: &ExpressionTree,
    root: NodeId,
) -> QueryTemplateWithParameters {
    plan(binding, types, tree, root)
        .unwrap_or_else(|e| panic!("conversion failed: {e} (code {})", e.code()))
}

/// Extracts a string parameter value.
pub fn str_param(template: &QueryTemplateWithParameters, index: usize) -> &str {
    match template.parameters()[index].value() {
        TransferValue::Str(s) => s,
        other => panic!("parameter {index} is not a string: {other:?}"),
    }
}

/// The linker invariant: one `?` per parameter, positions aligned.
pub fn assert_linked(template: &QueryTemplateWithParameters) {
    let questions = template.sql().matches('?').count();
    assert_eq!(questions, template.parameters().len());
    assert_eq!(questions, template.positions().len());
    for &position in template.positions() {
        assert_eq!(&template.sql()[position..=position], "?");
    }
}
