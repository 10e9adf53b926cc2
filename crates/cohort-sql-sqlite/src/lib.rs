//! # cohort-sql-sqlite
//!
//! SQLite execution layer for cohort-sql query templates.
//!
//! A [`QueryTemplateWithParameters`] carries positional `?` placeholders and
//! its parameters in appearance order; this crate binds them onto a sqlx
//! prepared statement and fetches the resulting id set. Backend errors are
//! propagated verbatim.
//!
//! Transfer mapping onto SQLite storage classes:
//! - booleans and the integer family bind as `INTEGER`;
//! - the decimal family binds as `REAL` (scale-7 fixed point is unscaled
//!   back to a double);
//! - strings bind as `TEXT`;
//! - calendar dates bind as ISO `TEXT` (`yyyy-MM-dd`);
//! - timestamps bind as `INTEGER` milliseconds since epoch.

use cohort_sql_core::types::transfer::NUMERIC_SCALE_FACTOR;
use cohort_sql_core::{QueryTemplateWithParameters, TransferValue};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool};
use sqlx::query::Query;
use sqlx::Row;
use thiserror::Error;
use tracing::debug;

/// Errors of the SQLite execution layer.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Database error from sqlx, propagated verbatim.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type alias for template execution.
pub type Result<T> = std::result::Result<T, ApplyError>;

/// Binds every template parameter positionally onto a prepared statement.
#[must_use]
pub fn bind_template<'q>(
    template: &'q QueryTemplateWithParameters,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query::<Sqlite>(template.sql());
    for parameter in template.parameters() {
        query = bind_value(query, parameter.value());
    }
    query
}

#[allow(clippy::cast_precision_loss)]
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q TransferValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        TransferValue::Null => query.bind(None::<i64>),
        TransferValue::Bool(b) => query.bind(*b),
        TransferValue::U8(v) => query.bind(i64::from(*v)),
        TransferValue::I16(v) => query.bind(i64::from(*v)),
        TransferValue::I32(v) => query.bind(i64::from(*v)),
        TransferValue::I64(v) => query.bind(*v),
        TransferValue::F32(v) => query.bind(f64::from(*v)),
        TransferValue::F64(v) => query.bind(*v),
        TransferValue::Decimal7(scaled) => {
            query.bind(*scaled as f64 / NUMERIC_SCALE_FACTOR as f64)
        }
        TransferValue::Str(s) => query.bind(s.as_str()),
        TransferValue::Date(d) => query.bind(d.format("%Y-%m-%d").to_string()),
        TransferValue::Timestamp(millis) => query.bind(*millis),
    }
}

/// Executes a `SELECT DISTINCT <id>` template and returns the id set.
///
/// # Errors
///
/// Propagates backend errors verbatim.
pub async fn fetch_ids(
    pool: &SqlitePool,
    template: &QueryTemplateWithParameters,
) -> Result<Vec<i64>> {
    debug!(sql = template.sql(), parameters = template.parameters().len(), "executing template");
    let rows = bind_template(template).fetch_all(pool).await?;
    let mut ids = Vec::with_capacity(rows.len());
    for row in &rows {
        ids.push(row.try_get::<i64, _>(0)?);
    }
    Ok(ids)
}

/// Executes a `SELECT COUNT(DISTINCT <id>)` template.
///
/// # Errors
///
/// Propagates backend errors verbatim.
pub async fn fetch_count(
    pool: &SqlitePool,
    template: &QueryTemplateWithParameters,
) -> Result<i64> {
    debug!(sql = template.sql(), "executing count template");
    let row = bind_template(template).fetch_one(pool).await?;
    Ok(row.try_get::<i64, _>(0)?)
}
