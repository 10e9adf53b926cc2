//! Unsafe textual rendering and augmentation hooks.
//!
//! The renderer inlines parameter values as SQL literals for debugging.
//! **This surface is unsafe by design**: production execution must go through
//! prepared-statement binding; nothing here is injection-proof against
//! adversarial strings beyond quote doubling.

use std::sync::{Arc, OnceLock};

use chrono::DateTime;

use crate::error::CoercionError;
use crate::param::{ParameterApplicator, QueryParameter};
use crate::template::QueryTemplateWithParameters;
use crate::types::transfer::{TransferValue, NUMERIC_SCALE_FACTOR};

/// Dialect of date/timestamp literal rendering.
///
/// Only the unsafe debug renderer is dialect-sensitive; prepared-statement
/// execution never touches this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralDialect {
    /// Bare quoted literals.
    Plain,
    /// ANSI `DATE` / `TIMESTAMP` literals.
    Default,
    /// MySQL.
    MySql,
    /// Oracle.
    Oracle,
    /// SQL Server.
    SqlServer,
}

/// Positions an [`AugmentationListener`] may decorate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentationPoint {
    /// Before everything.
    BeforeScript,
    /// Before the main `SELECT` keyword.
    BeforeMainSelect,
    /// After the main select list.
    AfterMainSelect,
    /// Before a join's ON condition.
    BeforeOnConditions,
    /// After a join's ON condition.
    AfterOnConditions,
    /// Before the select inside a with-clause.
    BeforeWithSelect,
    /// After the select inside a with-clause.
    AfterWithSelect,
    /// After everything.
    AfterScript,
}

/// Inserts dialect comments at fixed positions of the emitted script.
///
/// The listener is purely decorative; returned text is wrapped in a SQL
/// comment and stripped of comment terminators, so it cannot emit executable
/// tokens.
pub trait AugmentationListener: std::fmt::Debug + Send + Sync {
    /// Returns the comment text for `point`, or `None` for no comment.
    fn comment_at(&self, point: AugmentationPoint) -> Option<String>;
}

/// Renders a listener comment for `point`, already wrapped and sanitised.
#[must_use]
pub fn augmentation_comment(
    listener: Option<&dyn AugmentationListener>,
    point: AugmentationPoint,
) -> Option<String> {
    let text = listener?.comment_at(point)?;
    let sanitised = text.replace("*/", "").replace("/*", "");
    Some(format!("/* {} */", sanitised.trim()))
}

/// Returns the cached default applicator.
pub fn default_applicator() -> Arc<dyn ParameterApplicator> {
    static DEFAULT: OnceLock<Arc<dyn ParameterApplicator>> = OnceLock::new();
    Arc::clone(DEFAULT.get_or_init(|| Arc::new(DefaultParameterApplicator)))
}

/// The built-in applicator for the unsafe debug surface.
#[derive(Debug)]
pub struct DefaultParameterApplicator;

impl ParameterApplicator for DefaultParameterApplicator {
    fn render_unsafe(
        &self,
        parameter: &QueryParameter,
        dialect: LiteralDialect,
    ) -> Result<String, CoercionError> {
        render_literal(parameter, dialect)
    }
}

/// Renders a whole template with literals inlined.
///
/// # Errors
///
/// Propagates rendering failures of individual parameters.
pub fn render_unsafe(
    template: &QueryTemplateWithParameters,
    dialect: LiteralDialect,
) -> Result<String, CoercionError> {
    let sql = template.sql();
    let mut out = String::with_capacity(sql.len() + template.parameters().len() * 8);
    let mut cursor = 0usize;
    for (position, parameter) in template.positions().iter().zip(template.parameters()) {
        out.push_str(&sql[cursor..*position]);
        let literal = match parameter.kind().applicator() {
            Some(applicator) => applicator.render_unsafe(parameter, dialect)?,
            None => default_applicator().render_unsafe(parameter, dialect)?,
        };
        out.push_str(&literal);
        cursor = position + 1;
    }
    out.push_str(&sql[cursor..]);
    Ok(out)
}

fn render_literal(
    parameter: &QueryParameter,
    dialect: LiteralDialect,
) -> Result<String, CoercionError> {
    let literal = match parameter.value() {
        TransferValue::Null => String::from("NULL"),
        TransferValue::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
        TransferValue::U8(v) => v.to_string(),
        TransferValue::I16(v) => v.to_string(),
        TransferValue::I32(v) => v.to_string(),
        TransferValue::I64(v) => v.to_string(),
        TransferValue::F32(v) => format_decimal(f64::from(*v)),
        TransferValue::F64(v) => format_decimal(*v),
        TransferValue::Decimal7(scaled) => format_decimal7(*scaled),
        TransferValue::Str(s) => quote(s),
        TransferValue::Date(d) => {
            let text = d.format("%Y-%m-%d").to_string();
            match dialect {
                LiteralDialect::Plain => quote(&text),
                LiteralDialect::Default | LiteralDialect::MySql => format!("DATE '{text}'"),
                LiteralDialect::Oracle => format!("TO_DATE('{text}', 'YYYY-MM-DD')"),
                LiteralDialect::SqlServer => format!("CONVERT(date, '{text}')"),
            }
        }
        TransferValue::Timestamp(millis) => {
            let text = DateTime::from_timestamp_millis(*millis)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .ok_or_else(|| CoercionError::ValueFormat {
                    attribute: parameter.id().to_string(),
                    value: millis.to_string(),
                    target: parameter.kind().name().to_string(),
                })?;
            match dialect {
                LiteralDialect::Plain => quote(&text),
                LiteralDialect::Default | LiteralDialect::MySql => format!("TIMESTAMP '{text}'"),
                LiteralDialect::Oracle => {
                    format!("TO_TIMESTAMP('{text}', 'YYYY-MM-DD HH24:MI:SS')")
                }
                // TODO: verify against a live SQL Server; conventional T-SQL
                // would be CAST('...' AS DATETIME2).
                LiteralDialect::SqlServer => format!("TO_TIMESTAMP('{text}')"),
            }
        }
    };
    Ok(literal)
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Formats a double with 1 to 7 fraction digits; whole numbers keep a
/// trailing `.0`.
fn format_decimal(value: f64) -> String {
    let text = format!("{value:.7}");
    trim_fraction(&text)
}

/// Formats a scale-7 fixed-point value.
fn format_decimal7(scaled: i64) -> String {
    let sign = if scaled < 0 { "-" } else { "" };
    let magnitude = scaled.unsigned_abs();
    let factor = NUMERIC_SCALE_FACTOR.unsigned_abs();
    let text = format!("{sign}{}.{:07}", magnitude / factor, magnitude % factor);
    trim_fraction(&text)
}

fn trim_fraction(text: &str) -> String {
    let trimmed = text.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}
