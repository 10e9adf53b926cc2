//! Typed value coercion.
//!
//! The default parameter creator maps a raw attribute value into the transfer
//! type demanded by the target column kind, enforcing the compatibility
//! matrix, format rules, and range rules on the way.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::trace;

use crate::error::CoercionError;
use crate::param::{ParameterCreator, ParameterIdSequence, ParameterRequest, QueryParameter};
use crate::types::column::BaseSqlKind;
use crate::types::transfer::TransferValue;
use crate::types::AttributeKind;

/// Tests the compatibility matrix: may a value of `source` kind be carried to
/// a column of `target` kind at all?
#[must_use]
pub fn accepts(source: AttributeKind, target: BaseSqlKind) -> bool {
    match source {
        AttributeKind::String | AttributeKind::Integer => true,
        AttributeKind::Decimal => !target.is_boolean_family(),
        AttributeKind::Bool => {
            target.is_integer_family() || target.is_boolean_family() || target.is_character()
        }
        AttributeKind::Date => {
            matches!(target, BaseSqlKind::Date | BaseSqlKind::Timestamp)
                || target.is_integer_family()
                || (target.is_decimal_family() && target != BaseSqlKind::Float)
                || target.is_character()
        }
    }
}

/// Returns the cached default creator.
pub fn default_creator() -> Arc<dyn ParameterCreator> {
    static DEFAULT: OnceLock<Arc<dyn ParameterCreator>> = OnceLock::new();
    Arc::clone(DEFAULT.get_or_init(|| Arc::new(DefaultParameterCreator)))
}

/// Creates a parameter for `request`, dispatching to the target kind's
/// creator override when one is decorated on, and to the default creator
/// otherwise.
///
/// # Errors
///
/// Propagates the creator's [`CoercionError`].
pub fn create_for(request: &ParameterRequest<'_>) -> Result<QueryParameter, CoercionError> {
    match request.target.creator() {
        Some(creator) => creator.create(request),
        None => default_creator().create(request),
    }
}

/// The built-in creator implementing the full coercion pipeline.
#[derive(Debug)]
pub struct DefaultParameterCreator;

/// Canonical intermediate between the source kind's parse and the target
/// kind's transfer representation.
enum Canonical {
    Str(String),
    Int(i64),
    Dec(f64),
    Bool(bool),
    /// Milliseconds since epoch (UTC); `midnight` records whether the source
    /// carried a date-only form.
    DateMs { millis: i64, midnight: bool },
}

impl ParameterCreator for DefaultParameterCreator {
    fn create(&self, request: &ParameterRequest<'_>) -> Result<QueryParameter, CoercionError> {
        let source = request.attribute_type.kind();
        let target = request.target.base();
        if !accepts(source, target) {
            return Err(CoercionError::TypeMismatch {
                attribute: request.attribute.to_string(),
                kind: source,
                target: request.target.name().to_string(),
            });
        }

        let mut formatted = request
            .attribute_type
            .format(request.attribute, request.raw)?;
        if let Some(formatter) = request.target.formatter() {
            formatted = formatter.format(request.attribute, &formatted)?;
        }

        let canonical = parse_canonical(request, &formatted, target)?;
        let value = retarget(request, &formatted, canonical, target)?;

        let id = match request.id {
            Some(id) => id.to_string(),
            None => ParameterIdSequence::next(),
        };
        trace!(attribute = request.attribute, id = %id, target = request.target.name(), "created parameter");
        QueryParameter::new(id, request.target.clone(), value, request.operator)
            .map_err(CoercionError::Config)
    }
}

/// Parses the formatted value into the source kind's canonical intermediate.
fn parse_canonical(
    request: &ParameterRequest<'_>,
    formatted: &str,
    target: BaseSqlKind,
) -> Result<Canonical, CoercionError> {
    match request.attribute_type.kind() {
        AttributeKind::String => Ok(Canonical::Str(formatted.to_string())),
        AttributeKind::Integer => {
            if let Ok(v) = formatted.parse::<i64>() {
                return Ok(Canonical::Int(v));
            }
            // A BIGINT target accepts an ISO-date source, carried as epoch
            // seconds.
            if target == BaseSqlKind::BigInt {
                if let Some(date) = parse_iso_date(formatted) {
                    return Ok(Canonical::Int(date_to_millis(date) / 1000));
                }
            }
            Err(value_format(request, formatted))
        }
        AttributeKind::Decimal => formatted
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Canonical::Dec)
            .ok_or_else(|| value_format(request, formatted)),
        AttributeKind::Bool => match formatted {
            "0" => Ok(Canonical::Bool(false)),
            "1" => Ok(Canonical::Bool(true)),
            _ => Err(CoercionError::ValueFormatBool {
                attribute: request.attribute.to_string(),
                value: formatted.to_string(),
            }),
        },
        AttributeKind::Date => {
            if let Some(date) = parse_iso_date(formatted) {
                return Ok(Canonical::DateMs {
                    millis: date_to_millis(date),
                    midnight: true,
                });
            }
            // Timestamp targets accept the extended form.
            if target == BaseSqlKind::Timestamp {
                if let Some(dt) = parse_iso_datetime(formatted) {
                    return Ok(Canonical::DateMs {
                        millis: dt.and_utc().timestamp_millis(),
                        midnight: false,
                    });
                }
            }
            Err(CoercionError::ValueFormatDate {
                attribute: request.attribute.to_string(),
                value: formatted.to_string(),
            })
        }
    }
}

/// Retargets the canonical intermediate to the target kind's transfer type,
/// applying range checks.
#[allow(clippy::cast_possible_truncation)]
fn retarget(
    request: &ParameterRequest<'_>,
    formatted: &str,
    canonical: Canonical,
    target: BaseSqlKind,
) -> Result<TransferValue, CoercionError> {
    match target {
        BaseSqlKind::Bit | BaseSqlKind::Boolean => {
            let b = match canonical {
                Canonical::Bool(b) => b,
                Canonical::Str(s) => parse_bool_text(&s).ok_or_else(|| bool_format(request, &s))?,
                Canonical::Int(0) => false,
                Canonical::Int(1) => true,
                _ => return Err(bool_format(request, formatted)),
            };
            Ok(TransferValue::Bool(b))
        }
        BaseSqlKind::TinyInt => TransferValue::tiny_int(to_i64(request, formatted, canonical)?)
            .ok_or_else(|| value_range(request, formatted)),
        BaseSqlKind::SmallInt => TransferValue::small_int(to_i64(request, formatted, canonical)?)
            .ok_or_else(|| value_range(request, formatted)),
        BaseSqlKind::Integer => TransferValue::integer(to_i64(request, formatted, canonical)?)
            .ok_or_else(|| value_range(request, formatted)),
        BaseSqlKind::BigInt => Ok(TransferValue::I64(to_i64(request, formatted, canonical)?)),
        BaseSqlKind::Decimal | BaseSqlKind::Double | BaseSqlKind::Real => {
            Ok(TransferValue::F64(to_f64(request, formatted, canonical)?))
        }
        BaseSqlKind::Float => Ok(TransferValue::F32(
            to_f64(request, formatted, canonical)? as f32
        )),
        BaseSqlKind::Numeric => TransferValue::numeric(to_f64(request, formatted, canonical)?)
            .ok_or_else(|| value_range(request, formatted)),
        BaseSqlKind::Date => {
            let millis = match canonical {
                Canonical::DateMs { millis, .. } => millis,
                Canonical::Int(ms) => ms,
                Canonical::Dec(v) => v as i64,
                Canonical::Str(ref s) => parse_iso_date(s)
                    .map(date_to_millis)
                    .ok_or_else(|| date_format(request, s))?,
                Canonical::Bool(_) => return Err(value_format(request, formatted)),
            };
            DateTime::from_timestamp_millis(millis)
                .map(|dt| TransferValue::Date(dt.date_naive()))
                .ok_or_else(|| value_range(request, formatted))
        }
        BaseSqlKind::Timestamp => {
            let millis = match canonical {
                Canonical::DateMs { millis, .. } => millis,
                Canonical::Int(ms) => ms,
                Canonical::Dec(v) => v as i64,
                Canonical::Str(ref s) => probe_timestamp_text(s)
                    .ok_or_else(|| date_format(request, s))?,
                Canonical::Bool(_) => return Err(value_format(request, formatted)),
            };
            TransferValue::timestamp_millis(millis).ok_or_else(|| value_range(request, formatted))
        }
        BaseSqlKind::Char
        | BaseSqlKind::NChar
        | BaseSqlKind::Varchar
        | BaseSqlKind::NVarchar
        | BaseSqlKind::LongVarchar
        | BaseSqlKind::LongNVarchar => Ok(TransferValue::Str(match canonical {
            Canonical::Str(s) => s,
            Canonical::Int(v) => v.to_string(),
            Canonical::Dec(v) => v.to_string(),
            Canonical::Bool(b) => String::from(if b { "1" } else { "0" }),
            Canonical::DateMs { millis, midnight } => render_date_text(request, millis, midnight)?,
        })),
    }
}

/// Coerces the canonical intermediate to `i64` for the integer family.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn to_i64(
    request: &ParameterRequest<'_>,
    formatted: &str,
    canonical: Canonical,
) -> Result<i64, CoercionError> {
    match canonical {
        Canonical::Int(v) => Ok(v),
        Canonical::Bool(b) => Ok(i64::from(b)),
        // A DATE source carried into the integer family becomes epoch
        // seconds, not milliseconds.
        Canonical::DateMs { millis, .. } => Ok(millis / 1000),
        Canonical::Str(ref s) => s
            .parse::<i64>()
            .map_err(|_| value_format(request, s)),
        Canonical::Dec(v) => {
            if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(value_format(request, formatted))
            }
        }
    }
}

/// Coerces the canonical intermediate to `f64` for the decimal family.
#[allow(clippy::cast_precision_loss)]
fn to_f64(
    request: &ParameterRequest<'_>,
    _formatted: &str,
    canonical: Canonical,
) -> Result<f64, CoercionError> {
    match canonical {
        Canonical::Dec(v) => Ok(v),
        Canonical::Int(v) => Ok(v as f64),
        Canonical::DateMs { millis, .. } => Ok(millis as f64),
        Canonical::Str(ref s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| value_format(request, s)),
        Canonical::Bool(_) => Err(value_format(request, "boolean")),
    }
}

fn parse_bool_text(s: &str) -> Option<bool> {
    match s {
        "0" => Some(false),
        "1" => Some(true),
        _ if s.eq_ignore_ascii_case("true") => Some(true),
        _ if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Parses `yyyy-MM-dd` (UTC).
#[must_use]
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parses `yyyy-MM-dd HH:mm:ss` (UTC).
#[must_use]
pub fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()
}

/// Midnight of `date` as milliseconds since epoch (UTC).
#[must_use]
pub fn date_to_millis(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Probes a timestamp text by trying the date-only form first, then the
/// extended form.
#[must_use]
pub fn probe_timestamp_text(s: &str) -> Option<i64> {
    if let Some(date) = parse_iso_date(s) {
        return Some(date_to_millis(date));
    }
    parse_iso_datetime(s).map(|dt| dt.and_utc().timestamp_millis())
}

fn render_date_text(
    request: &ParameterRequest<'_>,
    millis: i64,
    midnight: bool,
) -> Result<String, CoercionError> {
    let dt = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| value_range(request, &millis.to_string()))?;
    if midnight {
        Ok(dt.format("%Y-%m-%d").to_string())
    } else {
        Ok(dt.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

fn value_format(request: &ParameterRequest<'_>, value: &str) -> CoercionError {
    CoercionError::ValueFormat {
        attribute: request.attribute.to_string(),
        value: value.to_string(),
        target: request.target.name().to_string(),
    }
}

fn value_range(request: &ParameterRequest<'_>, value: &str) -> CoercionError {
    CoercionError::ValueRange {
        attribute: request.attribute.to_string(),
        value: value.to_string(),
        target: request.target.name().to_string(),
    }
}

fn bool_format(request: &ParameterRequest<'_>, value: &str) -> CoercionError {
    CoercionError::ValueFormatBool {
        attribute: request.attribute.to_string(),
        value: value.to_string(),
    }
}

fn date_format(request: &ParameterRequest<'_>, value: &str) -> CoercionError {
    CoercionError::ValueFormatDate {
        attribute: request.attribute.to_string(),
        value: value.to_string(),
    }
}
