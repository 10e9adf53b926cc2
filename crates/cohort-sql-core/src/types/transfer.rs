//! Transfer values.
//!
//! A transfer value is what travels from the parameter creator to the
//! parameter applicator. Its variant must match the transfer type demanded by
//! the target SQL column kind; all range checks are total on the variant
//! constructors.

use chrono::{DateTime, NaiveDate};

/// Milliseconds-since-epoch upper bound of SQL_TIMESTAMP
/// (9999-12-31 23:59:59 UTC).
pub const TIMESTAMP_MAX_MILLIS: i64 = 253_402_300_799_000;

/// Scale factor of the fixed-point NUMERIC representation.
pub const NUMERIC_SCALE_FACTOR: i64 = 10_000_000;

/// Discriminant of a [`TransferValue`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferTag {
    /// Boolean.
    Bool,
    /// Unsigned byte, 0..=255.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Single-precision float.
    F32,
    /// Double-precision float.
    F64,
    /// Fixed-point decimal, scale 7.
    Decimal7,
    /// String.
    Str,
    /// Calendar date (UTC).
    Date,
    /// Instant, milliseconds since epoch (UTC).
    Timestamp,
}

/// A typed value ready for positional binding.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferValue {
    /// Absent value (SQL NULL).
    Null,
    /// Boolean.
    Bool(bool),
    /// Unsigned byte.
    U8(u8),
    /// Signed 16-bit integer.
    I16(i16),
    /// Signed 32-bit integer.
    I32(i32),
    /// Signed 64-bit integer.
    I64(i64),
    /// Single-precision float.
    F32(f32),
    /// Double-precision float.
    F64(f64),
    /// Fixed-point decimal scaled by `10^7`.
    Decimal7(i64),
    /// String.
    Str(String),
    /// Calendar date (UTC).
    Date(NaiveDate),
    /// Milliseconds since epoch (UTC), in `[0, TIMESTAMP_MAX_MILLIS]`.
    Timestamp(i64),
}

impl TransferValue {
    /// Returns the variant's tag, or `None` for [`TransferValue::Null`].
    #[must_use]
    pub const fn tag(&self) -> Option<TransferTag> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(TransferTag::Bool),
            Self::U8(_) => Some(TransferTag::U8),
            Self::I16(_) => Some(TransferTag::I16),
            Self::I32(_) => Some(TransferTag::I32),
            Self::I64(_) => Some(TransferTag::I64),
            Self::F32(_) => Some(TransferTag::F32),
            Self::F64(_) => Some(TransferTag::F64),
            Self::Decimal7(_) => Some(TransferTag::Decimal7),
            Self::Str(_) => Some(TransferTag::Str),
            Self::Date(_) => Some(TransferTag::Date),
            Self::Timestamp(_) => Some(TransferTag::Timestamp),
        }
    }

    /// Constructs a TINYINT value; `None` outside `[0, 255]`.
    #[must_use]
    pub fn tiny_int(value: i64) -> Option<Self> {
        u8::try_from(value).ok().map(Self::U8)
    }

    /// Constructs a SMALLINT value; `None` outside `[-32767, 32767]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn small_int(value: i64) -> Option<Self> {
        if value >= -32_767 && value <= 32_767 {
            Some(Self::I16(value as i16))
        } else {
            None
        }
    }

    /// Constructs an INTEGER value; `None` outside
    /// `[-2147483647, 2147483647]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn integer(value: i64) -> Option<Self> {
        if value >= -2_147_483_647 && value <= 2_147_483_647 {
            Some(Self::I32(value as i32))
        } else {
            None
        }
    }

    /// Constructs a TIMESTAMP value; `None` outside
    /// `[0, TIMESTAMP_MAX_MILLIS]`.
    #[must_use]
    pub const fn timestamp_millis(millis: i64) -> Option<Self> {
        if millis >= 0 && millis <= TIMESTAMP_MAX_MILLIS {
            Some(Self::Timestamp(millis))
        } else {
            None
        }
    }

    /// Constructs a NUMERIC value: fixed point, scale 7, rounding half-up;
    /// `None` when the scaled value overflows.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn numeric(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scaled = value * NUMERIC_SCALE_FACTOR as f64;
        if scaled.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self::Decimal7(scaled.round() as i64))
    }

    /// Converts a TIMESTAMP or DATE value to a calendar date (UTC); `None`
    /// when the variant is neither.
    #[must_use]
    pub fn as_calendar_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Timestamp(ms) => DateTime::from_timestamp_millis(*ms).map(|dt| dt.date_naive()),
            _ => None,
        }
    }
}
