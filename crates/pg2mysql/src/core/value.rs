//! Dynamic SQL values exchanged at the row boundary.
//!
//! Rows read from either dialect are decoded into [`SqlValue`] and narrowed to
//! concrete types right after scanning. Nothing outside the row-copy path keeps
//! values in this form.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Owned SQL value for one cell of a result row or one bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real/float4).
    F32(f32),

    /// 64-bit floating point (double precision/float8).
    F64(f64),

    /// Exact numeric (numeric/decimal).
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Binary data (bytea/blob/binary).
    Bytes(Vec<u8>),

    /// Native UUID (PostgreSQL uuid).
    Uuid(Uuid),

    /// Timestamp without time zone.
    DateTime(NaiveDateTime),

    /// Timestamp with time zone, normalized to UTC.
    DateTimeTz(DateTime<Utc>),

    /// Calendar date.
    Date(NaiveDate),

    /// Time of day.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Narrow to an integer, accepting any integer width and booleans.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I16(v) => Some(*v as i64),
            SqlValue::I32(v) => Some(*v as i64),
            SqlValue::I64(v) => Some(*v),
            SqlValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Narrow to a boolean. MySQL reports `EXISTS` and `tinyint(1)` as integers.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            other => other.as_i64().map(|v| v != 0),
        }
    }

    /// Borrow character data.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Apply `normalize` to timestamp and time-of-day values, leaving everything else untouched.
    pub fn map_time(self, normalize: impl Fn(NaiveDateTime) -> NaiveDateTime) -> SqlValue {
        match self {
            SqlValue::DateTime(dt) => SqlValue::DateTime(normalize(dt)),
            // Rounding past midnight wraps to 00:00:00.
            SqlValue::Time(t) => SqlValue::Time(normalize(NaiveDate::MIN.and_time(t)).time()),
            SqlValue::DateTimeTz(dt) => {
                SqlValue::DateTimeTz(DateTime::from_naive_utc_and_offset(normalize(dt.naive_utc()), Utc))
            }
            other => other,
        }
    }

    /// NULL-safe equality: NULL matches NULL, integers compare across widths.
    pub fn null_safe_eq(&self, other: &SqlValue) -> bool {
        match (self.as_int_only(), other.as_int_only()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    fn as_int_only(&self) -> Option<i64> {
        match self {
            SqlValue::I16(_) | SqlValue::I32(_) | SqlValue::I64(_) => self.as_i64(),
            _ => None,
        }
    }

    /// Render an identity value as text.
    ///
    /// Raw 16-byte values and 36-byte UUID strings become canonical UUID text,
    /// other byte sequences are listed as `[b1 b2 ...]`.
    pub fn id_to_string(&self) -> String {
        match self {
            SqlValue::Bytes(bytes) => {
                if let Ok(uuid) = Uuid::from_slice(bytes) {
                    return uuid.to_string();
                }
                if bytes.len() == 36 {
                    if let Some(uuid) = std::str::from_utf8(bytes)
                        .ok()
                        .and_then(|s| Uuid::parse_str(s).ok())
                    {
                        return uuid.to_string();
                    }
                }
                let parts: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
                format!("[{}]", parts.join(" "))
            }
            SqlValue::Text(s) if s.len() == 36 => match Uuid::parse_str(s) {
                Ok(uuid) => uuid.to_string(),
                Err(_) => s.clone(),
            },
            other => other.to_string(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Decimal(d) => write!(f, "{}", d),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Bytes(b) => write!(f, "{:?}", b),
            SqlValue::Uuid(u) => write!(f, "{}", u),
            SqlValue::DateTime(dt) => write!(f, "{}", dt),
            SqlValue::DateTimeTz(dt) => write!(f, "{}", dt),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Time(t) => write!(f, "{}", t),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}
