//! Conversions between [`SqlValue`] and the PostgreSQL binary protocol.
//!
//! Parameters are encoded according to the type the server inferred for the
//! placeholder, so a value read from MySQL (e.g. `tinyint` or `binary(16)`)
//! can be bound to a `boolean` or `uuid` column.

use std::error::Error;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => int_to_sql(*b as i64, ty, out),
            },
            SqlValue::I16(v) => int_to_sql(*v as i64, ty, out),
            SqlValue::I32(v) => int_to_sql(*v as i64, ty, out),
            SqlValue::I64(v) => int_to_sql(*v, ty, out),
            SqlValue::F32(v) => float_to_sql(*v as f64, ty, out),
            SqlValue::F64(v) => float_to_sql(*v, ty, out),
            SqlValue::Decimal(d) => match *ty {
                Type::NUMERIC => d.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => {
                    let v = d
                        .to_i64()
                        .ok_or_else(|| format!("decimal {} does not fit an integer", d))?;
                    int_to_sql(v, ty, out)
                }
                Type::FLOAT4 | Type::FLOAT8 => {
                    let v = d
                        .to_f64()
                        .ok_or_else(|| format!("decimal {} does not fit a float", d))?;
                    float_to_sql(v, ty, out)
                }
                _ => text_to_sql(&d.to_string(), ty, out),
            },
            SqlValue::Text(s) => text_to_sql(s, ty, out),
            SqlValue::Bytes(b) => match *ty {
                Type::UUID => Uuid::from_slice(b)?.to_sql(ty, out),
                Type::BYTEA => b.to_sql(ty, out),
                _ => text_to_sql(std::str::from_utf8(b)?, ty, out),
            },
            SqlValue::Uuid(u) => match *ty {
                Type::UUID => u.to_sql(ty, out),
                Type::BYTEA => u.as_bytes().as_slice().to_sql(ty, out),
                _ => text_to_sql(&u.to_string(), ty, out),
            },
            SqlValue::DateTime(dt) => match *ty {
                Type::TIMESTAMP => dt.to_sql(ty, out),
                Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
                Type::DATE => dt.date().to_sql(ty, out),
                _ => text_to_sql(&dt.to_string(), ty, out),
            },
            SqlValue::DateTimeTz(dt) => match *ty {
                Type::TIMESTAMPTZ => dt.to_sql(ty, out),
                Type::TIMESTAMP => dt.naive_utc().to_sql(ty, out),
                _ => text_to_sql(&dt.to_rfc3339(), ty, out),
            },
            SqlValue::Date(d) => match *ty {
                Type::DATE => d.to_sql(ty, out),
                Type::TIMESTAMP => d.and_time(NaiveTime::MIN).to_sql(ty, out),
                _ => text_to_sql(&d.to_string(), ty, out),
            },
            SqlValue::Time(t) => match *ty {
                Type::TIME => t.to_sql(ty, out),
                _ => text_to_sql(&t.to_string(), ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::BOOL => (v != 0).to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        _ => text_to_sql(&v.to_string(), ty, out),
    }
}

fn float_to_sql(v: f64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_f64(v)
            .ok_or_else(|| format!("float {} does not fit a numeric", v))?
            .to_sql(ty, out),
        _ => text_to_sql(&v.to_string(), ty, out),
    }
}

fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::UUID => Uuid::parse_str(s)?.to_sql(ty, out),
        Type::BOOL => match s.to_lowercase().as_str() {
            "t" | "true" | "1" | "yes" | "on" => true.to_sql(ty, out),
            "f" | "false" | "0" | "no" | "off" => false.to_sql(ty, out),
            other => Err(format!("invalid boolean '{}'", other).into()),
        },
        Type::INT2 | Type::INT4 | Type::INT8 => int_to_sql(s.trim().parse()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => float_to_sql(s.trim().parse()?, ty, out),
        Type::NUMERIC => Decimal::from_str(s.trim())?.to_sql(ty, out),
        Type::TIMESTAMP => {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")?.to_sql(ty, out)
        }
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s)?
            .with_timezone(&Utc)
            .to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")?.to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        Type::JSONB => {
            // jsonb binary format is a version byte followed by the text form
            out.put_u8(1);
            out.put_slice(s.as_bytes());
            Ok(IsNull::No)
        }
        // text, varchar, bpchar, name, json, enums and other text-encoded types
        _ => {
            out.put_slice(s.as_bytes());
            Ok(IsNull::No)
        }
    }
}

/// Decode every column of a row.
pub(crate) fn row_to_values(row: &Row) -> Result<Vec<SqlValue>> {
    (0..row.len()).map(|idx| decode(row, idx)).collect()
}

fn decode(row: &Row, idx: usize) -> Result<SqlValue> {
    let ty = row.columns()[idx].type_().clone();
    let value = match ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(SqlValue::I16),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(SqlValue::I32),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::I64),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(SqlValue::F32),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::F64),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(SqlValue::Decimal),
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.map(SqlValue::Uuid),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Bytes),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(SqlValue::DateTime),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(SqlValue::DateTimeTz),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(SqlValue::Date),
        Type::TIME => row.try_get::<_, Option<NaiveTime>>(idx)?.map(SqlValue::Time),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| SqlValue::Text(v.to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text)
        }
        other => {
            return Err(MigrateError::Value(format!(
                "column {} has type {} without a binary decoding; select it as text",
                row.columns()[idx].name(),
                other
            )))
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Map a driver error, surfacing primary-key collisions as [`MigrateError::DuplicateKey`].
pub(crate) fn map_error(err: tokio_postgres::Error) -> MigrateError {
    if let Some(db_err) = err.as_db_error() {
        if let Some(constraint) = primary_key_violation(db_err.code(), db_err.constraint()) {
            return MigrateError::DuplicateKey(constraint.to_string());
        }
    }
    MigrateError::Postgres(err)
}

/// The violated constraint when a unique violation hit a `*_pkey` constraint.
fn primary_key_violation<'e>(code: &SqlState, constraint: Option<&'e str>) -> Option<&'e str> {
    if code != &SqlState::UNIQUE_VIOLATION {
        return None;
    }
    constraint.filter(|c| c.ends_with("pkey"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: SqlValue, ty: Type) -> BytesMut {
        let mut out = BytesMut::new();
        value.to_sql(&ty, &mut out).unwrap();
        out
    }

    #[test]
    fn test_primary_key_violation() {
        assert_eq!(
            primary_key_violation(&SqlState::UNIQUE_VIOLATION, Some("users_pkey")),
            Some("users_pkey")
        );
        assert_eq!(
            primary_key_violation(&SqlState::UNIQUE_VIOLATION, Some("users_email_key")),
            None
        );
        assert_eq!(primary_key_violation(&SqlState::UNIQUE_VIOLATION, None), None);
        assert_eq!(
            primary_key_violation(&SqlState::FOREIGN_KEY_VIOLATION, Some("users_pkey")),
            None
        );
    }

    #[test]
    fn test_tinyint_binds_to_boolean() {
        assert_eq!(&encode(SqlValue::I64(1), Type::BOOL)[..], &[1]);
        assert_eq!(&encode(SqlValue::I64(0), Type::BOOL)[..], &[0]);
    }

    #[test]
    fn test_integer_width_follows_target() {
        assert_eq!(encode(SqlValue::I64(7), Type::INT4).len(), 4);
        assert_eq!(encode(SqlValue::I16(7), Type::INT8).len(), 8);

        let mut out = BytesMut::new();
        assert!(SqlValue::I64(i64::MAX).to_sql(&Type::INT2, &mut out).is_err());
    }

    #[test]
    fn test_binary_uuid_binds_to_uuid() {
        let uuid = Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
        let out = encode(SqlValue::Bytes(uuid.as_bytes().to_vec()), Type::UUID);
        assert_eq!(&out[..], uuid.as_bytes());

        let out = encode(SqlValue::Text(uuid.to_string()), Type::UUID);
        assert_eq!(&out[..], uuid.as_bytes());
    }

    #[test]
    fn test_null_is_null_for_any_type() {
        let mut out = BytesMut::new();
        let is_null = SqlValue::Null.to_sql(&Type::UUID, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
    }

    #[test]
    fn test_text_passthrough() {
        assert_eq!(&encode(SqlValue::from("abc"), Type::VARCHAR)[..], b"abc");
        assert_eq!(&encode(SqlValue::from("{}"), Type::JSONB)[..], b"\x01{}");
    }
}
