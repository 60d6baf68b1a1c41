//! Conversions between [`SqlValue`] and `mysql_async::Value`.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::{Column, Value};
use rust_decimal::Decimal;

use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};

/// MySQL charset id reported for binary strings.
const BINARY_CHARSET: u16 = 63;

/// Server error raised on a unique/primary key collision.
const ER_DUP_ENTRY: u16 = 1062;

/// Convert a bound parameter.
pub(crate) fn to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(*b as i64),
        SqlValue::I16(i) => Value::Int(*i as i64),
        SqlValue::I32(i) => Value::Int(*i as i64),
        SqlValue::I64(i) => Value::Int(*i),
        SqlValue::F32(f) => Value::Float(*f),
        SqlValue::F64(f) => Value::Double(*f),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Uuid(u) => Value::Bytes(u.to_string().into_bytes()),
        SqlValue::DateTime(dt) => datetime_value(dt),
        SqlValue::DateTimeTz(dt) => datetime_value(&dt.naive_utc()),
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
    }
}

fn datetime_value(dt: &NaiveDateTime) -> Value {
    Value::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond() / 1_000,
    )
}

/// Decode one cell according to its column metadata.
///
/// Handles both the binary protocol (typed values) and the text protocol
/// (everything arrives as bytes).
pub(crate) fn from_mysql(value: Value, column: &Column) -> Result<SqlValue> {
    if value == Value::NULL {
        return Ok(SqlValue::Null);
    }

    let decoded = match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => match value {
            Value::Int(i) => SqlValue::I64(i),
            Value::UInt(u) => match i64::try_from(u) {
                Ok(i) => SqlValue::I64(i),
                Err(_) => SqlValue::Decimal(Decimal::from(u)),
            },
            other => {
                let text = text(other)?;
                if column.flags().contains(ColumnFlags::UNSIGNED_FLAG) {
                    let u: u64 = parse(&text)?;
                    match i64::try_from(u) {
                        Ok(i) => SqlValue::I64(i),
                        Err(_) => SqlValue::Decimal(Decimal::from(u)),
                    }
                } else {
                    SqlValue::I64(parse(&text)?)
                }
            }
        },
        ColumnType::MYSQL_TYPE_FLOAT => match value {
            Value::Float(f) => SqlValue::F32(f),
            Value::Double(d) => SqlValue::F32(d as f32),
            other => SqlValue::F32(parse(&text(other)?)?),
        },
        ColumnType::MYSQL_TYPE_DOUBLE => match value {
            Value::Double(d) => SqlValue::F64(d),
            Value::Float(f) => SqlValue::F64(f as f64),
            other => SqlValue::F64(parse(&text(other)?)?),
        },
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            SqlValue::Decimal(parse(&text(value)?)?)
        }
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => match value {
            Value::Date(y, m, d, ..) => match NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32)
            {
                Some(date) => SqlValue::Date(date),
                None => SqlValue::Null,
            },
            other => {
                let text = text(other)?;
                match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
                    Ok(date) => SqlValue::Date(date),
                    Err(_) if text.starts_with("0000-00-00") => SqlValue::Null,
                    Err(e) => return Err(MigrateError::Value(format!("date '{}': {}", text, e))),
                }
            }
        },
        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => match value {
            Value::Date(y, m, d, h, mi, s, us) => {
                match NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32)
                    .and_then(|date| date.and_hms_micro_opt(h as u32, mi as u32, s as u32, us))
                {
                    Some(dt) => SqlValue::DateTime(dt),
                    None => SqlValue::Null,
                }
            }
            other => {
                let text = text(other)?;
                match NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f") {
                    Ok(dt) => SqlValue::DateTime(dt),
                    Err(_) if text.starts_with("0000-00-00") => SqlValue::Null,
                    Err(e) => {
                        return Err(MigrateError::Value(format!("datetime '{}': {}", text, e)))
                    }
                }
            }
        },
        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => match value {
            Value::Time(false, 0, h, m, s, us) => {
                match NaiveTime::from_hms_micro_opt(h as u32, m as u32, s as u32, us) {
                    Some(t) => SqlValue::Time(t),
                    None => SqlValue::Text(format!("{:02}:{:02}:{:02}", h, m, s)),
                }
            }
            Value::Time(neg, days, h, m, s, _) => SqlValue::Text(format!(
                "{}{}:{:02}:{:02}",
                if neg { "-" } else { "" },
                days * 24 + h as u32,
                m,
                s
            )),
            other => {
                let text = text(other)?;
                match NaiveTime::parse_from_str(&text, "%H:%M:%S%.f") {
                    Ok(t) => SqlValue::Time(t),
                    Err(_) => SqlValue::Text(text),
                }
            }
        },
        ColumnType::MYSQL_TYPE_JSON => SqlValue::Text(text(value)?),
        _ if column.character_set() == BINARY_CHARSET => match value {
            Value::Bytes(b) => SqlValue::Bytes(b),
            other => SqlValue::Text(text(other)?),
        },
        _ => SqlValue::Text(text(value)?),
    };

    Ok(decoded)
}

fn text(value: Value) -> Result<String> {
    match value {
        Value::Bytes(b) => {
            String::from_utf8(b).map_err(|e| MigrateError::Value(format!("invalid UTF-8: {}", e)))
        }
        Value::Int(i) => Ok(i.to_string()),
        Value::UInt(u) => Ok(u.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Double(d) => Ok(d.to_string()),
        other => Ok(other.as_sql(true)),
    }
}

fn parse<T>(text: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse()
        .map_err(|e| MigrateError::Value(format!("'{}': {}", text, e)))
}

/// Map a driver error, surfacing primary-key collisions as [`MigrateError::DuplicateKey`].
pub(crate) fn map_error(err: mysql_async::Error) -> MigrateError {
    if let mysql_async::Error::Server(server) = &err {
        if server.code == ER_DUP_ENTRY && server.message.contains("PRIMARY") {
            return MigrateError::DuplicateKey(server.message.clone());
        }
    }
    MigrateError::Mysql(err)
}
