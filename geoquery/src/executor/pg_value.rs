//! tokio-postgres row → JSON row conversion.

use rust_decimal::Decimal;
use std::error::Error;
use tokio_postgres::types::{FromSql, Kind, Type};

use super::Row;
use crate::normalizer::values::{DbValue, to_json};

/// Accepts any type and keeps the binary payload. Postgres sends enum
/// labels as their UTF-8 text; other unknown types (geometry, custom
/// domains) come through as bytes.
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

pub fn convert_row(row: &tokio_postgres::Row) -> Result<Row, tokio_postgres::Error> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_())?;
        out.insert(column.name().to_string(), to_json(value));
    }
    Ok(out)
}

fn get<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, f: F) -> Result<DbValue, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> DbValue,
{
    Ok(row.try_get::<_, Option<T>>(idx)?.map_or(DbValue::Null, f))
}

fn get_array<'a, T, F>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    f: F,
) -> Result<DbValue, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: Fn(T) -> DbValue,
{
    let items = row.try_get::<_, Option<Vec<Option<T>>>>(idx)?;
    Ok(match items {
        None => DbValue::Null,
        Some(items) => DbValue::Array(
            items
                .into_iter()
                .map(|item| item.map_or(DbValue::Null, &f))
                .collect(),
        ),
    })
}

fn column_value(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Result<DbValue, tokio_postgres::Error> {
    match *ty {
        Type::BOOL => get(row, idx, DbValue::Bool),
        Type::INT2 => get(row, idx, |v: i16| DbValue::Int(v.into())),
        Type::INT4 => get(row, idx, |v: i32| DbValue::Int(v.into())),
        Type::INT8 => get(row, idx, DbValue::Int),
        Type::OID => get(row, idx, |v: u32| DbValue::Int(v.into())),
        Type::FLOAT4 => get(row, idx, |v: f32| DbValue::Float(v.into())),
        Type::FLOAT8 => get(row, idx, DbValue::Float),
        Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(v) => Ok(v.map_or(DbValue::Null, DbValue::Decimal)),
            Err(e) => {
                // NaN or beyond 28 significant digits
                tracing::debug!(error = %e, column = idx, "NUMERIC value not representable; using null");
                Ok(DbValue::Null)
            }
        },
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get(row, idx, DbValue::Text)
        }
        Type::UUID => get(row, idx, DbValue::Uuid),
        Type::DATE => get(row, idx, DbValue::Date),
        Type::TIME => get(row, idx, DbValue::Time),
        Type::TIMESTAMP => get(row, idx, DbValue::Timestamp),
        Type::TIMESTAMPTZ => get(row, idx, DbValue::TimestampTz),
        Type::JSON | Type::JSONB => get(row, idx, DbValue::Json),
        Type::BYTEA => get(row, idx, DbValue::Bytes),
        _ => match ty.kind() {
            Kind::Array(inner) => array_value(row, idx, inner),
            _ => get(row, idx, |v: RawBytes| DbValue::Bytes(v.0)),
        },
    }
}

fn array_value(
    row: &tokio_postgres::Row,
    idx: usize,
    inner: &Type,
) -> Result<DbValue, tokio_postgres::Error> {
    match *inner {
        Type::BOOL => get_array(row, idx, DbValue::Bool),
        Type::INT2 => get_array(row, idx, |v: i16| DbValue::Int(v.into())),
        Type::INT4 => get_array(row, idx, |v: i32| DbValue::Int(v.into())),
        Type::INT8 => get_array(row, idx, DbValue::Int),
        Type::FLOAT4 => get_array(row, idx, |v: f32| DbValue::Float(v.into())),
        Type::FLOAT8 => get_array(row, idx, DbValue::Float),
        Type::NUMERIC => get_array(row, idx, DbValue::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => get_array(row, idx, DbValue::Text),
        Type::UUID => get_array(row, idx, DbValue::Uuid),
        Type::DATE => get_array(row, idx, DbValue::Date),
        Type::TIMESTAMP => get_array(row, idx, DbValue::Timestamp),
        Type::TIMESTAMPTZ => get_array(row, idx, DbValue::TimestampTz),
        Type::TIME => get_array(row, idx, DbValue::Time),
        Type::JSON | Type::JSONB => get_array(row, idx, DbValue::Json),
        _ => get_array(row, idx, |v: RawBytes| DbValue::Bytes(v.0)),
    }
}
