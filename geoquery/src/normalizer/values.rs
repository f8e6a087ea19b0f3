//! Value normalisation: native database values → JSON primitives.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Number, Value};
use uuid::Uuid;

/// A value as read from the database, before JSON conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Bytes(Vec<u8>),
    Json(Value),
    Array(Vec<DbValue>),
}

fn float_value(f: f64) -> Value {
    // NaN / ±inf have no JSON representation
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Postgres `bytea` hex style, used when bytes are not valid UTF-8.
fn hex_bytes(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("\\x{hex}")
}

pub fn to_json(value: DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Bool(b) => Value::Bool(b),
        DbValue::Int(i) => Value::Number(i.into()),
        DbValue::Float(f) => float_value(f),
        DbValue::Decimal(d) => match d.to_f64() {
            Some(f) => float_value(f),
            None => Value::String(d.to_string()),
        },
        DbValue::Text(s) => Value::String(s),
        DbValue::Uuid(u) => Value::String(u.to_string()),
        DbValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        DbValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        DbValue::Timestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        DbValue::TimestampTz(ts) => {
            Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        DbValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(e) => Value::String(hex_bytes(e.as_bytes())),
        },
        DbValue::Json(v) => v,
        DbValue::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(to_json(DbValue::Null), Value::Null);
        assert_eq!(to_json(DbValue::Bool(true)), json!(true));
        assert_eq!(to_json(DbValue::Int(403)), json!(403));
        assert_eq!(to_json(DbValue::Float(2.5)), json!(2.5));
        assert_eq!(to_json(DbValue::Float(f64::NAN)), Value::Null);
    }

    #[test]
    fn decimal_becomes_float() {
        let d = Decimal::new(12345, 2); // 123.45
        assert_eq!(to_json(DbValue::Decimal(d)), json!(123.45));
    }

    #[test]
    fn temporal_values_are_iso_8601() {
        let date = NaiveDate::from_ymd_opt(2005, 3, 17).unwrap();
        assert_eq!(to_json(DbValue::Date(date)), json!("2005-03-17"));

        let ts = date.and_hms_opt(8, 30, 0).unwrap();
        assert_eq!(to_json(DbValue::Timestamp(ts)), json!("2005-03-17T08:30:00"));

        let tz = DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc);
        assert_eq!(to_json(DbValue::TimestampTz(tz)), json!("2005-03-17T08:30:00Z"));
    }

    #[test]
    fn uuid_is_string() {
        let u = Uuid::parse_str("7f1c0a4e-2b7d-4f55-9a9e-0c2d3e4f5a6b").unwrap();
        assert_eq!(
            to_json(DbValue::Uuid(u)),
            json!("7f1c0a4e-2b7d-4f55-9a9e-0c2d3e4f5a6b")
        );
    }

    #[test]
    fn bytes_decode_or_hex() {
        assert_eq!(to_json(DbValue::Bytes(b"Miskin".to_vec())), json!("Miskin"));
        assert_eq!(to_json(DbValue::Bytes(vec![0x01, 0xff])), json!("\\x01ff"));
    }

    #[test]
    fn nested_values_recurse() {
        let v = DbValue::Array(vec![
            DbValue::Int(1),
            DbValue::Array(vec![DbValue::Text("a".into()), DbValue::Null]),
        ]);
        assert_eq!(to_json(v), json!([1, ["a", null]]));
    }

    #[test]
    fn normalisation_is_idempotent() {
        let inputs = vec![
            DbValue::Decimal(Decimal::new(755, 1)),
            DbValue::Bytes(vec![0xde, 0xad]),
            DbValue::Json(json!({"a": [1, 2.5, null, {"b": "c"}]})),
            DbValue::Array(vec![DbValue::Float(1.5), DbValue::Bool(false)]),
        ];
        for input in inputs {
            let once = to_json(input);
            let twice = to_json(DbValue::Json(once.clone()));
            assert_eq!(once, twice);
        }
    }
}
