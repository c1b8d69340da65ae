use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use model::records::row::{FieldValue, Record};
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row};
use tracing::debug;

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn timestamp(value: DateTime<Utc>) -> Value {
    Value::String(value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn naive_timestamp(value: NaiveDateTime) -> Value {
    timestamp(DateTime::<Utc>::from_naive_utc_and_offset(value, Utc))
}

/// Probes one column with a sequence of decode attempts, narrowest type
/// first. A mismatch is not an error, just the cue to try the next shape;
/// anything we cannot represent degrades to null.
macro_rules! probe {
    ($row:expr, $idx:expr, $ty:ty, $conv:expr) => {
        if let Ok(opt) = $row.try_get::<Option<$ty>, _>($idx) {
            return match opt {
                Some(v) => $conv(v),
                None => Value::Null,
            };
        }
    };
}

fn mysql_value(row: &MySqlRow, idx: usize) -> Value {
    probe!(row, idx, i64, |v: i64| Value::from(v));
    probe!(row, idx, u64, |v: u64| Value::from(v));
    probe!(row, idx, f64, number);
    probe!(row, idx, bool, Value::Bool);
    probe!(row, idx, DateTime<Utc>, timestamp);
    probe!(row, idx, NaiveDateTime, naive_timestamp);
    probe!(row, idx, NaiveDate, |v: NaiveDate| Value::String(v.to_string()));
    probe!(row, idx, String, Value::String);
    probe!(row, idx, Value, |v| v);
    probe!(row, idx, Vec<u8>, |v: Vec<u8>| Value::String(
        String::from_utf8_lossy(&v).into_owned()
    ));

    debug!(column = idx, "undecodable MySQL column, emitting null");
    Value::Null
}

fn postgres_value(row: &PgRow, idx: usize) -> Value {
    probe!(row, idx, bool, Value::Bool);
    probe!(row, idx, i64, |v: i64| Value::from(v));
    probe!(row, idx, i32, |v: i32| Value::from(v));
    probe!(row, idx, i16, |v: i16| Value::from(v));
    probe!(row, idx, f64, number);
    probe!(row, idx, f32, |v: f32| number(f64::from(v)));
    probe!(row, idx, DateTime<Utc>, timestamp);
    probe!(row, idx, NaiveDateTime, naive_timestamp);
    probe!(row, idx, NaiveDate, |v: NaiveDate| Value::String(v.to_string()));
    probe!(row, idx, String, Value::String);
    probe!(row, idx, Value, |v| v);
    probe!(row, idx, Vec<u8>, |v: Vec<u8>| Value::String(
        String::from_utf8_lossy(&v).into_owned()
    ));

    debug!(column = idx, "undecodable Postgres column, emitting null");
    Value::Null
}

pub fn mysql_record(row: &MySqlRow) -> Record {
    let fields = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| FieldValue::new(col.name(), mysql_value(row, idx)))
        .collect();
    Record::new(fields)
}

pub fn postgres_record(row: &PgRow) -> Record {
    let fields = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| FieldValue::new(col.name(), postgres_value(row, idx)))
        .collect();
    Record::new(fields)
}
