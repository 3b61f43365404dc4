pub mod config;
pub mod mastery;
pub mod notification;
pub mod trainer;
pub mod vocab;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

pub(crate) fn to_naive(value: DateTime<Utc>) -> NaiveDateTime {
    value.naive_utc()
}

pub(crate) fn from_naive(value: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(value, Utc)
}

pub(crate) fn get_timestamp(row: &PgRow, column: &str) -> DateTime<Utc> {
    row.try_get::<NaiveDateTime, _>(column)
        .map(from_naive)
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn get_optional_timestamp(row: &PgRow, column: &str) -> Option<DateTime<Utc>> {
    row.try_get::<Option<NaiveDateTime>, _>(column)
        .ok()
        .flatten()
        .map(from_naive)
}

pub(crate) fn get_json(row: &PgRow, column: &str) -> serde_json::Value {
    row.try_get::<Option<serde_json::Value>, _>(column)
        .ok()
        .flatten()
        .unwrap_or(serde_json::Value::Null)
}
