//! Per-value coercion from source values to target bind values.

use crate::target::{SqlValue, TargetColumn};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What to do with a source NULL headed for a NOT NULL target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Pass the NULL through; the batch fails and is isolated.
    #[default]
    Reject,
    /// Substitute a type-appropriate sentinel.
    Backfill,
}

/// Values substituted under [`NullPolicy::Backfill`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullSentinels {
    /// For character and CLOB columns.
    #[serde(default = "default_text_sentinel")]
    pub text: String,

    /// For numeric columns.
    #[serde(default)]
    pub number: i64,

    /// For DATE and TIMESTAMP columns, at midnight.
    #[serde(default = "default_date_sentinel")]
    pub date: NaiveDate,
}

fn default_text_sentinel() -> String {
    "N/A".to_string()
}

fn default_date_sentinel() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

impl Default for NullSentinels {
    fn default() -> Self {
        Self {
            text: default_text_sentinel(),
            number: 0,
            date: default_date_sentinel(),
        }
    }
}

/// Broad class of an Oracle column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetClass {
    Character,
    Numeric,
    Temporal,
    Other,
}

impl TargetClass {
    /// Classify an Oracle data type name (`VARCHAR2`, `TIMESTAMP(6)`, ...).
    pub fn of(data_type: &str) -> Self {
        let t = data_type.trim().to_uppercase();
        let base = t.split(['(', ' ']).next().unwrap_or_default();
        match base {
            "VARCHAR2" | "NVARCHAR2" | "VARCHAR" | "CHAR" | "NCHAR" | "CLOB" | "NCLOB"
            | "LONG" => TargetClass::Character,
            "NUMBER" | "FLOAT" | "BINARY_FLOAT" | "BINARY_DOUBLE" | "INTEGER" => {
                TargetClass::Numeric
            }
            "DATE" | "TIMESTAMP" => TargetClass::Temporal,
            _ => TargetClass::Other,
        }
    }
}

impl NullSentinels {
    /// Sentinel for a target column, `None` when no sensible value exists
    /// (binary, interval, XML).
    pub fn backfill_for(&self, column: &TargetColumn) -> Option<SqlValue> {
        match TargetClass::of(&column.data_type) {
            TargetClass::Character => Some(SqlValue::String(self.text.clone())),
            TargetClass::Numeric => Some(SqlValue::I64(self.number)),
            TargetClass::Temporal => Some(SqlValue::DateTime(self.date.and_time(Default::default()))),
            TargetClass::Other => None,
        }
    }
}

/// Coerce one source value for `target`.
///
/// Booleans become 0/1, JSON, arrays and UUIDs become text, times of day
/// become timestamps on 1970-01-01. Temporal and numeric values pass
/// through. NULLs are backfilled only under [`NullPolicy::Backfill`] and only
/// for NOT NULL target columns.
pub fn convert_value(
    value: SqlValue,
    target: &TargetColumn,
    policy: NullPolicy,
    sentinels: &NullSentinels,
) -> SqlValue {
    match value {
        SqlValue::Null(null_type) => {
            if policy == NullPolicy::Backfill && !target.nullable {
                if let Some(sentinel) = sentinels.backfill_for(target) {
                    return sentinel;
                }
            }
            SqlValue::Null(null_type)
        }
        SqlValue::Bool(b) => SqlValue::I32(i32::from(b)),
        SqlValue::Json(v) => SqlValue::String(v.to_string()),
        SqlValue::Uuid(u) => SqlValue::String(u.to_string()),
        SqlValue::Time(t) => SqlValue::DateTime(NaiveDate::default().and_time(t)),
        other => other,
    }
}
