//! Oracle target database operations.

mod oracle_pool;

pub use oracle_pool::OraclePool;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Trait for target database operations.
///
/// Table and constraint names passed in are exact catalog names as returned
/// by [`TargetPool::list_tables`] / [`TargetPool::list_foreign_keys`];
/// implementations quote them.
#[async_trait]
pub trait TargetPool: Send + Sync {
    /// Execute one DDL or DML statement without bind parameters.
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Names of all tables in the target schema.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Column metadata for a table, `None` if it does not exist.
    async fn describe_table(&self, table: &str) -> Result<Option<TargetTable>>;

    /// Insert a batch of rows with positional binds. Returns rows inserted.
    async fn insert_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64>;

    /// Commit the current transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the current transaction.
    async fn rollback(&self) -> Result<()>;

    /// Referential constraints in the target schema.
    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyRef>>;

    /// Enable or disable one constraint.
    async fn set_constraint_enabled(&self, table: &str, constraint: &str, enabled: bool)
        -> Result<()>;

    /// Get the row count for a table.
    async fn get_row_count(&self, table: &str) -> Result<i64>;

    /// Delete every row of a table. Returns rows deleted.
    async fn delete_all_rows(&self, table: &str) -> Result<u64>;

    /// Round-trip a trivial query.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Close the connection.
    async fn close(&self);
}

/// Target table metadata read back from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetTable {
    pub name: String,
    pub columns: Vec<TargetColumn>,
}

impl TargetTable {
    /// Case-insensitive column lookup.
    pub fn find_column(&self, name: &str) -> Option<&TargetColumn> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Target column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
    /// Oracle data type (e.g. `VARCHAR2`, `NUMBER`, `TIMESTAMP(6)`).
    pub data_type: String,
    pub nullable: bool,
}

/// A referential constraint in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub name: String,
    pub enabled: bool,
}

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Decimal(rust_decimal::Decimal),
    DateTime(chrono::NaiveDateTime),
    DateTimeOffset(chrono::DateTime<chrono::FixedOffset>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }
}

/// Type hint for NULL values so the driver binds the right type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
    Json,
}
