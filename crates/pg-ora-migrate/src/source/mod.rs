//! PostgreSQL source database operations.

mod catalog;
mod postgres;
mod tls;
mod types;

pub use catalog::extract_catalog;
pub use postgres::PgSourcePool;
pub use tls::SslMode;
pub use types::*;

use crate::error::Result;
use crate::target::SqlValue;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A chunk of rows in select-list order.
pub type RowChunk = Vec<Vec<SqlValue>>;

/// Trait for source database operations.
#[async_trait]
pub trait SourcePool: Send + Sync {
    /// Extract base tables with their columns and primary keys.
    async fn extract_schema(&self, schema: &str) -> Result<Vec<Table>>;

    /// Load foreign key metadata for a table.
    async fn load_foreign_keys(&self, table: &mut Table) -> Result<()>;

    /// Load unique constraint metadata for a table.
    async fn load_unique_constraints(&self, table: &mut Table) -> Result<()>;

    /// Load check constraint metadata for a table.
    async fn load_check_constraints(&self, table: &mut Table) -> Result<()>;

    /// Load index metadata for a table (without cardinality samples).
    async fn load_indexes(&self, table: &mut Table) -> Result<()>;

    /// Load enum types and their labels.
    async fn load_enums(&self, schema: &str) -> Result<EnumCatalog>;

    /// Count total rows and distinct values of one column.
    async fn sample_cardinality(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<CardinalityStats>;

    /// Load sequences with ownership and last value.
    async fn load_sequences(&self, schema: &str) -> Result<Vec<Sequence>>;

    /// Load triggers with their function bodies.
    async fn load_triggers(&self, schema: &str) -> Result<Vec<Trigger>>;

    /// Load views and materialized views.
    async fn load_views(&self, schema: &str) -> Result<Vec<View>>;

    /// Load functions and procedures.
    async fn load_routines(&self, schema: &str) -> Result<Vec<Routine>>;

    /// Get the row count for a table.
    async fn get_row_count(&self, schema: &str, table: &str) -> Result<i64>;

    /// Count NULLs in one column.
    async fn count_nulls(&self, schema: &str, table: &str, column: &str) -> Result<i64>;

    /// Stream a table's rows in chunks of at most `fetch_size`.
    ///
    /// The receiver yields `Err` once and then closes if the read fails.
    fn read_table(&self, request: ReadRequest) -> mpsc::Receiver<Result<RowChunk>>;

    /// Round-trip a trivial query.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}

/// Parameters for a streaming table read.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub schema: String,
    pub table: String,
    /// Columns to select, in order.
    pub columns: Vec<Column>,
    /// Rows per chunk.
    pub fetch_size: usize,
    /// Columns for a deterministic ORDER BY; empty reads in storage order.
    pub order_by: Vec<String>,
}
