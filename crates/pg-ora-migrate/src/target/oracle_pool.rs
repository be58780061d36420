//! Oracle target pool.
//!
//! The Oracle driver is blocking, so the single session lives behind a mutex
//! and every call runs on the blocking thread pool. Inserts, commits and
//! constraint toggles are serialized through that one session, which is what
//! keeps "commit every N batches" meaningful.

use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};
use crate::target::{ForeignKeyRef, SqlNullType, SqlValue, TargetColumn, TargetPool, TargetTable};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use oracle::sql_type::ToSql;
use oracle::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Savepoint taken before every batch so a failing batch leaves no rows behind.
const BATCH_SAVEPOINT: &str = "pgora_batch";

const CURRENT_SCHEMA: &str = "SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA')";

/// Oracle target pool implementation.
pub struct OraclePool {
    conn: Arc<Mutex<Connection>>,
}

impl OraclePool {
    /// Connect to the target and prepare the session.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let cfg = config.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::connect(&cfg.user, &cfg.password, &cfg.connect_string)?;
            // Decimals are bound as text; keep the conversion independent of territory.
            conn.execute("ALTER SESSION SET NLS_NUMERIC_CHARACTERS = '.,'", &[])?;
            if let Some(schema) = &cfg.schema {
                conn.execute(
                    &format!("ALTER SESSION SET CURRENT_SCHEMA = {}", Self::quote_ident(schema)),
                    &[],
                )?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| MigrateError::pool(e, "connecting to Oracle target"))??;

        info!(
            "Connected to Oracle target: {}{}",
            config.connect_string,
            config
                .schema
                .as_deref()
                .map(|s| format!(" (schema {})", s))
                .unwrap_or_default()
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Run a closure against the session on the blocking pool.
    async fn with_conn<T, F>(&self, context: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| MigrateError::pool("session mutex poisoned", context))?;
            f(&guard)
        })
        .await
        .map_err(|e| MigrateError::pool(e, context))?
    }

    fn build_insert_sql(table: &str, columns: &[String]) -> String {
        let cols = columns
            .iter()
            .map(|c| Self::quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let binds = (1..=columns.len())
            .map(|i| format!(":{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            Self::quote_ident(table),
            cols,
            binds
        )
    }
}

/// Convert a row value into an owned Oracle bind.
fn to_bind(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(t) => null_bind(*t),
        SqlValue::Bool(b) => Box::new(i64::from(*b)),
        SqlValue::I16(v) => Box::new(i64::from(*v)),
        SqlValue::I32(v) => Box::new(i64::from(*v)),
        SqlValue::I64(v) => Box::new(*v),
        SqlValue::F32(v) => Box::new(f64::from(*v)),
        SqlValue::F64(v) => Box::new(*v),
        SqlValue::String(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(u.to_string()),
        SqlValue::Decimal(d) => Box::new(d.to_string()),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dt) => Box::new(*dt),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(NaiveDate::default().and_time(*t)),
        SqlValue::Json(v) => Box::new(v.to_string()),
    }
}

fn null_bind(t: SqlNullType) -> Box<dyn ToSql> {
    match t {
        SqlNullType::Bool | SqlNullType::I16 | SqlNullType::I32 | SqlNullType::I64 => {
            Box::new(None::<i64>)
        }
        SqlNullType::F32 | SqlNullType::F64 => Box::new(None::<f64>),
        SqlNullType::String | SqlNullType::Uuid | SqlNullType::Decimal | SqlNullType::Json => {
            Box::new(None::<String>)
        }
        SqlNullType::Bytes => Box::new(None::<Vec<u8>>),
        SqlNullType::DateTime | SqlNullType::Time => Box::new(None::<NaiveDateTime>),
        SqlNullType::DateTimeOffset => Box::new(None::<DateTime<FixedOffset>>),
        SqlNullType::Date => Box::new(None::<NaiveDate>),
    }
}

#[async_trait]
impl TargetPool for OraclePool {
    async fn execute(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.with_conn("executing statement", move |conn| {
            conn.execute(&sql, &[])?;
            Ok(())
        })
        .await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.with_conn("listing target tables", |conn| {
            let sql = format!(
                "SELECT table_name FROM all_tables WHERE owner = {} ORDER BY table_name",
                CURRENT_SCHEMA
            );
            let rows = conn.query_as::<String>(&sql, &[])?;
            let names = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn describe_table(&self, table: &str) -> Result<Option<TargetTable>> {
        let table = table.to_string();
        self.with_conn("describing target table", move |conn| {
            let sql = format!(
                "SELECT column_name, data_type, nullable \
                 FROM all_tab_columns \
                 WHERE owner = {} AND table_name = :1 \
                 ORDER BY column_id",
                CURRENT_SCHEMA
            );
            let rows = conn.query_as::<(String, String, String)>(&sql, &[&table])?;
            let mut columns = Vec::new();
            for row in rows {
                let (name, data_type, nullable) = row?;
                columns.push(TargetColumn {
                    name,
                    data_type,
                    nullable: nullable == "Y",
                });
            }

            if columns.is_empty() {
                return Ok(None);
            }
            Ok(Some(TargetTable {
                name: table,
                columns,
            }))
        })
        .await
    }

    async fn insert_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = Self::build_insert_sql(table, columns);
        let table = table.to_string();
        self.with_conn("inserting batch", move |conn| {
            conn.execute(&format!("SAVEPOINT {}", BATCH_SAVEPOINT), &[])?;

            let attempt = (|| -> std::result::Result<(), oracle::Error> {
                let mut batch = conn.batch(&sql, rows.len()).build()?;
                for row in &rows {
                    let binds: Vec<Box<dyn ToSql>> = row.iter().map(to_bind).collect();
                    let refs: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref()).collect();
                    batch.append_row(&refs)?;
                }
                batch.execute()
            })();

            match attempt {
                Ok(()) => {
                    debug!("Inserted {} rows into {}", rows.len(), table);
                    Ok(rows.len() as u64)
                }
                Err(e) => {
                    if let Err(rb) =
                        conn.execute(&format!("ROLLBACK TO SAVEPOINT {}", BATCH_SAVEPOINT), &[])
                    {
                        warn!("Rollback to batch savepoint on {} failed: {}", table, rb);
                    }
                    Err(MigrateError::Target(e))
                }
            }
        })
        .await
    }

    async fn commit(&self) -> Result<()> {
        self.with_conn("committing", |conn| {
            conn.commit()?;
            Ok(())
        })
        .await
    }

    async fn rollback(&self) -> Result<()> {
        self.with_conn("rolling back", |conn| {
            conn.rollback()?;
            Ok(())
        })
        .await
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyRef>> {
        self.with_conn("listing target foreign keys", |conn| {
            let sql = format!(
                "SELECT table_name, constraint_name, status \
                 FROM all_constraints \
                 WHERE owner = {} AND constraint_type = 'R' \
                 ORDER BY table_name, constraint_name",
                CURRENT_SCHEMA
            );
            let rows = conn.query_as::<(String, String, String)>(&sql, &[])?;
            let mut fks = Vec::new();
            for row in rows {
                let (table, name, status) = row?;
                fks.push(ForeignKeyRef {
                    table,
                    name,
                    enabled: status == "ENABLED",
                });
            }
            Ok(fks)
        })
        .await
    }

    async fn set_constraint_enabled(
        &self,
        table: &str,
        constraint: &str,
        enabled: bool,
    ) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} {} CONSTRAINT {}",
            Self::quote_ident(table),
            if enabled { "ENABLE" } else { "DISABLE" },
            Self::quote_ident(constraint)
        );
        self.with_conn("toggling constraint", move |conn| {
            conn.execute(&sql, &[])?;
            Ok(())
        })
        .await
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", Self::quote_ident(table));
        self.with_conn("counting target rows", move |conn| {
            Ok(conn.query_row_as::<i64>(&sql, &[])?)
        })
        .await
    }

    async fn delete_all_rows(&self, table: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {}", Self::quote_ident(table));
        self.with_conn("deleting target rows", move |conn| {
            let stmt = conn.execute(&sql, &[])?;
            Ok(stmt.row_count()?)
        })
        .await
    }

    async fn test_connection(&self) -> Result<()> {
        self.with_conn("testing Oracle connection", |conn| {
            conn.query_row_as::<i64>("SELECT 1 FROM DUAL", &[])?;
            Ok(())
        })
        .await
    }

    fn db_type(&self) -> &str {
        "oracle"
    }

    async fn close(&self) {
        let result = self
            .with_conn("closing Oracle session", |conn| {
                conn.close()?;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            debug!("Closing Oracle session: {}", e);
        }
    }
}
