//! PostgreSQL source pool.
//!
//! Catalog reads go through `pg_catalog` so constraint names, key order and
//! ownership links are exact. Row reads stream through a portal inside a
//! read-only transaction.

use crate::config::SourceConfig;
use crate::error::{MigrateError, Result};
use crate::source::{
    CardinalityStats, Column, Constraint, ConstraintKind, EnumCatalog, EnumType, Index,
    ReadRequest, Routine, RoutineKind, RowChunk, Sequence, SequenceOwnership, SourcePool, Table,
    Trigger, TriggerEvent, TriggerTiming, ValueKind, View,
};
use crate::target::{SqlNullType, SqlValue};
use crate::typemap::quote_pg;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

/// Connections kept by the source pool. Extraction and streaming are sequential.
const MAX_CONNECTIONS: usize = 4;

// pg_trigger.tgtype bits
const TRIGGER_TYPE_ROW: i32 = 1 << 0;
const TRIGGER_TYPE_BEFORE: i32 = 1 << 1;
const TRIGGER_TYPE_INSERT: i32 = 1 << 2;
const TRIGGER_TYPE_DELETE: i32 = 1 << 3;
const TRIGGER_TYPE_UPDATE: i32 = 1 << 4;
const TRIGGER_TYPE_TRUNCATE: i32 = 1 << 5;
const TRIGGER_TYPE_INSTEAD: i32 = 1 << 6;

/// PostgreSQL source pool implementation.
pub struct PgSourcePool {
    pool: Pool,
}

impl PgSourcePool {
    /// Create a new PostgreSQL source pool from SourceConfig.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("pg-ora-migrate");

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match super::tls::connector(config.ssl_mode)? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };

        let pool = Pool::builder(mgr)
            .max_size(MAX_CONNECTIONS)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL source pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL source connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { pool })
    }

    async fn client(&self, context: &'static str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context))
    }

    async fn load_columns(&self, table: &mut Table) -> Result<()> {
        let client = self.client("getting connection for load_columns").await?;

        let query = r#"
            SELECT
                c.column_name::text,
                CASE WHEN c.data_type IN ('USER-DEFINED', 'ARRAY')
                     THEN c.udt_name::text
                     ELSE c.data_type::text
                END,
                c.udt_name::text,
                c.character_maximum_length::int4,
                c.numeric_precision::int4,
                c.numeric_scale::int4,
                c.is_nullable = 'YES',
                c.column_default::text,
                c.is_identity = 'YES',
                COALESCE(t.typtype = 'e', false),
                c.ordinal_position::int4
            FROM information_schema.columns c
            LEFT JOIN pg_catalog.pg_namespace tn ON tn.nspname = c.udt_schema
            LEFT JOIN pg_catalog.pg_type t
                   ON t.typname = c.udt_name AND t.typnamespace = tn.oid
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;

        let rows = client.query(query, &[&table.schema, &table.name]).await?;

        for row in rows {
            let udt_name: String = row.get(2);
            let is_enum: bool = row.get(9);
            table.columns.push(Column {
                table: table.name.clone(),
                name: row.get(0),
                data_type: row.get(1),
                enum_type: is_enum.then(|| udt_name.clone()),
                udt_name,
                max_length: row.get(3),
                precision: row.get(4),
                scale: row.get(5),
                is_nullable: row.get(6),
                default: row.get(7),
                is_identity: row.get(8),
                ordinal_pos: row.get(10),
            });
        }

        debug!(
            "Loaded {} columns for {}",
            table.columns.len(),
            table.full_name()
        );
        Ok(())
    }

    /// Load primary key or unique constraints (`contype` 'p' / 'u').
    async fn load_key_constraints(
        &self,
        table: &mut Table,
        contype: &str,
        kind: ConstraintKind,
    ) -> Result<()> {
        let client = self.client("getting connection for key constraints").await?;

        let query = r#"
            SELECT
                c.conname::text,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a
                      ON a.attrelid = c.conrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                )
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = $3::text::"char"
            ORDER BY c.conname
        "#;

        let rows = client
            .query(query, &[&table.schema, &table.name, &contype])
            .await?;

        for row in rows {
            table.constraints.push(Constraint {
                name: row.get(0),
                kind,
                table: table.name.clone(),
                columns: row.get(1),
                ref_table: None,
                ref_columns: Vec::new(),
                on_delete: None,
                definition: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SourcePool for PgSourcePool {
    async fn extract_schema(&self, schema: &str) -> Result<Vec<Table>> {
        let client = self.client("getting connection for extract_schema").await?;

        let query = r#"
            SELECT table_schema::text, table_name::text
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema = $1
            ORDER BY table_name
        "#;

        let rows = client.query(query, &[&schema]).await?;
        drop(client);

        let mut tables = Vec::new();
        for row in rows {
            let mut table = Table {
                schema: row.get(0),
                name: row.get(1),
                ..Default::default()
            };

            self.load_columns(&mut table).await?;
            self.load_key_constraints(&mut table, "p", ConstraintKind::PrimaryKey)
                .await?;

            tables.push(table);
        }

        info!("Extracted {} tables from schema '{}'", tables.len(), schema);
        Ok(tables)
    }

    async fn load_foreign_keys(&self, table: &mut Table) -> Result<()> {
        let client = self.client("getting connection for load_foreign_keys").await?;

        let query = r#"
            SELECT
                c.conname::text,
                rt.relname::text,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a
                      ON a.attrelid = c.conrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                ),
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a
                      ON a.attrelid = c.confrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                ),
                CASE c.confdeltype
                    WHEN 'a' THEN 'NO_ACTION'
                    WHEN 'r' THEN 'RESTRICT'
                    WHEN 'c' THEN 'CASCADE'
                    WHEN 'n' THEN 'SET_NULL'
                    WHEN 'd' THEN 'SET_DEFAULT'
                    ELSE 'NO_ACTION'
                END
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'f'
            ORDER BY c.conname
        "#;

        let rows = client.query(query, &[&table.schema, &table.name]).await?;

        for row in rows {
            table.constraints.push(Constraint {
                name: row.get(0),
                kind: ConstraintKind::ForeignKey,
                table: table.name.clone(),
                ref_table: Some(row.get(1)),
                columns: row.get(2),
                ref_columns: row.get(3),
                on_delete: Some(row.get(4)),
                definition: None,
            });
        }

        debug!(
            "Loaded {} foreign keys for {}",
            table.foreign_keys().count(),
            table.full_name()
        );
        Ok(())
    }

    async fn load_unique_constraints(&self, table: &mut Table) -> Result<()> {
        self.load_key_constraints(table, "u", ConstraintKind::Unique)
            .await
    }

    async fn load_check_constraints(&self, table: &mut Table) -> Result<()> {
        let client = self
            .client("getting connection for load_check_constraints")
            .await?;

        let query = r#"
            SELECT
                c.conname::text,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a
                      ON a.attrelid = c.conrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                ),
                pg_get_constraintdef(c.oid)
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'c'
            ORDER BY c.conname
        "#;

        let rows = client.query(query, &[&table.schema, &table.name]).await?;

        for row in rows {
            table.constraints.push(Constraint {
                name: row.get(0),
                kind: ConstraintKind::Check,
                table: table.name.clone(),
                columns: row.get(1),
                ref_table: None,
                ref_columns: Vec::new(),
                on_delete: None,
                definition: Some(row.get(2)),
            });
        }
        Ok(())
    }

    async fn load_indexes(&self, table: &mut Table) -> Result<()> {
        let client = self.client("getting connection for load_indexes").await?;

        let query = r#"
            SELECT
                i.relname::text,
                am.amname::text,
                ix.indisunique,
                ix.indisprimary,
                EXISTS (
                    SELECT 1 FROM pg_catalog.pg_constraint con
                    WHERE con.conindid = ix.indexrelid AND con.contype = 'u'
                ),
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_catalog.pg_attribute a
                      ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                )
            FROM pg_catalog.pg_index ix
            JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
            JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_am am ON am.oid = i.relam
            WHERE n.nspname = $1
              AND t.relname = $2
            ORDER BY i.relname
        "#;

        let rows = client.query(query, &[&table.schema, &table.name]).await?;

        for row in rows {
            table.indexes.push(Index {
                name: row.get(0),
                table: table.name.clone(),
                access_method: row.get(1),
                is_unique: row.get(2),
                is_primary: row.get(3),
                backs_unique_constraint: row.get(4),
                columns: row.get(5),
                cardinality: None,
            });
        }

        debug!(
            "Loaded {} indexes for {}",
            table.indexes.len(),
            table.full_name()
        );
        Ok(())
    }

    async fn load_enums(&self, schema: &str) -> Result<EnumCatalog> {
        let client = self.client("getting connection for load_enums").await?;

        let query = r#"
            SELECT
                t.typname::text,
                array_agg(e.enumlabel::text ORDER BY e.enumsortorder)
            FROM pg_catalog.pg_type t
            JOIN pg_catalog.pg_enum e ON e.enumtypid = t.oid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
            WHERE n.nspname = $1
            GROUP BY t.typname
            ORDER BY t.typname
        "#;

        let rows = client.query(query, &[&schema]).await?;

        let mut enums = EnumCatalog::new();
        for row in rows {
            enums.insert(EnumType {
                name: row.get(0),
                labels: row.get(1),
                usages: Vec::new(),
            });
        }

        debug!("Loaded {} enum types from '{}'", enums.len(), schema);
        Ok(enums)
    }

    async fn sample_cardinality(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<CardinalityStats> {
        let client = self.client("getting connection for cardinality").await?;

        let query = format!(
            "SELECT COUNT(*)::int8, COUNT(DISTINCT {})::int8 FROM {}.{}",
            quote_pg(column)?,
            quote_pg(schema)?,
            quote_pg(table)?
        );

        let row = client.query_one(&query, &[]).await?;
        Ok(CardinalityStats {
            total_rows: row.get(0),
            distinct_values: row.get(1),
        })
    }

    async fn load_sequences(&self, schema: &str) -> Result<Vec<Sequence>> {
        let client = self.client("getting connection for load_sequences").await?;

        let query = r#"
            SELECT
                s.sequencename::text,
                s.start_value,
                s.min_value,
                s.max_value,
                s.increment_by,
                s.cycle,
                s.last_value,
                tbl.relname::text,
                attr.attname::text
            FROM pg_catalog.pg_sequences s
            JOIN pg_catalog.pg_namespace n ON n.nspname = s.schemaname
            JOIN pg_catalog.pg_class seq
              ON seq.relname = s.sequencename AND seq.relnamespace = n.oid
            LEFT JOIN pg_catalog.pg_depend d
              ON d.objid = seq.oid
             AND d.classid = 'pg_catalog.pg_class'::regclass
             AND d.refclassid = 'pg_catalog.pg_class'::regclass
             AND d.deptype IN ('a', 'i')
            LEFT JOIN pg_catalog.pg_class tbl ON tbl.oid = d.refobjid
            LEFT JOIN pg_catalog.pg_attribute attr
              ON attr.attrelid = tbl.oid AND attr.attnum = d.refobjsubid
            WHERE s.schemaname = $1
            ORDER BY s.sequencename
        "#;

        let rows = client.query(query, &[&schema]).await?;

        let sequences = rows
            .iter()
            .map(|row| {
                let owner_table: Option<String> = row.get(7);
                let owner_column: Option<String> = row.get(8);
                let ownership = match (owner_table, owner_column) {
                    (Some(table), Some(column)) => SequenceOwnership::Automatic { table, column },
                    _ => SequenceOwnership::Manual,
                };
                Sequence {
                    name: row.get(0),
                    start_value: row.get(1),
                    min_value: row.get(2),
                    max_value: row.get(3),
                    increment: row.get(4),
                    cycle: row.get(5),
                    last_value: row.get(6),
                    ownership,
                }
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} sequences from '{}'", sequences.len(), schema);
        Ok(sequences)
    }

    async fn load_triggers(&self, schema: &str) -> Result<Vec<Trigger>> {
        let client = self.client("getting connection for load_triggers").await?;

        let query = r#"
            SELECT
                tg.tgname::text,
                tbl.relname::text,
                tg.tgtype::int4,
                p.proname::text,
                pg_get_functiondef(p.oid)
            FROM pg_catalog.pg_trigger tg
            JOIN pg_catalog.pg_class tbl ON tbl.oid = tg.tgrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = tbl.relnamespace
            JOIN pg_catalog.pg_proc p ON p.oid = tg.tgfoid
            WHERE n.nspname = $1
              AND NOT tg.tgisinternal
            ORDER BY tbl.relname, tg.tgname
        "#;

        let rows = client.query(query, &[&schema]).await?;

        let triggers = rows
            .iter()
            .map(|row| {
                let (timing, events, for_each_row) = decode_trigger_type(row.get(2));
                Trigger {
                    name: row.get(0),
                    table: row.get(1),
                    timing,
                    events,
                    for_each_row,
                    function_name: row.get(3),
                    function_definition: row.get(4),
                }
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} triggers from '{}'", triggers.len(), schema);
        Ok(triggers)
    }

    async fn load_views(&self, schema: &str) -> Result<Vec<View>> {
        let client = self.client("getting connection for load_views").await?;

        let query = r#"
            SELECT viewname::text, definition, false
            FROM pg_catalog.pg_views
            WHERE schemaname = $1
            UNION ALL
            SELECT matviewname::text, definition, true
            FROM pg_catalog.pg_matviews
            WHERE schemaname = $1
            ORDER BY 1
        "#;

        let rows = client.query(query, &[&schema]).await?;

        let views = rows
            .iter()
            .map(|row| View {
                name: row.get(0),
                definition: row.get::<_, Option<String>>(1).unwrap_or_default(),
                materialized: row.get(2),
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} views from '{}'", views.len(), schema);
        Ok(views)
    }

    async fn load_routines(&self, schema: &str) -> Result<Vec<Routine>> {
        let client = self.client("getting connection for load_routines").await?;

        // Extension members (uuid-ossp, pgcrypto, ...) are not user code.
        let query = r#"
            SELECT
                p.proname::text,
                p.prokind::text,
                pg_get_function_arguments(p.oid),
                CASE WHEN p.prokind = 'f' THEN pg_get_function_result(p.oid) END,
                l.lanname::text,
                pg_get_functiondef(p.oid)
            FROM pg_catalog.pg_proc p
            JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
            JOIN pg_catalog.pg_language l ON l.oid = p.prolang
            WHERE n.nspname = $1
              AND p.prokind IN ('f', 'p')
              AND NOT EXISTS (
                  SELECT 1 FROM pg_catalog.pg_depend d
                  WHERE d.objid = p.oid AND d.deptype = 'e'
              )
            ORDER BY p.proname
        "#;

        let rows = client.query(query, &[&schema]).await?;

        let routines = rows
            .iter()
            .map(|row| {
                let prokind: String = row.get(1);
                Routine {
                    name: row.get(0),
                    kind: if prokind == "p" {
                        RoutineKind::Procedure
                    } else {
                        RoutineKind::Function
                    },
                    arguments: row.get(2),
                    return_type: row.get(3),
                    language: row.get(4),
                    definition: row.get(5),
                }
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} routines from '{}'", routines.len(), schema);
        Ok(routines)
    }

    async fn get_row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self.client("getting connection for get_row_count").await?;

        let query = format!(
            "SELECT COUNT(*)::int8 FROM {}.{}",
            quote_pg(schema)?,
            quote_pg(table)?
        );

        let row = client.query_one(&query, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn count_nulls(&self, schema: &str, table: &str, column: &str) -> Result<i64> {
        let client = self.client("getting connection for count_nulls").await?;

        let query = format!(
            "SELECT COUNT(*)::int8 FROM {}.{} WHERE {} IS NULL",
            quote_pg(schema)?,
            quote_pg(table)?,
            quote_pg(column)?
        );

        let row = client.query_one(&query, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    fn read_table(&self, request: ReadRequest) -> mpsc::Receiver<Result<RowChunk>> {
        let (tx, rx) = mpsc::channel(1);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            if let Err(e) = stream_table(pool, request, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn test_connection(&self) -> Result<()> {
        let client = self.client("testing PostgreSQL connection").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Split `pg_trigger.tgtype` into timing, events and row/statement level.
fn decode_trigger_type(tgtype: i32) -> (TriggerTiming, Vec<TriggerEvent>, bool) {
    let timing = if tgtype & TRIGGER_TYPE_INSTEAD != 0 {
        TriggerTiming::InsteadOf
    } else if tgtype & TRIGGER_TYPE_BEFORE != 0 {
        TriggerTiming::Before
    } else {
        TriggerTiming::After
    };

    let events = [
        (TRIGGER_TYPE_INSERT, TriggerEvent::Insert),
        (TRIGGER_TYPE_UPDATE, TriggerEvent::Update),
        (TRIGGER_TYPE_DELETE, TriggerEvent::Delete),
        (TRIGGER_TYPE_TRUNCATE, TriggerEvent::Truncate),
    ]
    .into_iter()
    .filter(|(bit, _)| tgtype & bit != 0)
    .map(|(_, event)| event)
    .collect();

    (timing, events, tgtype & TRIGGER_TYPE_ROW != 0)
}

/// Select-list expression that makes a column decodable by [`convert_value`].
fn select_expr(column: &Column) -> Result<String> {
    let ident = quote_pg(&column.name)?;
    Ok(match column.value_kind() {
        ValueKind::Array => format!("to_jsonb({})", ident),
        ValueKind::Numeric => format!("{}::numeric::text", ident),
        ValueKind::Interval => interval_expr(&ident),
        ValueKind::Enum | ValueKind::Other => format!("{}::text", ident),
        _ => ident,
    })
}

/// `interval` as `D HH24:MI:SS.US` for a DAY TO SECOND target.
///
/// Months and years fold into days at 30 days per month, the same rate
/// `justify_days` uses; hours past 24 move into days first.
fn interval_expr(ident: &str) -> String {
    let j = format!("justify_hours({})", ident);
    format!(
        "CASE WHEN {c} IS NULL THEN NULL \
         ELSE ((date_part('year', {j}) * 12 + date_part('month', {j})) * 30 \
         + date_part('day', {j}))::int8 || ' ' || to_char({j}, 'HH24:MI:SS.US') END",
        c = ident,
        j = j
    )
}

fn build_select(request: &ReadRequest) -> Result<String> {
    let cols = request
        .columns
        .iter()
        .map(select_expr)
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let mut sql = format!(
        "SELECT {} FROM {}.{}",
        cols,
        quote_pg(&request.schema)?,
        quote_pg(&request.table)?
    );

    if !request.order_by.is_empty() {
        let order = request
            .order_by
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        sql.push_str(" ORDER BY ");
        sql.push_str(&order);
    }

    Ok(sql)
}

/// Stream rows through a portal, one chunk per channel send.
async fn stream_table(
    pool: Pool,
    request: ReadRequest,
    tx: mpsc::Sender<Result<RowChunk>>,
) -> Result<()> {
    let mut client = pool
        .get()
        .await
        .map_err(|e| MigrateError::pool(e, "getting connection for read_table"))?;

    let sql = build_select(&request)?;
    let kinds: Vec<ValueKind> = request.columns.iter().map(Column::value_kind).collect();
    let fetch_size = request.fetch_size.max(1);

    debug!("Streaming {}.{}: {}", request.schema, request.table, sql);

    let transaction = client.transaction().await?;
    let statement = transaction.prepare(&sql).await?;
    let portal = transaction.bind(&statement, &[]).await?;

    loop {
        let rows = transaction
            .query_portal(&portal, fetch_size as i32)
            .await?;
        if rows.is_empty() {
            break;
        }
        let last = rows.len() < fetch_size;

        let mut chunk = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(kinds.len());
            for (idx, kind) in kinds.iter().enumerate() {
                values.push(convert_value(row, idx, *kind)?);
            }
            chunk.push(values);
        }

        if tx.send(Ok(chunk)).await.is_err() {
            debug!("Reader for {} dropped, stopping stream", request.table);
            break;
        }
        if last {
            break;
        }
    }

    transaction.commit().await?;
    Ok(())
}

/// Decode one column of a row according to its value kind.
fn convert_value(row: &tokio_postgres::Row, idx: usize, kind: ValueKind) -> Result<SqlValue> {
    fn get<'a, T: tokio_postgres::types::FromSql<'a>>(
        row: &'a tokio_postgres::Row,
        idx: usize,
    ) -> Result<Option<T>> {
        Ok(row.try_get::<_, Option<T>>(idx)?)
    }

    let value = match kind {
        ValueKind::Boolean => get::<bool>(row, idx)?
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null(SqlNullType::Bool)),
        ValueKind::SmallInt => get::<i16>(row, idx)?
            .map(SqlValue::I16)
            .unwrap_or(SqlValue::Null(SqlNullType::I16)),
        ValueKind::Integer => get::<i32>(row, idx)?
            .map(SqlValue::I32)
            .unwrap_or(SqlValue::Null(SqlNullType::I32)),
        ValueKind::BigInt => get::<i64>(row, idx)?
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null(SqlNullType::I64)),
        ValueKind::Real => get::<f32>(row, idx)?
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null(SqlNullType::F32)),
        ValueKind::Double => get::<f64>(row, idx)?
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null(SqlNullType::F64)),
        // Read as text; values beyond Decimal's range stay text.
        ValueKind::Numeric => match get::<String>(row, idx)? {
            Some(text) => Decimal::from_str(&text)
                .map(SqlValue::Decimal)
                .unwrap_or(SqlValue::String(text)),
            None => SqlValue::Null(SqlNullType::Decimal),
        },
        ValueKind::Bytes => get::<Vec<u8>>(row, idx)?
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
        ValueKind::Uuid => get::<uuid::Uuid>(row, idx)?
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null(SqlNullType::Uuid)),
        ValueKind::Timestamp => get::<chrono::NaiveDateTime>(row, idx)?
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTime)),
        ValueKind::TimestampTz => get::<chrono::DateTime<chrono::FixedOffset>>(row, idx)?
            .map(SqlValue::DateTimeOffset)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTimeOffset)),
        ValueKind::Date => get::<chrono::NaiveDate>(row, idx)?
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null(SqlNullType::Date)),
        ValueKind::Time => get::<chrono::NaiveTime>(row, idx)?
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null(SqlNullType::Time)),
        ValueKind::Json | ValueKind::Array => get::<serde_json::Value>(row, idx)?
            .map(SqlValue::Json)
            .unwrap_or(SqlValue::Null(SqlNullType::Json)),
        ValueKind::Text | ValueKind::Interval | ValueKind::Enum | ValueKind::Other => {
            get::<String>(row, idx)?
                .map(SqlValue::String)
                .unwrap_or(SqlValue::Null(SqlNullType::String))
        }
    };
    Ok(value)
}
