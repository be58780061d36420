//! In-memory source and target pools for unit tests.

use crate::ddl::column_type;
use crate::error::{MigrateError, Result};
use crate::source::{
    CardinalityStats, Catalog, Column, Constraint, ConstraintKind, EnumCatalog, EnumType, Index,
    ReadRequest, RowChunk, Routine, Sequence, SequenceOwnership, SourcePool, Table, Trigger, View,
};
use crate::target::{ForeignKeyRef, SqlNullType, SqlValue, TargetColumn, TargetPool, TargetTable};
use crate::typemap::IDENTITY_CLAUSE;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::mpsc;

fn column(table: &str, name: &str, data_type: &str, nullable: bool, pos: i32) -> Column {
    Column {
        table: table.into(),
        name: name.into(),
        data_type: data_type.into(),
        udt_name: data_type.into(),
        is_nullable: nullable,
        ordinal_pos: pos,
        ..Default::default()
    }
}

fn constraint(table: &str, name: &str, kind: ConstraintKind, columns: &[&str]) -> Constraint {
    Constraint {
        name: name.into(),
        kind,
        table: table.into(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        ref_table: None,
        ref_columns: Vec::new(),
        on_delete: None,
        definition: None,
    }
}

/// Two tables, one enum, one serial sequence.
///
/// - `customers(id integer identity pk, name varchar(100) not null, email text)`
/// - `orders(id serial pk, customer_id -> customers, status order_status
///   not null default 'OPEN', created_at timestamp, note text)`
pub fn orders_fixture() -> Catalog {
    let mut customers_id = column("customers", "id", "integer", false, 1);
    customers_id.is_identity = true;
    let mut name = column("customers", "name", "character varying", false, 2);
    name.max_length = Some(100);

    let customers = Table {
        schema: "public".into(),
        name: "customers".into(),
        columns: vec![
            customers_id,
            name,
            column("customers", "email", "text", true, 3),
        ],
        constraints: vec![constraint(
            "customers",
            "customers_pkey",
            ConstraintKind::PrimaryKey,
            &["id"],
        )],
        indexes: vec![Index {
            name: "customers_pkey".into(),
            table: "customers".into(),
            columns: vec!["id".into()],
            access_method: "btree".into(),
            is_unique: true,
            is_primary: true,
            backs_unique_constraint: false,
            cardinality: None,
        }],
    };

    let mut orders_id = column("orders", "id", "integer", false, 1);
    orders_id.default = Some("nextval('orders_id_seq'::regclass)".into());
    let mut status = column("orders", "status", "USER-DEFINED", false, 3);
    status.udt_name = "order_status".into();
    status.enum_type = Some("order_status".into());
    status.default = Some("'OPEN'::order_status".into());

    let mut fk = constraint(
        "orders",
        "orders_customer_id_fkey",
        ConstraintKind::ForeignKey,
        &["customer_id"],
    );
    fk.ref_table = Some("customers".into());
    fk.ref_columns = vec!["id".into()];
    fk.on_delete = Some("NO_ACTION".into());

    let orders = Table {
        schema: "public".into(),
        name: "orders".into(),
        columns: vec![
            orders_id,
            column("orders", "customer_id", "integer", true, 2),
            status,
            column("orders", "created_at", "timestamp without time zone", true, 4),
            column("orders", "note", "text", true, 5),
        ],
        constraints: vec![
            constraint("orders", "orders_pkey", ConstraintKind::PrimaryKey, &["id"]),
            fk,
        ],
        indexes: vec![Index {
            name: "idx_orders_customer".into(),
            table: "orders".into(),
            columns: vec!["customer_id".into()],
            access_method: "btree".into(),
            is_unique: false,
            is_primary: false,
            backs_unique_constraint: false,
            cardinality: Some(CardinalityStats {
                total_rows: 1000,
                distinct_values: 400,
            }),
        }],
    };

    let mut enums = EnumCatalog::new();
    enums.insert(EnumType {
        name: "order_status".into(),
        labels: vec!["OPEN".into(), "CLOSED".into()],
        usages: Vec::new(),
    });
    enums.add_usage("order_status", "orders", "status");

    Catalog {
        schema: "public".into(),
        tables: vec![customers, orders],
        enums,
        sequences: vec![Sequence {
            name: "orders_id_seq".into(),
            start_value: 1,
            min_value: 1,
            max_value: i64::MAX,
            increment: 1,
            cycle: false,
            last_value: Some(1),
            ownership: SequenceOwnership::Automatic {
                table: "orders".into(),
                column: "id".into(),
            },
        }],
        ..Default::default()
    }
}

/// A `customers` row; `name: None` violates its NOT NULL.
pub fn customer_row(id: i32, name: Option<&str>) -> Vec<SqlValue> {
    vec![
        SqlValue::I32(id),
        name.map(|n| SqlValue::String(n.into()))
            .unwrap_or(SqlValue::Null(SqlNullType::String)),
        SqlValue::Null(SqlNullType::String),
    ]
}

/// One customer and one open order.
pub fn orders_rows() -> Vec<(&'static str, Vec<Vec<SqlValue>>)> {
    let created = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    vec![
        ("customers", vec![customer_row(1, Some("Ada"))]),
        (
            "orders",
            vec![vec![
                SqlValue::I32(1),
                SqlValue::I32(1),
                SqlValue::String("OPEN".into()),
                SqlValue::DateTime(created),
                SqlValue::Null(SqlNullType::String),
            ]],
        ),
    ]
}

/// Source pool serving a fixed catalog and row sets.
pub struct MockSource {
    catalog: Catalog,
    rows: HashMap<String, Vec<Vec<SqlValue>>>,
    fail_views: bool,
    fail_read_after: HashMap<String, usize>,
}

impl MockSource {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            rows: HashMap::new(),
            fail_views: false,
            fail_read_after: HashMap::new(),
        }
    }

    pub fn with_rows(mut self, table: &str, rows: Vec<Vec<SqlValue>>) -> Self {
        self.rows.insert(table.to_string(), rows);
        self
    }

    pub fn with_rows_from(mut self, sets: Vec<(&str, Vec<Vec<SqlValue>>)>) -> Self {
        for (table, rows) in sets {
            self.rows.insert(table.to_string(), rows);
        }
        self
    }

    /// Make `load_views` fail.
    pub fn fail_views(mut self) -> Self {
        self.fail_views = true;
        self
    }

    /// Send `chunks` chunks of `table`, then an error.
    pub fn fail_read_after(mut self, table: &str, chunks: usize) -> Self {
        self.fail_read_after.insert(table.to_string(), chunks);
        self
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.catalog
            .table(name)
            .ok_or_else(|| MigrateError::SchemaExtraction(format!("no table {}", name)))
    }
}

#[async_trait]
impl SourcePool for MockSource {
    async fn extract_schema(&self, _schema: &str) -> Result<Vec<Table>> {
        Ok(self.catalog.tables.clone())
    }

    async fn load_foreign_keys(&self, _table: &mut Table) -> Result<()> {
        Ok(())
    }

    async fn load_unique_constraints(&self, _table: &mut Table) -> Result<()> {
        Ok(())
    }

    async fn load_check_constraints(&self, _table: &mut Table) -> Result<()> {
        Ok(())
    }

    async fn load_indexes(&self, _table: &mut Table) -> Result<()> {
        Ok(())
    }

    async fn load_enums(&self, _schema: &str) -> Result<EnumCatalog> {
        Ok(self.catalog.enums.clone())
    }

    async fn sample_cardinality(
        &self,
        _schema: &str,
        _table: &str,
        _column: &str,
    ) -> Result<CardinalityStats> {
        Ok(CardinalityStats {
            total_rows: 1000,
            distinct_values: 400,
        })
    }

    async fn load_sequences(&self, _schema: &str) -> Result<Vec<Sequence>> {
        Ok(self.catalog.sequences.clone())
    }

    async fn load_triggers(&self, _schema: &str) -> Result<Vec<Trigger>> {
        Ok(self.catalog.triggers.clone())
    }

    async fn load_views(&self, _schema: &str) -> Result<Vec<View>> {
        if self.fail_views {
            return Err(MigrateError::SchemaExtraction(
                "permission denied for pg_views".into(),
            ));
        }
        Ok(self.catalog.views.clone())
    }

    async fn load_routines(&self, _schema: &str) -> Result<Vec<Routine>> {
        Ok(self.catalog.routines.clone())
    }

    async fn get_row_count(&self, _schema: &str, table: &str) -> Result<i64> {
        Ok(self.rows.get(table).map(|r| r.len() as i64).unwrap_or(0))
    }

    async fn count_nulls(&self, _schema: &str, table: &str, column: &str) -> Result<i64> {
        let position = self
            .table(table)?
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| MigrateError::SchemaExtraction(format!("no column {}", column)))?;
        Ok(self
            .rows
            .get(table)
            .map(|rows| rows.iter().filter(|r| r[position].is_null()).count() as i64)
            .unwrap_or(0))
    }

    fn read_table(&self, request: ReadRequest) -> mpsc::Receiver<Result<RowChunk>> {
        let (tx, rx) = mpsc::channel(1);
        let rows = self.rows.get(&request.table).cloned().unwrap_or_default();
        let fail_after = self.fail_read_after.get(&request.table).copied();
        let table = request.table.clone();
        let fetch_size = request.fetch_size.max(1);

        tokio::spawn(async move {
            for (sent, chunk) in rows.chunks(fetch_size).enumerate() {
                if fail_after == Some(sent) {
                    let _ = tx
                        .send(Err(MigrateError::transfer(&table, "connection reset by peer")))
                        .await;
                    return;
                }
                if tx.send(Ok(chunk.to_vec())).await.is_err() {
                    return;
                }
            }
        });
        rx
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {}
}

#[derive(Default)]
struct TargetState {
    tables: BTreeMap<String, TargetTable>,
    committed: HashMap<String, Vec<Vec<SqlValue>>>,
    pending: Vec<(String, Vec<Vec<SqlValue>>)>,
    executed: Vec<String>,
    foreign_keys: Vec<ForeignKeyRef>,
    insert_calls: HashMap<String, usize>,
    commits: usize,
    fail_patterns: Vec<String>,
    fail_enable: Vec<String>,
}

/// Target pool that keeps rows in memory and enforces NOT NULL.
#[derive(Default)]
pub struct MockTarget {
    state: Mutex<TargetState>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables and foreign keys as the generated DDL would create them.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let target = Self::new();
        {
            let mut state = target.state.lock().unwrap();
            for table in &catalog.tables {
                let columns = table
                    .columns
                    .iter()
                    .map(|c| {
                        let mapped = column_type(c, &catalog.enums).target_type;
                        TargetColumn {
                            name: c.name.to_uppercase(),
                            data_type: mapped.trim_end_matches(IDENTITY_CLAUSE).trim().to_string(),
                            nullable: c.is_nullable,
                        }
                    })
                    .collect();
                let name = table.name.to_uppercase();
                state.tables.insert(name.clone(), TargetTable { name, columns });

                for fk in table.foreign_keys() {
                    state.foreign_keys.push(ForeignKeyRef {
                        table: table.name.to_uppercase(),
                        name: fk.name.to_uppercase(),
                        enabled: true,
                    });
                }
            }
        }
        target
    }

    pub fn with_foreign_key(self, table: &str, name: &str) -> Self {
        self.state.lock().unwrap().foreign_keys.push(ForeignKeyRef {
            table: table.into(),
            name: name.into(),
            enabled: true,
        });
        self
    }

    pub fn without_column(self, table: &str, column: &str) -> Self {
        if let Some(t) = self.state.lock().unwrap().tables.get_mut(table) {
            t.columns.retain(|c| c.name != column);
        }
        self
    }

    pub fn with_not_null(self, table: &str, column: &str) -> Self {
        if let Some(t) = self.state.lock().unwrap().tables.get_mut(table) {
            for c in t.columns.iter_mut().filter(|c| c.name == column) {
                c.nullable = false;
            }
        }
        self
    }

    /// Fail any statement containing `pattern`.
    pub fn fail_statements_containing(self, pattern: &str) -> Self {
        self.state.lock().unwrap().fail_patterns.push(pattern.into());
        self
    }

    /// Fail re-enabling constraint `name`.
    pub fn fail_enable(self, name: &str) -> Self {
        self.state.lock().unwrap().fail_enable.push(name.into());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Committed rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Vec<SqlValue>> {
        self.state
            .lock()
            .unwrap()
            .committed
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn insert_calls(&self, table: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .insert_calls
            .get(table)
            .copied()
            .unwrap_or(0)
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub fn foreign_keys(&self) -> Vec<ForeignKeyRef> {
        self.state.lock().unwrap().foreign_keys.clone()
    }
}

#[async_trait]
impl TargetPool for MockTarget {
    async fn execute(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        if let Some(pattern) = state.fail_patterns.iter().find(|p| sql.contains(p.as_str())) {
            return Err(MigrateError::ddl(
                pattern.clone(),
                "ORA-02264: name already used by an existing constraint",
            ));
        }
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().tables.keys().cloned().collect())
    }

    async fn describe_table(&self, table: &str) -> Result<Option<TargetTable>> {
        Ok(self.state.lock().unwrap().tables.get(table).cloned())
    }

    async fn insert_batch(
        &self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        *state.insert_calls.entry(table.to_string()).or_default() += 1;

        let target = state
            .tables
            .get(table)
            .ok_or_else(|| MigrateError::transfer(table, "ORA-00942: table or view does not exist"))?;
        for row in &rows {
            for (value, name) in row.iter().zip(columns) {
                let nullable = target.find_column(name).map(|c| c.nullable).unwrap_or(true);
                if value.is_null() && !nullable {
                    return Err(MigrateError::transfer(
                        table,
                        format!("ORA-01400: cannot insert NULL into (\"{}\".\"{}\")", table, name),
                    ));
                }
            }
        }

        let count = rows.len() as u64;
        state.pending.push((table.to_string(), rows));
        Ok(count)
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let pending = std::mem::take(&mut state.pending);
        for (table, rows) in pending {
            state.committed.entry(table).or_default().extend(rows);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.state.lock().unwrap().pending.clear();
        Ok(())
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyRef>> {
        Ok(self.state.lock().unwrap().foreign_keys.clone())
    }

    async fn set_constraint_enabled(
        &self,
        table: &str,
        constraint: &str,
        enabled: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if enabled && state.fail_enable.iter().any(|n| n == constraint) {
            return Err(MigrateError::ddl(
                constraint,
                "ORA-02298: cannot validate - parent keys not found",
            ));
        }
        let fk = state
            .foreign_keys
            .iter_mut()
            .find(|fk| fk.table == table && fk.name == constraint)
            .ok_or_else(|| MigrateError::ddl(constraint, "ORA-02431: constraint does not exist"))?;
        fk.enabled = enabled;
        Ok(())
    }

    async fn get_row_count(&self, table: &str) -> Result<i64> {
        let state = self.state.lock().unwrap();
        let committed = state.committed.get(table).map(Vec::len).unwrap_or(0);
        let pending: usize = state
            .pending
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, rows)| rows.len())
            .sum();
        Ok((committed + pending) as i64)
    }

    async fn delete_all_rows(&self, table: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let mut deleted = state.committed.remove(table).map(|r| r.len()).unwrap_or(0);
        state.pending.retain(|(t, rows)| {
            if t == table {
                deleted += rows.len();
                false
            } else {
                true
            }
        });
        Ok(deleted as u64)
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "oracle"
    }

    async fn close(&self) {}
}
