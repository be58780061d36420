//! Data transfer engine.
//!
//! Tables are loaded one at a time in dependency order. Each table goes
//! through a small state machine:
//!
//! ```text
//! Counting -> Empty
//!          -> Streaming -> Batching -> Loading <-> Committing -> Done
//!                                        \-> ErrorIsolated -> Batching
//! ```
//!
//! Rows are streamed from a server-side cursor, coerced column by column,
//! grouped into batches and inserted. A failing batch is rolled back on its
//! own, classified and skipped; the table carries on with the next batch.

mod coerce;

pub use coerce::{convert_value, NullPolicy, NullSentinels, TargetClass};

use crate::error::{MigrateError, Result};
use crate::plan::TableLoadPlan;
use crate::source::{ReadRequest, SourcePool, Table};
use crate::target::{SqlValue, TargetColumn, TargetPool};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per insert batch (also the cursor fetch size).
    pub batch_size: usize,
    /// Commit after this many successful batches.
    pub commit_every: usize,
    /// Handling of NULLs headed for NOT NULL columns.
    pub null_policy: NullPolicy,
    /// Backfill values.
    pub sentinels: NullSentinels,
    /// Read rows ordered by primary key.
    pub order_by_primary_key: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            commit_every: 10,
            null_policy: NullPolicy::default(),
            sentinels: NullSentinels::default(),
            order_by_primary_key: false,
        }
    }
}

/// Where a table is in its load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TablePhase {
    Counting,
    Empty,
    Streaming,
    Batching,
    Loading,
    Committing,
    Done,
    ErrorIsolated,
}

/// Diagnostic class of a failed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadErrorKind {
    /// Date or timestamp literal the target could not parse.
    DateFormat,
    /// NULL into a NOT NULL column.
    NotNull,
    Other,
}

impl LoadErrorKind {
    /// Classify a target error message.
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        if m.contains("ora-01843")
            || m.contains("not a valid month")
            || m.contains("ora-01861")
            || m.contains("ora-01847")
            || m.contains("ora-01830")
        {
            LoadErrorKind::DateFormat
        } else if m.contains("ora-01400") || m.contains("cannot insert null") {
            LoadErrorKind::NotNull
        } else {
            LoadErrorKind::Other
        }
    }
}

/// A batch that was rolled back and skipped.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// 0-based batch number within the table.
    pub batch_index: usize,
    /// Rows in the batch.
    pub rows: usize,
    pub kind: LoadErrorKind,
    pub message: String,
}

/// Final state of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableStatus {
    /// Every batch loaded.
    Loaded,
    /// Source table had no rows.
    Empty,
    /// Some batches were isolated.
    Partial,
    /// Nothing usable was loaded, or the table could not be mapped.
    Failed,
}

/// Result for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub status: TableStatus,
    /// Source row count at the start of the load.
    pub source_rows: i64,
    /// Rows committed to the target.
    pub rows_inserted: u64,
    pub failed_batches: Vec<BatchFailure>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Table-level error (mapping, read or commit failure).
    pub error: Option<String>,
}

impl TableOutcome {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            status: TableStatus::Failed,
            source_rows: 0,
            rows_inserted: 0,
            failed_batches: Vec::new(),
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    /// Loaded or empty.
    pub fn success(&self) -> bool {
        matches!(self.status, TableStatus::Loaded | TableStatus::Empty)
    }
}

/// Result for a whole pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutcome {
    pub tables: Vec<TableOutcome>,
    pub rows_inserted: u64,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl PipelineOutcome {
    /// Throughput over the whole run.
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows_inserted as f64 / secs
        } else {
            0.0
        }
    }

    /// Tables that did not load completely.
    pub fn incomplete_tables(&self) -> impl Iterator<Item = &TableOutcome> {
        self.tables.iter().filter(|t| !t.success())
    }

    pub fn is_success(&self) -> bool {
        self.tables.iter().all(TableOutcome::success)
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Progress callbacks. Every method defaults to a no-op.
pub trait TransferObserver: Send + Sync {
    fn table_started(&self, _table: &str, _source_rows: i64) {}
    fn phase_changed(&self, _table: &str, _phase: TablePhase) {}
    fn batch_failed(&self, _table: &str, _failure: &BatchFailure) {}
    fn table_finished(&self, _outcome: &TableOutcome) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Source-to-target column mapping for one table.
struct TableMapping {
    target_table: String,
    target_columns: Vec<String>,
    columns: Vec<TargetColumn>,
}

/// Transfer engine for moving data between databases.
pub struct TransferEngine {
    source: Arc<dyn SourcePool>,
    target: Arc<dyn TargetPool>,
    config: TransferConfig,
    observer: Arc<dyn TransferObserver>,
}

impl TransferEngine {
    pub fn new(
        source: Arc<dyn SourcePool>,
        target: Arc<dyn TargetPool>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Attach a progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Load every table in `plan` order.
    ///
    /// Only a failure to read the target catalog aborts the run; everything
    /// else is reported per table.
    pub async fn run(&self, tables: &[Table], plan: &TableLoadPlan) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let target_tables = self.target_table_names().await?;
        let by_name: HashMap<&str, &Table> = tables.iter().map(|t| (t.name.as_str(), t)).collect();

        info!(
            "Loading {} tables (batch size {}, commit every {} batches, null policy {:?})",
            plan.order.len(),
            self.config.batch_size,
            self.config.commit_every,
            self.config.null_policy
        );

        let mut outcome = PipelineOutcome::default();
        for name in &plan.order {
            let Some(table) = by_name.get(name.as_str()) else {
                warn!("{}: in load plan but not in catalog, skipped", name);
                continue;
            };
            let result = self.transfer_table(table, &target_tables).await;
            outcome.rows_inserted += result.rows_inserted;
            self.observer.table_finished(&result);
            outcome.tables.push(result);
        }
        outcome.elapsed = start.elapsed();

        info!(
            "Loaded {} rows in {:.1}s ({:.0} rows/sec), {} of {} tables complete",
            outcome.rows_inserted,
            outcome.elapsed.as_secs_f64(),
            outcome.rows_per_second(),
            outcome.tables.iter().filter(|t| t.success()).count(),
            outcome.tables.len()
        );
        Ok(outcome)
    }

    /// Target table names keyed by lower case.
    async fn target_table_names(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .target
            .list_tables()
            .await?
            .into_iter()
            .map(|t| (t.to_lowercase(), t))
            .collect())
    }

    fn phase(&self, table: &str, phase: TablePhase) {
        debug!("{}: {:?}", table, phase);
        self.observer.phase_changed(table, phase);
    }

    /// Match source columns to target columns by case-insensitive name.
    async fn map_table(
        &self,
        table: &Table,
        target_tables: &HashMap<String, String>,
    ) -> Result<TableMapping> {
        let target_name = target_tables
            .get(&table.name.to_lowercase())
            .ok_or_else(|| MigrateError::transfer(&table.name, "no matching target table"))?;
        let target = self
            .target
            .describe_table(target_name)
            .await?
            .ok_or_else(|| MigrateError::transfer(&table.name, "target table disappeared"))?;

        let mut columns = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            let target_column = target.find_column(&column.name).ok_or_else(|| {
                MigrateError::transfer(
                    &table.name,
                    format!(
                        "column {} has no counterpart in target table {}",
                        column.name, target.name
                    ),
                )
            })?;
            columns.push(target_column.clone());
        }

        Ok(TableMapping {
            target_table: target.name.clone(),
            target_columns: columns.iter().map(|c| c.name.clone()).collect(),
            columns,
        })
    }

    async fn transfer_table(
        &self,
        table: &Table,
        target_tables: &HashMap<String, String>,
    ) -> TableOutcome {
        let start = Instant::now();
        let mut outcome = TableOutcome::new(&table.name);

        self.phase(&table.name, TablePhase::Counting);
        match self.source.get_row_count(&table.schema, &table.name).await {
            Ok(count) => outcome.source_rows = count,
            Err(e) => {
                error!("{}: row count failed: {}", table.full_name(), e);
                outcome.error = Some(e.to_string());
                outcome.elapsed = start.elapsed();
                return outcome;
            }
        }
        self.observer.table_started(&table.name, outcome.source_rows);

        if outcome.source_rows == 0 {
            self.phase(&table.name, TablePhase::Empty);
            info!("{}: empty, skipped", table.full_name());
            outcome.status = TableStatus::Empty;
            outcome.elapsed = start.elapsed();
            return outcome;
        }

        let mapping = match self.map_table(table, target_tables).await {
            Ok(m) => m,
            Err(e) => {
                error!("{}", e);
                outcome.error = Some(e.to_string());
                outcome.elapsed = start.elapsed();
                return outcome;
            }
        };

        let stream_error = self.stream_batches(table, &mapping, &mut outcome).await;

        let batches_failed = outcome.failed_batches.len();
        outcome.status = match (&stream_error, batches_failed, outcome.rows_inserted) {
            (Some(_), _, _) => TableStatus::Failed,
            (None, 0, _) => TableStatus::Loaded,
            (None, _, 0) => TableStatus::Failed,
            (None, _, _) => TableStatus::Partial,
        };
        if let Some(e) = stream_error {
            outcome.error = Some(e);
        } else if outcome.status == TableStatus::Failed {
            outcome.error = Some(format!("all {} batches failed", batches_failed));
        }
        outcome.elapsed = start.elapsed();
        self.phase(&table.name, TablePhase::Done);

        info!(
            "{}: {:?}, {} of {} rows in {:.1}s ({} batches isolated)",
            table.full_name(),
            outcome.status,
            outcome.rows_inserted,
            outcome.source_rows,
            outcome.elapsed.as_secs_f64(),
            batches_failed
        );
        outcome
    }

    /// Stream, batch, load and commit. Returns a table-level error, if any.
    async fn stream_batches(
        &self,
        table: &Table,
        mapping: &TableMapping,
        outcome: &mut TableOutcome,
    ) -> Option<String> {
        let batch_size = self.config.batch_size.max(1);
        let commit_every = self.config.commit_every.max(1);
        let order_by = if self.config.order_by_primary_key {
            table.primary_key_columns()
        } else {
            Vec::new()
        };

        self.phase(&table.name, TablePhase::Streaming);
        let mut rx = self.source.read_table(ReadRequest {
            schema: table.schema.clone(),
            table: table.name.clone(),
            columns: table.columns.clone(),
            fetch_size: batch_size,
            order_by,
        });

        let mut batch: Vec<Vec<SqlValue>> = Vec::with_capacity(batch_size);
        let mut batch_index = 0;
        let mut pending_rows = 0u64;
        let mut pending_batches = 0;
        let mut read_error = None;

        self.phase(&table.name, TablePhase::Batching);
        while let Some(chunk) = rx.recv().await {
            let rows = match chunk {
                Ok(rows) => rows,
                Err(e) => {
                    error!("{}: read failed: {}", table.full_name(), e);
                    read_error = Some(e.to_string());
                    break;
                }
            };

            for row in rows {
                batch.push(self.coerce_row(row, &mapping.columns));
                if batch.len() < batch_size {
                    continue;
                }
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if let Some(inserted) = self.load_batch(table, mapping, full, batch_index, outcome).await {
                    pending_rows += inserted;
                    pending_batches += 1;
                }
                batch_index += 1;

                if pending_batches >= commit_every {
                    if let Err(e) = self.commit(table, &mut pending_rows, outcome).await {
                        return Some(e);
                    }
                    pending_batches = 0;
                }
                self.phase(&table.name, TablePhase::Batching);
            }
        }

        if !batch.is_empty() {
            if let Some(inserted) = self.load_batch(table, mapping, batch, batch_index, outcome).await {
                pending_rows += inserted;
            }
        }

        // Batches loaded before a read error are still good.
        if let Err(e) = self.commit(table, &mut pending_rows, outcome).await {
            return Some(e);
        }
        read_error
    }

    fn coerce_row(&self, row: Vec<SqlValue>, columns: &[TargetColumn]) -> Vec<SqlValue> {
        row.into_iter()
            .zip(columns)
            .map(|(value, column)| {
                convert_value(
                    value,
                    column,
                    self.config.null_policy,
                    &self.config.sentinels,
                )
            })
            .collect()
    }

    /// Insert one batch; `None` when it failed and was isolated.
    async fn load_batch(
        &self,
        table: &Table,
        mapping: &TableMapping,
        rows: Vec<Vec<SqlValue>>,
        batch_index: usize,
        outcome: &mut TableOutcome,
    ) -> Option<u64> {
        self.phase(&table.name, TablePhase::Loading);
        let row_count = rows.len();
        match self
            .target
            .insert_batch(&mapping.target_table, &mapping.target_columns, rows)
            .await
        {
            Ok(inserted) => {
                debug!(
                    "{}: batch {} inserted {} rows",
                    table.full_name(),
                    batch_index,
                    inserted
                );
                Some(inserted)
            }
            Err(e) => {
                self.phase(&table.name, TablePhase::ErrorIsolated);
                let message = e.to_string();
                let failure = BatchFailure {
                    batch_index,
                    rows: row_count,
                    kind: LoadErrorKind::classify(&message),
                    message,
                };
                warn!(
                    "{}: batch {} ({} rows) skipped, {:?}: {}",
                    table.full_name(),
                    batch_index,
                    row_count,
                    failure.kind,
                    failure.message
                );
                self.observer.batch_failed(&table.name, &failure);
                outcome.failed_batches.push(failure);
                None
            }
        }
    }

    async fn commit(
        &self,
        table: &Table,
        pending_rows: &mut u64,
        outcome: &mut TableOutcome,
    ) -> std::result::Result<(), String> {
        self.phase(&table.name, TablePhase::Committing);
        match self.target.commit().await {
            Ok(()) => {
                outcome.rows_inserted += *pending_rows;
                *pending_rows = 0;
                Ok(())
            }
            Err(e) => {
                error!("{}: commit failed: {}", table.full_name(), e);
                if let Err(rb) = self.target.rollback().await {
                    warn!("{}: rollback after failed commit failed: {}", table.full_name(), rb);
                }
                *pending_rows = 0;
                Err(format!("commit failed: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::plan_load_order;
    use crate::testutil::{orders_fixture, orders_rows, MockSource, MockTarget};
    use std::sync::Mutex;

    fn engine(source: MockSource, target: Arc<MockTarget>, config: TransferConfig) -> TransferEngine {
        TransferEngine::new(Arc::new(source), target, config)
    }

    #[test]
    fn test_classify_errors() {
        assert_eq!(
            LoadErrorKind::classify("ORA-01843: not a valid month"),
            LoadErrorKind::DateFormat
        );
        assert_eq!(
            LoadErrorKind::classify("ORA-01400: cannot insert NULL into (\"SHOP\".\"ORDERS\".\"STATUS\")"),
            LoadErrorKind::NotNull
        );
        assert_eq!(
            LoadErrorKind::classify("ORA-00001: unique constraint violated"),
            LoadErrorKind::Other
        );
    }

    #[tokio::test]
    async fn test_orders_row_loaded() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone()).with_rows_from(orders_rows());
        let target = Arc::new(MockTarget::from_catalog(&catalog));
        let plan = plan_load_order(&catalog.tables);

        let outcome = engine(source, target.clone(), TransferConfig::default())
            .run(&catalog.tables, &plan)
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.rows_inserted, 2);
        let orders = target.rows("ORDERS");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0][2], SqlValue::String("OPEN".into()));
    }

    #[tokio::test]
    async fn test_batches_and_commit_cadence() {
        let catalog = orders_fixture();
        let rows = (1..=25).map(|i| crate::testutil::customer_row(i, Some("x"))).collect();
        let source = MockSource::new(catalog.clone()).with_rows("customers", rows);
        let target = Arc::new(MockTarget::from_catalog(&catalog));
        let plan = plan_load_order(&catalog.tables);
        let config = TransferConfig {
            batch_size: 10,
            commit_every: 2,
            ..Default::default()
        };

        let outcome = engine(source, target.clone(), config)
            .run(&catalog.tables, &plan)
            .await
            .unwrap();

        let customers = outcome.tables.iter().find(|t| t.table == "customers").unwrap();
        assert_eq!(customers.status, TableStatus::Loaded);
        assert_eq!(customers.rows_inserted, 25);
        assert_eq!(target.insert_calls("CUSTOMERS"), 3);
        // One checkpoint after two batches, one final commit.
        assert_eq!(target.commit_count(), 2);

        let orders = outcome.tables.iter().find(|t| t.table == "orders").unwrap();
        assert_eq!(orders.status, TableStatus::Empty);
    }

    #[tokio::test]
    async fn test_reject_policy_isolates_batch() {
        let catalog = orders_fixture();
        let rows = vec![
            crate::testutil::customer_row(1, Some("a")),
            crate::testutil::customer_row(2, Some("b")),
            crate::testutil::customer_row(3, None),
            crate::testutil::customer_row(4, Some("d")),
        ];
        let source = MockSource::new(catalog.clone()).with_rows("customers", rows);
        let target = Arc::new(MockTarget::from_catalog(&catalog));
        let plan = plan_load_order(&catalog.tables);
        let config = TransferConfig {
            batch_size: 2,
            ..Default::default()
        };

        let outcome = engine(source, target.clone(), config)
            .run(&catalog.tables, &plan)
            .await
            .unwrap();

        let customers = outcome.tables.iter().find(|t| t.table == "customers").unwrap();
        assert_eq!(customers.status, TableStatus::Partial);
        assert_eq!(customers.rows_inserted, 2);
        assert_eq!(customers.failed_batches.len(), 1);
        assert_eq!(customers.failed_batches[0].batch_index, 1);
        assert_eq!(customers.failed_batches[0].kind, LoadErrorKind::NotNull);
        assert_eq!(target.rows("CUSTOMERS").len(), 2);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_backfill_policy_fills_sentinel() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone())
            .with_rows("customers", vec![crate::testutil::customer_row(1, None)]);
        let target = Arc::new(MockTarget::from_catalog(&catalog));
        let plan = plan_load_order(&catalog.tables);
        let config = TransferConfig {
            null_policy: NullPolicy::Backfill,
            ..Default::default()
        };

        engine(source, target.clone(), config)
            .run(&catalog.tables, &plan)
            .await
            .unwrap();

        let rows = target.rows("CUSTOMERS");
        assert_eq!(rows[0][1], SqlValue::String("N/A".into()));
    }

    #[tokio::test]
    async fn test_rerun_after_wipe_matches_source_count() {
        let catalog = orders_fixture();
        let rows: Vec<_> = (1..=7).map(|i| crate::testutil::customer_row(i, Some("x"))).collect();
        let target = Arc::new(MockTarget::from_catalog(&catalog));
        let plan = plan_load_order(&catalog.tables);

        for _ in 0..2 {
            target.delete_all_rows("CUSTOMERS").await.unwrap();
            let source = MockSource::new(catalog.clone()).with_rows("customers", rows.clone());
            engine(source, target.clone(), TransferConfig::default())
                .run(&catalog.tables, &plan)
                .await
                .unwrap();
            assert_eq!(target.get_row_count("CUSTOMERS").await.unwrap(), 7);
        }
    }

    #[tokio::test]
    async fn test_missing_target_column_fails_table() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone()).with_rows_from(orders_rows());
        let target = Arc::new(MockTarget::from_catalog(&catalog).without_column("ORDERS", "NOTE"));
        let plan = plan_load_order(&catalog.tables);

        let outcome = engine(source, target, TransferConfig::default())
            .run(&catalog.tables, &plan)
            .await
            .unwrap();

        let orders = outcome.tables.iter().find(|t| t.table == "orders").unwrap();
        assert_eq!(orders.status, TableStatus::Failed);
        assert!(orders.error.as_deref().unwrap().contains("column note"));
    }

    #[tokio::test]
    async fn test_read_error_keeps_loaded_batches() {
        let catalog = orders_fixture();
        let rows: Vec<_> = (1..=5).map(|i| crate::testutil::customer_row(i, Some("x"))).collect();
        let source = MockSource::new(catalog.clone())
            .with_rows("customers", rows)
            .fail_read_after("customers", 1);
        let target = Arc::new(MockTarget::from_catalog(&catalog));
        let plan = plan_load_order(&catalog.tables);
        let config = TransferConfig {
            batch_size: 2,
            ..Default::default()
        };

        let outcome = engine(source, target.clone(), config)
            .run(&catalog.tables, &plan)
            .await
            .unwrap();

        let customers = outcome.tables.iter().find(|t| t.table == "customers").unwrap();
        assert_eq!(customers.status, TableStatus::Failed);
        assert_eq!(customers.rows_inserted, 2);
        assert_eq!(target.rows("CUSTOMERS").len(), 2);
    }

    struct Recorder(Mutex<Vec<TablePhase>>);

    impl TransferObserver for Recorder {
        fn phase_changed(&self, table: &str, phase: TablePhase) {
            if table == "orders" {
                self.0.lock().unwrap().push(phase);
            }
        }
    }

    #[tokio::test]
    async fn test_observer_sees_phases() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone()).with_rows_from(orders_rows());
        let target = Arc::new(MockTarget::from_catalog(&catalog));
        let plan = plan_load_order(&catalog.tables);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));

        engine(source, target, TransferConfig::default())
            .with_observer(recorder.clone())
            .run(&catalog.tables, &plan)
            .await
            .unwrap();

        let phases = recorder.0.lock().unwrap().clone();
        assert_eq!(phases.first(), Some(&TablePhase::Counting));
        assert!(phases.contains(&TablePhase::Loading));
        assert_eq!(phases.last(), Some(&TablePhase::Done));
    }
}
