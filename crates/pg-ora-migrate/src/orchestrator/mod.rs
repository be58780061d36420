//! Migration orchestrator - main workflow coordinator.

use crate::config::Config;
use crate::constraints::{ConstraintToggle, ToggleReport};
use crate::ddl::{self, ApplyReport, DdlOptions, DdlScript};
use crate::error::{MigrateError, Result};
use crate::plan::{plan_load_order, CycleEdge, TableLoadPlan};
use crate::source::{extract_catalog, Catalog, PgSourcePool, SourcePool};
use crate::target::{OraclePool, SqlValue, TargetPool};
use crate::transfer::{
    NoopObserver, NullPolicy, PipelineOutcome, TransferEngine, TransferObserver,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourcePool>,
    target: Option<Arc<dyn TargetPool>>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: completed, partial, failed or dry_run.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Generated DDL statements.
    pub ddl_statements: usize,

    /// DDL statements the target rejected.
    pub ddl_failures: usize,

    /// Review warnings from DDL generation.
    pub ddl_warnings: usize,

    /// Foreign key edges that close a cycle.
    pub cycles: Vec<String>,

    /// Total tables processed.
    pub tables_total: usize,

    /// Tables loaded completely (or empty).
    pub tables_success: usize,

    /// Tables with isolated batches or table-level errors.
    pub tables_failed: usize,

    /// Total rows committed.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// List of incomplete table names.
    pub failed_tables: Vec<String>,

    /// Foreign keys that could not be re-enabled.
    pub fk_enable_failures: usize,

    /// Row-count comparison, when run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<TableValidation>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Row counts for one table, source vs target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableValidation {
    pub table: String,
    pub source_rows: i64,
    /// `None` when the target table is missing.
    pub target_rows: Option<i64>,
    pub matches: bool,
}

/// A source column holding NULLs that a NOT NULL target column will refuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NullAuditEntry {
    pub table: String,
    pub column: String,
    pub target_type: String,
    pub null_count: i64,
    /// Value the backfill policy would write, `None` under reject.
    pub backfill: Option<String>,
}

/// Rows removed by a target cleanup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Table -> rows deleted, in delete order.
    pub tables: Vec<(String, u64)>,
    /// Tables selected in the source but missing in the target.
    pub missing: Vec<String>,
    pub fk_enable_failures: usize,
}

impl CleanupReport {
    pub fn rows_deleted(&self) -> u64 {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// Result of a data-only load.
#[derive(Debug, Clone, Serialize)]
pub struct DataLoadReport {
    pub plan: TableLoadPlan,
    pub pipeline: PipelineOutcome,
    pub fk_enable: ToggleReport,
}

/// Connectivity of both ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
}

impl Orchestrator {
    /// Connect to both source and target.
    pub async fn new(config: Config) -> Result<Self> {
        let source = PgSourcePool::new(&config.source).await?;
        let target = OraclePool::new(&config.target).await?;
        Ok(Self {
            config,
            source: Arc::new(source),
            target: Some(Arc::new(target)),
        })
    }

    /// Connect to the source only, for DDL generation and dry runs.
    pub async fn source_only(config: Config) -> Result<Self> {
        let source = PgSourcePool::new(&config.source).await?;
        Ok(Self {
            config,
            source: Arc::new(source),
            target: None,
        })
    }

    /// Use existing pools.
    pub fn with_pools(
        config: Config,
        source: Arc<dyn SourcePool>,
        target: Option<Arc<dyn TargetPool>>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn target_pool(&self) -> Result<&Arc<dyn TargetPool>> {
        self.target
            .as_ref()
            .ok_or_else(|| MigrateError::Config("this operation needs a target connection".into()))
    }

    fn target(&self) -> Result<&dyn TargetPool> {
        self.target_pool().map(|t| t.as_ref())
    }

    /// Read the source catalog.
    pub async fn extract_catalog(&self) -> Result<Catalog> {
        extract_catalog(
            self.source.as_ref(),
            &self.config.source.schema,
            &self.config.migration,
        )
        .await
    }

    /// Generate the DDL script, writing it to `ddl_output` if configured.
    pub fn generate_ddl(&self, catalog: &Catalog) -> Result<DdlScript> {
        let options = DdlOptions::from(&self.config.migration);
        let script = ddl::generate(catalog, &options, Utc::now());
        if let Some(path) = &self.config.migration.ddl_output {
            script.write_to(path)?;
        }
        Ok(script)
    }

    /// Apply a script to the target, statement by statement.
    pub async fn apply_ddl(&self, script: &DdlScript) -> Result<ApplyReport> {
        let target = self.target()?;
        let report = ddl::apply_script(target, script).await;
        target.commit().await?;
        Ok(report)
    }

    /// Enable or disable every foreign key in the target.
    pub async fn toggle_fks(&self, enable: bool) -> Result<ToggleReport> {
        let toggle = ConstraintToggle::new(self.target()?);
        if enable {
            toggle.enable_all().await
        } else {
            toggle.disable_all().await
        }
    }

    /// Target names keyed by lower case.
    async fn target_names(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .target()?
            .list_tables()
            .await?
            .into_iter()
            .map(|t| (t.to_lowercase(), t))
            .collect())
    }

    /// Delete all rows of the catalog's tables from the target, children first.
    pub async fn wipe_target(&self, catalog: &Catalog) -> Result<CleanupReport> {
        let target = self.target()?;
        let plan = plan_load_order(&catalog.tables);
        let names = self.target_names().await?;
        let toggle = ConstraintToggle::new(target);

        toggle.disable_all().await?;
        let mut report = CleanupReport::default();
        let deleted = self.delete_rows(&plan, &names, &mut report).await;
        let enabled = toggle.enable_all().await?;
        report.fk_enable_failures = enabled.failed();
        deleted?;

        info!(
            "Deleted {} rows from {} target tables",
            report.rows_deleted(),
            report.tables.len()
        );
        Ok(report)
    }

    async fn delete_rows(
        &self,
        plan: &TableLoadPlan,
        names: &HashMap<String, String>,
        report: &mut CleanupReport,
    ) -> Result<()> {
        let target = self.target()?;
        for table in plan.reverse_order() {
            let Some(target_name) = names.get(&table.to_lowercase()) else {
                warn!("{}: not in target, nothing to delete", table);
                report.missing.push(table);
                continue;
            };
            let deleted = target.delete_all_rows(target_name).await?;
            debug!("{}: deleted {} rows", target_name, deleted);
            report.tables.push((target_name.clone(), deleted));
        }
        target.commit().await
    }

    /// Load data into an existing target schema.
    ///
    /// Foreign keys are disabled for the duration of the load and re-enabled
    /// afterwards even when the load fails.
    pub async fn migrate_data(
        &self,
        catalog: &Catalog,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<DataLoadReport> {
        let target = self.target()?;
        let plan = plan_load_order(&catalog.tables);
        info!("Load order: {}", plan.order.join(", "));

        if self.config.migration.wipe_target {
            self.wipe_target(catalog).await?;
        }

        let toggle = ConstraintToggle::new(target);
        toggle.disable_all().await?;

        let engine = TransferEngine::new(
            Arc::clone(&self.source),
            Arc::clone(self.target_pool()?),
            self.config.transfer_config(),
        )
        .with_observer(observer);
        let loaded = engine.run(&catalog.tables, &plan).await;

        let fk_enable = toggle.enable_all().await?;
        Ok(DataLoadReport {
            plan,
            pipeline: loaded?,
            fk_enable,
        })
    }

    /// Run the whole migration.
    pub async fn run(
        &self,
        dry_run: bool,
        observer: Option<Arc<dyn TransferObserver>>,
    ) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let observer: Arc<dyn TransferObserver> = match observer {
            Some(observer) => observer,
            None => Arc::new(NoopObserver),
        };

        info!("Starting migration run: {}", run_id);

        info!(
            "Phase 1: Extracting catalog from {} (schema '{}')",
            self.config.source.endpoint(),
            self.config.source.schema
        );
        let catalog = self.extract_catalog().await?;

        info!("Phase 2: Planning load order");
        let plan = plan_load_order(&catalog.tables);
        let cycles = plan.cycles.iter().map(describe_cycle).collect();

        info!("Phase 3: Generating Oracle DDL");
        let script = self.generate_ddl(&catalog)?;

        let mut result = MigrationResult {
            run_id,
            status: "dry_run".to_string(),
            duration_seconds: 0.0,
            started_at,
            completed_at: started_at,
            ddl_statements: script.statements.len(),
            ddl_failures: 0,
            ddl_warnings: script.warnings.len(),
            cycles,
            tables_total: catalog.tables.len(),
            tables_success: 0,
            tables_failed: 0,
            rows_transferred: 0,
            rows_per_second: 0,
            failed_tables: Vec::new(),
            fk_enable_failures: 0,
            validation: Vec::new(),
        };

        if dry_run {
            info!("Dry run: stopping before any change to the target");
            return Ok(self.finish(result));
        }

        if self.config.migration.apply_ddl {
            info!("Phase 4: Applying DDL to target");
            let applied = self.apply_ddl(&script).await?;
            result.ddl_failures = applied.failures.len();
        } else {
            info!("Phase 4: Skipping DDL apply (apply_ddl = false)");
        }

        info!("Phase 5: Loading data");
        let load = self.migrate_data(&catalog, observer).await?;
        let pipeline = &load.pipeline;
        result.tables_success = pipeline.tables.iter().filter(|t| t.success()).count();
        result.failed_tables = pipeline.incomplete_tables().map(|t| t.table.clone()).collect();
        result.tables_failed = result.failed_tables.len();
        result.rows_transferred = pipeline.rows_inserted;
        result.fk_enable_failures = load.fk_enable.failed();

        if self.config.migration.validate_after_load {
            info!("Phase 6: Validating row counts");
            result.validation = self.validate_catalog(&catalog).await?;
        }

        result.status = if result.tables_failed == 0 && result.fk_enable_failures == 0 {
            "completed"
        } else if result.tables_success > 0 {
            "partial"
        } else {
            "failed"
        }
        .to_string();

        Ok(self.finish(result))
    }

    fn finish(&self, mut result: MigrationResult) -> MigrationResult {
        result.completed_at = Utc::now();
        result.duration_seconds =
            (result.completed_at - result.started_at).num_milliseconds() as f64 / 1000.0;
        result.rows_per_second = if result.duration_seconds > 0.0 {
            (result.rows_transferred as f64 / result.duration_seconds) as i64
        } else {
            0
        };

        info!(
            "Migration {}: {} tables, {} rows in {:.1}s ({} rows/s)",
            result.status,
            result.tables_total,
            result.rows_transferred,
            result.duration_seconds,
            result.rows_per_second
        );
        result
    }

    /// Validate row counts between source and target.
    pub async fn validate(&self) -> Result<Vec<TableValidation>> {
        let catalog = self.extract_catalog().await?;
        self.validate_catalog(&catalog).await
    }

    async fn validate_catalog(&self, catalog: &Catalog) -> Result<Vec<TableValidation>> {
        let target = self.target()?;
        let names = self.target_names().await?;
        let mut results = Vec::with_capacity(catalog.tables.len());

        for table in &catalog.tables {
            let source_rows = self.source.get_row_count(&table.schema, &table.name).await?;
            let target_rows = match names.get(&table.name.to_lowercase()) {
                Some(name) => Some(target.get_row_count(name).await?),
                None => None,
            };
            let matches = target_rows == Some(source_rows);

            if matches {
                info!("{}: {} rows (match)", table.full_name(), source_rows);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table.full_name(),
                    source_rows,
                    target_rows.map(|n| n.to_string()).unwrap_or_else(|| "missing".into())
                );
            }
            results.push(TableValidation {
                table: table.name.clone(),
                source_rows,
                target_rows,
                matches,
            });
        }

        if results.iter().all(|r| r.matches) {
            info!("All {} tables match", results.len());
        }
        Ok(results)
    }

    /// NULLs in source columns whose target column is NOT NULL.
    pub async fn null_audit(&self, catalog: &Catalog) -> Result<Vec<NullAuditEntry>> {
        let target = self.target()?;
        let names = self.target_names().await?;
        let transfer = self.config.transfer_config();
        let mut entries = Vec::new();

        for table in &catalog.tables {
            let Some(target_name) = names.get(&table.name.to_lowercase()) else {
                continue;
            };
            let Some(target_table) = target.describe_table(target_name).await? else {
                continue;
            };
            for column in table.columns.iter().filter(|c| c.is_nullable) {
                let Some(target_column) = target_table.find_column(&column.name) else {
                    continue;
                };
                if target_column.nullable {
                    continue;
                }
                let null_count = self
                    .source
                    .count_nulls(&table.schema, &table.name, &column.name)
                    .await?;
                if null_count == 0 {
                    continue;
                }

                let backfill = match transfer.null_policy {
                    NullPolicy::Reject => None,
                    NullPolicy::Backfill => transfer
                        .sentinels
                        .backfill_for(target_column)
                        .map(|v| describe_value(&v)),
                };
                warn!(
                    "{}.{}: {} NULLs into NOT NULL {}",
                    table.name, column.name, null_count, target_column.data_type
                );
                entries.push(NullAuditEntry {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    target_type: target_column.data_type.clone(),
                    null_count,
                    backfill,
                });
            }
        }
        Ok(entries)
    }

    /// Test both connections.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source = self.source.test_connection().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = match self.target() {
            Ok(t) => t.test_connection().await,
            Err(e) => Err(e),
        };
        let target_latency_ms = start.elapsed().as_millis() as u64;

        if let Err(e) = &source {
            error!("Source health check failed: {}", e);
        }
        if let Err(e) = &target {
            error!("Target health check failed: {}", e);
        }

        Ok(HealthCheckResult {
            healthy: source.is_ok() && target.is_ok(),
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
        })
    }

    /// Close both connections.
    pub async fn close(&self) {
        self.source.close().await;
        if let Some(target) = &self.target {
            target.close().await;
        }
    }
}

fn describe_cycle(edge: &CycleEdge) -> String {
    format!("{} -> {}", edge.from, edge.to)
}

fn describe_value(value: &SqlValue) -> String {
    match value {
        SqlValue::String(s) => format!("'{}'", s),
        SqlValue::I64(n) => n.to_string(),
        SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{customer_row, orders_fixture, orders_rows, MockSource, MockTarget};

    fn config() -> Config {
        Config::from_yaml(
            r#"
source:
  host: localhost
  database: shop
  user: postgres
target:
  connect_string: //localhost:1521/FREEPDB1
  user: SHOP
"#,
        )
        .unwrap()
    }

    fn orchestrator(source: MockSource, target: Arc<MockTarget>) -> Orchestrator {
        Orchestrator::with_pools(config(), Arc::new(source), Some(target))
    }

    #[tokio::test]
    async fn test_run_end_to_end() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone()).with_rows_from(orders_rows());
        let target = Arc::new(MockTarget::from_catalog(&catalog));

        let result = orchestrator(source, target.clone())
            .run(false, None)
            .await
            .unwrap();

        assert_eq!(result.status, "completed");
        assert_eq!(result.rows_transferred, 2);
        assert_eq!(result.tables_success, 2);
        assert!(result.cycles.is_empty());
        assert!(result.validation.iter().all(|v| v.matches));

        let orders = target.rows("ORDERS");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0][2], SqlValue::String("OPEN".into()));

        // DDL went to the target before the load.
        assert!(target
            .executed()
            .iter()
            .any(|s| s.starts_with("CREATE TABLE orders")));
        // Foreign keys are back on.
        assert!(target.foreign_keys().iter().all(|fk| fk.enabled));
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone()).with_rows_from(orders_rows());
        let target = Arc::new(MockTarget::from_catalog(&catalog));

        let result = orchestrator(source, target.clone())
            .run(true, None)
            .await
            .unwrap();

        assert_eq!(result.status, "dry_run");
        assert!(result.ddl_statements > 0);
        assert!(target.executed().is_empty());
        assert!(target.rows("CUSTOMERS").is_empty());
    }

    #[tokio::test]
    async fn test_source_only_rejects_target_work() {
        let source = MockSource::new(orders_fixture());
        let orch = Orchestrator::with_pools(config(), Arc::new(source), None);
        let err = orch.toggle_fks(false).await.unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[tokio::test]
    async fn test_partial_run_status() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone()).with_rows(
            "customers",
            vec![customer_row(1, Some("a")), customer_row(2, None)],
        );
        let target = Arc::new(MockTarget::from_catalog(&catalog));
        let mut config = config();
        config.migration.batch_size = 1;
        let orch = Orchestrator::with_pools(config, Arc::new(source), Some(target));

        let result = orch.run(false, None).await.unwrap();
        assert_eq!(result.status, "partial");
        assert_eq!(result.failed_tables, vec!["customers"]);
        assert_eq!(result.rows_transferred, 1);
    }

    #[tokio::test]
    async fn test_wipe_target_clears_rows() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone()).with_rows_from(orders_rows());
        let target = Arc::new(MockTarget::from_catalog(&catalog));
        let orch = orchestrator(source, target.clone());

        orch.migrate_data(&catalog, Arc::new(NoopObserver)).await.unwrap();
        assert_eq!(target.rows("ORDERS").len(), 1);

        let report = orch.wipe_target(&catalog).await.unwrap();
        assert_eq!(report.rows_deleted(), 2);
        assert_eq!(report.tables[0].0, "ORDERS");
        assert!(target.rows("CUSTOMERS").is_empty());
        assert!(target.foreign_keys().iter().all(|fk| fk.enabled));
    }

    #[tokio::test]
    async fn test_validate_reports_mismatch() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone()).with_rows_from(orders_rows());
        let target = Arc::new(MockTarget::from_catalog(&catalog));

        let results = orchestrator(source, target).validate().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.matches));
        assert_eq!(results[0].target_rows, Some(0));
    }

    #[tokio::test]
    async fn test_null_audit() {
        let catalog = orders_fixture();
        let source = MockSource::new(catalog.clone())
            .with_rows("customers", vec![customer_row(1, Some("a")), customer_row(2, Some("b"))]);
        let target = Arc::new(MockTarget::from_catalog(&catalog).with_not_null("CUSTOMERS", "EMAIL"));
        let mut config = config();
        config.migration.null_policy = NullPolicy::Backfill;
        let orch = Orchestrator::with_pools(config, Arc::new(source), Some(target));

        let entries = orch.null_audit(&catalog).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].column, "email");
        assert_eq!(entries[0].null_count, 2);
        assert_eq!(entries[0].backfill.as_deref(), Some("'N/A'"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let source = MockSource::new(orders_fixture());
        let orch = Orchestrator::with_pools(config(), Arc::new(source), None);
        let health = orch.health_check().await.unwrap();
        assert!(health.source_connected);
        assert!(!health.target_connected);
        assert!(!health.healthy);
    }
}
