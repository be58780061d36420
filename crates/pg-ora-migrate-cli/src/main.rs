//! pg-ora-migrate CLI - PostgreSQL to Oracle schema and data migration.

use clap::{Parser, Subcommand, ValueEnum};
use pg_ora_migrate::orchestrator::NullAuditEntry;
use pg_ora_migrate::transfer::{BatchFailure, NoopObserver, TableOutcome, TablePhase};
use pg_ora_migrate::{Config, MigrateError, NullPolicy, Orchestrator, TransferObserver};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "pg-ora-migrate")]
#[command(about = "PostgreSQL to Oracle schema and data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    /// Answer yes to confirmation prompts
    #[arg(long, short)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum NullPolicyArg {
    Reject,
    Backfill,
}

impl From<NullPolicyArg> for NullPolicy {
    fn from(arg: NullPolicyArg) -> Self {
        match arg {
            NullPolicyArg::Reject => NullPolicy::Reject,
            NullPolicyArg::Backfill => NullPolicy::Backfill,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FkAction {
    Enable,
    Disable,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, convert, load and validate
    Run {
        /// Override source schema
        #[arg(long)]
        source_schema: Option<String>,

        /// Override the NULL policy
        #[arg(long, value_enum)]
        null_policy: Option<NullPolicyArg>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Plan and generate DDL without touching the target
        #[arg(long)]
        dry_run: bool,
    },

    /// Write the Oracle DDL script for the source schema
    GenerateDdl {
        /// Output path for the script
        #[arg(short, long, default_value = "schema_oracle.sql")]
        output: PathBuf,

        /// Override source schema
        #[arg(long)]
        source_schema: Option<String>,
    },

    /// Load data into an existing target schema
    MigrateData {
        /// Override the NULL policy
        #[arg(long, value_enum)]
        null_policy: Option<NullPolicyArg>,
    },

    /// Validate row counts between source and target
    Validate,

    /// Report source NULLs headed for NOT NULL target columns
    CheckNulls,

    /// Enable or disable all target foreign keys
    ToggleFks {
        #[arg(value_enum)]
        action: FkAction,
    },

    /// Delete all rows from the target tables
    Cleanup,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    tokio::select! {
        result = execute(&cli, config) => result,
        signal = shutdown_signal() => {
            eprintln!("\nReceived {}. Stopping; committed batches are kept.", signal);
            Err(MigrateError::Cancelled)
        }
    }
}

async fn execute(cli: &Cli, mut config: Config) -> Result<(), MigrateError> {
    match &cli.command {
        Commands::Run {
            source_schema,
            null_policy,
            batch_size,
            dry_run,
        } => {
            if let Some(schema) = source_schema {
                config.source.schema = schema.clone();
            }
            if let Some(policy) = null_policy {
                config.migration.null_policy = (*policy).into();
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = *size;
            }
            config.validate()?;

            let orchestrator = if *dry_run {
                Orchestrator::source_only(config).await?
            } else {
                if config.migration.wipe_target {
                    confirm(cli, "wipe_target is set: all target rows will be deleted first.")?;
                }
                Orchestrator::new(config).await?
            };

            let result = orchestrator.run(*dry_run, observer(cli)).await;
            orchestrator.close().await;
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = if *dry_run { "Dry run completed!" } else { "Migration finished!" };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Status: {}", result.status);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!(
                    "  DDL: {} statements, {} failed, {} warnings",
                    result.ddl_statements, result.ddl_failures, result.ddl_warnings
                );
                for cycle in &result.cycles {
                    println!("  FK cycle: {}", cycle);
                }
                if !*dry_run {
                    println!("  Tables: {}/{}", result.tables_success, result.tables_total);
                    println!("  Rows: {}", result.rows_transferred);
                    println!("  Throughput: {} rows/sec", result.rows_per_second);
                }
                if !result.failed_tables.is_empty() {
                    println!("  Incomplete tables: {:?}", result.failed_tables);
                }
                if result.fk_enable_failures > 0 {
                    println!(
                        "  Foreign keys left disabled: {}",
                        result.fk_enable_failures
                    );
                }
            }

            if result.status == "failed" {
                return Err(MigrateError::transfer(
                    result.failed_tables.join(", "),
                    "no table loaded completely",
                ));
            }
        }

        Commands::GenerateDdl {
            output,
            source_schema,
        } => {
            if let Some(schema) = source_schema {
                config.source.schema = schema.clone();
            }
            config.migration.ddl_output = Some(output.clone());

            let orchestrator = Orchestrator::source_only(config).await?;
            let catalog = orchestrator.extract_catalog().await?;
            let script = orchestrator.generate_ddl(&catalog)?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&script)?);
            } else {
                println!(
                    "Wrote {} statements ({} warnings) to {}",
                    script.statements.len(),
                    script.warnings.len(),
                    output.display()
                );
                for warning in &script.warnings {
                    println!("  WARNING: {}", warning);
                }
            }
        }

        Commands::MigrateData { null_policy } => {
            if let Some(policy) = null_policy {
                config.migration.null_policy = (*policy).into();
            }
            if config.migration.wipe_target {
                confirm(cli, "wipe_target is set: all target rows will be deleted first.")?;
            }

            let orchestrator = Orchestrator::new(config).await?;
            let catalog = orchestrator.extract_catalog().await?;
            let observer: Arc<dyn TransferObserver> = match observer(cli) {
                Some(observer) => observer,
                None => Arc::new(NoopObserver),
            };
            let report = orchestrator.migrate_data(&catalog, observer).await;
            orchestrator.close().await;
            let report = report?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nData load finished!");
                println!("  Rows: {}", report.pipeline.rows_inserted);
                println!(
                    "  Throughput: {:.0} rows/sec",
                    report.pipeline.rows_per_second()
                );
                for table in &report.pipeline.tables {
                    print_table_outcome(table);
                }
                if !report.fk_enable.is_clean() {
                    println!(
                        "  Foreign keys left disabled: {}",
                        report.fk_enable.failed()
                    );
                }
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config).await?;
            let results = orchestrator.validate().await?;
            orchestrator.close().await;

            let mismatches = results.iter().filter(|r| !r.matches).count();
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for r in &results {
                    println!(
                        "  {} {}: source={} target={}",
                        if r.matches { "OK      " } else { "MISMATCH" },
                        r.table,
                        r.source_rows,
                        r.target_rows
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| "missing".into())
                    );
                }
            }
            if mismatches > 0 {
                return Err(MigrateError::Validation(format!(
                    "{} of {} tables differ",
                    mismatches,
                    results.len()
                )));
            }
            if !cli.output_json {
                println!("Validation completed successfully");
            }
        }

        Commands::CheckNulls => {
            let orchestrator = Orchestrator::new(config).await?;
            let catalog = orchestrator.extract_catalog().await?;
            let entries = orchestrator.null_audit(&catalog).await;
            orchestrator.close().await;
            let entries = entries?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No NULLs headed for NOT NULL target columns");
            } else {
                println!("NULLs headed for NOT NULL target columns:");
                for entry in &entries {
                    print_null_entry(entry);
                }
            }
        }

        Commands::ToggleFks { action } => {
            let enable = matches!(action, FkAction::Enable);
            let orchestrator = Orchestrator::new(config).await?;
            let report = orchestrator.toggle_fks(enable).await;
            orchestrator.close().await;
            let report = report?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} {} of {} foreign keys",
                    if enable { "Enabled" } else { "Disabled" },
                    report.toggled,
                    report.attempted
                );
                for failure in &report.failures {
                    println!(
                        "  FAILED {}.{}: {}",
                        failure.table, failure.constraint, failure.message
                    );
                }
            }
            if enable && !report.is_clean() {
                return Err(MigrateError::Validation(format!(
                    "{} foreign keys could not be enabled",
                    report.failed()
                )));
            }
        }

        Commands::Cleanup => {
            confirm(cli, "All rows in the selected target tables will be deleted.")?;

            let orchestrator = Orchestrator::new(config).await?;
            let catalog = orchestrator.extract_catalog().await?;
            let report = orchestrator.wipe_target(&catalog).await;
            orchestrator.close().await;
            let report = report?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for (table, rows) in &report.tables {
                    println!("  {}: {} rows deleted", table, rows);
                }
                for table in &report.missing {
                    println!("  {}: not in target", table);
                }
                println!("Deleted {} rows", report.rows_deleted());
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (PostgreSQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (Oracle): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn print_table_outcome(table: &TableOutcome) {
    println!(
        "  {:?} {}: {}/{} rows in {:.1}s",
        table.status,
        table.table,
        table.rows_inserted,
        table.source_rows,
        table.elapsed.as_secs_f64()
    );
    for failure in &table.failed_batches {
        println!(
            "    batch {} ({} rows) {:?}: {}",
            failure.batch_index, failure.rows, failure.kind, failure.message
        );
    }
    if let Some(err) = &table.error {
        println!("    error: {}", err);
    }
}

fn print_null_entry(entry: &NullAuditEntry) {
    println!(
        "  {}.{}: {} NULLs into {} NOT NULL{}",
        entry.table,
        entry.column,
        entry.null_count,
        entry.target_type,
        entry
            .backfill
            .as_deref()
            .map(|v| format!(", backfill {}", v))
            .unwrap_or_else(|| ", rows will be rejected".to_string())
    );
}

/// Ask on stdin unless `--yes` was given.
fn confirm(cli: &Cli, message: &str) -> Result<(), MigrateError> {
    if cli.yes {
        return Ok(());
    }
    eprint!("{} Continue? [y/N] ", message);
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(MigrateError::Cancelled),
    }
}

/// JSON progress lines on stderr.
struct ProgressReporter;

impl TransferObserver for ProgressReporter {
    fn table_started(&self, table: &str, source_rows: i64) {
        eprintln!(
            "{}",
            serde_json::json!({"event": "table_started", "table": table, "source_rows": source_rows})
        );
    }

    fn phase_changed(&self, table: &str, phase: TablePhase) {
        eprintln!(
            "{}",
            serde_json::json!({"event": "phase", "table": table, "phase": phase})
        );
    }

    fn batch_failed(&self, table: &str, failure: &BatchFailure) {
        eprintln!(
            "{}",
            serde_json::json!({"event": "batch_failed", "table": table, "failure": failure})
        );
    }

    fn table_finished(&self, outcome: &TableOutcome) {
        eprintln!(
            "{}",
            serde_json::json!({
                "event": "table_finished",
                "table": outcome.table,
                "status": outcome.status,
                "rows_inserted": outcome.rows_inserted,
            })
        );
    }
}

fn observer(cli: &Cli) -> Option<Arc<dyn TransferObserver>> {
    if cli.progress {
        Some(Arc::new(ProgressReporter))
    } else {
        None
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Resolves with the signal name on SIGINT or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl-C"
}
