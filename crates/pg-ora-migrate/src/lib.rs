//! # pg-ora-migrate
//!
//! PostgreSQL to Oracle schema and data migration library.
//!
//! This library provides:
//!
//! - **Catalog extraction** of tables, constraints, indexes, enums, sequences,
//!   views, triggers and routines
//! - **Oracle DDL generation** with enum-to-CHECK conversion, a cardinality
//!   heuristic for bitmap indexes and PL/pgSQL to PL/SQL rewriting
//! - **Dependency-ordered loading** in committed batches with per-batch error
//!   isolation
//! - **Foreign key toggling**, row-count validation and NULL audits
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_ora_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run(false, None).await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constraints;
pub mod ddl;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod source;
pub mod target;
pub mod transfer;
pub mod typemap;

#[cfg(test)]
mod testutil;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use constraints::{ConstraintToggle, ToggleReport};
pub use ddl::{DdlOptions, DdlScript, DdlStatement, StatementKind};
pub use error::{MigrateError, Result};
pub use orchestrator::{HealthCheckResult, MigrationResult, Orchestrator};
pub use plan::{plan_load_order, TableLoadPlan};
pub use source::{Catalog, PgSourcePool, SourcePool, Table};
pub use target::{OraclePool, SqlValue, TargetPool};
pub use transfer::{NullPolicy, TransferConfig, TransferEngine, TransferObserver};
pub use typemap::{convert_type, map_type, IdentifierMode, TypeMapping};
