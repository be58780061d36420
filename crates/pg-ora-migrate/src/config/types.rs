//! Configuration type definitions.

use crate::source::SslMode;
use crate::transfer::{NullPolicy, NullSentinels};
use crate::typemap::IdentifierMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (PostgreSQL).
    pub source: SourceConfig,

    /// Target database configuration (Oracle).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Source schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode: disable, require, verify-ca, verify-full (default: disable).
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Target database (Oracle) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Easy Connect string or TNS alias, e.g. `//localhost:1521/FREEPDB1`.
    pub connect_string: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema to switch the session to. Defaults to the login user's schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("connect_string", &self.connect_string)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per insert batch (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Commit after this many successful batches (default: 10).
    #[serde(default = "default_commit_every")]
    pub commit_every: usize,

    /// What to do with a source NULL bound for a NOT NULL target column.
    #[serde(default)]
    pub null_policy: NullPolicy,

    /// Values substituted under the backfill policy.
    #[serde(default)]
    pub null_sentinels: NullSentinels,

    /// How identifiers are written into generated DDL.
    #[serde(default)]
    pub identifier_mode: IdentifierMode,

    /// Tables to include (glob patterns).
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (glob patterns).
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Apply generated DDL to the target during `run` (default: true).
    #[serde(default = "default_true")]
    pub apply_ddl: bool,

    /// Where to write the generated DDL script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddl_output: Option<PathBuf>,

    /// Convert source CHECK constraints (default: true).
    #[serde(default = "default_true")]
    pub include_check_constraints: bool,

    /// Delete all target rows before loading (default: false).
    #[serde(default)]
    pub wipe_target: bool,

    /// Read source rows ordered by primary key (default: false).
    #[serde(default)]
    pub order_by_primary_key: bool,

    /// Compare row counts after loading (default: true).
    #[serde(default = "default_true")]
    pub validate_after_load: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            commit_every: default_commit_every(),
            null_policy: NullPolicy::default(),
            null_sentinels: NullSentinels::default(),
            identifier_mode: IdentifierMode::default(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            apply_ddl: true,
            ddl_output: None,
            include_check_constraints: true,
            wipe_target: false,
            order_by_primary_key: false,
            validate_after_load: true,
        }
    }
}

impl MigrationConfig {
    /// Whether a source table passes the include/exclude filters.
    pub fn table_selected(&self, name: &str) -> bool {
        let included = self.include_tables.is_empty()
            || self.include_tables.iter().any(|p| glob_match(p, name));
        included && !self.exclude_tables.iter().any(|p| glob_match(p, name))
    }
}

/// Case-insensitive glob match supporting `*` and `?`.
fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let n: Vec<char> = name.to_lowercase().chars().collect();

    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

// Default value functions for serde
fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_commit_every() -> usize {
    10
}

fn default_true() -> bool {
    true
}
