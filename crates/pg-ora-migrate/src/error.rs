//! Error types for the migration library.

use thiserror::Error;

/// Process exit codes reported by the CLI.
pub mod exit_codes {
    pub const CONFIG_ERROR: u8 = 1;
    pub const SOURCE_ERROR: u8 = 2;
    pub const TARGET_ERROR: u8 = 3;
    pub const EXTRACTION_ERROR: u8 = 4;
    pub const TRANSFER_ERROR: u8 = 5;
    pub const VALIDATION_ERROR: u8 = 6;
    pub const IO_ERROR: u8 = 7;
    pub const INTERRUPTED: u8 = 130;
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source (PostgreSQL) connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] tokio_postgres::Error),

    /// Target (Oracle) connection or statement error
    #[error("Target database error: {0}")]
    Target(#[from] oracle::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Catalog extraction failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// A generated statement could not be built or applied
    #[error("DDL error on {object}: {message}")]
    Ddl { object: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Row count validation failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was interrupted (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a DDL error for a named object
    pub fn ddl(object: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Ddl {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => exit_codes::CONFIG_ERROR,
            MigrateError::Source(_) => exit_codes::SOURCE_ERROR,
            MigrateError::Target(_) | MigrateError::Pool { .. } => exit_codes::TARGET_ERROR,
            MigrateError::SchemaExtraction(_) | MigrateError::Ddl { .. } => {
                exit_codes::EXTRACTION_ERROR
            }
            MigrateError::Transfer { .. } => exit_codes::TRANSFER_ERROR,
            MigrateError::Validation(_) => exit_codes::VALIDATION_ERROR,
            MigrateError::Io(_) | MigrateError::Json(_) => exit_codes::IO_ERROR,
            MigrateError::Cancelled => exit_codes::INTERRUPTED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
