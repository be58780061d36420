//! Oracle DDL generation from an extracted catalog.
//!
//! [`generate`] turns a [`Catalog`] into a [`DdlScript`]: an ordered list of
//! statements grouped by kind, plus review warnings. The script can be
//! rendered as a SQL*Plus-style file or applied statement by statement.

mod enums;
mod indexes;
mod procedural;
mod rewrite;
mod sequences;
mod tables;
mod views;

pub use enums::{enum_checks, enum_to_check, enum_width, EnumCheck};
pub use indexes::{
    classify_index, recommend_index_strategy, IndexClass, IndexRecommendation, IndexStrategy,
    BITMAP_MAX_RATIO, BTREE_MIN_RATIO,
};
pub use rewrite::{unconverted_constructs, RewritePipeline, RewriteRule};

pub(crate) use tables::column_type;

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::source::Catalog;
use crate::target::TargetPool;
use crate::typemap::IdentifierMode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Statement kinds, declared in apply order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatementKind {
    Sequence,
    Table,
    PrimaryKey,
    Unique,
    Check,
    ForeignKey,
    Index,
    Routine,
    View,
    MaterializedView,
    Trigger,
}

impl StatementKind {
    /// Position in the apply order.
    ///
    /// Views and materialized views share a rank so the dependency order
    /// between them survives the sort. Routines go first: Oracle creates a
    /// PL/SQL unit with a missing reference as invalid, but rejects a view
    /// that calls a missing function.
    pub fn apply_rank(&self) -> u8 {
        match self {
            StatementKind::Sequence => 0,
            StatementKind::Table => 1,
            StatementKind::PrimaryKey => 2,
            StatementKind::Unique => 3,
            StatementKind::Check => 4,
            StatementKind::ForeignKey => 5,
            StatementKind::Index => 6,
            StatementKind::Routine => 7,
            StatementKind::View | StatementKind::MaterializedView => 8,
            StatementKind::Trigger => 9,
        }
    }

    /// Section heading in the rendered script.
    pub fn section_title(&self) -> &'static str {
        match self {
            StatementKind::Sequence => "Sequences",
            StatementKind::Table => "Tables",
            StatementKind::PrimaryKey => "Primary keys",
            StatementKind::Unique => "Unique constraints",
            StatementKind::Check => "Check constraints",
            StatementKind::ForeignKey => "Foreign keys",
            StatementKind::Index => "Indexes",
            StatementKind::Routine => "Functions and procedures",
            StatementKind::View | StatementKind::MaterializedView => "Views and materialized views",
            StatementKind::Trigger => "Triggers",
        }
    }

    /// PL/SQL units are terminated with `/` instead of `;`.
    pub fn is_plsql(&self) -> bool {
        matches!(self, StatementKind::Routine | StatementKind::Trigger)
    }
}

/// One generated statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DdlStatement {
    pub kind: StatementKind,
    /// Object the statement creates, for reports (`orders`, `orders.orders_pkey`).
    pub object: String,
    /// Executable text without a script terminator.
    pub sql: String,
    /// Review notes rendered as comments above the statement.
    pub notes: Vec<String>,
}

impl DdlStatement {
    /// Statement text with its script terminator.
    pub fn terminated(&self) -> String {
        if self.kind.is_plsql() {
            format!("{}\n/", self.sql)
        } else {
            format!("{};", self.sql)
        }
    }
}

/// Options that shape the generated DDL.
#[derive(Debug, Clone, Copy)]
pub struct DdlOptions {
    pub identifier_mode: IdentifierMode,
    pub include_check_constraints: bool,
}

impl Default for DdlOptions {
    fn default() -> Self {
        Self {
            identifier_mode: IdentifierMode::default(),
            include_check_constraints: true,
        }
    }
}

impl From<&MigrationConfig> for DdlOptions {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            identifier_mode: config.identifier_mode,
            include_check_constraints: config.include_check_constraints,
        }
    }
}

/// Generated DDL for one schema.
#[derive(Debug, Clone, Serialize)]
pub struct DdlScript {
    pub source_schema: String,
    pub generated_at: DateTime<Utc>,
    pub identifier_mode: IdentifierMode,
    /// Statements in apply order.
    pub statements: Vec<DdlStatement>,
    /// Everything that needs a manual look, one line each.
    pub warnings: Vec<String>,
}

impl DdlScript {
    /// Statements of one kind, in order.
    pub fn statements_of(&self, kind: StatementKind) -> impl Iterator<Item = &DdlStatement> {
        self.statements.iter().filter(move |s| s.kind == kind)
    }

    /// Render as a script file.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "-- ============================================================";

        out.push_str(&format!(
            "{rule}\n-- Oracle DDL for PostgreSQL schema '{}'\n-- Generated: {}\n-- Identifier mode: {:?}\n{rule}\n",
            self.source_schema,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.identifier_mode,
        ));

        let mut section = None;
        for statement in &self.statements {
            let title = statement.kind.section_title();
            if section != Some(title) {
                out.push_str(&format!("\n-- {}\n\n", title));
                section = Some(title);
            }
            for note in &statement.notes {
                out.push_str(&format!("-- NOTE: {}\n", note));
            }
            out.push_str(&statement.terminated());
            out.push_str("\n\n");
        }

        out.push_str(&format!(
            "{rule}\n-- {} statements, {} warnings\n{rule}\n",
            self.statements.len(),
            self.warnings.len()
        ));
        out
    }

    /// Write the rendered script to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render())?;
        info!(
            "Wrote {} statements to {}",
            self.statements.len(),
            path.display()
        );
        Ok(())
    }
}

/// Generate Oracle DDL for everything in `catalog`.
pub fn generate(catalog: &Catalog, options: &DdlOptions, generated_at: DateTime<Utc>) -> DdlScript {
    let mode = options.identifier_mode;
    let mut warnings = Vec::new();
    let mut statements = Vec::new();

    for failure in &catalog.failures {
        warnings.push(format!(
            "{} could not be extracted: {}",
            failure.resource, failure.message
        ));
    }

    statements.extend(sequences::sequence_statements(&catalog.sequences, mode, &mut warnings));

    let checks = enum_checks(&catalog.enums, mode);

    for table in &catalog.tables {
        statements.push(tables::create_table(table, &catalog.enums, mode, &mut warnings));
        statements.extend(tables::constraint_statements(
            table,
            &checks,
            mode,
            options.include_check_constraints,
            &mut warnings,
        ));
        statements.extend(indexes::index_statements(table, &catalog.enums, mode, &mut warnings));
    }

    statements.extend(procedural::routine_statements(&catalog.routines, mode, &mut warnings));
    statements.extend(views::view_statements(&catalog.views, mode, &mut warnings));
    statements.extend(procedural::trigger_statements(&catalog.triggers, mode, &mut warnings));

    // Stable: order within a rank is kept.
    statements.sort_by_key(|s| s.kind.apply_rank());

    info!(
        "Generated {} DDL statements for schema '{}' ({} warnings)",
        statements.len(),
        catalog.schema,
        warnings.len()
    );

    DdlScript {
        source_schema: catalog.schema.clone(),
        generated_at,
        identifier_mode: mode,
        statements,
        warnings,
    }
}

/// A statement the target rejected.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyFailure {
    pub kind: StatementKind,
    pub object: String,
    pub message: String,
}

/// Result of applying a script.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub applied: usize,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Execute every statement against the target, continuing past failures.
pub async fn apply_script(target: &dyn TargetPool, script: &DdlScript) -> ApplyReport {
    let mut report = ApplyReport::default();
    for statement in &script.statements {
        match target.execute(&statement.sql).await {
            Ok(()) => {
                debug!("Applied {:?} {}", statement.kind, statement.object);
                report.applied += 1;
            }
            Err(e) => {
                warn!(
                    "Failed to apply {:?} {}: {}",
                    statement.kind, statement.object, e
                );
                report.failures.push(ApplyFailure {
                    kind: statement.kind,
                    object: statement.object.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
    info!(
        "Applied {} of {} DDL statements ({} failed)",
        report.applied,
        script.statements.len(),
        report.failures.len()
    );
    report
}
