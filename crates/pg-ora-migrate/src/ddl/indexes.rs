//! Index classification and the cardinality-based storage heuristic.

use super::{tables, DdlStatement, StatementKind};
use crate::source::{CardinalityStats, ConstraintKind, EnumCatalog, Index, Table};
use crate::typemap::IdentifierMode;
use serde::Serialize;
use tracing::debug;

/// Below this distinct/total ratio a bitmap index is recommended.
pub const BITMAP_MAX_RATIO: f64 = 0.05;

/// Above this ratio a B-tree index is recommended outright.
pub const BTREE_MIN_RATIO: f64 = 0.20;

/// Why an index exists in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexClass {
    /// Backs the primary key (implicit in the target).
    PrimaryKey,
    /// Backs a UNIQUE constraint (implicit in the target).
    UniqueConstraint,
    /// Covers the columns of a foreign key.
    ForeignKey,
    /// Created explicitly.
    Manual,
}

impl IndexClass {
    /// Whether the target creates this index on its own.
    pub fn is_implicit(&self) -> bool {
        matches!(self, IndexClass::PrimaryKey | IndexClass::UniqueConstraint)
    }
}

/// Classify an index of `table`.
pub fn classify_index(index: &Index, table: &Table) -> IndexClass {
    if index.is_primary {
        return IndexClass::PrimaryKey;
    }
    if index.backs_unique_constraint {
        return IndexClass::UniqueConstraint;
    }
    let covers_fk = table.foreign_keys().any(|fk| {
        !fk.columns.is_empty()
            && index.columns.len() >= fk.columns.len()
            && index.columns[..fk.columns.len()] == fk.columns[..]
    });
    if covers_fk {
        IndexClass::ForeignKey
    } else {
        IndexClass::Manual
    }
}

/// Target index storage strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexStrategy {
    Bitmap,
    BTree,
}

/// Outcome of the cardinality heuristic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRecommendation {
    pub strategy: IndexStrategy,
    /// Review or override note for the script.
    pub note: Option<String>,
    /// The ratio fell between the thresholds or was not sampled.
    pub needs_review: bool,
}

/// Pick a storage strategy from a cardinality sample.
///
/// Unique indexes are always B-tree; the override is noted so the reader can
/// see the heuristic was bypassed.
pub fn recommend_index_strategy(
    stats: Option<CardinalityStats>,
    unique: bool,
) -> IndexRecommendation {
    if unique {
        return IndexRecommendation {
            strategy: IndexStrategy::BTree,
            note: Some("unique index: bitmap suppressed, B-tree forced".to_string()),
            needs_review: false,
        };
    }

    let Some(stats) = stats else {
        return IndexRecommendation {
            strategy: IndexStrategy::BTree,
            note: Some("no cardinality sample, defaulted to B-tree; review".to_string()),
            needs_review: true,
        };
    };

    let ratio = stats.ratio();
    if ratio < BITMAP_MAX_RATIO {
        IndexRecommendation {
            strategy: IndexStrategy::Bitmap,
            note: Some(format!(
                "cardinality ratio {:.3} ({} distinct / {} rows): bitmap",
                ratio, stats.distinct_values, stats.total_rows
            )),
            needs_review: false,
        }
    } else if ratio > BTREE_MIN_RATIO {
        IndexRecommendation {
            strategy: IndexStrategy::BTree,
            note: None,
            needs_review: false,
        }
    } else {
        IndexRecommendation {
            strategy: IndexStrategy::BTree,
            note: Some(format!(
                "cardinality ratio {:.3} is between {} and {}, defaulted to B-tree; review",
                ratio, BITMAP_MAX_RATIO, BTREE_MIN_RATIO
            )),
            needs_review: true,
        }
    }
}

/// CREATE INDEX statements for the explicit indexes of `table`.
pub(crate) fn index_statements(
    table: &Table,
    enums: &EnumCatalog,
    mode: IdentifierMode,
    warnings: &mut Vec<String>,
) -> Vec<DdlStatement> {
    let key_column_sets: Vec<&Vec<String>> = table
        .constraints
        .iter()
        .filter(|c| matches!(c.kind, ConstraintKind::PrimaryKey | ConstraintKind::Unique))
        .map(|c| &c.columns)
        .collect();

    let mut statements = Vec::new();
    for index in &table.indexes {
        let class = classify_index(index, table);
        if class.is_implicit() || key_column_sets.contains(&&index.columns) {
            debug!("Skipping implicit index {} on {}", index.name, table.name);
            continue;
        }

        let object = format!("{}.{}", table.name, index.name);
        if index.columns.is_empty() {
            warnings.push(format!("{}: expression index not converted", object));
            continue;
        }
        if !matches!(index.access_method.as_str(), "btree" | "hash") {
            warnings.push(format!(
                "{}: access method '{}' has no Oracle equivalent, skipped",
                object, index.access_method
            ));
            continue;
        }
        if let Some(lob) = index.columns.iter().find(|c| is_lob_column(table, c, enums)) {
            warnings.push(format!(
                "{}: column {} maps to a LOB type and cannot be indexed, skipped",
                object, lob
            ));
            continue;
        }

        let recommendation = recommend_index_strategy(index.cardinality, index.is_unique);
        let keyword = match (recommendation.strategy, index.is_unique) {
            (_, true) => "UNIQUE INDEX",
            (IndexStrategy::Bitmap, false) => "BITMAP INDEX",
            (IndexStrategy::BTree, false) => "INDEX",
        };

        let mut notes = Vec::new();
        if let Some(note) = recommendation.note {
            if recommendation.needs_review {
                warnings.push(format!("{}: {}", object, note));
            }
            notes.push(note);
        }

        statements.push(DdlStatement {
            kind: StatementKind::Index,
            object,
            sql: format!(
                "CREATE {} {} ON {} ({})",
                keyword,
                mode.render_truncated(&index.name),
                mode.render(&table.name),
                mode.render_list(&index.columns)
            ),
            notes,
        });
    }
    statements
}

fn is_lob_column(table: &Table, column: &str, enums: &EnumCatalog) -> bool {
    table
        .column(column)
        .map(|c| {
            let target = tables::column_type(c, enums).target_type;
            target == "CLOB" || target == "BLOB"
        })
        .unwrap_or(false)
}
