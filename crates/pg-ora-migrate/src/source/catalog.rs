//! Full catalog extraction.
//!
//! Tables and columns are mandatory. Every other sub-resource is read
//! independently; a failure is logged, recorded in [`Catalog::failures`] and
//! the rest of the extraction continues.

use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::source::{Catalog, ExtractionFailure, SourcePool, Table};
use tracing::{info, warn};

/// Read everything needed for DDL generation and loading from `schema`.
pub async fn extract_catalog(
    source: &dyn SourcePool,
    schema: &str,
    migration: &MigrationConfig,
) -> Result<Catalog> {
    let mut tables = source
        .extract_schema(schema)
        .await
        .map_err(|e| MigrateError::SchemaExtraction(format!("tables in '{}': {}", schema, e)))?;

    let before = tables.len();
    tables.retain(|t| migration.table_selected(&t.name));
    if tables.len() != before {
        info!(
            "Table filters selected {} of {} tables",
            tables.len(),
            before
        );
    }

    let mut failures = Vec::new();

    for table in tables.iter_mut() {
        load_table_details(source, table, &mut failures).await;
    }

    let mut enums = record(&mut failures, "enum types", source.load_enums(schema).await)
        .unwrap_or_default();
    for table in &tables {
        for column in &table.columns {
            if let Some(type_name) = &column.enum_type {
                enums.add_usage(type_name, &table.name, &column.name);
            }
        }
    }

    let sequences =
        record(&mut failures, "sequences", source.load_sequences(schema).await).unwrap_or_default();
    let views = record(&mut failures, "views", source.load_views(schema).await).unwrap_or_default();

    let mut triggers =
        record(&mut failures, "triggers", source.load_triggers(schema).await).unwrap_or_default();
    triggers.retain(|t| migration.table_selected(&t.table));

    let routines =
        record(&mut failures, "routines", source.load_routines(schema).await).unwrap_or_default();

    let catalog = Catalog {
        schema: schema.to_string(),
        tables,
        enums,
        sequences,
        views,
        triggers,
        routines,
        failures,
    };

    info!(
        "Catalog '{}': {} tables, {} enums, {} sequences, {} views, {} triggers, {} routines ({} failures)",
        schema,
        catalog.tables.len(),
        catalog.enums.len(),
        catalog.sequences.len(),
        catalog.views.len(),
        catalog.triggers.len(),
        catalog.routines.len(),
        catalog.failures.len()
    );

    Ok(catalog)
}

async fn load_table_details(
    source: &dyn SourcePool,
    table: &mut Table,
    failures: &mut Vec<ExtractionFailure>,
) {
    let name = table.name.clone();

    let result = source.load_foreign_keys(table).await;
    record(failures, &format!("foreign keys on {}", name), result);

    let result = source.load_unique_constraints(table).await;
    record(failures, &format!("unique constraints on {}", name), result);

    let result = source.load_check_constraints(table).await;
    record(failures, &format!("check constraints on {}", name), result);

    let result = source.load_indexes(table).await;
    if record(failures, &format!("indexes on {}", name), result).is_none() {
        return;
    }

    // Only plain indexes are candidates for the bitmap heuristic.
    for index in table.indexes.iter_mut() {
        if index.is_primary || index.is_unique {
            continue;
        }
        let Some(leading) = index.columns.first() else {
            continue;
        };
        let sample = source
            .sample_cardinality(&table.schema, &table.name, leading)
            .await;
        index.cardinality = record(
            failures,
            &format!("cardinality of {}.{}", name, leading),
            sample,
        );
    }
}

/// Keep the value or log and record the failure.
fn record<T>(failures: &mut Vec<ExtractionFailure>, resource: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to extract {}: {}", resource, e);
            failures.push(ExtractionFailure {
                resource: resource.to_string(),
                message: e.to_string(),
            });
            None
        }
    }
}
