//! Bulk enable/disable of target foreign keys around a data load.

use crate::error::Result;
use crate::target::{ForeignKeyRef, TargetPool};
use serde::Serialize;
use tracing::{info, warn};

/// A constraint that could not be toggled.
#[derive(Debug, Clone, Serialize)]
pub struct ToggleFailure {
    pub table: String,
    pub constraint: String,
    pub message: String,
}

/// Outcome of one bulk toggle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToggleReport {
    /// Constraints that needed a change.
    pub attempted: usize,
    /// Constraints changed.
    pub toggled: usize,
    pub failures: Vec<ToggleFailure>,
}

impl ToggleReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Enables or disables every foreign key in the target schema.
///
/// Individual failures are logged and collected; only a failure to list the
/// constraints is returned as an error.
pub struct ConstraintToggle<'a> {
    target: &'a dyn TargetPool,
}

impl<'a> ConstraintToggle<'a> {
    pub fn new(target: &'a dyn TargetPool) -> Self {
        Self { target }
    }

    /// Disable every enabled foreign key.
    pub async fn disable_all(&self) -> Result<ToggleReport> {
        let report = self.set_all(false).await?;
        info!(
            "Disabled {} of {} foreign keys",
            report.toggled, report.attempted
        );
        Ok(report)
    }

    /// Enable every disabled foreign key. Constraints whose existing rows
    /// violate them stay disabled and are reported.
    pub async fn enable_all(&self) -> Result<ToggleReport> {
        let report = self.set_all(true).await?;
        if report.is_clean() {
            info!("Re-enabled {} foreign keys", report.toggled);
        } else {
            warn!(
                "Re-enabled {} of {} foreign keys, {} failed",
                report.toggled,
                report.attempted,
                report.failed()
            );
        }
        Ok(report)
    }

    async fn set_all(&self, enabled: bool) -> Result<ToggleReport> {
        let keys: Vec<ForeignKeyRef> = self
            .target
            .list_foreign_keys()
            .await?
            .into_iter()
            .filter(|fk| fk.enabled != enabled)
            .collect();

        let mut report = ToggleReport {
            attempted: keys.len(),
            ..Default::default()
        };
        for fk in keys {
            match self
                .target
                .set_constraint_enabled(&fk.table, &fk.name, enabled)
                .await
            {
                Ok(()) => report.toggled += 1,
                Err(e) => {
                    warn!(
                        "Could not {} {} on {}: {}",
                        if enabled { "enable" } else { "disable" },
                        fk.name,
                        fk.table,
                        e
                    );
                    report.failures.push(ToggleFailure {
                        table: fk.table,
                        constraint: fk.name,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }
}
