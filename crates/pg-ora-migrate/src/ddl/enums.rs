//! Enum columns become bounded strings guarded by an IN-list check.

use crate::source::{EnumCatalog, EnumType};
use crate::typemap::IdentifierMode;

/// Replacement for one enum-typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumCheck {
    pub table: String,
    pub column: String,
    /// Source enum type, kept for review notes.
    pub enum_type: String,
    /// Rendered constraint name, `chk_<table>_<column>` cut to 30 characters.
    pub constraint_name: String,
    /// `CHECK (col IN ('A', 'B'))`.
    pub check_clause: String,
}

impl EnumCheck {
    /// `ALTER TABLE ... ADD CONSTRAINT ...` for the check.
    pub fn alter_statement(&self, mode: IdentifierMode) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {}",
            mode.render(&self.table),
            self.constraint_name,
            self.check_clause
        )
    }
}

/// Width of the replacement column in bytes.
///
/// VARCHAR2 defaults to byte semantics, so multi-byte labels are measured in
/// bytes rather than characters.
pub fn enum_width(enum_type: &EnumType) -> usize {
    enum_type
        .labels
        .iter()
        .map(|l| l.len())
        .max()
        .unwrap_or(0)
        .max(1)
}

/// Build the bounded string type and check clause for `table.column`.
pub fn enum_to_check(
    enum_type: &EnumType,
    table: &str,
    column: &str,
    mode: IdentifierMode,
) -> EnumCheck {
    let labels = enum_type
        .labels
        .iter()
        .map(|l| format!("'{}'", l.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ");

    EnumCheck {
        table: table.to_string(),
        column: column.to_string(),
        enum_type: enum_type.name.clone(),
        constraint_name: mode.render_truncated(&format!("chk_{}_{}", table, column)),
        check_clause: format!("CHECK ({} IN ({}))", mode.render(column), labels),
    }
}

/// Checks for every recorded usage of every enum type.
pub fn enum_checks(enums: &EnumCatalog, mode: IdentifierMode) -> Vec<EnumCheck> {
    enums
        .iter()
        .flat_map(|e| {
            e.usages
                .iter()
                .map(move |u| enum_to_check(e, &u.table, &u.column, mode))
        })
        .collect()
}
