//! Identifier validation, quoting and truncation.
//!
//! SQL identifiers cannot be bound as parameters, so every table, column and
//! constraint name that ends up in generated SQL goes through one of the
//! functions here.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};

/// Oracle identifier length limit used for generated names.
pub const ORACLE_IDENTIFIER_MAX: usize = 30;

/// Longest identifier accepted from the source catalog.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Oracle reserved words that must be quoted when used as identifiers.
const RESERVED_WORDS: &[&str] = &[
    "access", "add", "all", "alter", "and", "any", "as", "asc", "audit", "between", "by",
    "char", "check", "cluster", "column", "comment", "compress", "connect", "create",
    "current", "date", "decimal", "default", "delete", "desc", "distinct", "drop", "else",
    "exclusive", "exists", "file", "float", "for", "from", "grant", "group", "having",
    "identified", "immediate", "in", "increment", "index", "initial", "insert", "integer",
    "intersect", "into", "is", "level", "like", "lock", "long", "maxextents", "minus",
    "mlslabel", "mode", "modify", "noaudit", "nocompress", "not", "nowait", "null", "number",
    "of", "offline", "on", "online", "option", "or", "order", "pctfree", "prior",
    "privileges", "public", "raw", "rename", "resource", "revoke", "row", "rowid", "rownum",
    "rows", "select", "session", "set", "share", "size", "smallint", "start", "successful",
    "synonym", "sysdate", "table", "then", "to", "trigger", "uid", "union", "unique",
    "update", "user", "validate", "values", "varchar", "varchar2", "view", "whenever",
    "where", "with",
];

/// How identifiers are written into generated DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierMode {
    /// Leave names unquoted (Oracle folds them to upper case) except
    /// reserved words and names that are not plain identifiers.
    #[default]
    ReservedOnly,

    /// Quote every identifier so the source spelling is kept verbatim.
    PreserveCase,
}

impl IdentifierMode {
    /// Render an identifier for generated DDL.
    pub fn render(&self, name: &str) -> String {
        match self {
            IdentifierMode::PreserveCase => quote(name),
            IdentifierMode::ReservedOnly if !is_simple_identifier(name) => quote(name),
            IdentifierMode::ReservedOnly => quote_identifier_if_needed(name),
        }
    }

    /// Render a generated name after truncating it to the Oracle limit.
    pub fn render_truncated(&self, name: &str) -> String {
        self.render(&truncate_identifier(name, ORACLE_IDENTIFIER_MAX))
    }

    /// Render a comma-separated column list.
    pub fn render_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.render(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Whether `name` is an Oracle reserved word (case-insensitive).
pub fn is_reserved_word(name: &str) -> bool {
    let lowered = name.to_lowercase();
    RESERVED_WORDS.contains(&lowered.as_str())
}

/// Quote `name` only when it collides with a reserved word.
///
/// Reserved names are upper-cased inside the quotes so they resolve the same
/// way as the surrounding unquoted (folded) identifiers.
pub fn quote_identifier_if_needed(name: &str) -> String {
    if is_reserved_word(name) {
        quote(&name.to_uppercase())
    } else {
        name.to_string()
    }
}

/// Truncate to at most `max` characters.
pub fn truncate_identifier(name: &str, max: usize) -> String {
    name.chars().take(max).collect()
}

/// Validate an identifier read from the source catalog.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(quote(name))
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Letters, digits, `_`, `$`, `#`, starting with a letter.
fn is_simple_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#'))
}
