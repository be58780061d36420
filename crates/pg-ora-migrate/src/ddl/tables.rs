//! CREATE TABLE and table constraints.

use super::enums::{enum_width, EnumCheck};
use super::rewrite::{unconverted_constructs, RewritePipeline};
use super::{DdlStatement, StatementKind};
use crate::source::{Column, Constraint, ConstraintKind, EnumCatalog, Table};
use crate::typemap::{clean_default_value, map_type, IdentifierMode, TypeMapping, IDENTITY_CLAUSE};

/// Target type of a column.
///
/// Precedence: enum type, then sequence-backed or identity integer, then the
/// general type mapping.
pub(crate) fn column_type(column: &Column, enums: &EnumCatalog) -> TypeMapping {
    if let Some(enum_type) = column.enum_type.as_deref().and_then(|n| enums.get(n)) {
        return TypeMapping {
            target_type: format!("VARCHAR2({})", enum_width(enum_type)),
            lossy: false,
            warning: None,
        };
    }

    if column.is_identity || column.has_sequence_default() {
        let number = match column.data_type.to_lowercase().as_str() {
            "smallint" | "int2" => "NUMBER(5)",
            "bigint" | "int8" => "NUMBER(19)",
            _ => "NUMBER(10)",
        };
        return TypeMapping {
            target_type: format!("{} {}", number, IDENTITY_CLAUSE),
            lossy: false,
            warning: None,
        };
    }

    map_type(
        &column.data_type,
        column.max_length,
        column.precision,
        column.scale,
    )
}

/// Column line inside CREATE TABLE.
fn column_definition(
    column: &Column,
    enums: &EnumCatalog,
    mode: IdentifierMode,
    warnings: &mut Vec<String>,
) -> String {
    let mapping = column_type(column, enums);
    if let Some(warning) = &mapping.warning {
        warnings.push(format!("{}.{}: {}", column.table, column.name, warning));
    }

    let mut line = format!("{} {}", mode.render(&column.name), mapping.target_type);
    let is_identity = mapping.target_type.ends_with(IDENTITY_CLAUSE);
    if !is_identity {
        if let Some(default) = column.default.as_deref().and_then(clean_default_value) {
            line.push_str(" DEFAULT ");
            line.push_str(&default);
        }
    }
    if !column.is_nullable {
        line.push_str(" NOT NULL");
    }
    line
}

/// CREATE TABLE for `table`; constraints are emitted separately.
pub(crate) fn create_table(
    table: &Table,
    enums: &EnumCatalog,
    mode: IdentifierMode,
    warnings: &mut Vec<String>,
) -> DdlStatement {
    let columns = table
        .columns
        .iter()
        .map(|c| format!("  {}", column_definition(c, enums, mode, warnings)))
        .collect::<Vec<_>>()
        .join(",\n");

    DdlStatement {
        kind: StatementKind::Table,
        object: table.name.clone(),
        sql: format!("CREATE TABLE {} (\n{}\n)", mode.render(&table.name), columns),
        notes: Vec::new(),
    }
}

/// Primary key, unique, check and foreign key statements for `table`.
pub(crate) fn constraint_statements(
    table: &Table,
    enum_checks: &[EnumCheck],
    mode: IdentifierMode,
    include_checks: bool,
    warnings: &mut Vec<String>,
) -> Vec<DdlStatement> {
    let mut statements = Vec::new();

    for constraint in &table.constraints {
        let statement = match constraint.kind {
            ConstraintKind::PrimaryKey => Some(key_constraint(table, constraint, "PRIMARY KEY", mode)),
            ConstraintKind::Unique => Some(key_constraint(table, constraint, "UNIQUE", mode)),
            ConstraintKind::ForeignKey => foreign_key(table, constraint, mode, warnings),
            ConstraintKind::Check if include_checks => check_constraint(table, constraint, mode),
            ConstraintKind::Check => None,
        };
        statements.extend(statement);
    }

    for check in enum_checks.iter().filter(|c| c.table == table.name) {
        statements.push(DdlStatement {
            kind: StatementKind::Check,
            object: format!("{}.{}", table.name, check.constraint_name),
            sql: check.alter_statement(mode),
            notes: vec![format!("values of enum type {}", check.enum_type)],
        });
    }

    statements
}

fn add_constraint(table: &Table, constraint: &Constraint, mode: IdentifierMode) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {}",
        mode.render(&table.name),
        mode.render_truncated(&constraint.name)
    )
}

fn key_constraint(
    table: &Table,
    constraint: &Constraint,
    keyword: &str,
    mode: IdentifierMode,
) -> DdlStatement {
    let kind = if constraint.kind == ConstraintKind::PrimaryKey {
        StatementKind::PrimaryKey
    } else {
        StatementKind::Unique
    };
    DdlStatement {
        kind,
        object: format!("{}.{}", table.name, constraint.name),
        sql: format!(
            "{} {} ({})",
            add_constraint(table, constraint, mode),
            keyword,
            mode.render_list(&constraint.columns)
        ),
        notes: Vec::new(),
    }
}

fn foreign_key(
    table: &Table,
    constraint: &Constraint,
    mode: IdentifierMode,
    warnings: &mut Vec<String>,
) -> Option<DdlStatement> {
    let object = format!("{}.{}", table.name, constraint.name);
    let Some(ref_table) = constraint.ref_table.as_deref() else {
        warnings.push(format!("{}: foreign key without referenced table, skipped", object));
        return None;
    };

    let mut notes = Vec::new();
    let on_delete = match constraint.on_delete.as_deref() {
        Some("CASCADE") => " ON DELETE CASCADE",
        Some("SET_NULL") => " ON DELETE SET NULL",
        Some("SET_DEFAULT") => {
            notes.push("ON DELETE SET DEFAULT is not supported, rule dropped".to_string());
            warnings.push(format!("{}: ON DELETE SET DEFAULT dropped", object));
            ""
        }
        _ => "",
    };

    Some(DdlStatement {
        kind: StatementKind::ForeignKey,
        object,
        sql: format!(
            "{} FOREIGN KEY ({}) REFERENCES {} ({}){}",
            add_constraint(table, constraint, mode),
            mode.render_list(&constraint.columns),
            mode.render(ref_table),
            mode.render_list(&constraint.ref_columns),
            on_delete
        ),
        notes,
    })
}

fn check_constraint(
    table: &Table,
    constraint: &Constraint,
    mode: IdentifierMode,
) -> Option<DdlStatement> {
    let definition = constraint.definition.as_deref()?;
    let expression = check_expression(definition);
    let notes = unconverted_constructs(&expression)
        .into_iter()
        .map(|c| format!("unconverted construct '{}', review", c))
        .collect();

    Some(DdlStatement {
        kind: StatementKind::Check,
        object: format!("{}.{}", table.name, constraint.name),
        sql: format!(
            "{} CHECK {}",
            add_constraint(table, constraint, mode),
            expression
        ),
        notes,
    })
}

/// `CHECK ((price > (0)::numeric)) NOT VALID` -> `((price > (0)))`.
fn check_expression(definition: &str) -> String {
    let mut expr = definition.trim();
    if expr.len() >= 5 && expr[..5].eq_ignore_ascii_case("CHECK") {
        expr = expr[5..].trim_start();
    }
    if let Some(stripped) = expr.strip_suffix("NOT VALID") {
        expr = stripped.trim_end();
    }
    let rewritten = RewritePipeline::check_expression().apply(expr);
    let rewritten = rewritten.trim();
    if rewritten.starts_with('(') && rewritten.ends_with(')') {
        rewritten.to_string()
    } else {
        format!("({})", rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::enum_checks;
    use crate::source::EnumType;

    fn column(name: &str, data_type: &str) -> Column {
        Column {
            table: "orders".into(),
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            ..Default::default()
        }
    }

    fn enums() -> EnumCatalog {
        let mut enums = EnumCatalog::new();
        enums.insert(EnumType {
            name: "order_status".into(),
            labels: vec!["OPEN".into(), "CLOSED".into()],
            usages: vec![],
        });
        enums
    }

    #[test]
    fn test_column_type_precedence() {
        let mut status = column("status", "order_status");
        status.enum_type = Some("order_status".into());
        assert_eq!(column_type(&status, &enums()).target_type, "VARCHAR2(6)");

        let mut id = column("id", "bigint");
        id.default = Some("nextval('orders_id_seq'::regclass)".into());
        assert_eq!(
            column_type(&id, &enums()).target_type,
            "NUMBER(19) GENERATED BY DEFAULT AS IDENTITY"
        );

        let created = column("created_at", "timestamp without time zone");
        assert_eq!(column_type(&created, &enums()).target_type, "TIMESTAMP");
    }

    #[test]
    fn test_create_table() {
        let mut id = column("id", "integer");
        id.is_identity = true;
        id.is_nullable = false;
        let mut status = column("status", "order_status");
        status.enum_type = Some("order_status".into());
        status.default = Some("'OPEN'::order_status".into());
        let mut paid = column("paid", "boolean");
        paid.default = Some("false".into());

        let table = Table {
            schema: "public".into(),
            name: "orders".into(),
            columns: vec![id, status, paid],
            ..Default::default()
        };

        let mut warnings = Vec::new();
        let stmt = create_table(&table, &enums(), IdentifierMode::ReservedOnly, &mut warnings);
        assert_eq!(
            stmt.sql,
            "CREATE TABLE orders (\n  id NUMBER(10) GENERATED BY DEFAULT AS IDENTITY NOT NULL,\n  status VARCHAR2(6) DEFAULT 'OPEN',\n  paid NUMBER(1) DEFAULT 0\n)"
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unmapped_type_warns() {
        let table = Table {
            name: "hosts".into(),
            columns: vec![Column {
                table: "hosts".into(),
                ..column("addr", "inet")
            }],
            ..Default::default()
        };
        let mut warnings = Vec::new();
        let stmt = create_table(&table, &enums(), IdentifierMode::ReservedOnly, &mut warnings);
        assert!(stmt.sql.contains("addr VARCHAR2(4000)"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("hosts.addr"));
    }

    #[test]
    fn test_constraint_statements() {
        let mut status = column("status", "order_status");
        status.enum_type = Some("order_status".into());
        let table = Table {
            schema: "public".into(),
            name: "orders".into(),
            columns: vec![column("id", "integer"), status],
            constraints: vec![
                Constraint {
                    name: "orders_pkey".into(),
                    kind: ConstraintKind::PrimaryKey,
                    table: "orders".into(),
                    columns: vec!["id".into()],
                    ref_table: None,
                    ref_columns: vec![],
                    on_delete: None,
                    definition: None,
                },
                Constraint {
                    name: "orders_customer_id_fkey".into(),
                    kind: ConstraintKind::ForeignKey,
                    table: "orders".into(),
                    columns: vec!["customer_id".into()],
                    ref_table: Some("customers".into()),
                    ref_columns: vec!["id".into()],
                    on_delete: Some("CASCADE".into()),
                    definition: None,
                },
                Constraint {
                    name: "orders_total_check".into(),
                    kind: ConstraintKind::Check,
                    table: "orders".into(),
                    columns: vec![],
                    ref_table: None,
                    ref_columns: vec![],
                    on_delete: None,
                    definition: Some("CHECK ((total >= (0)::numeric))".into()),
                },
            ],
            indexes: vec![],
        };

        let mut enums = enums();
        enums.add_usage("order_status", "orders", "status");
        let checks = enum_checks(&enums, IdentifierMode::ReservedOnly);

        let mut warnings = Vec::new();
        let stmts = constraint_statements(
            &table,
            &checks,
            IdentifierMode::ReservedOnly,
            true,
            &mut warnings,
        );
        let sql: Vec<_> = stmts.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE orders ADD CONSTRAINT orders_pkey PRIMARY KEY (id)",
                "ALTER TABLE orders ADD CONSTRAINT orders_customer_id_fkey FOREIGN KEY (customer_id) REFERENCES customers (id) ON DELETE CASCADE",
                "ALTER TABLE orders ADD CONSTRAINT orders_total_check CHECK ((total >= (0)))",
                "ALTER TABLE orders ADD CONSTRAINT chk_orders_status CHECK (status IN ('OPEN', 'CLOSED'))",
            ]
        );

        let without_checks = constraint_statements(
            &table,
            &checks,
            IdentifierMode::ReservedOnly,
            false,
            &mut warnings,
        );
        assert_eq!(without_checks.len(), 3);
    }
}
