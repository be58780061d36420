//! Catalog descriptors shared across the conversion and transfer layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything read from the source catalog for one schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Source schema name.
    pub schema: String,
    /// Base tables with columns, constraints and indexes.
    pub tables: Vec<Table>,
    /// Enum types and where they are used.
    pub enums: EnumCatalog,
    /// Sequences.
    pub sequences: Vec<Sequence>,
    /// Views and materialized views.
    pub views: Vec<View>,
    /// Triggers with their function bodies.
    pub triggers: Vec<Trigger>,
    /// Functions and procedures.
    pub routines: Vec<Routine>,
    /// Sub-resources that could not be read.
    pub failures: Vec<ExtractionFailure>,
}

impl Catalog {
    /// Find a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// A catalog sub-resource that failed to load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionFailure {
    /// Which sub-resource (e.g. "views", "indexes on orders").
    pub resource: String,
    /// Error text.
    pub message: String,
}

/// Table metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<Column>,
    /// Primary key, unique, foreign key and check constraints.
    pub constraints: Vec<Constraint>,
    /// Indexes, including constraint-backed ones.
    pub indexes: Vec<Index>,
}

impl Table {
    /// Schema-qualified name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary key constraint, if any.
    pub fn primary_key(&self) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
    }

    /// Primary key column names (empty without a primary key).
    pub fn primary_key_columns(&self) -> Vec<String> {
        self.primary_key()
            .map(|pk| pk.columns.clone())
            .unwrap_or_default()
    }

    /// Foreign key constraints.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::ForeignKey)
    }
}

/// Column metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Column {
    /// Owning table name.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Source type name as reported by `information_schema.columns.data_type`,
    /// with `USER-DEFINED` and `ARRAY` resolved through `udt_name`.
    pub data_type: String,
    /// `udt_name` from the catalog.
    pub udt_name: String,
    /// Declared character length.
    pub max_length: Option<i32>,
    /// Numeric precision.
    pub precision: Option<i32>,
    /// Numeric scale.
    pub scale: Option<i32>,
    /// Whether NULLs are allowed.
    pub is_nullable: bool,
    /// Default expression text.
    pub default: Option<String>,
    /// `GENERATED ... AS IDENTITY` column.
    pub is_identity: bool,
    /// Enum type name when the column is enum-typed.
    pub enum_type: Option<String>,
    /// 1-based position.
    pub ordinal_pos: i32,
}

impl Column {
    /// Whether the default advances a sequence (serial columns).
    pub fn has_sequence_default(&self) -> bool {
        self.default
            .as_deref()
            .map(|d| d.to_lowercase().contains("nextval("))
            .unwrap_or(false)
    }

    /// How values of this column arrive from the source reader.
    pub fn value_kind(&self) -> ValueKind {
        if self.enum_type.is_some() {
            return ValueKind::Enum;
        }
        ValueKind::from_type_name(&self.data_type)
    }
}

/// Coarse classification of source values, used by the reader and coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Text,
    Bytes,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Json,
    Interval,
    Array,
    Enum,
    /// Read as text (xml, network types, ...).
    Other,
}

impl ValueKind {
    /// Classify a PostgreSQL type name.
    pub fn from_type_name(type_name: &str) -> Self {
        let t = type_name.trim().to_lowercase();
        if t.ends_with("[]") || t.starts_with('_') || t == "array" {
            return ValueKind::Array;
        }
        match t.as_str() {
            "boolean" | "bool" => ValueKind::Boolean,
            "smallint" | "int2" => ValueKind::SmallInt,
            "integer" | "int" | "int4" => ValueKind::Integer,
            "bigint" | "int8" => ValueKind::BigInt,
            "real" | "float4" => ValueKind::Real,
            "double precision" | "float8" => ValueKind::Double,
            "numeric" | "decimal" | "money" => ValueKind::Numeric,
            "character varying" | "varchar" | "character" | "char" | "bpchar" | "text"
            | "name" | "citext" => ValueKind::Text,
            "bytea" => ValueKind::Bytes,
            "uuid" => ValueKind::Uuid,
            "timestamp" | "timestamp without time zone" => ValueKind::Timestamp,
            "timestamptz" | "timestamp with time zone" => ValueKind::TimestampTz,
            "date" => ValueKind::Date,
            "time" | "time without time zone" => ValueKind::Time,
            "json" | "jsonb" => ValueKind::Json,
            "interval" => ValueKind::Interval,
            _ => ValueKind::Other,
        }
    }
}

/// Kind of table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

/// Table constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint name as in the source.
    pub name: String,
    /// Kind.
    pub kind: ConstraintKind,
    /// Owning table.
    pub table: String,
    /// Constrained columns in key order.
    pub columns: Vec<String>,
    /// Referenced table (foreign keys).
    pub ref_table: Option<String>,
    /// Referenced columns (foreign keys).
    pub ref_columns: Vec<String>,
    /// Delete rule (foreign keys): NO_ACTION, RESTRICT, CASCADE, SET_NULL, SET_DEFAULT.
    pub on_delete: Option<String>,
    /// Constraint definition text (checks).
    pub definition: Option<String>,
}

/// Distinct/total sample for an index's leading column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityStats {
    /// Rows in the table.
    pub total_rows: i64,
    /// Distinct values of the leading column.
    pub distinct_values: i64,
}

impl CardinalityStats {
    /// Distinct/total ratio; an empty table counts as fully selective.
    pub fn ratio(&self) -> f64 {
        if self.total_rows <= 0 {
            1.0
        } else {
            self.distinct_values as f64 / self.total_rows as f64
        }
    }
}

/// Index metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Owning table.
    pub table: String,
    /// Key columns in order (expression keys are omitted).
    pub columns: Vec<String>,
    /// Access method (btree, hash, gin, gist, ...).
    pub access_method: String,
    /// UNIQUE index.
    pub is_unique: bool,
    /// Backs the primary key.
    pub is_primary: bool,
    /// Backs a UNIQUE constraint.
    pub backs_unique_constraint: bool,
    /// Cardinality sample; `None` when sampling failed or was not needed.
    pub cardinality: Option<CardinalityStats>,
}

/// Column reference used by enum usages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

/// An enum type with its labels in catalog sort order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnumType {
    /// Type name.
    pub name: String,
    /// Labels ordered by `enumsortorder`.
    pub labels: Vec<String>,
    /// Columns typed with this enum.
    pub usages: Vec<ColumnRef>,
}

/// Enum types keyed by type name.
///
/// Built by extraction and passed explicitly to everything that needs enum
/// information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnumCatalog {
    types: BTreeMap<String, EnumType>,
}

impl EnumCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enum type (replacing any previous definition).
    pub fn insert(&mut self, enum_type: EnumType) {
        self.types.insert(enum_type.name.clone(), enum_type);
    }

    /// Record that `table.column` is typed with `type_name`.
    pub fn add_usage(&mut self, type_name: &str, table: &str, column: &str) {
        if let Some(t) = self.types.get_mut(type_name) {
            let usage = ColumnRef {
                table: table.to_string(),
                column: column.to_string(),
            };
            if !t.usages.contains(&usage) {
                t.usages.push(usage);
            }
        }
    }

    /// Look up an enum type by name.
    pub fn get(&self, type_name: &str) -> Option<&EnumType> {
        self.types.get(type_name)
    }

    /// All enum types ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &EnumType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Who owns a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceOwnership {
    /// Owned by a serial or identity column.
    Automatic { table: String, column: String },
    /// Standalone sequence used explicitly by application code.
    Manual,
}

/// Sequence metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub start_value: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub increment: i64,
    pub cycle: bool,
    /// Last value handed out; `None` if the sequence was never called.
    pub last_value: Option<i64>,
    pub ownership: SequenceOwnership,
}

impl Sequence {
    /// The value the converted sequence should start at.
    pub fn next_value(&self) -> i64 {
        match self.last_value {
            Some(last) => last.saturating_add(self.increment),
            None => self.start_value,
        }
    }
}

/// View or materialized view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    /// Stored query text.
    pub definition: String,
    pub materialized: bool,
}

/// When a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

impl TriggerTiming {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        }
    }
}

/// Statement that fires a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl TriggerEvent {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::Delete => "DELETE",
            TriggerEvent::Truncate => "TRUNCATE",
        }
    }
}

/// Trigger metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub table: String,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    pub for_each_row: bool,
    /// Name of the trigger function.
    pub function_name: String,
    /// `pg_get_functiondef` output of the trigger function.
    pub function_definition: String,
}

/// Function or procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutineKind {
    Function,
    Procedure,
}

/// Routine metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    pub kind: RoutineKind,
    /// `pg_get_function_arguments` output.
    pub arguments: String,
    /// `pg_get_function_result` output (`None` for procedures).
    pub return_type: Option<String>,
    /// Implementation language (plpgsql, sql, ...).
    pub language: String,
    /// `pg_get_functiondef` output.
    pub definition: String,
}
