//! Type mapping between PostgreSQL and Oracle.

mod defaults;
mod identifier;

pub use defaults::clean_default_value;
pub(crate) use defaults::strip_casts;
pub use identifier::{
    is_reserved_word, quote_identifier_if_needed, quote_pg, truncate_identifier,
    validate_identifier, IdentifierMode, ORACLE_IDENTIFIER_MAX,
};

/// Fallback for source types with no Oracle equivalent.
pub const FALLBACK_TYPE: &str = "VARCHAR2(4000)";

/// Identity clause appended to auto-increment integer columns.
pub const IDENTITY_CLAUSE: &str = "GENERATED BY DEFAULT AS IDENTITY";

const VARCHAR2_MAX: i32 = 4000;
const CHAR_MAX: i32 = 2000;
const NUMBER_MAX_PRECISION: i32 = 38;

/// Result of mapping one source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Oracle type string.
    pub target_type: String,
    /// True when the mapping may lose data or semantics.
    pub lossy: bool,
    /// Why the mapping needs review, if it does.
    pub warning: Option<String>,
}

impl TypeMapping {
    fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            lossy: false,
            warning: None,
        }
    }

    fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            lossy: true,
            warning: Some(warning.into()),
        }
    }
}

/// Map a PostgreSQL type to an Oracle type string.
///
/// Total over its input: unknown types fall back to [`FALLBACK_TYPE`].
pub fn convert_type(
    source_type: &str,
    length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> String {
    map_type(source_type, length, precision, scale).target_type
}

/// Map a PostgreSQL type, reporting whether the conversion needs review.
pub fn map_type(
    source_type: &str,
    length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> TypeMapping {
    let (base, modifiers) = split_modifiers(source_type);
    let length = length.or(modifiers.0);
    let precision = precision.or(modifiers.0);
    let scale = scale.or(modifiers.1);

    if base.ends_with("[]") || base.starts_with('_') || base == "array" {
        return TypeMapping::lossless("CLOB");
    }

    match base.as_str() {
        // Integers
        "smallint" | "int2" => TypeMapping::lossless("NUMBER(5)"),
        "integer" | "int" | "int4" => TypeMapping::lossless("NUMBER(10)"),
        "bigint" | "int8" => TypeMapping::lossless("NUMBER(19)"),

        // Auto-increment integers become identity columns
        "smallserial" | "serial2" => TypeMapping::lossless(format!("NUMBER(5) {}", IDENTITY_CLAUSE)),
        "serial" | "serial4" => TypeMapping::lossless(format!("NUMBER(10) {}", IDENTITY_CLAUSE)),
        "bigserial" | "serial8" => TypeMapping::lossless(format!("NUMBER(19) {}", IDENTITY_CLAUSE)),

        // Fixed point
        "numeric" | "decimal" => map_numeric(precision, scale),
        "money" => TypeMapping::lossless("NUMBER(19,2)"),

        // Floating point
        "real" | "float4" => TypeMapping::lossless("BINARY_FLOAT"),
        "double precision" | "float8" | "float" => TypeMapping::lossless("BINARY_DOUBLE"),

        // Character
        "character varying" | "varchar" => match length.filter(|l| *l > 0) {
            Some(l) if l > VARCHAR2_MAX => TypeMapping::lossy(
                "CLOB",
                format!("varchar({}) exceeds VARCHAR2 limit, mapped to CLOB", l),
            ),
            Some(l) => TypeMapping::lossless(format!("VARCHAR2({})", l)),
            None => TypeMapping::lossless("VARCHAR2(4000)"),
        },
        "character" | "char" | "bpchar" => match length.filter(|l| *l > 0) {
            Some(l) if l > CHAR_MAX => TypeMapping::lossy(
                "CLOB",
                format!("char({}) exceeds CHAR limit, mapped to CLOB", l),
            ),
            Some(l) => TypeMapping::lossless(format!("CHAR({})", l)),
            None => TypeMapping::lossless("CHAR(1)"),
        },
        "text" => TypeMapping::lossless("CLOB"),

        // Binary
        "bytea" => TypeMapping::lossless("BLOB"),

        // Date/time
        "date" => TypeMapping::lossless("DATE"),
        "timestamp" | "timestamp without time zone" => TypeMapping::lossless("TIMESTAMP"),
        "timestamptz" | "timestamp with time zone" => {
            TypeMapping::lossless("TIMESTAMP WITH TIME ZONE")
        }
        "time" | "time without time zone" => TypeMapping::lossless("TIMESTAMP"),
        "timetz" | "time with time zone" => TypeMapping::lossless("TIMESTAMP WITH TIME ZONE"),
        "interval" => TypeMapping::lossless("INTERVAL DAY TO SECOND"),

        // Boolean as a single-digit code
        "boolean" | "bool" => TypeMapping::lossless("NUMBER(1)"),

        // Identifiers and documents
        "uuid" => TypeMapping::lossless("VARCHAR2(36)"),
        "json" | "jsonb" => TypeMapping::lossless("CLOB"),
        "xml" => TypeMapping::lossless("XMLTYPE"),

        other => TypeMapping::lossy(
            FALLBACK_TYPE,
            format!("unmapped source type '{}', using {}", other, FALLBACK_TYPE),
        ),
    }
}

fn map_numeric(precision: Option<i32>, scale: Option<i32>) -> TypeMapping {
    match precision.filter(|p| *p > 0) {
        Some(p) if p > NUMBER_MAX_PRECISION => TypeMapping::lossy(
            "NUMBER",
            format!("numeric precision {} exceeds 38, using unconstrained NUMBER", p),
        ),
        Some(p) => match scale.filter(|s| *s > 0) {
            Some(s) => TypeMapping::lossless(format!("NUMBER({},{})", p, s)),
            None => TypeMapping::lossless(format!("NUMBER({})", p)),
        },
        None => TypeMapping::lossless("NUMBER"),
    }
}

/// Oracle type for a routine parameter or return value.
///
/// PL/SQL signatures take no size constraints, so `NUMBER(10)` becomes
/// `NUMBER` and the identity clause is dropped.
pub fn signature_type(source_type: &str) -> String {
    let mapped = convert_type(source_type, None, None, None);
    let without_identity = mapped.replace(IDENTITY_CLAUSE, "");
    let mut out = String::with_capacity(without_identity.len());
    let mut depth = 0;
    for c in without_identity.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Split `numeric(10,2)` into `("numeric", (Some(10), Some(2)))`.
fn split_modifiers(source_type: &str) -> (String, (Option<i32>, Option<i32>)) {
    let lowered = source_type.trim().to_lowercase();
    let Some(open) = lowered.find('(') else {
        return (lowered, (None, None));
    };
    let Some(close) = lowered[open..].find(')').map(|c| c + open) else {
        return (lowered, (None, None));
    };

    let mut args = lowered[open + 1..close]
        .split(',')
        .map(|a| a.trim().parse::<i32>().ok());
    let first = args.next().flatten();
    let second = args.next().flatten();

    // "timestamp(3) without time zone" keeps its trailing words
    let base = format!("{}{}", lowered[..open].trim_end(), &lowered[close + 1..]);
    (base.trim().to_string(), (first, second))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_types() {
        assert_eq!(convert_type("smallint", None, None, None), "NUMBER(5)");
        assert_eq!(convert_type("int2", None, None, None), "NUMBER(5)");
        assert_eq!(convert_type("integer", None, Some(32), Some(0)), "NUMBER(10)");
        assert_eq!(convert_type("int4", None, None, None), "NUMBER(10)");
        assert_eq!(convert_type("bigint", None, None, None), "NUMBER(19)");
        assert_eq!(convert_type("int8", None, None, None), "NUMBER(19)");
    }

    #[test]
    fn test_serial_types() {
        assert_eq!(
            convert_type("serial", None, None, None),
            "NUMBER(10) GENERATED BY DEFAULT AS IDENTITY"
        );
        assert_eq!(
            convert_type("bigserial", None, None, None),
            "NUMBER(19) GENERATED BY DEFAULT AS IDENTITY"
        );
        assert_eq!(
            convert_type("smallserial", None, None, None),
            "NUMBER(5) GENERATED BY DEFAULT AS IDENTITY"
        );
    }

    #[test]
    fn test_numeric_types() {
        assert_eq!(convert_type("numeric", None, Some(10), Some(2)), "NUMBER(10,2)");
        assert_eq!(convert_type("numeric", None, Some(10), Some(0)), "NUMBER(10)");
        assert_eq!(convert_type("decimal", None, None, None), "NUMBER");
        assert_eq!(convert_type("numeric(12,4)", None, None, None), "NUMBER(12,4)");
        assert_eq!(convert_type("money", None, None, None), "NUMBER(19,2)");
        assert!(map_type("numeric", None, Some(60), Some(2)).lossy);
    }

    #[test]
    fn test_floating_types() {
        assert_eq!(convert_type("real", None, None, None), "BINARY_FLOAT");
        assert_eq!(convert_type("float4", None, None, None), "BINARY_FLOAT");
        assert_eq!(convert_type("double precision", None, None, None), "BINARY_DOUBLE");
        assert_eq!(convert_type("float8", None, None, None), "BINARY_DOUBLE");
    }

    #[test]
    fn test_character_types() {
        assert_eq!(convert_type("character varying", Some(100), None, None), "VARCHAR2(100)");
        assert_eq!(convert_type("varchar", None, None, None), "VARCHAR2(4000)");
        assert_eq!(convert_type("varchar(50)", None, None, None), "VARCHAR2(50)");
        assert_eq!(convert_type("character", Some(3), None, None), "CHAR(3)");
        assert_eq!(convert_type("bpchar", None, None, None), "CHAR(1)");
        assert_eq!(convert_type("text", None, None, None), "CLOB");

        let wide = map_type("varchar", Some(10000), None, None);
        assert_eq!(wide.target_type, "CLOB");
        assert!(wide.lossy);
    }

    #[test]
    fn test_binary_type() {
        assert_eq!(convert_type("bytea", None, None, None), "BLOB");
    }

    #[test]
    fn test_datetime_types() {
        assert_eq!(convert_type("date", None, None, None), "DATE");
        assert_eq!(convert_type("timestamp", None, None, None), "TIMESTAMP");
        assert_eq!(
            convert_type("timestamp without time zone", None, None, None),
            "TIMESTAMP"
        );
        assert_eq!(
            convert_type("timestamp with time zone", None, None, None),
            "TIMESTAMP WITH TIME ZONE"
        );
        assert_eq!(convert_type("timestamptz", None, None, None), "TIMESTAMP WITH TIME ZONE");
        assert_eq!(
            convert_type("timestamp(3) without time zone", None, None, None),
            "TIMESTAMP"
        );
        assert_eq!(convert_type("time", None, None, None), "TIMESTAMP");
        assert_eq!(
            convert_type("time with time zone", None, None, None),
            "TIMESTAMP WITH TIME ZONE"
        );
        assert_eq!(convert_type("interval", None, None, None), "INTERVAL DAY TO SECOND");
    }

    #[test]
    fn test_special_types() {
        assert_eq!(convert_type("boolean", None, None, None), "NUMBER(1)");
        assert_eq!(convert_type("bool", None, None, None), "NUMBER(1)");
        assert_eq!(convert_type("uuid", None, None, None), "VARCHAR2(36)");
        assert_eq!(convert_type("json", None, None, None), "CLOB");
        assert_eq!(convert_type("jsonb", None, None, None), "CLOB");
        assert_eq!(convert_type("xml", None, None, None), "XMLTYPE");
        assert_eq!(convert_type("integer[]", None, None, None), "CLOB");
        assert_eq!(convert_type("_text", None, None, None), "CLOB");
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let mapping = map_type("tsvector", None, None, None);
        assert_eq!(mapping.target_type, FALLBACK_TYPE);
        assert!(mapping.lossy);
        assert!(mapping.warning.unwrap().contains("tsvector"));
    }

    #[test]
    fn test_case_insensitive_input() {
        assert_eq!(convert_type("INTEGER", None, None, None), "NUMBER(10)");
        assert_eq!(convert_type(" Boolean ", None, None, None), "NUMBER(1)");
    }

    #[test]
    fn test_signature_type() {
        assert_eq!(signature_type("integer"), "NUMBER");
        assert_eq!(signature_type("character varying"), "VARCHAR2");
        assert_eq!(signature_type("numeric(10,2)"), "NUMBER");
        assert_eq!(signature_type("serial"), "NUMBER");
        assert_eq!(signature_type("timestamp with time zone"), "TIMESTAMP WITH TIME ZONE");
        assert_eq!(signature_type("text"), "CLOB");
    }
}
