//! Column default expression cleaning.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static CAST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"::\s*(?:"[^"]+"|[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)(?:\s+varying|\s+precision|\s+with(?:out)?\s+time\s+zone)?(?:\s*\(\s*\d+(?:\s*,\s*\d+)?\s*\))?(?:\[\])*"#,
    )
    .expect("valid cast pattern")
});

static ENUM_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*[A-Za-z_][A-Za-z0-9_]*\.[A-Za-z_][A-Za-z0-9_]*\s*\)")
        .expect("valid enum reference pattern")
});

static UUID_GENERATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:uuid_generate_v4|gen_random_uuid)\s*\(\s*\)")
        .expect("valid uuid generator pattern")
});

static CURRENT_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bnow\s*\(\s*\)|\bcurrent_timestamp\b(?:\s*\(\s*\d*\s*\))?|\blocaltimestamp\b")
        .expect("valid timestamp pattern")
});

static BOOLEAN_CAST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\(*\s*'([^']*)'\s*::\s*bool(?:ean)?\s*\)*$")
        .expect("valid boolean cast pattern")
});

static CURRENT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcurrent_date\b").expect("valid date pattern"));

/// Convert a PostgreSQL column default into an Oracle DEFAULT expression.
///
/// Returns `None` when nothing usable survives, in which case the DEFAULT
/// clause is omitted. Sequence-advance defaults are always dropped because
/// the column becomes an identity column instead.
pub fn clean_default_value(expr: &str) -> Option<String> {
    if expr.to_lowercase().contains("nextval(") {
        return None;
    }
    if let Some(bit) = boolean_literal(expr.trim()) {
        return Some(bit.to_string());
    }

    let stripped = strip_casts(expr);
    let stripped = ENUM_REF.replace_all(&stripped, "");
    let mut value = unwrap_parens(stripped.trim()).to_string();

    match value.to_lowercase().as_str() {
        "false" => return Some("0".to_string()),
        "true" => return Some("1".to_string()),
        "null" | "" => return None,
        _ => {}
    }

    value = UUID_GENERATOR.replace_all(&value, "SYS_GUID()").into_owned();
    value = CURRENT_TIMESTAMP.replace_all(&value, "SYSTIMESTAMP").into_owned();
    value = CURRENT_DATE.replace_all(&value, "TRUNC(SYSDATE)").into_owned();

    let value = value.trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// `'t'::boolean` and the other quoted spellings PostgreSQL accepts, as 0/1.
fn boolean_literal(expr: &str) -> Option<u8> {
    let caps = BOOLEAN_CAST.captures(expr)?;
    match caps[1].trim().to_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Some(1),
        "f" | "false" | "n" | "no" | "off" | "0" => Some(0),
        _ => None,
    }
}

/// Remove `::type` cast annotations, including multi-word and array types.
pub(crate) fn strip_casts(expr: &str) -> Cow<'_, str> {
    CAST.replace_all(expr, "")
}

/// Drop redundant outer parentheses: `('x')` -> `'x'`.
fn unwrap_parens(mut s: &str) -> &str {
    while s.starts_with('(') && s.ends_with(')') && encloses_whole(s) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

fn encloses_whole(s: &str) -> bool {
    let mut depth = 0;
    let mut in_literal = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => {
                depth -= 1;
                if depth == 0 && i != s.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
