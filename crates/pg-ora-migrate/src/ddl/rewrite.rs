//! Token-level rewrites from PostgreSQL SQL and PL/pgSQL to Oracle.
//!
//! Each rewrite is a named [`RewriteRule`] that can be applied and tested on
//! its own. A [`RewritePipeline`] fixes the order rules run in for one kind of
//! input; rules that depend on each other are ordered there (casts are
//! stripped before operands are matched, LIKE operators are rewritten before
//! the bare `~` regex operator).

use crate::typemap::strip_casts;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static ROW_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|[^:\w.])(new|old)\.").expect("valid row context pattern")
});

static CURRENT_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcurrent_timestamp\b").expect("valid current_timestamp pattern")
});

static NOW_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bnow\s*\(\s*\)").expect("valid now() pattern"));

static CURRENT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcurrent_date\b").expect("valid current_date pattern"));

static TG_OP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bTG_OP\s*=\s*'(INSERT|UPDATE|DELETE)'").expect("valid TG_OP pattern")
});

static RETURN_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bRETURN\s+(?:NEW|OLD|NULL)\s*;").expect("valid RETURN pattern")
});

static RAISE_EXCEPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bRAISE\s+EXCEPTION\s+'((?:[^']|'')*)'(?:\s*,[^;]*)?")
        .expect("valid RAISE EXCEPTION pattern")
});

static RAISE_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bRAISE\s+(?:NOTICE|INFO|LOG|DEBUG|WARNING)\s+'((?:[^']|'')*)'(?:\s*,[^;]*)?")
        .expect("valid RAISE NOTICE pattern")
});

static SUBSTRING_FROM_FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bSUBSTRING\s*\(\s*([^()]+?)\s+FROM\s+([^()]+?)\s+FOR\s+([^()]+?)\s*\)")
        .expect("valid SUBSTRING FROM FOR pattern")
});

static SUBSTRING_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bSUBSTRING\s*\(\s*([^()]+?)\s+FROM\s+([^()]+?)\s*\)")
        .expect("valid SUBSTRING FROM pattern")
});

static SUBSTRING_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSUBSTRING\s*\(").expect("valid SUBSTRING pattern"));

static POSITION_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bPOSITION\s*\(\s*([^()]+?)\s+IN\s+([^()]+?)\s*\)")
        .expect("valid POSITION pattern")
});

static STRPOS_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSTRPOS\s*\(").expect("valid STRPOS pattern"));

static DOLLAR_QUOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:[A-Za-z_][A-Za-z0-9_]*)?\$").expect("valid dollar quote pattern")
});

static PERFORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bPERFORM\b").expect("valid PERFORM pattern"));

static LEADING_DECLARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*DECLARE\b\s*").expect("valid DECLARE pattern"));

static LIMIT_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLIMIT\s+([\w:]+)\s+OFFSET\s+([\w:]+)").expect("valid LIMIT OFFSET pattern")
});

static OFFSET_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bOFFSET\s+([\w:]+)\s+LIMIT\s+([\w:]+)").expect("valid OFFSET LIMIT pattern")
});

static LIMIT_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s+([\w:]+)").expect("valid LIMIT pattern"));

static OFFSET_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bOFFSET\s+([\w:]+)(\s+ROWS?\b)?").expect("valid OFFSET pattern")
});

static BOOLEAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(true|false)\b").expect("valid boolean pattern"));

const OPERAND: &str = r#"([\w."]+|\([^()]*\))"#;
const RIGHT_OPERAND: &str = r#"('(?:[^']|'')*'|[\w.:"]+|\([^()]*\))"#;

static ILIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i){}\s*(NOT\s+ILIKE|!~~\*|ILIKE|~~\*)\s*{}",
        OPERAND, RIGHT_OPERAND
    ))
    .expect("valid ILIKE pattern")
});

static LIKE_OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!~~|~~)").expect("valid LIKE operator pattern"));

static REGEX_MATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}\s*(!?)~(\*?)\s*{}", OPERAND, RIGHT_OPERAND))
        .expect("valid regex match pattern")
});

static ANY_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*=\s*ANY\s*\(\s*\(?\s*ARRAY\s*\[([^\]]*)\]\s*\)?\s*\)")
        .expect("valid ANY(ARRAY) pattern")
});

/// One named rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteRule {
    /// `x::type` -> `x`.
    CastStrip,
    /// `NEW.col` / `OLD.col` -> `:NEW.col` / `:OLD.col`.
    RowContextPrefix,
    /// `CURRENT_TIMESTAMP` -> `SYSTIMESTAMP`, `now()` -> `SYSDATE`,
    /// `CURRENT_DATE` -> `TRUNC(SYSDATE)`.
    TimestampFunctions,
    /// `TG_OP = 'INSERT'` -> `INSERTING` (and UPDATE / DELETE).
    OperationPredicates,
    /// Drop `RETURN NEW;` / `RETURN OLD;` / `RETURN NULL;`.
    ReturnStrip,
    /// `RAISE EXCEPTION` -> `RAISE_APPLICATION_ERROR`, `RAISE NOTICE` ->
    /// `DBMS_OUTPUT.PUT_LINE`. Format arguments are dropped.
    RaiseCalls,
    /// `SUBSTRING(s FROM a FOR b)` -> `SUBSTR(s, a, b)`,
    /// `POSITION(a IN b)` -> `INSTR(b, a)`, `STRPOS` -> `INSTR`.
    StringFunctions,
    /// Remove `$$` / `$tag$` body delimiters.
    DollarQuoteStrip,
    /// `PERFORM` -> `SELECT`.
    PerformToSelect,
    /// Drop a leading `DECLARE`; routine declarations go after `IS`.
    DeclareStrip,
    /// `LIMIT n OFFSET m` -> `OFFSET m ROWS FETCH NEXT n ROWS ONLY`.
    LimitOffset,
    /// `true` / `false` -> `1` / `0` outside string literals.
    BooleanLiterals,
    /// `a ILIKE b` -> `UPPER(a) LIKE UPPER(b)`; `~~` -> `LIKE`.
    CaseInsensitiveLike,
    /// `a ~ 'p'` -> `REGEXP_LIKE(a, 'p')`, `~*` adds the `'i'` flag.
    RegexMatch,
    /// `x = ANY (ARRAY[...])` -> `x IN (...)`.
    ArrayMembership,
    /// Drop a trailing `;`.
    TrailingDelimiter,
}

impl RewriteRule {
    pub fn name(&self) -> &'static str {
        match self {
            RewriteRule::CastStrip => "cast-strip",
            RewriteRule::RowContextPrefix => "row-context-prefix",
            RewriteRule::TimestampFunctions => "timestamp-functions",
            RewriteRule::OperationPredicates => "operation-predicates",
            RewriteRule::ReturnStrip => "return-strip",
            RewriteRule::RaiseCalls => "raise-calls",
            RewriteRule::StringFunctions => "string-functions",
            RewriteRule::DollarQuoteStrip => "dollar-quote-strip",
            RewriteRule::PerformToSelect => "perform-to-select",
            RewriteRule::DeclareStrip => "declare-strip",
            RewriteRule::LimitOffset => "limit-offset",
            RewriteRule::BooleanLiterals => "boolean-literals",
            RewriteRule::CaseInsensitiveLike => "case-insensitive-like",
            RewriteRule::RegexMatch => "regex-match",
            RewriteRule::ArrayMembership => "array-membership",
            RewriteRule::TrailingDelimiter => "trailing-delimiter",
        }
    }

    /// Apply this rule to `text`.
    pub fn apply(&self, text: &str) -> String {
        match self {
            RewriteRule::CastStrip => strip_casts(text).into_owned(),
            RewriteRule::RowContextPrefix => ROW_CONTEXT
                .replace_all(text, |caps: &Captures| {
                    format!("{}:{}.", &caps[1], caps[2].to_uppercase())
                })
                .into_owned(),
            RewriteRule::TimestampFunctions => {
                let text = CURRENT_TIMESTAMP.replace_all(text, "SYSTIMESTAMP");
                let text = NOW_CALL.replace_all(&text, "SYSDATE");
                CURRENT_DATE.replace_all(&text, "TRUNC(SYSDATE)").into_owned()
            }
            RewriteRule::OperationPredicates => TG_OP
                .replace_all(text, |caps: &Captures| {
                    format!("{}ING", caps[1].to_uppercase().trim_end_matches('E'))
                })
                .into_owned(),
            RewriteRule::ReturnStrip => RETURN_ROW.replace_all(text, "").into_owned(),
            RewriteRule::RaiseCalls => {
                let text =
                    RAISE_EXCEPTION.replace_all(text, "RAISE_APPLICATION_ERROR(-20001, '${1}')");
                RAISE_MESSAGE
                    .replace_all(&text, "DBMS_OUTPUT.PUT_LINE('${1}')")
                    .into_owned()
            }
            RewriteRule::StringFunctions => {
                let text = SUBSTRING_FROM_FOR.replace_all(text, "SUBSTR(${1}, ${2}, ${3})");
                let text = SUBSTRING_FROM.replace_all(&text, "SUBSTR(${1}, ${2})");
                let text = SUBSTRING_CALL.replace_all(&text, "SUBSTR(");
                let text = POSITION_IN.replace_all(&text, "INSTR(${2}, ${1})");
                STRPOS_CALL.replace_all(&text, "INSTR(").into_owned()
            }
            RewriteRule::DollarQuoteStrip => DOLLAR_QUOTE.replace_all(text, "").into_owned(),
            RewriteRule::PerformToSelect => PERFORM.replace_all(text, "SELECT").into_owned(),
            RewriteRule::DeclareStrip => LEADING_DECLARE.replace(text, "").into_owned(),
            RewriteRule::LimitOffset => rewrite_limit_offset(text),
            RewriteRule::BooleanLiterals => map_outside_literals(text, |segment| {
                BOOLEAN
                    .replace_all(segment, |caps: &Captures| {
                        if caps[1].eq_ignore_ascii_case("true") {
                            "1"
                        } else {
                            "0"
                        }
                    })
                    .into_owned()
            }),
            RewriteRule::CaseInsensitiveLike => {
                let text = ILIKE.replace_all(text, |caps: &Captures| {
                    let negated = caps[2].starts_with('!') || caps[2].to_uppercase().starts_with("NOT");
                    format!(
                        "UPPER({}) {}LIKE UPPER({})",
                        &caps[1],
                        if negated { "NOT " } else { "" },
                        &caps[3]
                    )
                });
                LIKE_OPERATOR
                    .replace_all(&text, |caps: &Captures| {
                        if &caps[1] == "!~~" {
                            "NOT LIKE"
                        } else {
                            "LIKE"
                        }
                    })
                    .into_owned()
            }
            RewriteRule::RegexMatch => REGEX_MATCH
                .replace_all(text, |caps: &Captures| {
                    let negated = !caps[2].is_empty();
                    let insensitive = !caps[3].is_empty();
                    format!(
                        "{}REGEXP_LIKE({}, {}{})",
                        if negated { "NOT " } else { "" },
                        &caps[1],
                        &caps[4],
                        if insensitive { ", 'i'" } else { "" }
                    )
                })
                .into_owned(),
            RewriteRule::ArrayMembership => ANY_ARRAY.replace_all(text, " IN (${1})").into_owned(),
            RewriteRule::TrailingDelimiter => text
                .trim_end()
                .trim_end_matches(';')
                .trim_end()
                .to_string(),
        }
    }
}

fn rewrite_limit_offset(text: &str) -> String {
    let text = LIMIT_OFFSET.replace_all(text, "OFFSET ${2} ROWS FETCH NEXT ${1} ROWS ONLY");
    let text = OFFSET_LIMIT.replace_all(&text, "OFFSET ${1} ROWS FETCH NEXT ${2} ROWS ONLY");
    let text = LIMIT_ONLY.replace_all(&text, |caps: &Captures| {
        if caps[1].eq_ignore_ascii_case("all") {
            String::new()
        } else {
            format!("FETCH FIRST {} ROWS ONLY", &caps[1])
        }
    });
    OFFSET_ONLY
        .replace_all(&text, |caps: &Captures| match caps.get(2) {
            Some(_) => caps[0].to_string(),
            None => format!("OFFSET {} ROWS", &caps[1]),
        })
        .into_owned()
}

/// Apply `f` to the parts of `text` outside single-quoted literals.
fn map_outside_literals(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut segment = String::new();
    let mut in_literal = false;

    for c in text.chars() {
        if c == '\'' {
            if in_literal {
                segment.push(c);
                out.push_str(&segment);
            } else {
                out.push_str(&f(&segment));
                segment.clear();
                segment.push(c);
                in_literal = true;
                continue;
            }
            segment.clear();
            in_literal = false;
            continue;
        }
        segment.push(c);
    }

    if in_literal {
        out.push_str(&segment);
    } else {
        out.push_str(&f(&segment));
    }
    out
}

/// An ordered list of rules for one kind of input.
#[derive(Debug, Clone)]
pub struct RewritePipeline {
    rules: Vec<RewriteRule>,
}

impl RewritePipeline {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// Trigger function bodies.
    pub fn trigger_body() -> Self {
        Self::new(vec![
            RewriteRule::DollarQuoteStrip,
            RewriteRule::CastStrip,
            RewriteRule::RowContextPrefix,
            RewriteRule::TimestampFunctions,
            RewriteRule::OperationPredicates,
            RewriteRule::ReturnStrip,
            RewriteRule::RaiseCalls,
            RewriteRule::StringFunctions,
            RewriteRule::PerformToSelect,
        ])
    }

    /// Function and procedure bodies.
    pub fn routine_body() -> Self {
        Self::new(vec![
            RewriteRule::DollarQuoteStrip,
            RewriteRule::DeclareStrip,
            RewriteRule::CastStrip,
            RewriteRule::TimestampFunctions,
            RewriteRule::RaiseCalls,
            RewriteRule::StringFunctions,
            RewriteRule::PerformToSelect,
        ])
    }

    /// Stored view and materialized view queries.
    pub fn view_query() -> Self {
        Self::new(vec![
            RewriteRule::CastStrip,
            RewriteRule::TimestampFunctions,
            RewriteRule::LimitOffset,
            RewriteRule::BooleanLiterals,
            RewriteRule::ArrayMembership,
            RewriteRule::CaseInsensitiveLike,
            RewriteRule::RegexMatch,
            RewriteRule::StringFunctions,
            RewriteRule::TrailingDelimiter,
        ])
    }

    /// CHECK constraint expressions.
    pub fn check_expression() -> Self {
        Self::new(vec![
            RewriteRule::CastStrip,
            RewriteRule::BooleanLiterals,
            RewriteRule::ArrayMembership,
            RewriteRule::CaseInsensitiveLike,
            RewriteRule::RegexMatch,
            RewriteRule::StringFunctions,
        ])
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Run every rule in order.
    pub fn apply(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |acc, rule| rule.apply(&acc))
    }
}

/// PostgreSQL constructs left after rewriting that need a manual look.
pub fn unconverted_constructs(text: &str) -> Vec<&'static str> {
    const MARKERS: &[(&str, &str)] = &[
        ("RETURN QUERY", "RETURN QUERY"),
        ("RETURN NEXT", "RETURN NEXT"),
        ("GET DIAGNOSTICS", "GET DIAGNOSTICS"),
        ("TG_", "trigger special variable"),
        ("ILIKE", "ILIKE"),
        ("::", "cast annotation"),
        ("EXECUTE FORMAT", "dynamic SQL via format()"),
    ];
    let upper = text.to_uppercase();
    MARKERS
        .iter()
        .filter(|(needle, _)| upper.contains(needle))
        .map(|(_, label)| *label)
        .collect()
}

/// Text between the first `$tag$` and its matching close.
pub(crate) fn dollar_quoted_body(text: &str) -> Option<&str> {
    let open = DOLLAR_QUOTE.find(text)?;
    let rest = &text[open.end()..];
    let close = rest.find(open.as_str())?;
    Some(&rest[..close])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_strip() {
        assert_eq!(
            RewriteRule::CastStrip.apply("x::text = 'a'::character varying"),
            "x = 'a'"
        );
    }

    #[test]
    fn test_row_context_prefix() {
        assert_eq!(
            RewriteRule::RowContextPrefix.apply("new.updated_at := old.created_at;"),
            ":NEW.updated_at := :OLD.created_at;"
        );
        // Already prefixed and qualified names are left alone.
        assert_eq!(RewriteRule::RowContextPrefix.apply(":NEW.x"), ":NEW.x");
        assert_eq!(RewriteRule::RowContextPrefix.apply("t.new.x"), "t.new.x");
        assert_eq!(RewriteRule::RowContextPrefix.apply("renew.x"), "renew.x");
    }

    #[test]
    fn test_timestamp_functions() {
        assert_eq!(
            RewriteRule::TimestampFunctions.apply("a := now(); b := CURRENT_TIMESTAMP; c := current_date;"),
            "a := SYSDATE; b := SYSTIMESTAMP; c := TRUNC(SYSDATE);"
        );
    }

    #[test]
    fn test_operation_predicates() {
        assert_eq!(
            RewriteRule::OperationPredicates.apply("IF TG_OP = 'INSERT' THEN"),
            "IF INSERTING THEN"
        );
        assert_eq!(
            RewriteRule::OperationPredicates.apply("tg_op='update' OR TG_OP = 'DELETE'"),
            "UPDATING OR DELETING"
        );
    }

    #[test]
    fn test_return_strip() {
        assert_eq!(
            RewriteRule::ReturnStrip.apply("x := 1;\nRETURN NEW;\n"),
            "x := 1;\n\n"
        );
        assert_eq!(RewriteRule::ReturnStrip.apply("return null;"), "");
        assert_eq!(RewriteRule::ReturnStrip.apply("RETURN total;"), "RETURN total;");
    }

    #[test]
    fn test_raise_calls() {
        assert_eq!(
            RewriteRule::RaiseCalls.apply("RAISE EXCEPTION 'Stock insuffisant';"),
            "RAISE_APPLICATION_ERROR(-20001, 'Stock insuffisant');"
        );
        assert_eq!(
            RewriteRule::RaiseCalls.apply("RAISE NOTICE 'id %', NEW.id;"),
            "DBMS_OUTPUT.PUT_LINE('id %');"
        );
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            RewriteRule::StringFunctions.apply("SUBSTRING(name FROM 2 FOR 3)"),
            "SUBSTR(name, 2, 3)"
        );
        assert_eq!(
            RewriteRule::StringFunctions.apply("substring(name from 2)"),
            "SUBSTR(name, 2)"
        );
        assert_eq!(
            RewriteRule::StringFunctions.apply("SUBSTRING(name, 1, 4)"),
            "SUBSTR(name, 1, 4)"
        );
        assert_eq!(
            RewriteRule::StringFunctions.apply("POSITION('@' IN email)"),
            "INSTR(email, '@')"
        );
        assert_eq!(
            RewriteRule::StringFunctions.apply("strpos(email, '@')"),
            "INSTR(email, '@')"
        );
    }

    #[test]
    fn test_dollar_quote_strip() {
        assert_eq!(
            RewriteRule::DollarQuoteStrip.apply("$function$ BEGIN END; $function$"),
            " BEGIN END; "
        );
        assert_eq!(RewriteRule::DollarQuoteStrip.apply("$$x$$"), "x");
    }

    #[test]
    fn test_perform_to_select() {
        assert_eq!(
            RewriteRule::PerformToSelect.apply("PERFORM log_change(1);"),
            "SELECT log_change(1);"
        );
    }

    #[test]
    fn test_declare_strip() {
        assert_eq!(
            RewriteRule::DeclareStrip.apply("\nDECLARE\n  v INTEGER;\nBEGIN"),
            "v INTEGER;\nBEGIN"
        );
        assert_eq!(RewriteRule::DeclareStrip.apply("BEGIN"), "BEGIN");
    }

    #[test]
    fn test_limit_offset() {
        let rule = RewriteRule::LimitOffset;
        assert_eq!(rule.apply("SELECT 1 LIMIT 10"), "SELECT 1 FETCH FIRST 10 ROWS ONLY");
        assert_eq!(
            rule.apply("SELECT 1 LIMIT 10 OFFSET 5"),
            "SELECT 1 OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            rule.apply("SELECT 1 OFFSET 5 LIMIT 10"),
            "SELECT 1 OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(rule.apply("SELECT 1 OFFSET 5"), "SELECT 1 OFFSET 5 ROWS");
    }

    #[test]
    fn test_boolean_literals_skip_strings() {
        assert_eq!(
            RewriteRule::BooleanLiterals.apply("WHERE active = true AND note = 'true'"),
            "WHERE active = 1 AND note = 'true'"
        );
        assert_eq!(
            RewriteRule::BooleanLiterals.apply("FALSE OR 'it''s true'"),
            "0 OR 'it''s true'"
        );
    }

    #[test]
    fn test_case_insensitive_like() {
        assert_eq!(
            RewriteRule::CaseInsensitiveLike.apply("name ILIKE 'a%'"),
            "UPPER(name) LIKE UPPER('a%')"
        );
        assert_eq!(
            RewriteRule::CaseInsensitiveLike.apply("(c.name ~~* 'a%')"),
            "(UPPER(c.name) LIKE UPPER('a%'))"
        );
        assert_eq!(
            RewriteRule::CaseInsensitiveLike.apply("name !~~* 'a%'"),
            "UPPER(name) NOT LIKE UPPER('a%')"
        );
        assert_eq!(
            RewriteRule::CaseInsensitiveLike.apply("name ~~ 'a%' AND x !~~ 'b'"),
            "name LIKE 'a%' AND x NOT LIKE 'b'"
        );
    }

    #[test]
    fn test_regex_match() {
        assert_eq!(
            RewriteRule::RegexMatch.apply("email ~ '^[a-z]+@'"),
            "REGEXP_LIKE(email, '^[a-z]+@')"
        );
        assert_eq!(
            RewriteRule::RegexMatch.apply("code ~* 'abc'"),
            "REGEXP_LIKE(code, 'abc', 'i')"
        );
        assert_eq!(
            RewriteRule::RegexMatch.apply("code !~ 'x'"),
            "NOT REGEXP_LIKE(code, 'x')"
        );
    }

    #[test]
    fn test_array_membership() {
        assert_eq!(
            RewriteRule::ArrayMembership.apply("((status) = ANY ((ARRAY['a', 'b'])))"),
            "((status) IN ('a', 'b'))"
        );
    }

    #[test]
    fn test_trailing_delimiter() {
        assert_eq!(RewriteRule::TrailingDelimiter.apply(" SELECT 1;  \n"), " SELECT 1");
    }

    #[test]
    fn test_view_pipeline() {
        let query = " SELECT orders.id,\n    orders.status\n   FROM orders\n  WHERE ((orders.status)::text = 'OPEN'::text) AND orders.paid = true\n LIMIT 5;";
        assert_eq!(
            RewritePipeline::view_query().apply(query),
            " SELECT orders.id,\n    orders.status\n   FROM orders\n  WHERE ((orders.status) = 'OPEN') AND orders.paid = 1\n FETCH FIRST 5 ROWS ONLY"
        );
    }

    #[test]
    fn test_check_pipeline() {
        let check = "((status)::text = ANY ((ARRAY['draft'::character varying, 'sent'::character varying])::text[]))";
        assert_eq!(
            RewritePipeline::check_expression().apply(check),
            "((status) IN ('draft', 'sent'))"
        );
    }

    #[test]
    fn test_trigger_pipeline() {
        let body = "\nBEGIN\n  IF TG_OP = 'UPDATE' THEN\n    NEW.updated_at := now();\n  END IF;\n  RETURN NEW;\nEND;\n";
        let out = RewritePipeline::trigger_body().apply(body);
        assert!(out.contains("IF UPDATING THEN"));
        assert!(out.contains(":NEW.updated_at := SYSDATE;"));
        assert!(!out.contains("RETURN NEW"));
    }

    #[test]
    fn test_pipeline_order_is_explicit() {
        let names: Vec<_> = RewritePipeline::check_expression()
            .rules()
            .iter()
            .map(|r| r.name())
            .collect();
        assert_eq!(names[0], "cast-strip");
        let like = names.iter().position(|n| *n == "case-insensitive-like").unwrap();
        let regex = names.iter().position(|n| *n == "regex-match").unwrap();
        assert!(like < regex);
    }

    #[test]
    fn test_unconverted_constructs() {
        assert!(unconverted_constructs("RETURN QUERY SELECT 1").contains(&"RETURN QUERY"));
        assert!(unconverted_constructs("x := 1;").is_empty());
    }

    #[test]
    fn test_dollar_quoted_body() {
        let def = "CREATE FUNCTION f() RETURNS int AS $fn$\nBEGIN RETURN 1; END;\n$fn$ LANGUAGE plpgsql";
        assert_eq!(dollar_quoted_body(def), Some("\nBEGIN RETURN 1; END;\n"));
        assert_eq!(dollar_quoted_body("no body"), None);
    }
}
