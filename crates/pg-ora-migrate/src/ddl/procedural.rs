//! Triggers, functions and procedures.
//!
//! Bodies are lifted out of their dollar quotes and run through the rewrite
//! pipelines. The result is a starting point: anything the rules do not cover
//! is listed as a review note on the statement.

use super::rewrite::{dollar_quoted_body, unconverted_constructs, RewritePipeline};
use super::{DdlStatement, StatementKind};
use crate::source::{Routine, RoutineKind, Trigger, TriggerEvent};
use crate::typemap::{clean_default_value, map_type, signature_type, IdentifierMode};
use tracing::debug;

/// Routines provided by the uuid-ossp extension; the target has SYS_GUID.
const UUID_ROUTINES: &[&str] = &[
    "uuid_generate_v1",
    "uuid_generate_v1mc",
    "uuid_generate_v3",
    "uuid_generate_v4",
    "uuid_generate_v5",
    "uuid_nil",
    "uuid_ns_dns",
    "uuid_ns_url",
    "uuid_ns_oid",
    "uuid_ns_x500",
];

fn review_notes(body: &str) -> Vec<String> {
    unconverted_constructs(body)
        .into_iter()
        .map(|c| format!("unconverted construct '{}', review", c))
        .collect()
}

/// The procedural block of a function definition.
///
/// Falls back to the text from the first BEGIN to the last END when the body
/// is not dollar quoted.
fn extract_body(definition: &str) -> String {
    if let Some(body) = dollar_quoted_body(definition) {
        return body.to_string();
    }
    let upper = definition.to_uppercase();
    match (upper.find("BEGIN"), upper.rfind("END")) {
        (Some(start), Some(end)) if end > start => {
            let end = upper[end..].find(';').map(|s| end + s + 1).unwrap_or(end + 3);
            definition[start..end].to_string()
        }
        _ => definition.to_string(),
    }
}

/// Make `body` a complete PL/SQL block ending in `END;`.
fn finish_block(body: &str) -> String {
    let mut body = body.trim().to_string();
    let upper = body.to_uppercase();
    if upper.ends_with("END") {
        body.push(';');
    } else if !upper.ends_with("END;") {
        body.push_str("\nEND;");
    }

    // An empty BEGIN ... END is not valid PL/SQL.
    let upper = body.to_uppercase();
    if let Some(begin) = upper.rfind("BEGIN") {
        let end = upper.len() - "END;".len();
        if end >= begin + 5 && upper[begin + 5..end].trim().is_empty() {
            body.replace_range(begin + 5..end, "\n  NULL;\n");
        }
    }
    body
}

/// CREATE TRIGGER statements; sequence-filling triggers are dropped.
pub(crate) fn trigger_statements(
    triggers: &[Trigger],
    mode: IdentifierMode,
    warnings: &mut Vec<String>,
) -> Vec<DdlStatement> {
    let pipeline = RewritePipeline::trigger_body();
    let mut statements = Vec::new();

    for trigger in triggers {
        let object = format!("{}.{}", trigger.table, trigger.name);
        if trigger.function_definition.to_lowercase().contains("nextval") {
            debug!("Skipping trigger {}: fills a sequence, replaced by identity", object);
            continue;
        }

        let mut notes = Vec::new();
        let events: Vec<&str> = trigger
            .events
            .iter()
            .filter(|e| **e != TriggerEvent::Truncate)
            .map(|e| e.as_sql())
            .collect();
        if events.len() != trigger.events.len() {
            notes.push("TRUNCATE event has no row-trigger equivalent, dropped".to_string());
        }
        if events.is_empty() {
            warnings.push(format!("{}: TRUNCATE-only trigger skipped", object));
            continue;
        }

        let body = pipeline.apply(&extract_body(&trigger.function_definition));
        let body = finish_block(&body);
        notes.extend(review_notes(&body));
        if !trigger.for_each_row && body.contains(":NEW") {
            notes.push("statement-level trigger references :NEW, review".to_string());
        }
        for note in &notes {
            warnings.push(format!("{}: {}", object, note));
        }

        let for_each_row = if trigger.for_each_row { "\nFOR EACH ROW" } else { "" };
        statements.push(DdlStatement {
            kind: StatementKind::Trigger,
            object,
            sql: format!(
                "CREATE OR REPLACE TRIGGER {}\n{} {} ON {}{}\n{}",
                mode.render_truncated(&trigger.name),
                trigger.timing.as_sql(),
                events.join(" OR "),
                mode.render(&trigger.table),
                for_each_row,
                body
            ),
            notes,
        });
    }
    statements
}

/// Whether a routine is dropped instead of converted.
fn skip_reason(routine: &Routine) -> Option<String> {
    let name = routine.name.to_lowercase();
    if UUID_ROUTINES.contains(&name.as_str()) || name.starts_with("uuid_") {
        return Some("uuid helper, replaced by SYS_GUID()".to_string());
    }
    if routine
        .return_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("trigger"))
    {
        return Some("trigger function, inlined into its trigger".to_string());
    }
    if !matches!(routine.language.as_str(), "plpgsql" | "sql") {
        return Some(format!("language '{}' is not convertible", routine.language));
    }
    None
}

/// Split on commas outside parentheses.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// One parameter of `pg_get_function_arguments` output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Parameter {
    mode: &'static str,
    name: String,
    data_type: String,
    default: Option<String>,
}

fn parse_parameter(text: &str, position: usize) -> Parameter {
    let (decl, default) = match find_default(text) {
        Some((at, len)) => (&text[..at], Some(text[at + len..].trim().to_string())),
        None => (text, None),
    };

    let mut rest = decl.trim();
    let mut mode = "IN";
    for (keyword, oracle_mode) in [("INOUT ", "IN OUT"), ("OUT ", "OUT"), ("IN ", "IN"), ("VARIADIC ", "IN")] {
        if rest.len() > keyword.len() && rest[..keyword.len()].eq_ignore_ascii_case(keyword) {
            mode = oracle_mode;
            rest = rest[keyword.len()..].trim_start();
            break;
        }
    }

    // Unnamed parameters are a bare type: "integer", "character varying".
    let (name, data_type) = match rest.split_once(char::is_whitespace) {
        Some((first, tail)) if map_type(rest, None, None, None).lossy => {
            (first.to_string(), tail.trim().to_string())
        }
        _ => (format!("p{}", position), rest.to_string()),
    };

    Parameter {
        mode,
        name,
        data_type,
        default,
    }
}

/// Position and length of the DEFAULT keyword or `=` in a parameter.
fn find_default(text: &str) -> Option<(usize, usize)> {
    let upper = text.to_uppercase();
    if let Some(at) = upper.find(" DEFAULT ") {
        return Some((at, " DEFAULT ".len()));
    }
    text.find(" = ").map(|at| (at, " = ".len()))
}

fn render_parameter(param: &Parameter, mode: IdentifierMode) -> String {
    let mut out = format!(
        "{} {} {}",
        mode.render(&param.name),
        param.mode,
        signature_type(&param.data_type)
    );
    if let Some(default) = &param.default {
        let value = clean_default_value(default).unwrap_or_else(|| default.clone());
        out.push_str(" DEFAULT ");
        out.push_str(&value);
    }
    out
}

/// CREATE FUNCTION / PROCEDURE statements.
pub(crate) fn routine_statements(
    routines: &[Routine],
    mode: IdentifierMode,
    warnings: &mut Vec<String>,
) -> Vec<DdlStatement> {
    let pipeline = RewritePipeline::routine_body();
    let mut statements = Vec::new();

    for routine in routines {
        if let Some(reason) = skip_reason(routine) {
            debug!("Skipping routine {}: {}", routine.name, reason);
            continue;
        }

        let mut notes = Vec::new();
        let params: Vec<String> = split_top_level(&routine.arguments)
            .iter()
            .enumerate()
            .map(|(i, p)| render_parameter(&parse_parameter(p, i + 1), mode))
            .collect();
        let signature = if params.is_empty() {
            String::new()
        } else {
            format!("({})", params.join(", "))
        };

        let return_type = routine.return_type.as_deref().map(str::trim);
        let returns = match (routine.kind, return_type) {
            (RoutineKind::Procedure, _) | (_, None) => None,
            (_, Some(t)) if t.eq_ignore_ascii_case("void") => None,
            (_, Some(t)) if t.to_uppercase().starts_with("SETOF ") || t.to_uppercase().starts_with("TABLE(") => {
                notes.push(format!("returns '{}', converted to SYS_REFCURSOR; review", t));
                Some("SYS_REFCURSOR".to_string())
            }
            (_, Some(t)) => Some(signature_type(t)),
        };

        let mut body = pipeline.apply(&extract_body(&routine.definition));
        if routine.language == "sql" {
            notes.push("SQL-language body wrapped in BEGIN ... END, review".to_string());
            body = format!("BEGIN\n  {}\nEND;", body.trim());
        }
        let body = finish_block(&body);
        notes.extend(review_notes(&body));

        let name = mode.render_truncated(&routine.name);
        let header = match &returns {
            Some(t) => format!("CREATE OR REPLACE FUNCTION {}{} RETURN {}", name, signature, t),
            None => format!("CREATE OR REPLACE PROCEDURE {}{}", name, signature),
        };
        for note in &notes {
            warnings.push(format!("{}: {}", routine.name, note));
        }

        statements.push(DdlStatement {
            kind: StatementKind::Routine,
            object: routine.name.clone(),
            sql: format!("{} IS\n{}", header, body),
            notes,
        });
    }
    statements
}
