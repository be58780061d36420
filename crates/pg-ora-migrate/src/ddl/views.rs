//! Views and materialized views.

use super::rewrite::{unconverted_constructs, RewritePipeline};
use super::{DdlStatement, StatementKind};
use crate::source::View;
use crate::typemap::IdentifierMode;
use std::collections::HashSet;

/// Statements for all views, ordered so a view follows the views it reads.
pub(crate) fn view_statements(
    views: &[View],
    mode: IdentifierMode,
    warnings: &mut Vec<String>,
) -> Vec<DdlStatement> {
    let pipeline = RewritePipeline::view_query();
    order_views(views)
        .into_iter()
        .map(|view| {
            let query = pipeline.apply(view.definition.trim());
            let notes: Vec<String> = unconverted_constructs(&query)
                .into_iter()
                .map(|c| format!("unconverted construct '{}', review", c))
                .collect();
            for note in &notes {
                warnings.push(format!("{}: {}", view.name, note));
            }

            let name = mode.render(&view.name);
            let (kind, sql) = if view.materialized {
                (
                    StatementKind::MaterializedView,
                    format!(
                        "CREATE MATERIALIZED VIEW {}\nBUILD IMMEDIATE\nREFRESH COMPLETE ON DEMAND\nAS\n{}",
                        name,
                        query.trim()
                    ),
                )
            } else {
                (
                    StatementKind::View,
                    format!("CREATE OR REPLACE VIEW {} AS\n{}", name, query.trim()),
                )
            };

            DdlStatement {
                kind,
                object: view.name.clone(),
                sql,
                notes,
            }
        })
        .collect()
}

/// Depth-first order over textual references between views.
fn order_views(views: &[View]) -> Vec<&View> {
    fn visit<'a>(
        view: &'a View,
        views: &'a [View],
        visited: &mut HashSet<&'a str>,
        ordered: &mut Vec<&'a View>,
    ) {
        if !visited.insert(view.name.as_str()) {
            return;
        }
        for other in views {
            if other.name != view.name && references(&view.definition, &other.name) {
                visit(other, views, visited, ordered);
            }
        }
        ordered.push(view);
    }

    let mut visited = HashSet::new();
    let mut ordered = Vec::with_capacity(views.len());
    for view in views {
        visit(view, views, &mut visited, &mut ordered);
    }
    ordered
}

/// Whether `query` mentions `name` as a whole word.
fn references(query: &str, name: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let query = query.to_lowercase();
    let name = name.to_lowercase();
    query.match_indices(&name).any(|(at, _)| {
        let before = query[..at].chars().next_back();
        let after = query[at + name.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(name: &str, definition: &str, materialized: bool) -> View {
        View {
            name: name.into(),
            definition: definition.into(),
            materialized,
        }
    }

    #[test]
    fn test_view_statements() {
        let views = vec![
            view(
                "open_orders",
                " SELECT orders.id\n   FROM orders\n  WHERE orders.status = 'OPEN'::order_status;",
                false,
            ),
            view(
                "daily_totals",
                " SELECT date_trunc('day', created_at) AS day, sum(total) AS total FROM orders GROUP BY 1;",
                true,
            ),
        ];
        let mut warnings = Vec::new();
        let stmts = view_statements(&views, IdentifierMode::ReservedOnly, &mut warnings);

        assert_eq!(stmts[0].kind, StatementKind::View);
        assert_eq!(
            stmts[0].sql,
            "CREATE OR REPLACE VIEW open_orders AS\nSELECT orders.id\n   FROM orders\n  WHERE orders.status = 'OPEN'"
        );
        assert_eq!(stmts[1].kind, StatementKind::MaterializedView);
        assert!(stmts[1]
            .sql
            .starts_with("CREATE MATERIALIZED VIEW daily_totals\nBUILD IMMEDIATE\nREFRESH COMPLETE ON DEMAND\nAS\n"));
    }

    #[test]
    fn test_dependent_view_follows_dependency() {
        let views = vec![
            view("big_open_orders", "SELECT * FROM open_orders WHERE total > 100", false),
            view("open_orders", "SELECT * FROM orders", false),
            view("open_orders_v2", "SELECT * FROM orders", false),
        ];
        let names: Vec<_> = order_views(&views).iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["open_orders", "big_open_orders", "open_orders_v2"]);
    }

    #[test]
    fn test_references_whole_word() {
        assert!(references("select * from open_orders", "open_orders"));
        assert!(!references("select * from open_orders_v2", "open_orders"));
    }
}
