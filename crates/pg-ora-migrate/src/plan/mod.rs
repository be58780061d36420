//! Table load order from foreign key dependencies.

use crate::source::Table;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// A foreign key edge that closes a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleEdge {
    /// Referencing table.
    pub from: String,
    /// Referenced table, already on the current DFS path.
    pub to: String,
}

/// Order in which tables are loaded.
///
/// For every foreign key `A -> B` between distinct tables, `B` comes before
/// `A` unless the edge is listed in [`TableLoadPlan::cycles`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableLoadPlan {
    pub order: Vec<String>,
    /// Back edges found during the traversal.
    pub cycles: Vec<CycleEdge>,
}

impl TableLoadPlan {
    /// Position of `table` in the order.
    pub fn position(&self, table: &str) -> Option<usize> {
        self.order.iter().position(|t| t == table)
    }

    /// The order reversed, for deletes.
    pub fn reverse_order(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current path.
    Visiting,
    Done,
}

/// Adjacency: table -> tables it references. Self references and references
/// to tables outside `tables` are dropped.
pub fn dependency_graph(tables: &[Table]) -> BTreeMap<String, BTreeSet<String>> {
    let known: BTreeSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    let mut graph = BTreeMap::new();
    for table in tables {
        let mut deps = BTreeSet::new();
        for fk in table.foreign_keys() {
            let Some(target) = fk.ref_table.as_deref() else {
                continue;
            };
            if target == table.name {
                continue;
            }
            if known.contains(target) {
                deps.insert(target.to_string());
            } else {
                debug!(
                    "{}: foreign key {} references {} outside the load set",
                    table.name, fk.name, target
                );
            }
        }
        graph.insert(table.name.clone(), deps);
    }
    graph
}

/// Post-order depth-first traversal: a table is appended after everything it
/// references. Starts are taken in the given table order.
pub fn plan_load_order(tables: &[Table]) -> TableLoadPlan {
    let graph = dependency_graph(tables);
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut plan = TableLoadPlan::default();

    fn visit<'a>(
        table: &'a str,
        graph: &'a BTreeMap<String, BTreeSet<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        plan: &mut TableLoadPlan,
    ) {
        marks.insert(table, Mark::Visiting);
        if let Some(deps) = graph.get(table) {
            for dep in deps {
                match marks.get(dep.as_str()) {
                    None => visit(dep, graph, marks, plan),
                    Some(Mark::Visiting) => plan.cycles.push(CycleEdge {
                        from: table.to_string(),
                        to: dep.clone(),
                    }),
                    Some(Mark::Done) => {}
                }
            }
        }
        marks.insert(table, Mark::Done);
        plan.order.push(table.to_string());
    }

    for table in tables {
        if !marks.contains_key(table.name.as_str()) {
            visit(&table.name, &graph, &mut marks, &mut plan);
        }
    }

    for edge in &plan.cycles {
        warn!(
            "Foreign key cycle: {} -> {} (order cannot satisfy this edge; constraints stay disabled during load)",
            edge.from, edge.to
        );
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Constraint, ConstraintKind};

    fn table(name: &str, refs: &[&str]) -> Table {
        Table {
            schema: "public".into(),
            name: name.into(),
            constraints: refs
                .iter()
                .map(|r| Constraint {
                    name: format!("{}_{}_fk", name, r),
                    kind: ConstraintKind::ForeignKey,
                    table: name.into(),
                    columns: vec![format!("{}_id", r)],
                    ref_table: Some(r.to_string()),
                    ref_columns: vec!["id".into()],
                    on_delete: None,
                    definition: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_chain_referenced_first() {
        let tables = vec![table("a", &["b"]), table("b", &["c"]), table("c", &[])];
        let plan = plan_load_order(&tables);
        assert_eq!(plan.order, vec!["c", "b", "a"]);
        assert!(!plan.has_cycles());
    }

    #[test]
    fn test_every_edge_respected() {
        let tables = vec![
            table("order_lines", &["orders", "products"]),
            table("orders", &["customers"]),
            table("products", &["categories"]),
            table("customers", &[]),
            table("categories", &[]),
            table("audit", &[]),
        ];
        let plan = plan_load_order(&tables);
        assert_eq!(plan.order.len(), tables.len());
        for t in &tables {
            for fk in t.foreign_keys() {
                let referenced = fk.ref_table.as_deref().unwrap();
                assert!(plan.position(referenced) < plan.position(&t.name));
            }
        }
    }

    #[test]
    fn test_self_reference_ignored() {
        let tables = vec![table("employees", &["employees"])];
        let plan = plan_load_order(&tables);
        assert_eq!(plan.order, vec!["employees"]);
        assert!(!plan.has_cycles());
    }

    #[test]
    fn test_cycle_detected_and_terminates() {
        let tables = vec![table("a", &["b"]), table("b", &["a"]), table("c", &["a"])];
        let plan = plan_load_order(&tables);
        assert_eq!(plan.order, vec!["b", "a", "c"]);
        assert_eq!(
            plan.cycles,
            vec![CycleEdge {
                from: "b".into(),
                to: "a".into()
            }]
        );
    }

    #[test]
    fn test_unknown_reference_dropped() {
        let tables = vec![table("orders", &["customers"])];
        let graph = dependency_graph(&tables);
        assert!(graph["orders"].is_empty());
        assert_eq!(plan_load_order(&tables).reverse_order(), vec!["orders"]);
    }
}
