//! Foreign key dependency ordering.
//!
//! Tables are sorted so that referenced tables come before the tables
//! referencing them. Cycles are broken silently: whichever table of the
//! cycle is reached first is emitted after its non-cyclic dependencies.

use std::collections::HashMap;

use crate::schema::Table;

/// Dependency graph over the tables of one synchronization run.
#[derive(Debug)]
pub struct DependencyGraph {
    /// For each table (by input position), the tables it references.
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds the graph. Only tables of the same database that take part
    /// in the run produce edges, and self references are ignored.
    #[must_use]
    pub fn new(tables: &[Table]) -> Self {
        let positions: HashMap<(&str, &str), usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| ((t.database(), t.name()), i))
            .collect();

        let edges = tables
            .iter()
            .enumerate()
            .map(|(i, table)| {
                // Dropped tables no longer declare anything; their initial
                // references still matter for ordering.
                let state = if table.is_dropped() {
                    table.initial()
                } else {
                    table.current()
                };
                let mut targets: Vec<usize> = Vec::new();
                for referenced in state.referenced_tables() {
                    if let Some(&j) = positions.get(&(table.database(), referenced)) {
                        if j != i && !targets.contains(&j) {
                            targets.push(j);
                        }
                    }
                }
                targets
            })
            .collect();

        Self { edges }
    }

    /// Tables referenced by the table at `index`.
    #[must_use]
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.edges[index]
    }

    /// Returns input positions in dependency order.
    #[must_use]
    pub fn sort(&self) -> Vec<usize> {
        let mut visited = vec![false; self.edges.len()];
        let mut order = Vec::with_capacity(self.edges.len());
        for start in 0..self.edges.len() {
            self.visit(start, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, node: usize, visited: &mut [bool], order: &mut Vec<usize>) {
        if visited[node] {
            return;
        }
        // Marked before recursing so a cycle leads back here and stops.
        visited[node] = true;
        for &dependency in &self.edges[node] {
            self.visit(dependency, visited, order);
        }
        order.push(node);
    }
}

/// Sorts tables so referenced tables come first.
#[must_use]
pub fn sort_tables(tables: &[Table]) -> Vec<&Table> {
    DependencyGraph::new(tables)
        .sort()
        .into_iter()
        .map(|i| &tables[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    fn table(name: &str, references: &[&str]) -> Table {
        let mut table = Table::new(name, "default", Dialect::Sqlite);
        table.primary("id");
        for target in references {
            let column = format!("{target}_id");
            table.integer(&column);
            table.foreign_key(&column, target, "id");
        }
        table
    }

    fn names(tables: &[Table]) -> Vec<&str> {
        sort_tables(tables).into_iter().map(Table::name).collect()
    }

    #[test]
    fn test_referenced_tables_come_first() {
        let tables = vec![
            table("comments", &["posts", "users"]),
            table("posts", &["users"]),
            table("users", &[]),
        ];
        assert_eq!(names(&tables), vec!["users", "posts", "comments"]);
    }

    #[test]
    fn test_independent_tables_keep_input_order() {
        let tables = vec![table("b", &[]), table("a", &[]), table("c", &[])];
        assert_eq!(names(&tables), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_cycles_and_self_references_terminate() {
        let tables = vec![
            table("a", &["b"]),
            table("b", &["a"]),
            table("tree", &["tree"]),
        ];
        let sorted = names(&tables);
        assert_eq!(sorted.len(), 3);
        assert_eq!(sorted, vec!["b", "a", "tree"]);
    }

    #[test]
    fn test_tables_outside_the_run_are_ignored() {
        let tables = vec![table("posts", &["users"])];
        let graph = DependencyGraph::new(&tables);
        assert!(graph.dependencies(0).is_empty());
    }

    #[test]
    fn test_other_databases_do_not_create_edges() {
        let users = Table::from_state(
            table("users", &[]).current().clone(),
            "archive",
            Dialect::Sqlite,
        );
        let tables = vec![table("posts", &["users"]), users];
        assert!(DependencyGraph::new(&tables).dependencies(0).is_empty());
    }
}
