use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::{Direction, Graph};
use tracing::debug;

use crate::error::{ReconcileError, Result};
use crate::schema::TableSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// A column of the dependent table references the dependency
    ForeignKey,
    /// Declared on the table spec without a backing foreign key
    Declared,
}

/// Table dependency graph; an edge points from a dependency to its dependent.
///
/// Nodes are inserted in declaration order, so a node's index doubles as its
/// tie-break rank when several tables become ready at once.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: Graph<String, DependencyKind>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn build(tables: &[TableSpec]) -> Result<Self> {
        let mut graph = Graph::new();
        let mut node_map = HashMap::new();

        debug!("Building dependency graph from {} tables", tables.len());

        for table in tables {
            if node_map.contains_key(&table.name) {
                return Err(ReconcileError::InvalidSchema(format!(
                    "duplicate table '{}'",
                    table.name
                )));
            }
            let node = graph.add_node(table.name.clone());
            node_map.insert(table.name.clone(), node);
        }

        for table in tables {
            let dependent = node_map[&table.name];
            for dependency in &table.depends_on {
                if dependency == &table.name {
                    continue;
                }
                let source = *node_map.get(dependency).ok_or_else(|| {
                    ReconcileError::MissingDependency {
                        table: table.name.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                let kind = if table.foreign_keys().any(|(_, fk)| &fk.table == dependency) {
                    DependencyKind::ForeignKey
                } else {
                    DependencyKind::Declared
                };
                debug!("  Creating edge: {} -> {} ({:?})", dependency, table.name, kind);
                graph.add_edge(source, dependent, kind);
            }
        }

        Ok(Self { graph, node_map })
    }

    pub fn has_cycles(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Tables in creation order: dependencies first, ties broken by declaration order
    pub fn creation_order(&self) -> Result<Vec<String>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            let node = NodeIndex::new(idx);
            order.push(self.graph[node].clone());
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                let target = edge.target().index();
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    ready.push(Reverse(target));
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(ReconcileError::CircularDependency(self.describe_cycle()));
        }

        Ok(order)
    }

    fn describe_cycle(&self) -> String {
        let mut components: Vec<Vec<NodeIndex>> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .collect();
        for component in &mut components {
            component.sort();
        }
        components.sort();

        match components.first() {
            Some(component) => {
                let mut names: Vec<&str> = component.iter().map(|n| self.graph[*n].as_str()).collect();
                names.push(names[0]);
                names.join(" -> ")
            }
            None => "unresolvable table ordering".to_string(),
        }
    }

    /// Direct dependencies of a table, in declaration order
    pub fn dependencies_of(&self, table: &str) -> Vec<String> {
        let Some(&node) = self.node_map.get(table) else {
            return vec![];
        };
        let mut deps: Vec<NodeIndex> = self.graph.neighbors_directed(node, Direction::Incoming).collect();
        deps.sort();
        deps.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Output the dependency graph in Graphviz DOT format
    pub fn to_graphviz(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph table_dependencies {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fillcolor=lightcyan];\n\n");

        for node in self.graph.node_indices() {
            output.push_str(&format!("  \"{}\";\n", self.graph[node]));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let style = match edge.weight() {
                DependencyKind::ForeignKey => "solid",
                DependencyKind::Declared => "dashed",
            };
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [style={}];\n",
                self.graph[edge.source()],
                self.graph[edge.target()],
                style
            ));
        }

        output.push_str("}\n");
        output
    }
}

/// Resolve creation order for a table set; a cycle is a configuration error
pub fn resolve_creation_order(tables: &[TableSpec]) -> Result<Vec<String>> {
    DependencyGraph::build(tables)?.creation_order()
}
