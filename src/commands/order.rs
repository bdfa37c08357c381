use std::fs;
use std::path::Path;

use crate::analysis::DependencyGraph;
use crate::error::{ReconcileError, Result};
use crate::output::OutputHandler;
use crate::schema::TargetSchema;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    pub creation_order: Vec<String>,
    pub dependency_count: usize,
}

/// Resolve and print the table creation order; never touches a database
pub fn execute_order(
    schema: &TargetSchema,
    output_graph: Option<&Path>,
    output: &dyn OutputHandler,
) -> Result<OrderResult> {
    schema.validate()?;
    let graph = DependencyGraph::build(&schema.tables)?;

    if let Some(path) = output_graph {
        // Written before ordering so a cyclic graph can still be inspected
        fs::write(path, graph.to_graphviz()).map_err(|e| ReconcileError::FileWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
            source: e,
        })?;
        output.info(&format!("Dependency graph written to {}", path.display()));
    }

    let creation_order = graph.creation_order()?;

    output.heading(&format!("Table creation order for schema {}", schema.name));
    for (position, table) in creation_order.iter().enumerate() {
        let dependencies = graph.dependencies_of(table);
        let line = if dependencies.is_empty() {
            format!("{:>3}. {}", position + 1, table)
        } else {
            format!("{:>3}. {} (after {})", position + 1, table, dependencies.join(", "))
        };
        output.info(&line);
    }

    Ok(OrderResult {
        creation_order,
        dependency_count: graph.edge_count(),
    })
}
