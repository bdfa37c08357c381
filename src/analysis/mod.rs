pub mod graph;

pub use graph::{resolve_creation_order, DependencyGraph, DependencyKind};
