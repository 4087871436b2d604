//! Dependency validation, cycle detection and load ordering.

mod graph;
mod resolver;

pub use graph::DependencyGraph;
pub use resolver::{DependencyResolver, LoadPlan};
