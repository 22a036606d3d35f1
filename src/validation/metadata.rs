//! Metadata consistency checks and table processing order

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

use crate::error::ArchiveError;
use crate::models::Schema;

/// Result of checking a schema
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataReport {
    #[serde(skip)]
    pub errors: Vec<ArchiveError>,
    pub warnings: Vec<String>,
    /// Table names with referenced tables before the tables referencing
    /// them; schema order when the references form a cycle
    pub processing_order: Vec<String>,
}

impl MetadataReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The first error, for callers that treat any metadata error as fatal
    pub fn into_result(mut self) -> crate::error::Result<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(self.errors.remove(0))
        }
    }
}

/// Foreign key checks over a whole schema
pub struct MetadataValidator;

impl MetadataValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check every foreign key and compute the processing order
    ///
    /// Uses petgraph for the dependency graph between tables.
    pub fn validate(&self, schema: &Schema) -> MetadataReport {
        let mut report = MetadataReport::default();
        let mut graph = DiGraph::<usize, ()>::new();
        let mut node_map: HashMap<String, NodeIndex> = HashMap::new();
        for (i, table) in schema.tables().iter().enumerate() {
            node_map.insert(table.name.to_uppercase(), graph.add_node(i));
        }

        for table in schema.tables() {
            if table.primary_key().is_none() {
                report
                    .warnings
                    .push(format!("table {} has no primary key", table.name));
            }

            for foreign_key in &table.foreign_keys {
                let Some(referenced) = schema.table(&foreign_key.referenced_table) else {
                    report.errors.push(ArchiveError::metadata(
                        &table.name,
                        format!(
                            "foreign key {} references unknown table {}",
                            foreign_key.name, foreign_key.referenced_table
                        ),
                    ));
                    continue;
                };
                let Some(key) = referenced.referenced_key(foreign_key.referenced_key.as_deref())
                else {
                    report.errors.push(ArchiveError::metadata(
                        &table.name,
                        format!(
                            "foreign key {} references key {} which table {} does not define",
                            foreign_key.name,
                            foreign_key.referenced_key.as_deref().unwrap_or("<primary>"),
                            referenced.name
                        ),
                    ));
                    continue;
                };
                if key.components.len() != foreign_key.components.len() {
                    report.errors.push(ArchiveError::metadata(
                        &table.name,
                        format!(
                            "foreign key {} has {} fields but key {} of {} has {}",
                            foreign_key.name,
                            foreign_key.components.len(),
                            key.name,
                            referenced.name,
                            key.components.len()
                        ),
                    ));
                    continue;
                }

                if referenced.name.eq_ignore_ascii_case(&table.name) {
                    continue;
                }
                let from = node_map[&referenced.name.to_uppercase()];
                let to = node_map[&table.name.to_uppercase()];
                graph.update_edge(from, to, ());
            }
        }

        report.processing_order = match dependency_order(&graph) {
            Some(order) => order
                .into_iter()
                .map(|i| schema.tables()[i].name.clone())
                .collect(),
            None => {
                for component in tarjan_scc(&graph).into_iter().filter(|c| c.len() > 1) {
                    let mut names: Vec<&str> = component
                        .iter()
                        .map(|n| schema.tables()[graph[*n]].name.as_str())
                        .collect();
                    names.sort();
                    report.warnings.push(format!(
                        "foreign keys form a cycle between {}",
                        names.join(", ")
                    ));
                }
                schema.tables().iter().map(|t| t.name.clone()).collect()
            }
        };

        for warning in &report.warnings {
            tracing::warn!("{}", warning);
        }
        report
    }
}

impl Default for MetadataValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Topological order preferring schema order among independent tables;
/// `None` when the graph has a cycle
fn dependency_order(graph: &DiGraph<usize, ()>) -> Option<Vec<usize>> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<usize> = graph
        .node_indices()
        .filter(|n| in_degree[n.index()] == 0)
        .map(|n| graph[n])
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        let node = NodeIndex::new(next);
        for dependent in graph.neighbors_directed(node, Direction::Outgoing) {
            in_degree[dependent.index()] -= 1;
            if in_degree[dependent.index()] == 0 {
                ready.insert(graph[dependent]);
            }
        }
    }
    (order.len() == graph.node_count()).then_some(order)
}
