//! Schema Dependency Graph
//!
//! petgraph view of the registered schemas. A root-level `schema` reference
//! is an inheritance edge; a `schema` reference on a nested node (a property,
//! a collection element) is a usage edge. Inheritance loops are errors,
//! usage loops are ordinary recursive schemas.

pub mod diagnostics;

pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::registry::SchemaRegistry;
use crate::resolver::SCHEMA_ATTR;
use crate::schema::{SchemaId, SchemaStore};
use crate::value::Value;

/// Relationship between two registered schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// The root of one schema inherits from the other
    Extends,
    /// A nested node of one schema is typed by the other
    Uses,
}

/// `schema` reference naming nothing registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRef {
    pub schema: String,
    pub target: String,
    /// Path of the referencing node
    pub at: String,
}

#[derive(Debug, Clone)]
pub struct SchemaGraph {
    pub(crate) graph: DiGraph<String, EdgeKind>,
    pub(crate) node_indices: HashMap<String, NodeIndex>,
    /// Registered names per root node
    names_by_root: BTreeMap<SchemaId, Vec<String>>,
    unresolved: Vec<UnresolvedRef>,
}

impl SchemaGraph {
    /// Build the graph of every schema in `registry`
    pub fn from_registry(store: &SchemaStore, registry: &SchemaRegistry) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();
        let mut names_by_root: BTreeMap<SchemaId, Vec<String>> = BTreeMap::new();

        for (name, root) in registry.iter() {
            let idx = graph.add_node(name.to_string());
            node_indices.insert(name.to_string(), idx);
            names_by_root.entry(root).or_default().push(name.to_string());
        }

        let mut unresolved = Vec::new();
        let mut edges = HashSet::new();
        for (name, root) in registry.iter() {
            let from = node_indices[name];
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                stack.extend(store.children(id).iter().rev().copied());
                let Some(reference) = store.attribute(id, SCHEMA_ATTR) else {
                    continue;
                };
                let kind = if id == root {
                    EdgeKind::Extends
                } else {
                    EdgeKind::Uses
                };
                let target = match reference {
                    Value::Str(target) if node_indices.contains_key(target) => Some(target.clone()),
                    Value::Str(target) => {
                        unresolved.push(UnresolvedRef {
                            schema: name.to_string(),
                            target: target.clone(),
                            at: store.path(id),
                        });
                        None
                    }
                    Value::Schema(target) => owner_name(store, &names_by_root, *target),
                    _ => None,
                };
                if let Some(target) = target {
                    edges.insert((from, node_indices[&target], kind));
                }
            }
        }

        let mut edges: Vec<_> = edges.into_iter().collect();
        edges.sort_by_key(|(a, b, k)| (a.index(), b.index(), *k == EdgeKind::Uses));
        for (from, to, kind) in edges {
            graph.add_edge(from, to, kind);
        }

        debug!(
            schemas = graph.node_count(),
            edges = graph.edge_count(),
            unresolved = unresolved.len(),
            "Built schema graph"
        );

        Self {
            graph,
            node_indices,
            names_by_root,
            unresolved,
        }
    }

    pub fn schema_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn unresolved(&self) -> &[UnresolvedRef] {
        &self.unresolved
    }

    /// Schemas `name` references, with the kind of reference
    pub fn dependencies(&self, name: &str) -> Vec<(&str, EdgeKind)> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Schemas referencing `name`
    pub fn dependents(&self, name: &str) -> Vec<(&str, EdgeKind)> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<(&str, EdgeKind)> {
        let Some(&idx) = self.node_indices.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<(&str, EdgeKind)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (self.graph[other].as_str(), *e.weight())
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    fn extends_graph(&self) -> DiGraph<String, EdgeKind> {
        self.graph.filter_map(
            |_, name| Some(name.clone()),
            |_, kind| (*kind == EdgeKind::Extends).then_some(*kind),
        )
    }

    /// Registered names ordered so every schema follows the schema it extends
    ///
    /// `None` when inheritance is cyclic.
    pub fn inheritance_order(&self) -> Option<Vec<String>> {
        let extends = self.extends_graph();
        let order = toposort(&extends, None).ok()?;
        Some(order.into_iter().rev().map(|i| extends[i].clone()).collect())
    }

    /// Check the graph for unresolved references, cycles and aliases
    pub fn diagnose(&self) -> Diagnostics {
        let mut diags = Diagnostics::new();

        for r in &self.unresolved {
            diags.unresolved_ref(&r.schema, &r.target, &r.at);
        }

        for names in self.names_by_root.values().filter(|n| n.len() > 1) {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            diags.shared_root(&names);
        }

        let extends = self.extends_graph();
        let mut cyclic = HashSet::new();
        for scc in kosaraju_scc(&extends) {
            if is_cycle(&extends, &scc) {
                diags.inheritance_cycle(&self.member_names(&scc));
                cyclic.extend(scc);
            }
        }

        for scc in kosaraju_scc(&self.graph) {
            if is_cycle(&self.graph, &scc) && !scc.iter().all(|i| cyclic.contains(i)) {
                diags.recursive_schema(&self.member_names(&scc));
            }
        }

        diags
    }

    fn member_names(&self, scc: &[NodeIndex]) -> Vec<String> {
        let mut names: Vec<String> = scc.iter().map(|i| self.graph[*i].clone()).collect();
        names.sort();
        names
    }
}

fn is_cycle(graph: &DiGraph<String, EdgeKind>, scc: &[NodeIndex]) -> bool {
    match scc {
        [single] => graph.contains_edge(*single, *single),
        _ => scc.len() > 1,
    }
}

/// Registered name of the schema tree containing `id`
fn owner_name(
    store: &SchemaStore,
    names_by_root: &BTreeMap<SchemaId, Vec<String>>,
    id: SchemaId,
) -> Option<String> {
    let mut cursor = id;
    while let Some(parent) = store.get(cursor).parent {
        cursor = parent;
    }
    names_by_root.get(&cursor)?.first().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Call;
    use crate::MetaBuilder;

    fn defined(calls: &[Call]) -> MetaBuilder {
        let mut builder = MetaBuilder::new();
        builder.define_all(calls).unwrap();
        builder
    }

    fn extends(name: &str, base: &str) -> Call {
        Call::new(name).attr("schema", base)
    }

    #[test]
    fn test_inheritance_edges_and_order() {
        let builder = defined(&[
            Call::new("base"),
            extends("middle", "base"),
            extends("leaf", "middle"),
        ]);
        let graph = SchemaGraph::from_registry(builder.store(), builder.registry());
        assert_eq!(graph.schema_count(), 3);
        assert_eq!(graph.dependencies("leaf"), vec![("middle", EdgeKind::Extends)]);
        assert_eq!(graph.dependents("base"), vec![("middle", EdgeKind::Extends)]);
        assert_eq!(
            graph.inheritance_order().unwrap(),
            vec!["base".to_string(), "middle".to_string(), "leaf".to_string()]
        );
        assert!(graph.diagnose().is_empty());
    }

    #[test]
    fn test_cycle_and_unresolved() {
        let builder = defined(&[extends("a", "b"), extends("b", "a"), extends("c", "nowhere")]);
        let graph = SchemaGraph::from_registry(builder.store(), builder.registry());
        assert!(graph.inheritance_order().is_none());

        let diags = graph.diagnose();
        let codes: Vec<DiagnosticCode> = diags.all().iter().map(|d| d.code).collect();
        assert!(codes.contains(&DiagnosticCode::UnresolvedRef));
        assert!(codes.contains(&DiagnosticCode::InheritanceCycle));
        assert!(!codes.contains(&DiagnosticCode::RecursiveSchema));
        assert_eq!(graph.unresolved()[0].target, "nowhere");
    }

    #[test]
    fn test_recursive_schema_is_info() {
        let builder = defined(&[Call::new("tree").child(
            Call::new("collections")
                .child(Call::new("kids").child(extends("tree", "tree"))),
        )]);
        let graph = SchemaGraph::from_registry(builder.store(), builder.registry());
        assert_eq!(graph.dependencies("tree"), vec![("tree", EdgeKind::Uses)]);

        let diags = graph.diagnose();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.all()[0].code, DiagnosticCode::RecursiveSchema);
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_shared_root_warning() {
        let mut builder = defined(&[Call::new("a")]);
        let id = builder.get_schema("a").unwrap();
        builder.add_schema("b", id).unwrap();
        let diags = SchemaGraph::from_registry(builder.store(), builder.registry()).diagnose();
        assert_eq!(diags.warning_count(), 1);
    }
}
