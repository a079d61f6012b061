//! Undirected graph over tables connected by known foreign keys (§4.2).
//! An arena of ID-indexed records plus an adjacency map, per the lineage's
//! treatment of cyclic schemas — no direct references between nodes.

use std::collections::{BTreeSet, HashMap, HashSet};

/// A table identified by its fully-qualified `schema.name`, independent of
/// any [`ontology_domain::ids::TableId`] so the graph can be built purely
/// from a `SchemaProbe`'s foreign-key declarations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self { schema: schema.into(), name: name.into() }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyEdge {
    pub source: TableRef,
    pub target: TableRef,
}

/// A maximal set of tables reachable via undirected FK edges, size ≥ 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub tables: BTreeSet<TableRef>,
}

impl Component {
    pub fn size(&self) -> usize {
        self.tables.len()
    }
}

#[derive(Default)]
pub struct TableGraph {
    tables: HashSet<TableRef>,
    adjacency: HashMap<TableRef, BTreeSet<TableRef>>,
}

impl TableGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: TableRef) {
        self.adjacency.entry(table.clone()).or_default();
        self.tables.insert(table);
    }

    /// Adds both endpoints (if not already present) and an undirected edge.
    pub fn add_foreign_key(&mut self, edge: ForeignKeyEdge) {
        self.add_table(edge.source.clone());
        self.add_table(edge.target.clone());
        self.adjacency.entry(edge.source.clone()).or_default().insert(edge.target.clone());
        self.adjacency.entry(edge.target.clone()).or_default().insert(edge.source);
    }

    /// Components sorted by descending size (size ≥ 2); islands (no edges)
    /// sorted lexicographically by qualified name.
    pub fn find_connected_components(&self) -> (Vec<Component>, Vec<TableRef>) {
        let mut visited: HashSet<TableRef> = HashSet::new();
        let mut components = Vec::new();
        let mut islands = Vec::new();

        let mut ordered: Vec<&TableRef> = self.tables.iter().collect();
        ordered.sort();

        for start in ordered {
            if visited.contains(start) {
                continue;
            }
            let mut stack = vec![start.clone()];
            let mut members = BTreeSet::new();
            while let Some(node) = stack.pop() {
                if !visited.insert(node.clone()) {
                    continue;
                }
                members.insert(node.clone());
                if let Some(neighbors) = self.adjacency.get(&node) {
                    for neighbor in neighbors {
                        if !visited.contains(neighbor) {
                            stack.push(neighbor.clone());
                        }
                    }
                }
            }
            if members.len() >= 2 {
                components.push(Component { tables: members });
            } else if let Some(only) = members.into_iter().next() {
                islands.push(only);
            }
        }

        components.sort_by(|a, b| b.size().cmp(&a.size()));
        islands.sort();
        (components, islands)
    }
}
