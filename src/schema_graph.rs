//! The schema graph: tables, columns, and foreign-key edges, plus the
//! connectivity queries the join-forest search and Shape Suggestion need.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("foreign key on table '{table}' references unknown table '{referenced}'")]
    UnknownTable { table: String, referenced: String },

    #[error("foreign key column '{column}' not found on table '{table}'")]
    UnknownColumn { table: String, column: String },
}

/// A directed foreign-key edge, oriented from referencing (child) table to
/// referenced (parent) table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FkEdge {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
}

impl FkEdge {
    pub fn new(
        child_table: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            child_table: child_table.into(),
            child_column: child_column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
        }
    }

    /// The other table touched by this edge, given one endpoint.
    pub fn other_table(&self, from: &str) -> Option<&str> {
        if self.child_table == from {
            Some(&self.parent_table)
        } else if self.parent_table == from {
            Some(&self.child_table)
        } else {
            None
        }
    }
}

/// Metadata about a single table, as supplied by schema reflection
/// (out of scope for this crate — assumed to be produced externally).
#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub name: String,
    pub columns: BTreeSet<String>,
    pub primary_key: BTreeSet<String>,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>, columns: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().collect(),
            primary_key: BTreeSet::new(),
        }
    }
}

/// The static, read-only graph of tables and FK edges for the lifetime of a
/// `QueryEngine`.
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    tables: HashMap<String, TableMetadata>,
    edges: BTreeSet<FkEdge>,
    /// Undirected adjacency, table -> sorted edges incident to it, built once.
    adjacency: HashMap<String, Vec<FkEdge>>,
}

impl SchemaGraph {
    /// Build the graph from reflected metadata. Fails if any FK edge
    /// references a table or column absent from `tables`.
    pub fn build(
        tables: Vec<TableMetadata>,
        edges: Vec<FkEdge>,
    ) -> Result<Self, SchemaError> {
        let tables: HashMap<String, TableMetadata> =
            tables.into_iter().map(|t| (t.name.clone(), t)).collect();

        for edge in &edges {
            let child = tables
                .get(&edge.child_table)
                .ok_or_else(|| SchemaError::UnknownTable {
                    table: edge.child_table.clone(),
                    referenced: edge.child_table.clone(),
                })?;
            if !child.columns.contains(&edge.child_column) {
                return Err(SchemaError::UnknownColumn {
                    table: edge.child_table.clone(),
                    column: edge.child_column.clone(),
                });
            }
            let parent = tables
                .get(&edge.parent_table)
                .ok_or_else(|| SchemaError::UnknownTable {
                    table: edge.child_table.clone(),
                    referenced: edge.parent_table.clone(),
                })?;
            if !parent.columns.contains(&edge.parent_column) {
                return Err(SchemaError::UnknownColumn {
                    table: edge.parent_table.clone(),
                    column: edge.parent_column.clone(),
                });
            }
        }

        let edges: BTreeSet<FkEdge> = edges.into_iter().collect();

        let mut adjacency: HashMap<String, Vec<FkEdge>> = HashMap::new();
        for edge in &edges {
            adjacency
                .entry(edge.child_table.clone())
                .or_default()
                .push(edge.clone());
            adjacency
                .entry(edge.parent_table.clone())
                .or_default()
                .push(edge.clone());
        }
        for edges in adjacency.values_mut() {
            edges.sort();
            edges.dedup();
        }

        Ok(Self {
            tables,
            edges,
            adjacency,
        })
    }

    pub fn tables(&self) -> BTreeSet<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn columns(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.tables.get(table).map(|t| &t.columns)
    }

    pub fn edges_incident(&self, table: &str) -> &[FkEdge] {
        self.adjacency
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Breadth-first shortest path between two tables on the undirected
    /// view of the graph. Ties are broken by the sorted order of edges
    /// incident to each frontier table, making the result deterministic.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<FkEdge>> {
        if from == to {
            return Some(Vec::new());
        }
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(from);
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(from);
        let mut came_from: HashMap<&str, &FkEdge> = HashMap::new();

        while let Some(current) = queue.pop_front() {
            for edge in self.edges_incident(current) {
                if let Some(next) = edge.other_table(current) {
                    if visited.contains(next) {
                        continue;
                    }
                    visited.insert(next);
                    came_from.insert(next, edge);
                    if next == to {
                        return Some(reconstruct_path(&came_from, from, to));
                    }
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Partition a requested set of tables into mutually-reachable groups.
    pub fn connected_components<'a>(
        &self,
        table_set: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Vec<String>> {
        let requested: BTreeSet<&str> = table_set.into_iter().collect();
        let mut assigned: HashSet<&str> = HashSet::new();
        let mut components: Vec<Vec<String>> = Vec::new();

        for &table in &requested {
            if assigned.contains(table) {
                continue;
            }
            let mut component = vec![table];
            assigned.insert(table);
            let mut queue: VecDeque<&str> = VecDeque::new();
            queue.push_back(table);
            let mut visited: HashSet<&str> = HashSet::new();
            visited.insert(table);
            while let Some(current) = queue.pop_front() {
                for edge in self.edges_incident(current) {
                    if let Some(next) = edge.other_table(current) {
                        if visited.insert(next) {
                            queue.push_back(next);
                            if requested.contains(next) && assigned.insert(next) {
                                component.push(next);
                            }
                        }
                    }
                }
            }
            component.sort();
            components.push(component.into_iter().map(String::from).collect());
        }
        components
    }
}

fn reconstruct_path<'a>(
    came_from: &HashMap<&'a str, &'a FkEdge>,
    from: &'a str,
    to: &'a str,
) -> Vec<FkEdge> {
    let mut path = Vec::new();
    let mut current = to;
    while current != from {
        let edge = came_from[current];
        path.push(edge.clone());
        current = edge.other_table(current).unwrap_or(from);
    }
    path.reverse();
    path
}
