//! Heuristic bridge-table suggestion for the `FindJoinForest.Heuristic`
//! primitive (spec.md §4.H).

use std::collections::{BTreeMap, BTreeSet};

use crate::schema_graph::SchemaGraph;

/// Given a set of referenced tables, propose a minimal bridging table set:
/// compute pairwise shortest paths, collect the union of intermediate
/// tables, and return them sorted by frequency (most shared first). Per
/// spec.md §9 Open Question (b), these tables are never meant to enter a
/// SELECT list — only FROM/JOIN.
pub fn suggest_bridge_tables(schema: &SchemaGraph, tables: &BTreeSet<String>) -> Vec<String> {
    let mut frequency: BTreeMap<String, usize> = BTreeMap::new();
    let ordered: Vec<&String> = tables.iter().collect();

    for i in 0..ordered.len() {
        for j in (i + 1)..ordered.len() {
            let Some(path) = schema.shortest_path(ordered[i], ordered[j]) else {
                continue;
            };
            for edge in &path {
                for candidate in [&edge.child_table, &edge.parent_table] {
                    if !tables.contains(candidate) {
                        *frequency.entry(candidate.clone()).or_insert(0) += 1;
                    }
                }
            }
        }
    }

    let mut bridges: Vec<(String, usize)> = frequency.into_iter().collect();
    bridges.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    bridges.into_iter().map(|(name, _)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_graph::{FkEdge, TableMetadata};

    #[test]
    fn suggests_shared_bridge_table() {
        let schema = SchemaGraph::build(
            vec![
                TableMetadata::new("a", ["id".into()]),
                TableMetadata::new("bridge", ["id".into(), "a_id".into(), "c_id".into()]),
                TableMetadata::new("c", ["id".into()]),
            ],
            vec![
                FkEdge::new("bridge", "a_id", "a", "id"),
                FkEdge::new("bridge", "c_id", "c", "id"),
            ],
        )
        .unwrap();
        let tables: BTreeSet<String> = ["a".to_string(), "c".to_string()].into_iter().collect();
        let bridges = suggest_bridge_tables(&schema, &tables);
        assert_eq!(bridges, vec!["bridge".to_string()]);
    }

    #[test]
    fn no_bridge_needed_when_directly_connected() {
        let schema = SchemaGraph::build(
            vec![
                TableMetadata::new("customers", ["id".into()]),
                TableMetadata::new("orders", ["id".into(), "customer_id".into()]),
            ],
            vec![FkEdge::new("orders", "customer_id", "customers", "id")],
        )
        .unwrap();
        let tables: BTreeSet<String> =
            ["customers".to_string(), "orders".to_string()].into_iter().collect();
        assert!(suggest_bridge_tables(&schema, &tables).is_empty());
    }
}
