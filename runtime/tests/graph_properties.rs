use std::collections::{BTreeSet, HashSet};

use krypton_runtime::graph::{
    AttributeFilter, FilterManager, FilterOperator, GraphData, GraphEdge, GraphFilters, GraphNode,
    NodeType,
};
use proptest::prelude::*;

fn node_type() -> impl Strategy<Value = NodeType> {
    prop_oneof![
        Just(NodeType::Entity),
        Just(NodeType::Document),
        Just(NodeType::Concept),
        Just(NodeType::Fact),
    ]
}

fn edge_type() -> impl Strategy<Value = String> {
    prop_oneof![Just("MENTIONS"), Just("CITES"), Just("RELATED_TO")].prop_map(str::to_string)
}

/// Random graphs whose edges may point at missing nodes too.
fn graph() -> impl Strategy<Value = GraphData> {
    let nodes = proptest::collection::vec((node_type(), "[a-z]{1,6}", 0i64..20), 0..12);
    let edges = proptest::collection::vec((0usize..14, 0usize..14, edge_type()), 0..24);
    (nodes, edges).prop_map(|(nodes, edges)| {
        let nodes: Vec<GraphNode> = nodes
            .into_iter()
            .enumerate()
            .map(|(i, (ty, label, score))| {
                GraphNode::new(format!("n{i}"), label, ty).with_attribute("score", score)
            })
            .collect();
        let edges = edges
            .into_iter()
            .enumerate()
            .map(|(i, (s, t, ty))| GraphEdge::new(format!("e{i}"), format!("n{s}"), format!("n{t}"), ty))
            .collect();
        GraphData::new(nodes, edges)
    })
}

fn filters() -> impl Strategy<Value = GraphFilters> {
    (
        proptest::collection::btree_set(node_type(), 0..3),
        proptest::collection::btree_set(edge_type(), 0..2),
        proptest::option::of("[a-z]{1,2}"),
        proptest::option::of(0i64..20),
    )
        .prop_map(|(entity_types, edge_types, search, min_score)| GraphFilters {
            entity_types,
            edge_types,
            search,
            attributes: min_score
                .map(|n| vec![AttributeFilter::new("score", FilterOperator::Gte, n)])
                .unwrap_or_default(),
            date_range: None,
        })
}

proptest! {
    #[test]
    fn filtered_edges_never_dangle(graph in graph(), filters in filters()) {
        let filtered = FilterManager::with_filters(filters).apply_filters(&graph);
        let ids: HashSet<&str> = filtered.nodes.iter().map(|n| n.id.as_str()).collect();

        for edge in &filtered.edges {
            prop_assert!(ids.contains(edge.source.as_str()));
            prop_assert!(ids.contains(edge.target.as_str()));
        }
        prop_assert_eq!(filtered.metadata.node_count, filtered.nodes.len());
        prop_assert_eq!(filtered.metadata.edge_count, filtered.edges.len());
    }

    #[test]
    fn filtering_only_removes(graph in graph(), filters in filters()) {
        let filtered = FilterManager::with_filters(filters).apply_filters(&graph);
        prop_assert!(filtered.nodes.iter().all(|n| graph.nodes.contains(n)));
        prop_assert!(filtered.edges.iter().all(|e| graph.edges.contains(e)));
    }

    #[test]
    fn empty_filters_keep_every_node(graph in graph()) {
        let filtered = FilterManager::new().apply_filters(&graph);
        prop_assert_eq!(&filtered.nodes, &graph.nodes);
    }

    #[test]
    fn allow_listing_every_type_is_identity(graph in graph()) {
        let filters = GraphFilters {
            entity_types: BTreeSet::from([
                NodeType::Entity,
                NodeType::Document,
                NodeType::Concept,
                NodeType::Fact,
            ]),
            ..GraphFilters::default()
        };
        let everything = FilterManager::with_filters(filters).apply_filters(&graph);
        let nothing = FilterManager::new().apply_filters(&graph);
        prop_assert_eq!(everything, nothing);
    }
}
