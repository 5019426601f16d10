use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use super::types::{GraphData, GraphEdge, GraphMetadata, GraphNode, NodeType};

/// Node attribute consulted by [`DateRange`].
pub const DATE_ATTRIBUTE: &str = "created_at";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, TS, Serialize)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum FilterOperator {
    Equals,
    Contains,
    Gt,
    Lt,
    Gte,
    Lte,
}

#[derive(Clone, Debug, PartialEq, Deserialize, TS, Serialize)]
#[ts(export)]
pub struct AttributeFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

impl AttributeFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// A node without the attribute never matches.
    pub fn matches(&self, node: &GraphNode) -> bool {
        let Some(actual) = node.attributes.get(&self.field) else {
            return false;
        };

        match self.operator {
            FilterOperator::Equals => stringify(actual) == stringify(&self.value),
            FilterOperator::Contains => stringify(actual)
                .to_lowercase()
                .contains(&stringify(&self.value).to_lowercase()),
            FilterOperator::Gt => compare_numeric(actual, &self.value, |a, b| a > b),
            FilterOperator::Lt => compare_numeric(actual, &self.value, |a, b| a < b),
            FilterOperator::Gte => compare_numeric(actual, &self.value, |a, b| a >= b),
            FilterOperator::Lte => compare_numeric(actual, &self.value, |a, b| a <= b),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, TS, Serialize)]
#[ts(export)]
pub struct DateRange {
    #[serde(default)]
    #[ts(type = "string | null")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Inclusive on both ends.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| instant >= start) && self.end.is_none_or(|end| instant <= end)
    }
}

/// Filter state for one graph view.
///
/// An empty type allow-list means "no type filter selected" and lets every
/// type through. The UI relies on this convention.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, TS, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[ts(export)]
pub struct GraphFilters {
    pub entity_types: BTreeSet<NodeType>,
    pub edge_types: BTreeSet<String>,
    pub search: Option<String>,
    pub attributes: Vec<AttributeFilter>,
    pub date_range: Option<DateRange>,
}

impl GraphFilters {
    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Clone, Debug, Default)]
pub struct FilterManager {
    filters: GraphFilters,
}

impl FilterManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(filters: GraphFilters) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &GraphFilters {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: GraphFilters) {
        self.filters = filters;
    }

    pub fn clear_filters(&mut self) {
        self.filters = GraphFilters::default();
    }

    pub fn has_active_filters(&self) -> bool {
        let filters = &self.filters;
        !filters.entity_types.is_empty()
            || !filters.edge_types.is_empty()
            || filters.search_term().is_some()
            || !filters.attributes.is_empty()
            || filters
                .date_range
                .as_ref()
                .is_some_and(DateRange::is_bounded)
    }

    /// Returns a filtered copy of `graph`; the input is left untouched.
    pub fn apply_filters(&self, graph: &GraphData) -> GraphData {
        let filters = &self.filters;

        let mut nodes: Vec<&GraphNode> = graph
            .nodes
            .iter()
            .filter(|node| {
                filters.entity_types.is_empty() || filters.entity_types.contains(&node.node_type)
            })
            .collect();

        let edges: Vec<&GraphEdge> = graph
            .edges
            .iter()
            .filter(|edge| filters.edge_types.is_empty() || filters.edge_types.contains(&edge.edge_type))
            .collect();

        if let Some(term) = filters.search_term() {
            nodes.retain(|node| node_matches_search(node, &term));
        }

        if !filters.attributes.is_empty() {
            nodes.retain(|node| filters.attributes.iter().all(|predicate| predicate.matches(node)));
        }

        if let Some(range) = filters.date_range.as_ref().filter(|range| range.is_bounded()) {
            nodes.retain(|node| match node_date(node) {
                Some(date) => range.contains(date),
                None => true,
            });
        }

        let surviving: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
        let edges: Vec<GraphEdge> = edges
            .into_iter()
            .filter(|edge| {
                surviving.contains(edge.source.as_str()) && surviving.contains(edge.target.as_str())
            })
            .cloned()
            .collect();
        let nodes: Vec<GraphNode> = nodes.into_iter().cloned().collect();

        GraphData {
            metadata: GraphMetadata {
                node_count: nodes.len(),
                edge_count: edges.len(),
                ..graph.metadata.clone()
            },
            nodes,
            edges,
        }
    }
}

fn node_matches_search(node: &GraphNode, term: &str) -> bool {
    node.label.to_lowercase().contains(term)
        || node.id.to_lowercase().contains(term)
        || node.node_type.as_str().contains(term)
        || node
            .attributes
            .values()
            .any(|value| stringify(value).to_lowercase().contains(term))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn compare_numeric(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (to_number(actual), to_number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn node_date(node: &GraphNode) -> Option<DateTime<Utc>> {
    let raw = node.attributes.get(DATE_ATTRIBUTE)?.as_str()?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
