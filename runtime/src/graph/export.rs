use anyhow::Result;
use serde::Deserialize;

use super::types::GraphData;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "graph-export.json",
            ExportFormat::Csv => "graph-export.csv",
        }
    }
}

pub fn export_graph(graph: &GraphData, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_vec_pretty(graph)?),
        ExportFormat::Csv => Ok(to_csv(graph).into_bytes()),
    }
}

/// Nodes and edges share one table, distinguished by the `kind` column.
pub fn to_csv(graph: &GraphData) -> String {
    let mut out = String::from("kind,id,label,type,source,target,weight,attributes\n");

    for node in &graph.nodes {
        let attributes = serde_json::to_string(&node.attributes).unwrap_or_default();
        push_row(
            &mut out,
            &[
                "node",
                &node.id,
                &node.label,
                node.node_type.as_str(),
                "",
                "",
                "",
                &attributes,
            ],
        );
    }

    for edge in &graph.edges {
        let weight = edge.weight.map(|w| w.to_string()).unwrap_or_default();
        let attributes = serde_json::to_string(&edge.attributes).unwrap_or_default();
        push_row(
            &mut out,
            &[
                "edge",
                &edge.id,
                "",
                &edge.edge_type,
                &edge.source,
                &edge.target,
                &weight,
                &attributes,
            ],
        );
    }

    out
}

fn push_row(out: &mut String, fields: &[&str]) {
    let row = fields
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&row);
    out.push('\n');
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
