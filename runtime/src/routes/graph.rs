use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Query,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use tracing::debug;

use super::types::GraphFilterRequest;
use crate::{
    AppState,
    error::AppResult,
    graph::{ExportFormat, FilterManager, GraphData, export_graph},
};

pub fn graph_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/graph/filter", post(filter_graph))
        .route("/api/graph/export", post(export))
}

fn apply(request: GraphFilterRequest) -> GraphData {
    let manager = FilterManager::with_filters(request.filters);
    let filtered = manager.apply_filters(&request.graph);
    debug!(
        nodes_before = request.graph.nodes.len(),
        nodes_after = filtered.nodes.len(),
        edges_after = filtered.edges.len(),
        "graph filtered"
    );
    filtered
}

async fn filter_graph(Json(request): Json<GraphFilterRequest>) -> Json<GraphData> {
    Json(apply(request))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportQuery {
    format: ExportFormat,
}

async fn export(
    Query(query): Query<ExportQuery>,
    Json(request): Json<GraphFilterRequest>,
) -> AppResult<Response> {
    let graph = apply(request);
    let body = export_graph(&graph, query.format)?;

    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(query.format.content_type()),
    );
    let disposition = format!("attachment; filename=\"{}\"", query.format.file_name());
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
