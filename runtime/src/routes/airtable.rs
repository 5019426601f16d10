use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;

use super::types::AirtableRecordsResponse;
use crate::{
    AppState,
    airtable::Table,
    error::{AppError, AppResult},
};

pub fn airtable_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/airtable/{table}", get(list_records))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ListQuery {
    filter_by_formula: Option<String>,
}

async fn list_records(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<AirtableRecordsResponse>> {
    let table: Table = table
        .parse()
        .map_err(|err: anyhow::Error| AppError::not_found(err.to_string()))?;
    let client = state
        .airtable
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("Airtable is not configured".to_string()))?;

    let formula = query
        .filter_by_formula
        .as_deref()
        .map(str::trim)
        .filter(|formula| !formula.is_empty());
    let records = client.list_records(table, formula).await?;

    Ok(Json(AirtableRecordsResponse {
        table: table.logical_name().to_string(),
        total: records.len(),
        records,
    }))
}
