use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use tracing::{debug, info};

use super::types::{AcceptSuggestionsRequest, AcceptSuggestionsResponse, SuggestionsResponse};
use crate::{
    AppState,
    airtable::{EdgeTypeDefinition, EntityTypeDefinition},
    error::{AppError, AppResult},
    pipeline::{CachedSuggestions, suggest_for_analysis},
    validation::validate_type_selection,
};

pub fn suggestion_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/documents/{id}/suggestions",
        get(get_suggestions).post(accept_suggestions),
    )
}

async fn get_suggestions(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> AppResult<Json<SuggestionsResponse>> {
    // a re-upload in flight makes any earlier analysis stale
    if state.analyzer.is_active(&document_id).await {
        return Ok(Json(SuggestionsResponse::generating()));
    }

    let analysis = state
        .analyzer
        .get_analysis_result(&document_id)
        .await
        .ok_or_else(|| AppError::not_found(format!("No analysis found for document {document_id}")))?;

    if let Some(cached) = state.suggestions_cache.get(&document_id).await {
        if cached.content_id == analysis.content_id {
            debug!(%document_id, "suggestions served from cache");
            return Ok(Json(SuggestionsResponse::complete(cached.suggestions, true)));
        }
        debug!(%document_id, "cached suggestions predate the current analysis");
    }

    let engine = state
        .engine
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow!("OPENAI_API_KEY is not configured")))?;

    // concurrent misses may both generate; the later put wins
    let suggestions = suggest_for_analysis(engine.as_ref(), &analysis).await?;
    state
        .suggestions_cache
        .insert(
            document_id.clone(),
            CachedSuggestions {
                content_id: analysis.content_id.clone(),
                suggestions: suggestions.clone(),
            },
        )
        .await;

    Ok(Json(SuggestionsResponse::complete(suggestions, false)))
}

async fn accept_suggestions(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
    Json(body): Json<AcceptSuggestionsRequest>,
) -> AppResult<Json<AcceptSuggestionsResponse>> {
    let limits = &state.config.suggestions;
    validate_type_selection(
        body.entity_types.len(),
        body.edge_types.len(),
        limits.max_entity_types,
        limits.max_edge_types,
    )?;

    let entity_types: Vec<EntityTypeDefinition> =
        body.entity_types.into_iter().map(Into::into).collect();
    let edge_types: Vec<EdgeTypeDefinition> =
        body.edge_types.into_iter().map(Into::into).collect();

    let ontology = state
        .ontologies
        .create_from_suggestions(&document_id, &entity_types, &edge_types)
        .await?;
    state.suggestions_cache.remove(&document_id).await;

    info!(
        %document_id,
        ontology_id = %ontology.id,
        entity_types = entity_types.len(),
        edge_types = edge_types.len(),
        "suggestions accepted"
    );

    Ok(Json(AcceptSuggestionsResponse {
        success: true,
        ontology_id: ontology.id,
        entity_types_count: entity_types.len(),
        edge_types_count: edge_types.len(),
    }))
}
