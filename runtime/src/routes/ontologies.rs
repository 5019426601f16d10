use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use crate::{
    AppState,
    airtable::{NewOntology, Ontology, OntologyStatus},
    error::{AppError, AppResult},
};

pub fn ontology_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ontologies", get(list_ontologies).post(create_ontology))
        .route("/api/ontologies/{id}/publish", post(publish))
        .route("/api/ontologies/{id}/deprecate", post(deprecate))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListQuery {
    domain: Option<String>,
    status: Option<String>,
}

async fn list_ontologies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Ontology>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OntologyStatus>)
        .transpose()
        .map_err(|err| AppError::validation(err.to_string()))?;
    let domain = query.domain.as_deref().filter(|d| !d.trim().is_empty());

    let ontologies = match (domain, status) {
        (Some(domain), None) => state.ontologies.find_by_domain(domain).await?,
        (None, Some(status)) => state.ontologies.find_by_status(status).await?,
        (domain, status) => state.ontologies.list(domain, status).await?,
    };
    Ok(Json(ontologies))
}

async fn create_ontology(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewOntology>,
) -> AppResult<(StatusCode, Json<Ontology>)> {
    let ontology = state.ontologies.create(body).await?;
    Ok((StatusCode::CREATED, Json(ontology)))
}

async fn publish(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Ontology>> {
    Ok(Json(state.ontologies.publish(&id).await?))
}

async fn deprecate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Ontology>> {
    Ok(Json(state.ontologies.deprecate(&id).await?))
}
