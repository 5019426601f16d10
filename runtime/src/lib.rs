pub mod ai;
pub mod airtable;
pub mod config;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod rate_limit;
pub mod routes;
pub mod storage;
pub mod validation;

use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, routing::get};

use airtable::{AirtableClient, OntologyService};
use config::AppConfig;
use pipeline::{CachedSuggestions, Chunker, DocumentAnalyzer, TypeSuggestionEngine};
use storage::TtlCache;
use validation::UploadValidator;

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub suggestions_cache: Arc<TtlCache<CachedSuggestions>>,
    pub analyzer: Arc<DocumentAnalyzer>,
    /// `None` when no OpenAI key is configured.
    pub engine: Option<Arc<dyn TypeSuggestionEngine>>,
    pub ontologies: OntologyService,
    /// `None` when no Airtable key is configured.
    pub airtable: Option<Arc<AirtableClient>>,
    pub chunker: Arc<dyn Chunker>,
    pub uploads: UploadValidator,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.config.uploads.max_file_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health))
        .merge(routes::suggestion_routes())
        .merge(routes::document_routes())
        .merge(routes::graph_routes())
        .merge(routes::airtable_routes())
        .merge(routes::ontology_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[inline]
async fn health() -> &'static str {
    "ok"
}
