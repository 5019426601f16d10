use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{
    airtable::TableRecord,
    graph::{GraphData, GraphFilters},
    pipeline::{
        AnalysisJob, Chunk, JobState, SuggestedEdgeType, SuggestedEntityType, TypeSuggestions,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum SuggestionStatus {
    Generating,
    Complete,
}

#[derive(Clone, Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SuggestionsResponse {
    pub status: SuggestionStatus,
    pub entity_types: Vec<SuggestedEntityType>,
    pub edge_types: Vec<SuggestedEdgeType>,
    pub classification_rate: f64,
    pub cached: bool,
}

impl SuggestionsResponse {
    pub fn generating() -> Self {
        Self {
            status: SuggestionStatus::Generating,
            entity_types: Vec::new(),
            edge_types: Vec::new(),
            classification_rate: 0.0,
            cached: false,
        }
    }

    pub fn complete(suggestions: TypeSuggestions, cached: bool) -> Self {
        Self {
            status: SuggestionStatus::Complete,
            entity_types: suggestions.entity_types,
            edge_types: suggestions.edge_types,
            classification_rate: suggestions.classification_rate,
            cached,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, TS)]
#[serde(default, rename_all = "camelCase")]
#[ts(export)]
pub struct AcceptSuggestionsRequest {
    pub entity_types: Vec<SuggestedEntityType>,
    pub edge_types: Vec<SuggestedEdgeType>,
}

#[derive(Clone, Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AcceptSuggestionsResponse {
    pub success: bool,
    pub ontology_id: String,
    pub entity_types_count: usize,
    pub edge_types_count: usize,
}

#[derive(Clone, Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UploadResponse {
    pub document_id: String,
    pub filename: String,
    pub size: u64,
    pub status: JobState,
}

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct JobsResponse {
    pub total: usize,
    pub jobs: Vec<AnalysisJob>,
}

#[derive(Clone, Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChunkPreviewRequest {
    pub content: String,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub overlap_tokens: Option<usize>,
    #[serde(default)]
    pub split_by: Option<String>,
}

#[derive(Clone, Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChunkPreviewResponse {
    pub total_chunks: usize,
    pub total_tokens: usize,
    pub chunks: Vec<Chunk>,
}

#[derive(Clone, Debug, Deserialize, TS)]
#[ts(export)]
pub struct GraphFilterRequest {
    pub graph: GraphData,
    #[serde(default)]
    pub filters: GraphFilters,
}

#[derive(Clone, Debug, Serialize)]
pub struct AirtableRecordsResponse {
    pub table: String,
    pub total: usize,
    pub records: Vec<TableRecord>,
}
