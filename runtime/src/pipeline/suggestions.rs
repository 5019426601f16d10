use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use super::{analyzer::AnalysisResult, chunker::Chunk};
use crate::{
    ai::{
        ResponsesClient,
        schemas::{
            TYPE_SUGGESTIONS_SCHEMA_NAME, TYPE_SUGGESTIONS_SYSTEM_PROMPT, type_suggestions_schema,
        },
    },
    airtable::{EdgeTypeDefinition, EntityTypeDefinition},
};

/// Upper bound on document text sent to the model.
const MAX_PROMPT_CHARS: usize = 48_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SuggestedEntityType {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SuggestedEdgeType {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source_types: Vec<String>,
    #[serde(default)]
    pub target_types: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TypeSuggestions {
    pub entity_types: Vec<SuggestedEntityType>,
    pub edge_types: Vec<SuggestedEdgeType>,
    #[serde(default)]
    pub classification_rate: f64,
}

/// Cache entry tying suggestions to the analysed content they were built from.
#[derive(Debug, Clone)]
pub struct CachedSuggestions {
    pub content_id: String,
    pub suggestions: TypeSuggestions,
}

impl From<SuggestedEntityType> for EntityTypeDefinition {
    fn from(suggested: SuggestedEntityType) -> Self {
        Self {
            name: suggested.name,
            description: suggested.description,
            examples: suggested.examples,
        }
    }
}

impl From<SuggestedEdgeType> for EdgeTypeDefinition {
    fn from(suggested: SuggestedEdgeType) -> Self {
        Self {
            name: suggested.name,
            description: suggested.description,
            source_types: suggested.source_types,
            target_types: suggested.target_types,
        }
    }
}

#[async_trait]
pub trait TypeSuggestionEngine: Send + Sync {
    async fn generate_type_suggestions(&self, content: &str) -> Result<TypeSuggestions>;
}

/// Share of chunks mentioning at least one entity type name or example,
/// compared case-insensitively.
pub fn predict_classification_rate(chunks: &[Chunk], entity_types: &[SuggestedEntityType]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }

    let needles: Vec<String> = entity_types
        .iter()
        .flat_map(|ty| std::iter::once(&ty.name).chain(ty.examples.iter()))
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect();
    if needles.is_empty() {
        return 0.0;
    }

    let covered = chunks
        .iter()
        .filter(|chunk| {
            let haystack = chunk.content.to_lowercase();
            needles.iter().any(|needle| haystack.contains(needle.as_str()))
        })
        .count();

    covered as f64 / chunks.len() as f64
}

/// Generates suggestions for an analysed document and fills in the
/// predicted classification rate from its chunks.
pub async fn suggest_for_analysis(
    engine: &dyn TypeSuggestionEngine,
    analysis: &AnalysisResult,
) -> Result<TypeSuggestions> {
    let mut suggestions = engine.generate_type_suggestions(&analysis.content).await?;
    suggestions.classification_rate =
        predict_classification_rate(&analysis.chunks, &suggestions.entity_types);
    info!(
        document_id = %analysis.document_id,
        entity_types = suggestions.entity_types.len(),
        edge_types = suggestions.edge_types.len(),
        classification_rate = suggestions.classification_rate,
        "type suggestions generated"
    );
    Ok(suggestions)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelSuggestions {
    entity_types: Vec<SuggestedEntityType>,
    edge_types: Vec<SuggestedEdgeType>,
}

pub struct LlmSuggestionEngine {
    client: Arc<ResponsesClient>,
    model: String,
    max_entity_types: usize,
    max_edge_types: usize,
}

impl LlmSuggestionEngine {
    pub fn new(
        client: Arc<ResponsesClient>,
        model: impl Into<String>,
        max_entity_types: usize,
        max_edge_types: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            max_entity_types,
            max_edge_types,
        }
    }
}

fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

#[async_trait]
impl TypeSuggestionEngine for LlmSuggestionEngine {
    async fn generate_type_suggestions(&self, content: &str) -> Result<TypeSuggestions> {
        let excerpt = truncate_chars(content, MAX_PROMPT_CHARS);
        debug!(
            model = %self.model,
            chars = excerpt.len(),
            truncated = excerpt.len() < content.len(),
            "requesting type suggestions"
        );

        let raw: ModelSuggestions = self
            .client
            .responses_structured(
                &self.model,
                TYPE_SUGGESTIONS_SYSTEM_PROMPT,
                excerpt,
                TYPE_SUGGESTIONS_SCHEMA_NAME,
                type_suggestions_schema(self.max_entity_types, self.max_edge_types),
            )
            .await?;

        let entity_types = raw
            .entity_types
            .into_iter()
            .filter(|ty| !ty.name.trim().is_empty())
            .take(self.max_entity_types)
            .map(|mut ty| {
                ty.confidence = ty.confidence.clamp(0.0, 1.0);
                ty
            })
            .collect();
        let edge_types = raw
            .edge_types
            .into_iter()
            .filter(|ty| !ty.name.trim().is_empty())
            .take(self.max_edge_types)
            .map(|mut ty| {
                ty.confidence = ty.confidence.clamp(0.0, 1.0);
                ty
            })
            .collect();

        Ok(TypeSuggestions {
            entity_types,
            edge_types,
            classification_rate: 0.0,
        })
    }
}
