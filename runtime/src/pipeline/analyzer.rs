use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{error, info};
use ts_rs::TS;

use super::{
    chunker::{Chunk, ChunkConfig, Chunker},
    extractor::DocumentExtractor,
    utils::{compute_mdhash_id, word_count},
};
use crate::{
    error::{AppError, AppResult},
    validation::file_extension,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AnalysisJob {
    pub document_id: String,
    pub filename: String,
    pub status: JobState,
    #[ts(type = "string")]
    pub started_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AnalysisResult {
    pub document_id: String,
    /// Hash of `content`; changes whenever a re-upload yields different text.
    pub content_id: String,
    pub content: String,
    pub chunks: Vec<Chunk>,
    pub word_count: usize,
    #[ts(type = "string")]
    pub completed_at: DateTime<Utc>,
}

/// Runs text extraction and chunking for uploaded documents in background
/// tasks and keeps the latest result per document.
pub struct DocumentAnalyzer {
    extractor: Arc<dyn DocumentExtractor>,
    chunker: Arc<dyn Chunker>,
    chunk_config: ChunkConfig,
    jobs: RwLock<HashMap<String, AnalysisJob>>,
    results: RwLock<HashMap<String, AnalysisResult>>,
}

impl DocumentAnalyzer {
    pub fn new(
        extractor: Arc<dyn DocumentExtractor>,
        chunker: Arc<dyn Chunker>,
        chunk_config: ChunkConfig,
    ) -> Self {
        Self {
            extractor,
            chunker,
            chunk_config,
            jobs: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the configured extractor can read this kind of file.
    pub fn supports(&self, filename: &str) -> bool {
        file_extension(filename).is_some_and(|ext| self.extractor.supports(&ext))
    }

    /// Queues a document for analysis. A document already being analysed is
    /// rejected rather than run twice.
    pub async fn submit(
        self: &Arc<Self>,
        document_id: impl Into<String>,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> AppResult<JoinHandle<()>> {
        let document_id = document_id.into();
        let filename = filename.into();

        {
            let mut jobs = self.jobs.write().await;
            if jobs
                .get(&document_id)
                .is_some_and(|job| job.status == JobState::Processing)
            {
                return Err(AppError::validation(format!(
                    "Document {document_id} is already being analysed"
                )));
            }
            jobs.insert(
                document_id.clone(),
                AnalysisJob {
                    document_id: document_id.clone(),
                    filename: filename.clone(),
                    status: JobState::Processing,
                    started_at: Utc::now(),
                    finished_at: None,
                    error: None,
                },
            );
        }
        info!(%document_id, %filename, size = bytes.len(), "analysis job queued");

        let analyzer = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome = analyzer.analyze(&document_id, &filename, &bytes).await;
            analyzer.finish(&document_id, outcome).await;
        }))
    }

    /// Extracts and chunks one document without touching job state.
    pub async fn analyze(
        &self,
        document_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<AnalysisResult> {
        let content = self
            .extractor
            .extract(document_id, filename, bytes)
            .await
            .with_context(|| format!("failed to extract text from {filename}"))?;
        let chunks = self
            .chunker
            .chunk(&content, &self.chunk_config)
            .with_context(|| format!("failed to chunk {filename}"))?;

        Ok(AnalysisResult {
            document_id: document_id.to_string(),
            content_id: compute_mdhash_id(&content, "content-"),
            word_count: word_count(&content),
            content,
            chunks,
            completed_at: Utc::now(),
        })
    }

    async fn finish(&self, document_id: &str, outcome: Result<AnalysisResult>) {
        let now = Utc::now();
        let error = match outcome {
            Ok(result) => {
                info!(
                    %document_id,
                    chunks = result.chunks.len(),
                    words = result.word_count,
                    "analysis complete"
                );
                self.store_result(result).await;
                None
            }
            Err(err) => {
                error!(%document_id, error = ?err, "analysis failed");
                Some(format!("{err:#}"))
            }
        };

        if let Some(job) = self.jobs.write().await.get_mut(document_id) {
            job.status = if error.is_some() {
                JobState::Failed
            } else {
                JobState::Completed
            };
            job.finished_at = Some(now);
            job.error = error;
        }
    }

    pub async fn store_result(&self, result: AnalysisResult) {
        self.results
            .write()
            .await
            .insert(result.document_id.clone(), result);
    }

    pub async fn get_analysis_result(&self, document_id: &str) -> Option<AnalysisResult> {
        self.results.read().await.get(document_id).cloned()
    }

    pub async fn active_jobs(&self) -> Vec<AnalysisJob> {
        let mut active: Vec<AnalysisJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.status == JobState::Processing)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        active
    }

    pub async fn is_active(&self, document_id: &str) -> bool {
        self.jobs
            .read()
            .await
            .get(document_id)
            .is_some_and(|job| job.status == JobState::Processing)
    }

    pub async fn job_status(&self, document_id: &str) -> Option<AnalysisJob> {
        self.jobs.read().await.get(document_id).cloned()
    }
}
