use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::validation::file_extension;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "json"];
/// The conversion service only accepts PDFs.
const CONVERTIBLE_EXTENSIONS: &[&str] = &["pdf"];

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Whether files with this (normalized) extension can be extracted at all.
    fn supports(&self, extension: &str) -> bool;

    async fn extract(&self, document_id: &str, filename: &str, bytes: &[u8]) -> Result<String>;
}

/// Reads text-like uploads directly.
#[derive(Clone, Debug, Default)]
pub struct Utf8DocumentExtractor;

#[async_trait]
impl DocumentExtractor for Utf8DocumentExtractor {
    fn supports(&self, extension: &str) -> bool {
        TEXT_EXTENSIONS.contains(&extension)
    }

    async fn extract(&self, _document_id: &str, filename: &str, bytes: &[u8]) -> Result<String> {
        let extension = file_extension(filename).unwrap_or_default();
        if !self.supports(&extension) {
            return Err(anyhow!(
                "cannot extract text from .{extension} files without a conversion service"
            ));
        }
        if bytes.is_empty() {
            return Err(anyhow!("file content is empty"));
        }

        let text = std::str::from_utf8(bytes).map_err(|_| anyhow!("file is not valid UTF-8"))?;
        if text.trim().is_empty() {
            return Err(anyhow!("file contains only whitespace"));
        }
        Ok(text.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversionResponse {
    #[serde(default)]
    markdown: String,
    status: String,
    #[serde(default)]
    errors: Vec<String>,
}

/// Sends PDF uploads to the Docling conversion service and reads text
/// formats locally.
pub struct DoclingExtractor {
    http: Client,
    base_url: String,
    local: Utf8DocumentExtractor,
}

impl DoclingExtractor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .context("failed to build Docling HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            local: Utf8DocumentExtractor,
        })
    }
}

#[async_trait]
impl DocumentExtractor for DoclingExtractor {
    fn supports(&self, extension: &str) -> bool {
        self.local.supports(extension) || CONVERTIBLE_EXTENSIONS.contains(&extension)
    }

    async fn extract(&self, document_id: &str, filename: &str, bytes: &[u8]) -> Result<String> {
        let extension = file_extension(filename).unwrap_or_default();
        if self.local.supports(&extension) {
            return self.local.extract(document_id, filename, bytes).await;
        }
        if !self.supports(&extension) {
            return Err(anyhow!("the conversion service does not accept .{extension} files"));
        }

        debug!(document_id, filename, "sending document to conversion service");
        let form = Form::new()
            .text("documentId", document_id.to_string())
            .part("file", Part::bytes(bytes.to_vec()).file_name(filename.to_string()));

        let response = self
            .http
            .post(format!("{}/api/documents/upload-convert", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("conversion service unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("conversion service returned {status}: {body}"));
        }

        let converted: ConversionResponse = response
            .json()
            .await
            .context("malformed conversion response")?;
        if converted.status != "success" {
            let reason = converted.errors.join("; ");
            warn!(document_id, %reason, "document conversion failed");
            return Err(anyhow!("conversion failed: {reason}"));
        }
        if converted.markdown.trim().is_empty() {
            return Err(anyhow!("conversion produced no text"));
        }
        Ok(converted.markdown)
    }
}
