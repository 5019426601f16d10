use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::records::{AirtableRecord, Table, TableRecord, parse_record};
use crate::{config::AirtableConfig, error::AppError, rate_limit::RateLimiter};

const MAX_BATCH_SIZE: usize = 10;

/// Thin REST client for one Airtable base.
///
/// Every request takes a slot from the shared [`RateLimiter`] first, so a
/// burst fails locally with a rate-limit error instead of reaching Airtable.
pub struct AirtableClient {
    http: Client,
    api_key: String,
    base_url: String,
    base_id: String,
    tables: HashMap<String, String>,
    limiter: Arc<RateLimiter>,
}

impl AirtableClient {
    pub fn new(config: &AirtableConfig, api_key: String, limiter: Arc<RateLimiter>) -> Result<Self> {
        if config.base_id.trim().is_empty() {
            return Err(anyhow!("airtable.base_id is not configured"));
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build Airtable HTTP client")?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            base_id: config.base_id.clone(),
            tables: config.tables.clone(),
            limiter,
        })
    }

    pub fn table_id(&self, table: Table) -> &str {
        self.tables
            .get(table.logical_name())
            .map(String::as_str)
            .unwrap_or(table.logical_name())
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/{}/{}", self.base_url, self.base_id, self.table_id(table))
    }

    /// Fetches every page of `table`, optionally narrowed by a formula.
    ///
    /// Only the first page can fail on the local quota; later pages wait for
    /// a slot so a long listing is never abandoned halfway.
    pub async fn list_raw(&self, table: Table, formula: Option<&str>) -> Result<Vec<Value>> {
        let url = self.table_url(table);
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![("pageSize", "100".to_string())];
            if let Some(formula) = formula.filter(|f| !f.is_empty()) {
                query.push(("filterByFormula", formula.to_string()));
            }
            let page = match offset.take() {
                Some(offset) => {
                    query.push(("offset", offset));
                    self.limiter.wait_for_slot().await;
                    self.execute(self.http.get(&url).query(&query)).await?
                }
                None => self.send(self.http.get(&url).query(&query)).await?,
            };
            let batch = page
                .get("records")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("Airtable response for {table} has no records array"))?;
            records.extend(batch.iter().cloned());

            match page.get("offset").and_then(Value::as_str) {
                Some(next) => offset = Some(next.to_string()),
                None => break,
            }
        }

        debug!(%table, count = records.len(), "listed Airtable records");
        Ok(records)
    }

    pub async fn list_records(&self, table: Table, formula: Option<&str>) -> Result<Vec<TableRecord>> {
        self.list_raw(table, formula)
            .await?
            .into_iter()
            .map(|raw| TableRecord::parse(table, raw))
            .collect()
    }

    pub async fn list_typed<F: DeserializeOwned>(
        &self,
        table: Table,
        formula: Option<&str>,
    ) -> Result<Vec<AirtableRecord<F>>> {
        self.list_raw(table, formula)
            .await?
            .into_iter()
            .map(|raw| parse_record(table, raw))
            .collect()
    }

    pub async fn create_typed<F: DeserializeOwned>(
        &self,
        table: Table,
        fields: Value,
    ) -> Result<AirtableRecord<F>> {
        let raw = self
            .send(self.http.post(self.table_url(table)).json(&json!({ "fields": fields })))
            .await?;
        parse_record(table, raw)
    }

    /// Creates records in batches of ten, Airtable's per-request maximum.
    pub async fn create_many_typed<F: DeserializeOwned>(
        &self,
        table: Table,
        fields: Vec<Value>,
    ) -> Result<Vec<AirtableRecord<F>>> {
        let mut created = Vec::with_capacity(fields.len());
        for batch in fields.chunks(MAX_BATCH_SIZE) {
            let records: Vec<Value> = batch.iter().map(|f| json!({ "fields": f })).collect();
            let raw = self
                .send(self.http.post(self.table_url(table)).json(&json!({ "records": records })))
                .await?;
            let rows = raw
                .get("records")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("Airtable batch create for {table} returned no records"))?;
            for row in rows {
                created.push(parse_record(table, row.clone())?);
            }
        }
        Ok(created)
    }

    pub async fn update_typed<F: DeserializeOwned>(
        &self,
        table: Table,
        record_id: &str,
        fields: Value,
    ) -> Result<AirtableRecord<F>> {
        let url = format!("{}/{}", self.table_url(table), record_id);
        let raw = self
            .send(self.http.patch(&url).json(&json!({ "fields": fields })))
            .await?;
        parse_record(table, raw)
    }

    /// Deletes one record. Used for cleanup after a failed multi-step write,
    /// so it waits for a limiter slot rather than giving up.
    pub async fn delete_record(&self, table: Table, record_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.table_url(table), record_id);
        self.limiter.wait_for_slot().await;
        self.execute(self.http.delete(&url)).await?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        self.limiter.try_acquire()?;
        self.execute(request).await
    }

    /// Sends without taking a limiter slot; the caller already holds one.
    async fn execute(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Airtable request failed")?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .context("failed to decode Airtable response");
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        Err(match status {
            StatusCode::NOT_FOUND => AppError::not_found("Airtable record not found").into(),
            StatusCode::UNPROCESSABLE_ENTITY => {
                AppError::validation(format!("Airtable rejected the request: {body}")).into()
            }
            StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited {
                retry_after: retry_after.unwrap_or(self.limiter.window()),
            }
            .into(),
            other => anyhow!("Airtable error {other}: {body}"),
        })
    }
}
