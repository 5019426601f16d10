use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::debug;

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Thin client for the OpenAI Responses API with JSON-schema structured output.
pub struct ResponsesClient {
    http: Client,
    api_key: String,
    base: String,
}

impl ResponsesClient {
    pub fn new(api_key: String, base: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(300))
            .build()
            .context("failed to build OpenAI HTTP client")?;
        Ok(Self {
            http,
            api_key,
            base: base
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE.into())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn extract_structured_output<T: DeserializeOwned>(root: &Value) -> Option<T> {
        for key in ["output_parsed", "output_text"] {
            if let Some(parsed) = root.get(key).and_then(Self::parse_candidate::<T>) {
                return Some(parsed);
            }
        }

        let items = root.get("output")?.as_array()?;
        items.iter().find_map(|item| {
            Self::parse_fields::<T>(item).or_else(|| {
                item.get("content")?
                    .as_array()?
                    .iter()
                    .find_map(Self::parse_fields::<T>)
            })
        })
    }

    fn parse_fields<T: DeserializeOwned>(value: &Value) -> Option<T> {
        value
            .get("parsed")
            .and_then(Self::parse_candidate::<T>)
            .or_else(|| value.get("text").and_then(Self::parse_candidate::<T>))
    }

    fn parse_candidate<T: DeserializeOwned>(value: &Value) -> Option<T> {
        match value {
            Value::String(s) => serde_json::from_str::<T>(s).ok(),
            Value::Array(items) => items.iter().find_map(Self::parse_candidate::<T>),
            Value::Null => None,
            _ => serde_json::from_value(value.clone()).ok(),
        }
    }

    fn failure_detail(v: &Value) -> Option<&str> {
        v.get("error")
            .and_then(|e| e.get("message"))
            .or_else(|| v.get("last_error").and_then(|e| e.get("message")))
            .and_then(Value::as_str)
    }

    /// Waits for a queued or in-progress response to settle.
    async fn settle(&self, mut response: Value) -> Result<Value> {
        loop {
            let status = response
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("completed");
            match status {
                "completed" => return Ok(response),
                "failed" | "cancelled" | "incomplete" => match Self::failure_detail(&response) {
                    Some(detail) => bail!("OpenAI response {status} | {detail}"),
                    None => bail!("OpenAI response {status}"),
                },
                _ => {}
            }

            let id = response
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("pending OpenAI response has no id"))?
                .to_string();
            debug!(response_id = %id, status, "waiting for OpenAI response");
            sleep(POLL_INTERVAL).await;

            let res = self
                .http
                .get(format!("{}/v1/responses/{id}", self.base))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .context("network error polling OpenAI")?;
            if !res.status().is_success() {
                let status = res.status();
                let body = res.text().await.unwrap_or_default();
                bail!("OpenAI error {status}: {body}");
            }
            response = res
                .json()
                .await
                .with_context(|| format!("malformed OpenAI response {id}"))?;
        }
    }

    pub async fn responses_structured<T: DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: Value,
    ) -> Result<T> {
        let body = json!({
            "model": model,
            "input": [
                { "role": "system", "content": [{ "type": "input_text", "text": system }] },
                { "role": "user",   "content": [{ "type": "input_text", "text": user }] }
            ],
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": schema_name,
                    "strict": true,
                    "schema": schema
                }
            },
        });

        let res = self
            .http
            .post(format!("{}/v1/responses", self.base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("network error calling OpenAI")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            bail!("OpenAI error {status}: {body}");
        }

        let v: Value = res.json().await.context("malformed OpenAI response")?;
        let v = self.settle(v).await?;
        Self::extract_structured_output(&v)
            .ok_or_else(|| anyhow!("structured output not found in OpenAI response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        value: u32,
    }

    #[test]
    fn finds_output_text_in_content_blocks() {
        let root = json!({
            "status": "completed",
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "{\"value\": 7}" }
                ]}
            ]
        });
        let parsed: Option<Answer> = ResponsesClient::extract_structured_output(&root);
        assert_eq!(parsed, Some(Answer { value: 7 }));
    }

    #[test]
    fn top_level_output_text_wins() {
        let root = json!({ "output_text": "{\"value\": 1}", "output": [] });
        let parsed: Option<Answer> = ResponsesClient::extract_structured_output(&root);
        assert_eq!(parsed, Some(Answer { value: 1 }));
    }

    #[test]
    fn unparseable_output_is_none() {
        let root = json!({ "output": [{ "content": [{ "text": "not json" }] }] });
        let parsed: Option<Answer> = ResponsesClient::extract_structured_output(&root);
        assert!(parsed.is_none());
    }
}
