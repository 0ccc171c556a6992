use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::error::{InsightsError, Result};
use crate::record::LogRecord;

/// Remote log search and summarization backend.
#[async_trait]
pub trait LogService: Send + Sync {
    async fn search(&self, token: &str, query: &str) -> Result<Vec<LogRecord>>;
    async fn summarize(&self, token: &str, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    search_id: &'a str,
    query: &'a str,
    time_args: Option<Value>,
    is_retry: bool,
    is_download: bool,
    is_legacy_format: bool,
}

impl<'a> SearchRequest<'a> {
    fn new(query: &'a str) -> Self {
        Self {
            search_id: "",
            query,
            time_args: None,
            is_retry: false,
            is_download: false,
            is_legacy_format: false,
        }
    }
}

pub struct HttpLogService {
    client: Client,
    search_url: String,
    summarize_url: String,
}

impl HttpLogService {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            search_url: config.search_url(),
            summarize_url: config.summarize_url(),
        })
    }

    async fn read_body(response: reqwest::Response, endpoint: &str) -> Result<String> {
        let status = response.status();
        debug!("{} response status: {}", endpoint, status);

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("{} request failed: {} - {}", endpoint, status, body);
            return Err(InsightsError::ServiceError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl LogService for HttpLogService {
    async fn search(&self, token: &str, query: &str) -> Result<Vec<LogRecord>> {
        info!("Submitting log search");
        debug!("Search query: {}", query);

        let response = self
            .client
            .post(&self.search_url)
            .bearer_auth(token)
            .json(&SearchRequest::new(query))
            .send()
            .await?;

        let body = Self::read_body(response, "Search").await?;
        let records = parse_search_response(&body)?;
        info!("Search returned {} records", records.len());
        Ok(records)
    }

    async fn summarize(&self, token: &str, prompt: &str) -> Result<String> {
        info!("Requesting summary ({} chars of prompt)", prompt.chars().count());

        let response = self
            .client
            .post(&self.summarize_url)
            .bearer_auth(token)
            .json(&prompt)
            .send()
            .await?;

        let body = Self::read_body(response, "Summarize").await?;
        Ok(parse_summary_response(&body))
    }
}

/// Records live under `Data`; a missing or non-array `Data` is malformed.
pub fn parse_search_response(body: &str) -> Result<Vec<LogRecord>> {
    let value: Value = serde_json::from_str(body)?;
    match value.get("Data") {
        Some(Value::Array(items)) => Ok(items.iter().cloned().map(LogRecord::new).collect()),
        Some(Value::Null) => Ok(Vec::new()),
        Some(other) => Err(InsightsError::MalformedResponse(format!(
            "expected Data to be an array, got {}",
            json_kind(other)
        ))),
        None => Err(InsightsError::MalformedResponse(
            "search response has no Data field".to_string(),
        )),
    }
}

/// Prefers `summary`, then `response`; anything else is used as plain text.
pub fn parse_summary_response(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            for field in ["summary", "response"] {
                if let Some(text) = value.get(field).and_then(Value::as_str) {
                    return text.to_string();
                }
            }
            if let Value::String(text) = value {
                return text;
            }
            warn!("Summary response had no summary field, using raw body");
            body.to_string()
        }
        Err(_) => {
            warn!("Summary response was not JSON, using raw body");
            body.to_string()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
