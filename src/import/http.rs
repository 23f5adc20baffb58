//! Remote ingestion API client
//!
//! Submits URLs to a knowledge service over HTTP, authenticated with a
//! static token in the `X-API-Key` header.

use crate::import::{IngestFailure, IngestOptions, Ingested, Ingestor};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Serialize)]
struct UrlRequest<'a> {
    url: &'a str,
    // Field name expected by the remote API
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_multimodel: Option<bool>,
}

/// [`Ingestor`] backed by the remote knowledge API
#[derive(Debug, Clone)]
pub struct HttpIngestor {
    client: Client,
    api_url: String,
    token: String,
}

impl HttpIngestor {
    /// Creates a client for the API rooted at `api_url`
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, knowledge_base_id: &str) -> String {
        format!(
            "{}/api/v1/knowledge-bases/{}/knowledge/url",
            self.api_url, knowledge_base_id
        )
    }
}

/// Reads the artifact id from `{"id": ..}` or `{"data": {"id": ..}}`
fn parse_knowledge_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("id")
        .or_else(|| value.get("data").and_then(|data| data.get("id")))
        .and_then(|id| id.as_str())
        .map(str::to_string)
}

#[async_trait]
impl Ingestor for HttpIngestor {
    async fn create_from_url(
        &self,
        knowledge_base_id: &str,
        url: &str,
        options: &IngestOptions,
    ) -> Result<Ingested, IngestFailure> {
        let payload = UrlRequest {
            url,
            enable_multimodel: options.enable_multimodal,
        };

        let response = self
            .client
            .post(self.endpoint(knowledge_base_id))
            .header("X-API-Key", &self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| IngestFailure::Failed(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        trace!(url, status = status.as_u16(), "Ingestion API responded");

        match status {
            StatusCode::CREATED => Ok(Ingested {
                knowledge_id: parse_knowledge_id(&body),
            }),
            StatusCode::CONFLICT => Err(IngestFailure::Duplicate(body)),
            _ => Err(IngestFailure::Failed(format!(
                "API error {}: {}",
                status.as_u16(),
                body
            ))),
        }
    }
}
