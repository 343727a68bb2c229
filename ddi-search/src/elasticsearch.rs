//! Elasticsearch backend over the HTTP REST API
//!
//! Bulk indexing uses the `_bulk` endpoint with an NDJSON body: one action
//! line followed by one source line per document.

use crate::backend::{Document, SearchBackend};
use crate::{Result, SearchError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const USER_AGENT: &str = concat!("ddi-search/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Elasticsearch REST client
#[derive(Debug, Clone)]
pub struct ElasticsearchBackend {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(rename = "_source")]
    source: Option<Value>,
}

impl ElasticsearchBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Turn a non-success response into an API error
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(SearchError::Api(status.as_u16(), error_text))
    }
}

/// NDJSON body for `_bulk`: action line then source line per document
pub fn bulk_body(index: &str, documents: &[Document]) -> Result<String> {
    let mut body = String::new();
    for (id, document) in documents {
        let action = json!({ "index": { "_index": index, "_id": id.to_string() } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }
    Ok(body)
}

/// Number of items a `_bulk` response reports as rejected
fn rejected_items(response: &BulkResponse) -> usize {
    if !response.errors {
        return 0;
    }
    response
        .items
        .iter()
        .filter_map(|item| item.as_object()?.values().next()?.get("status")?.as_u64())
        .filter(|status| *status >= 300)
        .count()
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        debug!(index, "Creating search index");
        let response = self.http_client.put(self.url(index)).json(body).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<bool> {
        let response = self.http_client.delete(self.url(index)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self.http_client.head(self.url(index)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(SearchError::Api(status.as_u16(), String::new())),
        }
    }

    async fn bulk_index(&self, index: &str, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let body = bulk_body(index, &documents)?;
        let response = self
            .http_client
            .post(self.url("_bulk"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let response: BulkResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        let failed = rejected_items(&response);
        if failed > 0 {
            warn!(index, failed, total = documents.len(), "Bulk request partially rejected");
            return Err(SearchError::BulkRejected {
                index: index.to_string(),
                failed,
            });
        }

        Ok(documents.len())
    }

    async fn put_document(&self, index: &str, id: Uuid, document: &Value) -> Result<()> {
        let response = self
            .http_client
            .put(self.url(&format!("{}/_doc/{}", index, id)))
            .json(document)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: Uuid) -> Result<bool> {
        let response = self
            .http_client
            .delete(self.url(&format!("{}/_doc/{}", index, id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response).await?;
        Ok(true)
    }

    async fn get_document(&self, index: &str, id: Uuid) -> Result<Option<Value>> {
        let response = self
            .http_client
            .get(self.url(&format!("{}/_doc/{}", index, id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response: GetResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;
        Ok(response.source)
    }

    async fn count(&self, index: &str) -> Result<u64> {
        let response = self
            .http_client
            .get(self.url(&format!("{}/_count", index)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SearchError::IndexNotFound(index.to_string()));
        }

        let response: CountResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;
        Ok(response.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_body_is_ndjson() {
        let id = Uuid::new_v4();
        let body = bulk_body("ddi.concepts", &[(id, json!({"name": "income"}))]).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(body.ends_with('\n'));
        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "ddi.concepts");
        assert_eq!(action["index"]["_id"], id.to_string());
        assert_eq!(lines[1], r#"{"name":"income"}"#);
    }

    #[test]
    fn test_rejected_items_counts_error_statuses() {
        let response: BulkResponse = serde_json::from_value(json!({
            "errors": true,
            "items": [
                {"index": {"_id": "a", "status": 201}},
                {"index": {"_id": "b", "status": 400, "error": {"type": "mapper_parsing_exception"}}},
            ]
        }))
        .unwrap();
        assert_eq!(rejected_items(&response), 1);

        let ok: BulkResponse = serde_json::from_value(json!({"errors": false, "items": []})).unwrap();
        assert_eq!(rejected_items(&ok), 0);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = ElasticsearchBackend::new("http://localhost:9200/").unwrap();
        assert_eq!(backend.url("_bulk"), "http://localhost:9200/_bulk");
    }
}
