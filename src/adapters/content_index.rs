// Unified content index sync (document-API search index)
use crate::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Document pushed to the unified search index for a processed video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoIndexDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub video_id: String,
    pub title: String,
    pub transcript: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ContentIndex: Send + Sync {
    /// Insert or replace the index document for one video.
    async fn sync_video(&self, document: &VideoIndexDocument) -> Result<(), PipelineError>;
}

#[derive(Serialize, Debug)]
struct ReplaceOneCommand<'a> {
    #[serde(rename = "findOneAndReplace")]
    find_one_and_replace: ReplaceOneBody<'a>,
}

#[derive(Serialize, Debug)]
struct ReplaceOneBody<'a> {
    filter: serde_json::Value,
    replacement: &'a VideoIndexDocument,
    options: serde_json::Value,
}

/// Token-authenticated document-API client for the content index.
#[derive(Debug, Clone)]
pub struct HttpContentIndex {
    client: Client,
    api_endpoint: String,
    application_token: String,
    collection: String,
}

impl HttpContentIndex {
    pub fn new(api_endpoint: String, application_token: String) -> Self {
        Self {
            client: Client::new(),
            api_endpoint,
            application_token,
            collection: "video_knowledge".to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let api_endpoint = std::env::var("CONTENT_INDEX_ENDPOINT").ok()?;
        let application_token = std::env::var("CONTENT_INDEX_TOKEN").ok()?;
        Some(Self::new(api_endpoint, application_token))
    }
}

#[async_trait]
impl ContentIndex for HttpContentIndex {
    async fn sync_video(&self, document: &VideoIndexDocument) -> Result<(), PipelineError> {
        let url = format!("{}/api/json/v1/{}", self.api_endpoint, self.collection);

        let command = ReplaceOneCommand {
            find_one_and_replace: ReplaceOneBody {
                filter: serde_json::json!({ "video_id": document.video_id }),
                replacement: document,
                options: serde_json::json!({ "upsert": true }),
            },
        };

        let response = self
            .client
            .post(&url)
            .header("X-Cassandra-Token", &self.application_token)
            .json(&command)
            .send()
            .await
            .map_err(|e| PipelineError::service("content-index", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::service(
                "content-index",
                format!("sync failed: HTTP {} {}", status, body),
            ));
        }
        Ok(())
    }
}
