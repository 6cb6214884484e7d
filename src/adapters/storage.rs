// Object storage adapter (storage-gateway HTTP API)
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), PipelineError>;
    async fn presigned_get(&self, key: &str, ttl_seconds: u64) -> Result<String, PipelineError>;
    async fn delete(&self, key: &str) -> Result<(), PipelineError>;
}

#[derive(Serialize, Debug)]
struct PresignRequest<'a> {
    key: &'a str,
    ttl_seconds: u64,
}

#[derive(Deserialize, Debug)]
struct PresignResponse {
    url: String,
}

/// Token-authenticated storage gateway client.
#[derive(Debug, Clone)]
pub struct HttpObjectStorage {
    client: Client,
    base_url: String,
    token: String,
    bucket: String,
}

impl HttpObjectStorage {
    pub fn new(base_url: String, token: String, bucket: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token,
            bucket,
        }
    }

    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("STORAGE_BASE_URL").ok()?;
        let token = std::env::var("STORAGE_TOKEN").ok()?;
        let bucket = std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "media".to_string());
        Some(Self::new(base_url, token, bucket))
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/buckets/{}/objects/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(key)
        )
    }

    /// Cheap reachability probe for health checks.
    pub async fn ping(&self) -> Result<(), String> {
        let url = format!("{}/buckets/{}", self.base_url, self.bucket);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| format!("object storage unreachable: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("object storage returned {}", response.status()))
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PipelineError> {
        let response = self
            .client
            .put(self.object_url(key))
            .bearer_auth(&self.token)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| PipelineError::service("storage", e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::service(
                "storage",
                format!("put '{}' failed: HTTP {}", key, response.status()),
            ));
        }
        Ok(())
    }

    async fn presigned_get(&self, key: &str, ttl_seconds: u64) -> Result<String, PipelineError> {
        let url = format!("{}/buckets/{}/presign", self.base_url, self.bucket);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&PresignRequest { key, ttl_seconds })
            .send()
            .await
            .map_err(|e| PipelineError::service("storage", e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PipelineError::NotFound(format!("object '{}'", key)));
        }
        if !response.status().is_success() {
            return Err(PipelineError::service(
                "storage",
                format!("presign '{}' failed: HTTP {}", key, response.status()),
            ));
        }

        let parsed: PresignResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::service("storage", format!("bad response: {}", e)))?;
        Ok(parsed.url)
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        let response = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PipelineError::service("storage", e.to_string()))?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(PipelineError::service(
                "storage",
                format!("delete '{}' failed: HTTP {}", key, response.status()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl crate::health::ServiceProbe for HttpObjectStorage {
    fn name(&self) -> &str {
        "object_storage"
    }

    async fn check(&self) -> Result<(), String> {
        self.ping().await
    }
}
