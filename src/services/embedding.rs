//! Embedding collaborator.
//!
//! Viewed by the core as a function `text -> vector<1536>`. A failed or
//! disabled embedder returns `None` and the caller downgrades the vector
//! signal to skip; embedding problems never fail a plan.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed one text. `None` means "no embedding available".
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// HTTP client for OpenAI-compatible embedding endpoints.
pub struct HttpEmbeddingClient {
    http_client: Client,
    config: EmbeddingConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self { http_client, config }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if !self.config.enabled || self.config.api_key.is_empty() {
            return None;
        }

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
            dimensions: self.config.dimensions,
        };

        let response = match self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Embedding request failed: {e}");
                return None;
            },
        };

        if !response.status().is_success() {
            tracing::warn!("Embedding API returned {}", response.status());
            return None;
        }

        let parsed: EmbeddingResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Embedding response parse error: {e}");
                return None;
            },
        };

        let embedding = parsed.data.into_iter().next()?.embedding;
        if embedding.len() != self.config.dimensions {
            tracing::warn!(
                "Embedding dimension mismatch: got {}, expected {}",
                embedding.len(),
                self.config.dimensions
            );
            return None;
        }
        Some(embedding)
    }
}

/// Embedder that always reports "no embedding"; used when the collaborator
/// is not configured and in tests.
pub struct NullEmbeddingClient;

#[async_trait]
impl EmbeddingClient for NullEmbeddingClient {
    async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }
}
