//! Embedding sources for semantic indexing.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::OpenAiEmbeddingConfig;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding response malformed: {0}")]
    Response(String),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn dimensions(&self) -> usize;
}

/// OpenAI-compatible embeddings client.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    config: OpenAiEmbeddingConfig,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(http: reqwest::Client, config: OpenAiEmbeddingConfig, dimensions: usize) -> Self {
        Self {
            http,
            config,
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .json(&serde_json::json!({
                "model": self.config.model,
                "input": [text],
            }))
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Request(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Response(e.to_string()))?;
        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Response("empty data array".to_string()))?;

        if embedding.len() != self.dimensions {
            return Err(EmbeddingError::Response(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Deterministic bag-of-words hashing embedder for tests: same text maps
/// to the same vector, overlapping vocabulary yields nonzero similarity.
#[cfg(test)]
pub struct HashEmbedder {
    dimensions: usize,
}

#[cfg(test)]
impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[cfg(test)]
#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0f32; self.dimensions];
        for word in text.to_lowercase().split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            word.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    fn config(base_url: String) -> OpenAiEmbeddingConfig {
        OpenAiEmbeddingConfig {
            api_key: "test-key".to_string(),
            base_url,
            model: "text-embedding-3-small".to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn openai_embedder_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.1, 0.2, 0.3] }]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(reqwest::Client::new(), config(server.uri()), 3);
        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn openai_embedder_rejects_wrong_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.1, 0.2] }]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(reqwest::Client::new(), config(server.uri()), 3);
        assert!(matches!(
            embedder.embed("hello").await,
            Err(EmbeddingError::Response(_))
        ));
    }

    #[tokio::test]
    async fn openai_embedder_surfaces_upstream_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(reqwest::Client::new(), config(server.uri()), 3);
        assert!(matches!(
            embedder.embed("hello").await,
            Err(EmbeddingError::Request(_))
        ));
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("apples and pears").await.unwrap();
        let b = embedder.embed("apples and pears").await.unwrap();
        assert_eq!(a, b);
    }
}
