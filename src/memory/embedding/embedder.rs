//! Embedding provider client.
//!
//! One attempt per call, bounded by a hard timeout, no retry. Every failure mode (transport,
//! status, payload shape, dimension, timeout) is reported as [`EmbeddingUnavailable`] so
//! callers can degrade instead of failing.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::memory::core::config::EmbeddingConfig;
use crate::memory::core::errors::MemoryResult;

/// Boxed future type for embedder operations.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Why the provider could not produce a vector.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EmbeddingUnavailable {
    /// The request did not complete within the hard timeout.
    #[error("embedding request timed out after {after_ms} ms")]
    Timeout {
        /// Configured timeout.
        after_ms: u64,
    },
    /// Connection or protocol failure.
    #[error("embedding transport error: {0}")]
    Transport(String),
    /// Non-2xx response.
    #[error("embedding service answered with status {0}")]
    Status(u16),
    /// Response body was not `{ "embedding": [f32, ...] }`.
    #[error("malformed embedding response: {0}")]
    Malformed(String),
    /// Vector length differs from the deployment's dimension.
    #[error("embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Received dimension.
        got: usize,
    },
    /// Nothing to embed.
    #[error("cannot embed empty text")]
    EmptyInput,
}

/// Trait abstraction over embedding providers.
pub trait Embedder: Send + Sync {
    /// Embed a single text string.
    fn embed(&self, text: &str) -> EmbedFuture<'_, Result<Vec<f32>, EmbeddingUnavailable>>;
    /// Return embedding dimensionality.
    fn ndims(&self) -> usize;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Ollama-compatible embedder (`POST /api/embeddings`).
#[derive(Clone, Debug)]
pub struct OllamaEmbedder {
    client: ReqwestClient,
    endpoint: Url,
    model: String,
    ndims: usize,
    timeout: Duration,
}

impl OllamaEmbedder {
    /// Create a new embedder from config.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn new(config: &EmbeddingConfig) -> MemoryResult<Self> {
        let endpoint = Url::parse(&config.base_url)?.join("api/embeddings")?;
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            ndims: config.ndims,
            timeout,
        })
    }

    /// Endpoint the embedder posts to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingUnavailable> {
        let body = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|err| self.map_transport(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingUnavailable::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.map_transport(&err))?;
        parse_embedding_response(&bytes, self.ndims)
    }

    fn map_transport(&self, err: &reqwest::Error) -> EmbeddingUnavailable {
        if err.is_timeout() {
            self.timed_out()
        } else {
            EmbeddingUnavailable::Transport(err.to_string())
        }
    }

    fn timed_out(&self) -> EmbeddingUnavailable {
        EmbeddingUnavailable::Timeout {
            after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> EmbedFuture<'_, Result<Vec<f32>, EmbeddingUnavailable>> {
        let text = text.to_string();
        Box::pin(async move {
            if text.trim().is_empty() {
                return Err(EmbeddingUnavailable::EmptyInput);
            }

            // The client timeout covers the body; this bounds the whole exchange.
            match tokio::time::timeout(self.timeout, self.request(&text)).await {
                Ok(result) => result,
                Err(_) => Err(self.timed_out()),
            }
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}

/// Decode a provider response body and check its dimension.
///
/// # Errors
/// Returns [`EmbeddingUnavailable::Malformed`] for any other JSON shape or non-finite values,
/// and [`EmbeddingUnavailable::DimensionMismatch`] for a vector of the wrong length.
pub fn parse_embedding_response(
    body: &[u8],
    ndims: usize,
) -> Result<Vec<f32>, EmbeddingUnavailable> {
    let parsed: EmbeddingResponse = serde_json::from_slice(body)
        .map_err(|err| EmbeddingUnavailable::Malformed(err.to_string()))?;

    if parsed.embedding.len() != ndims {
        return Err(EmbeddingUnavailable::DimensionMismatch {
            expected: ndims,
            got: parsed.embedding.len(),
        });
    }

    if parsed.embedding.iter().any(|value| !value.is_finite()) {
        return Err(EmbeddingUnavailable::Malformed(
            "embedding contains non-finite values".to_string(),
        ));
    }

    Ok(parsed.embedding)
}
