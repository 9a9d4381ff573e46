//! Memory record model with validation helpers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::core::content_type::ContentType;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;

/// A persisted development artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique record identifier.
    pub id: MemoryId,
    /// Raw artifact text.
    pub content: String,
    /// Artifact category.
    pub content_type: ContentType,
    /// Keywords derived at ingest time (sorted, deduplicated).
    pub keywords: BTreeSet<String>,
    /// Embedding vector, absent until the provider answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time (embedding backfill bumps it).
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a new record without an embedding.
    ///
    /// # Errors
    /// Returns a validation error if content is empty after trimming.
    pub fn new(
        content: impl Into<String>,
        content_type: ContentType,
        keywords: BTreeSet<String>,
    ) -> MemoryResult<Self> {
        let content = content.into();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(MemoryError::validation("content is empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: MemoryId::new(),
            content: trimmed.to_string(),
            content_type,
            keywords,
            embedding: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Attach an embedding.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// True if the record can be found through the vector index.
    #[must_use]
    pub const fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// Validate the record before it reaches storage.
    ///
    /// # Errors
    /// Returns a validation error if the content is empty or the embedding has the wrong size
    /// or contains non-finite values.
    pub fn validate(&self, ndims: usize) -> MemoryResult<()> {
        if self.content.trim().is_empty() {
            return Err(MemoryError::validation("content is empty"));
        }

        if let Some(embedding) = &self.embedding {
            validate_vector(embedding, ndims)?;
        }

        Ok(())
    }
}

/// Check a vector against the deployment's embedding dimension.
///
/// # Errors
/// Returns a validation error on a dimension mismatch or a non-finite component.
pub fn validate_vector(vector: &[f32], ndims: usize) -> MemoryResult<()> {
    if vector.len() != ndims {
        return Err(MemoryError::Validation(format!(
            "embedding has {} dimensions, expected {ndims}",
            vector.len()
        )));
    }

    if vector.iter().any(|value| !value.is_finite()) {
        return Err(MemoryError::validation(
            "embedding contains non-finite values",
        ));
    }

    Ok(())
}
