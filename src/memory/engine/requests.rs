//! Closed request and hook types accepted by the engine.

use serde::{Deserialize, Serialize};

use crate::memory::context::budget::ContextBudget;
use crate::memory::context::builder::AssembledContext;
use crate::memory::core::content_type::ContentType;
use crate::memory::core::ids::MemoryId;
use crate::memory::governor::outcome::{Outcome, SkipReason};
use crate::memory::retrieval::hybrid_search::SearchHit;
use crate::memory::storage::memory_store::EmbeddingUpdate;

/// Search parameters. Unset fields take the configured defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Restrict results to one content type.
    #[serde(default)]
    pub content_type: Option<ContentType>,
    /// Maximum results.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Relevance floor in `[0, 1]`.
    #[serde(default)]
    pub min_relevance: Option<f64>,
}

impl SearchRequest {
    /// Search for `query` with default parameters.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

/// Context assembly parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRequest {
    /// External documentation to place first.
    #[serde(default)]
    pub doc_blob: String,
    /// Query used to retrieve memories.
    pub query: String,
    /// Token budgets; configured defaults when unset.
    #[serde(default)]
    pub budget: Option<ContextBudget>,
    /// Text of the file being worked on.
    #[serde(default)]
    pub current_file: Option<String>,
    /// Restrict memories to one content type.
    #[serde(default)]
    pub content_type: Option<ContentType>,
}

/// Operations accepted by [`crate::memory::engine::MemoryEngine::dispatch`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MemoryRequest {
    /// Persist a new record.
    Store {
        /// Record text.
        content: String,
        /// Content type name; validated strictly.
        content_type: String,
        /// Extra keywords merged with extracted ones.
        #[serde(default)]
        keywords: Vec<String>,
    },
    /// Governed hybrid search.
    Search(SearchRequest),
    /// Attach a vector to a record.
    UpdateEmbedding {
        /// Target record.
        id: MemoryId,
        /// Vector of the configured dimension.
        embedding: Vec<f32>,
    },
    /// Build a context payload.
    AssembleContext(ContextRequest),
    /// Remove a record.
    Delete {
        /// Target record.
        id: MemoryId,
    },
}

/// Result of a [`MemoryRequest`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MemoryResponse {
    /// Record stored.
    Stored {
        /// New record id.
        id: MemoryId,
    },
    /// Search finished or was skipped.
    Search {
        /// Governed search result.
        outcome: Outcome<Vec<SearchHit>>,
    },
    /// Embedding attached.
    EmbeddingUpdated {
        /// Whether the index changed.
        update: EmbeddingUpdate,
    },
    /// Context assembled.
    Context {
        /// Assembled payload.
        context: AssembledContext,
    },
    /// Delete finished.
    Deleted {
        /// False if the record did not exist.
        deleted: bool,
    },
}

/// Events fired by the external caller around each unit of work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HookEvent {
    /// Before work starts: assemble context for it.
    Before {
        /// Debounce key (caller, file, session...).
        key: String,
        /// Query used to retrieve memories.
        query: String,
        /// External documentation.
        #[serde(default)]
        doc_blob: String,
        /// Text of the file being worked on.
        #[serde(default)]
        current_file: Option<String>,
        /// Restrict memories to one content type.
        #[serde(default)]
        content_type: Option<ContentType>,
    },
    /// After work finished: remember what happened.
    After {
        /// Debounce key.
        key: String,
        /// Artifact text.
        content: String,
        /// Content type name; validated strictly.
        content_type: String,
        /// Extra keywords.
        #[serde(default)]
        keywords: Vec<String>,
    },
}

impl HookEvent {
    /// Debounce key of the event, namespaced by phase.
    #[must_use]
    pub fn debounce_key(&self) -> String {
        match self {
            Self::Before { key, .. } => format!("before:{key}"),
            Self::After { key, .. } => format!("after:{key}"),
        }
    }
}

/// Result of a hook. Hooks never fail.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HookOutcome {
    /// Context assembled for a `Before` event.
    Context {
        /// Assembled payload.
        context: AssembledContext,
    },
    /// Record stored for an `After` event.
    Stored {
        /// New record id.
        id: MemoryId,
    },
    /// Nothing was done.
    Skipped {
        /// Why.
        reason: SkipReason,
    },
}

impl From<Outcome<AssembledContext>> for HookOutcome {
    fn from(outcome: Outcome<AssembledContext>) -> Self {
        match outcome {
            Outcome::Executed(context) | Outcome::Cached(context) => Self::Context { context },
            Outcome::Skipped(reason) => Self::Skipped { reason },
        }
    }
}

impl From<Outcome<MemoryId>> for HookOutcome {
    fn from(outcome: Outcome<MemoryId>) -> Self {
        match outcome {
            Outcome::Executed(id) | Outcome::Cached(id) => Self::Stored { id },
            Outcome::Skipped(reason) => Self::Skipped { reason },
        }
    }
}
