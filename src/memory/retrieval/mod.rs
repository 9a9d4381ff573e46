//! Retrieval: rank fusion and hybrid search.

pub mod fusion;
pub mod hybrid_search;

pub use fusion::{FusedScore, fuse, max_score, select};
pub use hybrid_search::{HybridSearcher, SearchHit};
