//! Second-stage reranking
//!
//! Rescores the retriever's survivors against the query. The default
//! [`SimilarityReranker`] blends a fresh query-chunk cosine similarity with
//! the fused score the chunk arrived with:
//!
//! ```text
//! rerank_score = 0.6 * similarity + 0.4 * fused_score
//! ```
//!
//! The similarity term never reuses retrieval scores.
//!
//! # Usage
//!
//! ```ignore
//! use ragpipe_lib::rerank::{Reranker, SimilarityReranker};
//!
//! let reranker = SimilarityReranker::new(embeddings.clone());
//! let top = reranker.rerank("What is RAG?", fused, 5)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::search::FusedResult;
use crate::Result;

/// Default number of results kept after reranking.
pub const DEFAULT_RERANK_TOP_N: usize = 5;

/// A fused result with its rerank scores attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankedResult {
    #[serde(flatten)]
    pub result: FusedResult,
    pub rerank_score: f32,
    /// Query-chunk cosine similarity in `[0, 1]`
    pub similarity: f32,
}

pub trait Reranker: Send + Sync {
    /// Score a single chunk against the query.
    fn score(&self, query: &str, chunk: &FusedResult) -> Result<f32>;

    /// Rescore, sort descending by rerank score and keep the best `top_n`.
    ///
    /// Empty input yields empty output.
    fn rerank(&self, query: &str, chunks: Vec<FusedResult>, top_n: usize) -> Result<Vec<RerankedResult>>;
}

mod similarity;

pub use similarity::*;
