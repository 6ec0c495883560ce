//! Dense vector storage
//!
//! The vector store is an external collaborator: production deployments put a
//! hosted vector database behind [`VectorStore`]. [`MemoryStore`] is the
//! in-process implementation used by the CLI and in tests.
//!
//! Stores take query *text*, not vectors; embedding happens inside the store
//! through the shared [`EmbeddingClient`](crate::embed::EmbeddingClient).
//!
//! # Usage
//!
//! ```ignore
//! use ragpipe_lib::store::{MemoryStore, VectorStore};
//!
//! let store = MemoryStore::new(embeddings.clone());
//! store.upsert(&chunks).await?;
//!
//! let hits = store.similarity_search("Who won the match?", 5, None).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkMetadata};
use crate::Result;

/// A ranked hit from either retrieval path.
///
/// `score` is source-specific (cosine similarity for dense, BM25 for sparse)
/// and must not be compared across sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalHit {
    pub chunk_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Higher is more relevant
    pub score: f32,
}

impl RetrievalHit {
    #[must_use]
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            content: chunk.content.clone(),
            metadata: chunk.metadata.clone(),
            score,
        }
    }
}

/// Restricts a dense search to matching chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataFilter {
    pub doc_id: Option<String>,
    pub filename: Option<String>,
}

impl MetadataFilter {
    #[must_use]
    pub fn doc(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: Some(doc_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.doc_id.as_ref().map_or(true, |id| *id == metadata.doc_id)
            && self
                .filename
                .as_ref()
                .map_or(true, |name| *name == metadata.filename)
    }
}

/// Size of a store's contents.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub total_vectors: usize,
    pub dimension: usize,
}

/// Trait for vector storage backends
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and store chunks, replacing any with the same id.
    ///
    /// Chunks that fail validation are skipped, not fatal to the batch.
    /// Returns the number of chunks stored.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Search for chunks similar to the query text
    ///
    /// # Returns
    /// Top-k hits sorted by similarity (highest first)
    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>>;

    /// Remove every chunk of a document. Returns the number removed.
    async fn delete_document(&self, doc_id: &str) -> Result<usize>;

    async fn stats(&self) -> Result<StoreStats>;
}

mod memory;

pub use memory::*;
