use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::embed::{cosine_similarity, Embedding, EmbeddingClient};
use crate::store::{MetadataFilter, RetrievalHit, StoreStats, VectorStore};
use crate::Result;

/// In-memory vector store for development and testing.
///
/// Uses brute-force cosine similarity search. Suitable for small datasets
/// (< 10k chunks). For production, use a proper vector database.
///
/// Entries keep insertion order so equal scores rank deterministically.
pub struct MemoryStore {
    embeddings: Arc<EmbeddingClient>,
    entries: RwLock<Vec<(Chunk, Embedding)>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new(embeddings: Arc<EmbeddingClient>) -> Self {
        Self {
            embeddings,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Returns the number of stored chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored data
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<usize> {
        let valid: Vec<&Chunk> = chunks
            .iter()
            .filter(|chunk| match chunk.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "skipping chunk");
                    false
                }
            })
            .collect();

        let texts: Vec<String> = valid.iter().map(|c| c.content.clone()).collect();
        let vectors = Arc::clone(&self.embeddings).embed_batch_async(texts).await?;

        let mut entries = self.entries.write();
        for (chunk, vector) in valid.iter().zip(vectors) {
            match entries.iter_mut().find(|(existing, _)| existing.id == chunk.id) {
                Some(slot) => *slot = ((*chunk).clone(), vector),
                None => entries.push(((*chunk).clone(), vector)),
            }
        }

        debug!(stored = valid.len(), total = entries.len(), "upserted chunks");
        Ok(valid.len())
    }

    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>> {
        let query_embedding = Arc::clone(&self.embeddings)
            .embed_async(query.to_string())
            .await?;
        let entries = self.entries.read();

        let mut hits: Vec<RetrievalHit> = entries
            .iter()
            .filter(|(chunk, _)| filter.map_or(true, |f| f.matches(&chunk.metadata)))
            .map(|(chunk, embedding)| {
                RetrievalHit::from_chunk(chunk, cosine_similarity(&query_embedding, embedding))
            })
            .collect();

        // stable: equal scores keep insertion order
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_document(&self, doc_id: &str) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(chunk, _)| chunk.metadata.doc_id != doc_id);
        Ok(before - entries.len())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_vectors: self.len(),
            dimension: self.embeddings.dimension(),
        })
    }
}
