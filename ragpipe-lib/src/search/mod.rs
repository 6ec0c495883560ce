//! Hybrid retrieval
//!
//! Combines the dense vector store and the sparse BM25 index into one ranked
//! list with weighted Reciprocal Rank Fusion. Fusion works on ranks only, so
//! cosine and BM25 score scales never meet.
//!
//! # Usage
//!
//! ```ignore
//! use ragpipe_lib::search::HybridRetriever;
//!
//! let retriever = HybridRetriever::new(store, Arc::new(SparseIndex::new()));
//! retriever.index_corpus(&chunks).await?;
//!
//! // 0.7 dense / 0.3 sparse, top 10 after fusion
//! let results = retriever.search("What is RAG?", 10, 0.7, 0.3).await?;
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::chunk::Chunk;
use crate::sparse::SparseIndex;
use crate::store::{MetadataFilter, VectorStore};
use crate::Result;

/// Each leg fetches this many candidates per requested result.
pub const OVERFETCH_FACTOR: usize = 2;

/// Dense + sparse retriever.
///
/// Dense failures surface to the caller; an unbuilt sparse index just
/// contributes nothing.
///
/// The retriever keeps its own copy of every indexed chunk so the sparse
/// index always covers exactly what the vector store holds. Index and delete
/// through the retriever, not through [`store`](Self::store).
pub struct HybridRetriever {
    store: Arc<dyn VectorStore>,
    sparse: Arc<SparseIndex>,
    corpus: RwLock<Vec<Chunk>>,
}

impl HybridRetriever {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, sparse: Arc<SparseIndex>) -> Self {
        Self {
            store,
            sparse,
            corpus: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    #[must_use]
    pub fn sparse_index(&self) -> &SparseIndex {
        &self.sparse
    }

    /// Number of chunks indexed through this retriever.
    #[must_use]
    pub fn corpus_len(&self) -> usize {
        self.corpus.read().len()
    }

    /// Upsert `chunks` into the vector store, then rebuild the sparse index
    /// over everything indexed so far.
    ///
    /// Chunks replace earlier ones with the same id. Invalid chunks are
    /// skipped by both indexes.
    pub async fn index_corpus(&self, chunks: &[Chunk]) -> Result<usize> {
        let stored = self.store.upsert(chunks).await?;

        let mut corpus = self.corpus.write();
        for chunk in chunks.iter().filter(|c| c.validate().is_ok()) {
            match corpus.iter_mut().find(|existing| existing.id == chunk.id) {
                Some(slot) => *slot = chunk.clone(),
                None => corpus.push(chunk.clone()),
            }
        }
        let indexed = self.sparse.build(&corpus);
        debug!(stored, indexed, "corpus indexed");
        Ok(stored)
    }

    /// Remove a document from the vector store and the sparse index.
    ///
    /// Returns the number of chunks the store removed.
    pub async fn delete_document(&self, doc_id: &str) -> Result<usize> {
        let removed = self.store.delete_document(doc_id).await?;

        let mut corpus = self.corpus.write();
        corpus.retain(|chunk| chunk.metadata.doc_id != doc_id);
        self.sparse.build(&corpus);
        debug!(doc_id, removed, remaining = corpus.len(), "document deleted");
        Ok(removed)
    }

    /// Hybrid search over the whole corpus.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        dense_weight: f32,
        sparse_weight: f32,
    ) -> Result<Vec<FusedResult>> {
        self.search_filtered(query, top_k, dense_weight, sparse_weight, None)
            .await
    }

    /// Hybrid search restricted by a metadata filter.
    ///
    /// The filter goes to the vector store and is applied to sparse hits too.
    #[instrument(skip(self, filter), fields(sparse_built = self.sparse.is_built()))]
    pub async fn search_filtered(
        &self,
        query: &str,
        top_k: usize,
        dense_weight: f32,
        sparse_weight: f32,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<FusedResult>> {
        let weights = FusionWeights::new(dense_weight, sparse_weight)?;
        let candidates = top_k.saturating_mul(OVERFETCH_FACTOR);

        let dense = self
            .store
            .similarity_search(query, candidates, filter)
            .await?;

        let mut sparse = self.sparse.search(query, candidates);
        if let Some(filter) = filter {
            sparse.retain(|hit| filter.matches(&hit.metadata));
        }

        debug!(dense = dense.len(), sparse = sparse.len(), "fusing candidates");

        let mut fused = weighted_rrf(&dense, &sparse, weights);
        fused.truncate(top_k);
        Ok(fused)
    }
}

mod fusion;

pub use fusion::*;
