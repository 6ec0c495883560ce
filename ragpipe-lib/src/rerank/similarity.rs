use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::embed::EmbeddingClient;
use crate::rerank::{RerankedResult, Reranker};
use crate::search::FusedResult;
use crate::Result;

/// Weight of the fresh similarity term.
pub const SIMILARITY_WEIGHT: f32 = 0.6;
/// Weight of the fused score carried from retrieval.
pub const PRIOR_WEIGHT: f32 = 0.4;

/// Bi-encoder reranker sharing the pipeline's embedding client.
///
/// Stateless between calls: reranking the same input twice gives the same
/// scores.
pub struct SimilarityReranker {
    embeddings: Arc<EmbeddingClient>,
}

impl SimilarityReranker {
    #[must_use]
    pub fn new(embeddings: Arc<EmbeddingClient>) -> Self {
        Self { embeddings }
    }

    fn blend(similarity: f32, prior: f32) -> f32 {
        SIMILARITY_WEIGHT * similarity + PRIOR_WEIGHT * prior
    }
}

impl Reranker for SimilarityReranker {
    fn score(&self, query: &str, chunk: &FusedResult) -> Result<f32> {
        let query_embedding = self.embeddings.embed(query)?;
        let chunk_embedding = self.embeddings.embed(&chunk.content)?;
        let similarity = EmbeddingClient::similarity(&query_embedding, &chunk_embedding);
        Ok(Self::blend(similarity, chunk.fused_score))
    }

    #[instrument(skip_all, fields(chunks = chunks.len(), top_n))]
    fn rerank(&self, query: &str, chunks: Vec<FusedResult>, top_n: usize) -> Result<Vec<RerankedResult>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embeddings.embed(query)?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let chunk_embeddings = self.embeddings.embed_batch(&texts)?;

        let mut reranked: Vec<RerankedResult> = chunks
            .into_iter()
            .zip(chunk_embeddings)
            .map(|(result, embedding)| {
                let similarity = EmbeddingClient::similarity(&query_embedding, &embedding);
                RerankedResult {
                    rerank_score: Self::blend(similarity, result.fused_score),
                    similarity,
                    result,
                }
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(Ordering::Equal)
        });
        reranked.truncate(top_n);

        debug!(kept = reranked.len(), "reranked");
        Ok(reranked)
    }
}
