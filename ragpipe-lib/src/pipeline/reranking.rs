use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::pipeline::{PipelineState, Stage, StageName};
use crate::rerank::Reranker;
use crate::{Error, Result};

pub struct RerankingStage {
    reranker: Arc<dyn Reranker>,
    top_n: usize,
}

impl RerankingStage {
    #[must_use]
    pub fn new(reranker: Arc<dyn Reranker>, top_n: usize) -> Self {
        Self { reranker, top_n }
    }
}

#[async_trait]
impl Stage for RerankingStage {
    fn name(&self) -> StageName {
        StageName::Reranking
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        // reranking embeds every candidate; keep it off the runtime workers
        let reranker = Arc::clone(&self.reranker);
        let query = state.query.clone();
        let candidates = state.retrieved_chunks.clone();
        let top_n = self.top_n;
        let reranked = tokio::task::spawn_blocking(move || reranker.rerank(&query, candidates, top_n))
            .await
            .map_err(|e| Error::Embedding(format!("rerank task failed: {e}")))??;

        match reranked.first() {
            Some(top) => debug!(kept = reranked.len(), top_score = top.rerank_score, "reranked"),
            None => debug!("nothing to rerank"),
        }

        let mut next = state.advance(self.name());
        next.reranked_chunks = reranked;
        Ok(next)
    }
}
