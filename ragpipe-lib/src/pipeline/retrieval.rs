use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::pipeline::{PipelineState, Stage, StageName};
use crate::search::{FusionWeights, HybridRetriever};
use crate::web::WebSearch;
use crate::Result;

/// Hybrid search over the corpus, plus the web when analysis asked for it.
///
/// Dense retrieval failures fail the stage. Web failures only cost the web
/// results.
pub struct RetrievalStage {
    retriever: Arc<HybridRetriever>,
    web: Option<Arc<dyn WebSearch>>,
    top_k: usize,
    weights: FusionWeights,
    max_web_results: usize,
}

impl RetrievalStage {
    #[must_use]
    pub fn new(retriever: Arc<HybridRetriever>, top_k: usize, weights: FusionWeights) -> Self {
        Self {
            retriever,
            web: None,
            top_k,
            weights,
            max_web_results: 5,
        }
    }

    #[must_use]
    pub fn with_web_search(mut self, web: Arc<dyn WebSearch>, max_results: usize) -> Self {
        self.web = Some(web);
        self.max_web_results = max_results;
        self
    }
}

#[async_trait]
impl Stage for RetrievalStage {
    fn name(&self) -> StageName {
        StageName::Retrieval
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let retrieved = self
            .retriever
            .search(&state.query, self.top_k, self.weights.dense(), self.weights.sparse())
            .await?;
        debug!(chunks = retrieved.len(), "retrieved from corpus");

        let web_results = match (&self.web, state.needs_web_search) {
            (Some(web), true) => match web.search(&state.query, self.max_web_results).await {
                Ok(results) => {
                    debug!(provider = web.name(), results = results.len(), "retrieved from web");
                    results
                }
                Err(e) => {
                    warn!(provider = web.name(), error = %e, "web search failed, continuing without it");
                    Vec::new()
                }
            },
            (None, true) => {
                debug!("web search requested but no provider configured");
                Vec::new()
            }
            (_, false) => Vec::new(),
        };

        let mut next = state.advance(self.name());
        next.retrieved_chunks = retrieved;
        next.web_results = web_results;
        Ok(next)
    }
}
