use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::pipeline::{preview, PipelineState, Stage, StageName};
use crate::rerank::RerankedResult;
use crate::web::WebResult;
use crate::Result;

/// Answer used when nothing was retrieved.
pub const NO_CONTEXT_ANSWER: &str = "I don't have enough information to answer your question.";

/// Turns the query and its context into an answer.
///
/// Implement this for a hosted language model; [`ExtractiveGenerator`]
/// needs none.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, query: &str, chunks: &[RerankedResult], web: &[WebResult]) -> Result<String>;
}

/// Builds an answer by quoting the best chunks and web snippets.
#[derive(Debug, Clone, Copy)]
pub struct ExtractiveGenerator {
    pub max_chunks: usize,
    pub chunk_chars: usize,
    pub max_web: usize,
    pub web_chars: usize,
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self {
            max_chunks: 3,
            chunk_chars: 200,
            max_web: 2,
            web_chars: 150,
        }
    }
}

impl ExtractiveGenerator {
    #[must_use]
    pub fn compose(&self, query: &str, chunks: &[RerankedResult], web: &[WebResult]) -> String {
        if chunks.is_empty() && web.is_empty() {
            return NO_CONTEXT_ANSWER.to_string();
        }

        let mut parts = vec![format!("Based on the available information regarding '{query}':\n")];

        if !chunks.is_empty() {
            parts.push(format!("\nFrom documents ({} relevant sections found):", chunks.len()));
            for (i, chunk) in chunks.iter().take(self.max_chunks).enumerate() {
                parts.push(format!("\n{}. {}", i + 1, preview(&chunk.result.content, self.chunk_chars)));
            }
        }

        if !web.is_empty() {
            parts.push(format!("\n\nFrom web search ({} results):", web.len()));
            for (i, result) in web.iter().take(self.max_web).enumerate() {
                parts.push(format!("\n{}. {}", i + 1, preview(&result.snippet, self.web_chars)));
            }
        }

        parts.join("\n")
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate(&self, query: &str, chunks: &[RerankedResult], web: &[WebResult]) -> Result<String> {
        Ok(self.compose(query, chunks, web))
    }
}

pub struct GenerationStage {
    generator: Arc<dyn Generator>,
}

impl GenerationStage {
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

impl Default for GenerationStage {
    fn default() -> Self {
        Self::new(Arc::new(ExtractiveGenerator::default()))
    }
}

#[async_trait]
impl Stage for GenerationStage {
    fn name(&self) -> StageName {
        StageName::Generation
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let response = self
            .generator
            .generate(&state.query, &state.reranked_chunks, &state.web_results)
            .await?;
        debug!(chars = response.len(), "generated response");

        let mut next = state.advance(self.name());
        next.generated_response = Some(response);
        Ok(next)
    }
}
