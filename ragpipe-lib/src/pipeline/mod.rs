//! Query pipeline
//!
//! A fixed, linear state machine:
//!
//! ```text
//! QueryAnalysis -> Retrieval -> Reranking -> Generation -> Citation -> done
//! ```
//!
//! Each [`Stage`] reads the current [`PipelineState`] and returns a new one
//! with its outputs filled in and its name appended to `stages`. Stages never
//! mutate the state they are given, so a failing stage cannot leave a
//! half-written record behind.
//!
//! When a stage fails, [`Pipeline::run`] returns the state produced by the
//! last successful stage with `error` set (best-effort partial result):
//! retrieved and reranked chunks computed before the failure are kept.
//!
//! # Usage
//!
//! ```ignore
//! use ragpipe_lib::pipeline::{Pipeline, PipelineComponents};
//!
//! let pipeline = Pipeline::from_components(components, &settings)?;
//! let state = pipeline.run("What is RAG?", None).await;
//!
//! match &state.error {
//!     None => println!("{}", state.final_response.unwrap_or_default()),
//!     Some(err) => eprintln!("{err}"),
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::Settings;
use crate::rerank::{RerankedResult, Reranker};
use crate::search::{FusedResult, HybridRetriever};
use crate::web::{WebResult, WebSearch};
use crate::{Error, Result};

/// Stage identifiers, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    QueryAnalysis,
    Retrieval,
    Reranking,
    Generation,
    Citation,
}

impl StageName {
    pub const ORDER: [StageName; 5] = [
        StageName::QueryAnalysis,
        StageName::Retrieval,
        StageName::Reranking,
        StageName::Generation,
        StageName::Citation,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryAnalysis => "query_analysis",
            Self::Retrieval => "retrieval",
            Self::Reranking => "reranking",
            Self::Generation => "generation",
            Self::Citation => "citation",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage failure recorded in the state.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{stage} stage failed: {error}")]
pub struct StageError {
    pub stage: StageName,
    #[serde(serialize_with = "display")]
    pub error: Error,
}

fn display<S: Serializer>(error: &Error, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Everything known about one query as it moves through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineState {
    pub query: String,
    pub conversation_id: Option<String>,

    pub query_type: Option<QueryType>,
    pub needs_web_search: bool,
    pub search_keywords: Vec<String>,

    pub retrieved_chunks: Vec<FusedResult>,
    pub web_results: Vec<WebResult>,
    pub reranked_chunks: Vec<RerankedResult>,

    pub generated_response: Option<String>,
    pub citations: Vec<Citation>,
    pub final_response: Option<String>,

    /// Completed stages, in order
    pub stages: Vec<StageName>,
    pub error: Option<StageError>,
}

impl PipelineState {
    #[must_use]
    pub fn new(query: impl Into<String>, conversation_id: Option<String>) -> Self {
        Self {
            query: query.into(),
            conversation_id,
            ..Self::default()
        }
    }

    /// Copy of this state with `stage` recorded as completed.
    #[must_use]
    pub fn advance(&self, stage: StageName) -> Self {
        let mut next = self.clone();
        next.stages.push(stage);
        next
    }

    /// All stages ran and none failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.stages == StageName::ORDER
    }
}

/// One step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// Produce the next state. Implementations append [`name`](Self::name)
    /// to `stages` (see [`PipelineState::advance`]).
    async fn run(&self, state: &PipelineState) -> Result<PipelineState>;
}

/// Shared collaborators for the standard stages.
pub struct PipelineComponents {
    pub retriever: Arc<HybridRetriever>,
    pub reranker: Arc<dyn Reranker>,
    pub analyzer: Arc<dyn QueryAnalyzer>,
    pub generator: Arc<dyn Generator>,
    pub web: Option<Arc<dyn WebSearch>>,
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Build from one stage per slot.
    ///
    /// Fails with a configuration error if a stage sits in the wrong slot.
    pub fn new(
        analysis: Box<dyn Stage>,
        retrieval: Box<dyn Stage>,
        reranking: Box<dyn Stage>,
        generation: Box<dyn Stage>,
        citation: Box<dyn Stage>,
    ) -> Result<Self> {
        let stages = vec![analysis, retrieval, reranking, generation, citation];
        for (stage, expected) in stages.iter().zip(StageName::ORDER) {
            if stage.name() != expected {
                return Err(Error::Configuration(format!(
                    "expected {expected} stage, got {}",
                    stage.name()
                )));
            }
        }
        Ok(Self { stages })
    }

    /// The standard stages wired to shared components.
    pub fn from_components(components: PipelineComponents, settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let mut retrieval = RetrievalStage::new(
            components.retriever,
            settings.retrieval.top_k,
            settings.fusion_weights(),
        );
        if let Some(web) = components.web {
            retrieval = retrieval.with_web_search(web, settings.web_search.max_results);
        }

        Self::new(
            Box::new(AnalysisStage::new(components.analyzer)),
            Box::new(retrieval),
            Box::new(RerankingStage::new(components.reranker, settings.reranking.top_n)),
            Box::new(GenerationStage::new(components.generator)),
            Box::new(CitationStage),
        )
    }

    /// Run a fresh query through every stage.
    pub async fn run(&self, query: &str, conversation_id: Option<String>) -> PipelineState {
        self.run_state(PipelineState::new(query, conversation_id)).await
    }

    /// Run every stage, in order, starting from `state`.
    ///
    /// Never fails: a stage error is attached to the returned state, which
    /// holds everything produced before the failing stage.
    #[instrument(skip_all, fields(query = %state.query))]
    pub async fn run_state(&self, mut state: PipelineState) -> PipelineState {
        if state.error.is_some() {
            return state;
        }

        for stage in &self.stages {
            let name = stage.name();
            match stage.run(&state).await {
                Ok(next) => state = next,
                Err(error) => {
                    warn!(stage = %name, error = %error, "pipeline stage failed");
                    state.error = Some(StageError { stage: name, error });
                    return state;
                }
            }
        }

        let trace: Vec<&str> = state.stages.iter().map(StageName::as_str).collect();
        info!(
            stages = %trace.join(" -> "),
            reranked = state.reranked_chunks.len(),
            citations = state.citations.len(),
            "pipeline complete"
        );
        state
    }
}

/// First `max_chars` characters of `text`, with "..." when cut.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

mod analysis;
mod citation;
mod generation;
mod reranking;
mod retrieval;

pub use analysis::*;
pub use citation::*;
pub use generation::*;
pub use reranking::*;
pub use retrieval::*;
