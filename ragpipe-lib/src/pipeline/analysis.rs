use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::{PipelineState, Stage, StageName};
use crate::{Error, Result};

/// Maximum keywords extracted from a query.
pub const MAX_KEYWORDS: usize = 5;

const QUESTION_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who"];
const REASONING_WORDS: &[&str] = &["why", "how"];
const GREETING_WORDS: &[&str] = &["hello", "hi", "thanks"];
const GREETING_PHRASES: &[&str] = &["thank you"];
const RECENCY_WORDS: &[&str] = &["latest", "recent", "current", "today", "now", "2024", "2025", "2026"];
const RECENCY_PHRASES: &[&str] = &["this year"];
const STOP_WORDS: &[&str] = &[
    "what", "is", "the", "a", "an", "in", "on", "at", "to", "for", "of", "and", "or", "but", "with",
    "from", "by", "about",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Seeking specific facts
    #[default]
    Factual,
    /// Requires reasoning ("why", "how")
    Analytical,
    /// Greetings and thanks
    Conversational,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Factual => "factual",
            Self::Analytical => "analytical",
            Self::Conversational => "conversational",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    pub needs_web_search: bool,
    pub keywords: Vec<String>,
}

/// Decides how a query should be answered.
#[async_trait]
pub trait QueryAnalyzer: Send + Sync {
    async fn analyze(&self, query: &str) -> Result<QueryAnalysis>;
}

/// Keyword rules; no model required.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedAnalyzer;

impl RuleBasedAnalyzer {
    #[must_use]
    pub fn classify(query: &str) -> QueryAnalysis {
        let lower = query.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has_word = |set: &[&str]| words.iter().any(|w| set.contains(w));
        let has_phrase = |set: &[&str]| set.iter().any(|p| lower.contains(p));

        let query_type = if has_word(GREETING_WORDS) || has_phrase(GREETING_PHRASES) {
            QueryType::Conversational
        } else if words.first().is_some_and(|w| QUESTION_WORDS.contains(w)) && has_word(REASONING_WORDS) {
            QueryType::Analytical
        } else {
            QueryType::Factual
        };

        let keywords = lower
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
            .take(MAX_KEYWORDS)
            .map(str::to_string)
            .collect();

        QueryAnalysis {
            query_type,
            needs_web_search: has_word(RECENCY_WORDS) || has_phrase(RECENCY_PHRASES),
            keywords,
        }
    }
}

#[async_trait]
impl QueryAnalyzer for RuleBasedAnalyzer {
    async fn analyze(&self, query: &str) -> Result<QueryAnalysis> {
        Ok(Self::classify(query))
    }
}

/// First stage: classify the query and decide whether the web is needed.
pub struct AnalysisStage {
    analyzer: Arc<dyn QueryAnalyzer>,
}

impl AnalysisStage {
    #[must_use]
    pub fn new(analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        Self { analyzer }
    }
}

impl Default for AnalysisStage {
    fn default() -> Self {
        Self::new(Arc::new(RuleBasedAnalyzer))
    }
}

#[async_trait]
impl Stage for AnalysisStage {
    fn name(&self) -> StageName {
        StageName::QueryAnalysis
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        if state.query.trim().is_empty() {
            return Err(Error::InvalidInput("query is empty".to_string()));
        }

        let analysis = self.analyzer.analyze(&state.query).await?;
        debug!(
            query_type = %analysis.query_type,
            needs_web_search = analysis.needs_web_search,
            keywords = ?analysis.keywords,
            "analyzed query"
        );

        let mut next = state.advance(self.name());
        next.query_type = Some(analysis.query_type);
        next.needs_web_search = analysis.needs_web_search;
        next.search_keywords = analysis.keywords;
        Ok(next)
    }
}
