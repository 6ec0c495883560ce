use std::fmt::Write;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::{PipelineState, Stage, StageName};
use crate::rerank::RerankedResult;
use crate::web::WebResult;
use crate::Result;

pub const MAX_DOCUMENT_CITATIONS: usize = 5;
pub const MAX_WEB_CITATIONS: usize = 3;
/// Characters of source text kept in a citation.
pub const CITATION_PREVIEW_CHARS: usize = 100;

/// A numbered source reference. Ids start at 1; documents come first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Citation {
    Document {
        id: usize,
        filename: String,
        page: Option<u32>,
        content_preview: String,
    },
    Web {
        id: usize,
        title: String,
        url: String,
        snippet: String,
    },
}

impl Citation {
    #[must_use]
    pub fn id(&self) -> usize {
        match self {
            Self::Document { id, .. } | Self::Web { id, .. } => *id,
        }
    }
}

/// Number the reranked chunks, then the web results.
#[must_use]
pub fn build_citations(chunks: &[RerankedResult], web: &[WebResult]) -> Vec<Citation> {
    let mut citations: Vec<Citation> = chunks
        .iter()
        .take(MAX_DOCUMENT_CITATIONS)
        .enumerate()
        .map(|(i, chunk)| Citation::Document {
            id: i + 1,
            filename: chunk.result.metadata.filename.clone(),
            page: chunk.result.metadata.page_number,
            content_preview: chunk.result.content.chars().take(CITATION_PREVIEW_CHARS).collect(),
        })
        .collect();

    let offset = citations.len();
    citations.extend(web.iter().take(MAX_WEB_CITATIONS).enumerate().map(|(i, result)| {
        Citation::Web {
            id: offset + i + 1,
            title: if result.title.is_empty() {
                "Web Source".to_string()
            } else {
                result.title.clone()
            },
            url: result.url.clone(),
            snippet: result.snippet.chars().take(CITATION_PREVIEW_CHARS).collect(),
        }
    }));

    citations
}

/// Append a "Sources" section listing every citation.
#[must_use]
pub fn format_with_citations(response: &str, citations: &[Citation]) -> String {
    let mut formatted = format!("{response}\n\n");
    if citations.is_empty() {
        return formatted;
    }

    formatted.push_str("**Sources:**\n\n");
    for citation in citations {
        // writing to a String cannot fail
        let _ = match citation {
            Citation::Document { id, filename, page: Some(page), .. } => {
                writeln!(formatted, "[{id}] {filename}, Page {page}")
            }
            Citation::Document { id, filename, page: None, .. } => writeln!(formatted, "[{id}] {filename}"),
            Citation::Web { id, title, url, .. } => writeln!(formatted, "[{id}] {title}\n    {url}"),
        };
    }
    formatted
}

/// Last stage: attach sources to the generated response.
#[derive(Debug, Clone, Copy, Default)]
pub struct CitationStage;

#[async_trait]
impl Stage for CitationStage {
    fn name(&self) -> StageName {
        StageName::Citation
    }

    async fn run(&self, state: &PipelineState) -> Result<PipelineState> {
        let mut next = state.advance(self.name());

        let response = state.generated_response.as_deref().unwrap_or_default();
        if response.is_empty() {
            next.citations = Vec::new();
            next.final_response = Some(String::new());
            return Ok(next);
        }

        let citations = build_citations(&state.reranked_chunks, &state.web_results);
        debug!(citations = citations.len(), "attached citations");

        next.final_response = Some(format_with_citations(response, &citations));
        next.citations = citations;
        Ok(next)
    }
}
