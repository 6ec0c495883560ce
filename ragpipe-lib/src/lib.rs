//! ragpipe - retrieval core for retrieval-augmented generation
//!
//! # Architecture
//!
//! ```text
//! Document -> Chunker -> EmbeddingClient -> VectorStore ----+
//!                    \                                      |
//!                     +-> SparseIndex (BM25) -------------+ |
//!                                                         | |
//! Query -> QueryAnalysis -> Retrieval (weighted RRF) <----+-+
//!                              |  (+ optional web search)
//!                          Reranking -> Generation -> Citation
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ragpipe_lib::chunk::{Chunker, DocumentMetadata, FileType, PageChunker};
//! use ragpipe_lib::config::Settings;
//! use ragpipe_lib::embed::{EmbeddingClient, LocalEmbedder};
//! use ragpipe_lib::pipeline::{Pipeline, PipelineComponents};
//!
//! let settings = Settings::load(None)?;
//! let embeddings = Arc::new(EmbeddingClient::new(Arc::new(LocalEmbedder::from_settings(&settings.embedding)?)));
//!
//! // Index a document
//! let doc = DocumentMetadata::new(doc_id, "guide.txt", FileType::Txt);
//! let chunker = PageChunker::new(settings.chunking.chunk_size, settings.chunking.chunk_overlap)?;
//! let chunks = chunker.chunk(&text, &doc);
//! retriever.index_corpus(&chunks).await?;
//!
//! // Ask
//! let pipeline = Pipeline::from_components(components, &settings)?;
//! let state = pipeline.run("What is RAG?", None).await;
//! println!("{}", state.final_response.unwrap_or_default());
//! ```

pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod pipeline;
pub mod rerank;
pub mod search;
pub mod sparse;
pub mod store;
pub mod web;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
