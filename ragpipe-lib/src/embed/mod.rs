//! Text embedding
//!
//! [`Embedder`] is the narrow interface to a text-to-vector model. Production
//! uses [`LocalEmbedder`] (fastembed, ONNX runtime), which loads the model
//! named by `embedding.model`; all-MiniLM-L6-v2 is the default.
//!
//! [`EmbeddingClient`] sits in front of the model and owns the contract the
//! rest of the crate relies on:
//! - blank text embeds to the zero vector, never an error
//! - batch output has the same length and order as the input
//! - every vector has the client's fixed dimension
//!
//! One client is built at startup and shared as `Arc<EmbeddingClient>` by the
//! vector store, the retriever and the reranker.
//!
//! # Usage
//!
//! ```ignore
//! use ragpipe_lib::embed::{EmbeddingClient, LocalEmbedder};
//!
//! let client = Arc::new(EmbeddingClient::new(Arc::new(LocalEmbedder::from_settings(&settings.embedding)?)));
//!
//! let query = client.embed("What is retrieval-augmented generation?")?;
//! let docs = client.embed_batch(&["RAG combines retrieval and generation", ""])?;
//! assert!(docs[1].iter().all(|v| *v == 0.0));
//!
//! let sim = EmbeddingClient::similarity(&query, &docs[0]);
//! ```

use std::sync::Arc;

use tracing::instrument;

use crate::{Error, Result};

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Trait for text embedding models
pub trait Embedder: Send + Sync {
    /// Embed a batch of non-blank texts, one vector per input, in order.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Returns the embedding dimension
    fn dimension(&self) -> usize;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;
}

/// Model-independent embedding front end.
pub struct EmbeddingClient {
    model: Arc<dyn Embedder>,
    dimension: usize,
}

impl EmbeddingClient {
    #[must_use]
    pub fn new(model: Arc<dyn Embedder>) -> Self {
        let dimension = model.dimension();
        Self { model, dimension }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// The all-zero vector of this client's dimension.
    #[must_use]
    pub fn zero_vector(&self) -> Embedding {
        vec![0.0; self.dimension]
    }

    /// Embed a single text.
    pub fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Ok(self.zero_vector());
        }

        let embedding = self
            .model
            .encode(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embeddings".to_string()))?;
        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    /// Embed many texts at once.
    ///
    /// Blank entries get the zero vector and are never sent to the model; the
    /// rest are sent in one call and scattered back to their input positions.
    #[instrument(skip_all, fields(texts = texts.len()))]
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut result = vec![self.zero_vector(); texts.len()];

        let (positions, valid): (Vec<usize>, Vec<&str>) = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| (i, *text))
            .unzip();

        if valid.is_empty() {
            return Ok(result);
        }

        let embeddings = self.model.encode(&valid)?;
        if embeddings.len() != valid.len() {
            return Err(Error::Embedding(format!(
                "model returned {} embeddings for {} texts",
                embeddings.len(),
                valid.len()
            )));
        }

        for (position, embedding) in positions.into_iter().zip(embeddings) {
            self.check_dimension(&embedding)?;
            result[position] = embedding;
        }

        Ok(result)
    }

    /// [`embed`](Self::embed) on the blocking thread pool.
    ///
    /// Model inference is CPU-bound; async callers use this so they never
    /// stall a runtime worker.
    pub async fn embed_async(self: Arc<Self>, text: String) -> Result<Embedding> {
        tokio::task::spawn_blocking(move || self.embed(&text))
            .await
            .map_err(join_error)?
    }

    /// [`embed_batch`](Self::embed_batch) on the blocking thread pool.
    pub async fn embed_batch_async(self: Arc<Self>, texts: Vec<String>) -> Result<Vec<Embedding>> {
        tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            self.embed_batch(&refs)
        })
        .await
        .map_err(join_error)?
    }

    /// Cosine similarity clamped to `[0, 1]`.
    ///
    /// Returns 0.0 when either vector has zero norm.
    #[must_use]
    pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b).clamp(0.0, 1.0)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() == self.dimension {
            Ok(())
        } else {
            Err(Error::Embedding(format!(
                "dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )))
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Embedding(format!("embedding task failed: {e}"))
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction, and 0.0 when
/// either vector has zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

mod local;
pub use local::*;
