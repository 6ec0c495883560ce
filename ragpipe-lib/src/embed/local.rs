use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use crate::config::EmbeddingSettings;
use crate::embed::{Embedder, Embedding};
use crate::{Error, Result};

/// Default model: sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Dimension of all-MiniLM-L6-v2 sentence embeddings.
pub const MINILM_DIMENSION: usize = 384;

/// Models the local embedder can load, with their output dimension.
///
/// Names match the Hugging Face repository ids; the part after the `/` is
/// accepted on its own.
pub const SUPPORTED_MODELS: &[(&str, usize)] = &[
    (DEFAULT_MODEL, MINILM_DIMENSION),
    ("sentence-transformers/all-MiniLM-L12-v2", 384),
    ("BAAI/bge-small-en-v1.5", 384),
    ("BAAI/bge-base-en-v1.5", 768),
    ("BAAI/bge-large-en-v1.5", 1024),
    ("nomic-ai/nomic-embed-text-v1.5", 768),
];

/// Look up a model by name, returning its canonical name and dimension.
///
/// Matching ignores ASCII case. Unknown names are configuration errors.
pub fn model_dimension(name: &str) -> Result<(&'static str, usize)> {
    let name = name.trim();
    SUPPORTED_MODELS
        .iter()
        .copied()
        .find(|(canonical, _)| {
            canonical.eq_ignore_ascii_case(name)
                || canonical
                    .rsplit_once('/')
                    .is_some_and(|(_, short)| short.eq_ignore_ascii_case(name))
        })
        .ok_or_else(|| {
            let known: Vec<&str> = SUPPORTED_MODELS.iter().map(|(n, _)| *n).collect();
            Error::Configuration(format!(
                "unknown embedding model '{name}' (supported: {})",
                known.join(", ")
            ))
        })
}

fn fastembed_model(canonical: &str) -> Result<EmbeddingModel> {
    match canonical {
        "sentence-transformers/all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "sentence-transformers/all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BAAI/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "BAAI/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "BAAI/bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        "nomic-ai/nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(Error::Configuration(format!("unknown embedding model '{other}'"))),
    }
}

/// Sentence embedder running locally through fastembed (ONNX runtime).
///
/// The model is chosen by name from [`SUPPORTED_MODELS`];
/// [`from_settings`](Self::from_settings) is the startup path and rejects a
/// configured dimension the model does not produce.
pub struct LocalEmbedder {
    model: Mutex<TextEmbedding>,
    name: &'static str,
    dimension: usize,
    batch_size: Option<usize>,
}

impl LocalEmbedder {
    /// Load the default model (all-MiniLM-L6-v2).
    ///
    /// Downloads the model on first use (~90MB).
    pub fn new() -> Result<Self> {
        Self::with_model(DEFAULT_MODEL)
    }

    /// Load a model by name. Downloads it on first use.
    pub fn with_model(name: &str) -> Result<Self> {
        let (canonical, dimension) = model_dimension(name)?;
        let opts = InitOptions::new(fastembed_model(canonical)?).with_show_download_progress(true);

        TextEmbedding::try_new(opts)
            .map(|model| Self {
                model: Mutex::new(model),
                name: canonical,
                dimension,
                batch_size: None,
            })
            .map_err(|e| Error::Embedding(e.to_string()))
    }

    /// Load the configured model after checking the configured dimension
    /// against it.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let (canonical, dimension) = model_dimension(&settings.model)?;
        if dimension != settings.dimension {
            return Err(Error::Configuration(format!(
                "embedding.dimension is {} but {canonical} produces {dimension}-dimensional vectors",
                settings.dimension
            )));
        }

        let embedder = Self::with_model(canonical)?;
        Ok(match settings.batch_size {
            Some(batch_size) => embedder.with_batch_size(batch_size),
            None => embedder,
        })
    }

    /// Number of texts per inference batch (fastembed's default when unset).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.model
            .lock()
            .embed(texts, self.batch_size)
            .map_err(|e| Error::Embedding(e.to_string()))
    }
}
