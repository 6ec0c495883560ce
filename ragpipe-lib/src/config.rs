//! Runtime settings
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`RAGPIPE_*`)
//! 2. TOML file passed to [`Settings::load`]
//! 3. Compiled defaults
//!
//! Every section is `#[serde(default)]`, so a file only needs the keys it
//! changes:
//!
//! ```toml
//! [chunking]
//! chunk_size = 800
//!
//! [web_search]
//! provider = "tavily"
//! tavily_api_key = "tvly-..."
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::embed::{model_dimension, DEFAULT_MODEL, MINILM_DIMENSION};
use crate::rerank::DEFAULT_RERANK_TOP_N;
use crate::search::FusionWeights;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub reranking: RerankingSettings,
    pub web_search: WebSearchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks with fewer trimmed characters are dropped as noise
    pub min_chunk_chars: usize,
    /// Threshold for `merge_small`
    pub merge_min_size: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 128,
            min_chunk_chars: crate::chunk::MIN_CHUNK_CHARS,
            merge_min_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    pub dimension: usize,
    /// Model batch size, `None` for the runtime default
    pub batch_size: Option<usize>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            dimension: MINILM_DIMENSION,
            batch_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub dense_weight: f32,
    pub sparse_weight: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        let weights = FusionWeights::default();
        Self {
            top_k: 10,
            dense_weight: weights.dense(),
            sparse_weight: weights.sparse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankingSettings {
    pub top_n: usize,
}

impl Default for RerankingSettings {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_RERANK_TOP_N,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchSettings {
    pub provider: WebProvider,
    pub max_results: usize,
    pub tavily_api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            provider: WebProvider::DuckDuckGo,
            max_results: 5,
            tavily_api_key: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebProvider {
    #[default]
    DuckDuckGo,
    Tavily,
}

impl FromStr for WebProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "duckduckgo" | "ddg" => Ok(Self::DuckDuckGo),
            "tavily" => Ok(Self::Tavily),
            other => Err(Error::Configuration(format!("unknown web search provider: {other}"))),
        }
    }
}

impl fmt::Display for WebProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DuckDuckGo => "duckduckgo",
            Self::Tavily => "tavily",
        })
    }
}

impl Settings {
    /// Defaults, then the optional TOML file, then `RAGPIPE_*` variables.
    /// The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`load`](Self::load)). Unparseable values are configuration errors.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "RAGPIPE_CHUNK_SIZE", &mut self.chunking.chunk_size)?;
        override_parsed(&lookup, "RAGPIPE_CHUNK_OVERLAP", &mut self.chunking.chunk_overlap)?;
        override_parsed(&lookup, "RAGPIPE_MIN_CHUNK_CHARS", &mut self.chunking.min_chunk_chars)?;
        override_parsed(&lookup, "RAGPIPE_MERGE_MIN_SIZE", &mut self.chunking.merge_min_size)?;
        override_parsed(&lookup, "RAGPIPE_EMBEDDING_MODEL", &mut self.embedding.model)?;
        override_parsed(&lookup, "RAGPIPE_EMBEDDING_DIMENSION", &mut self.embedding.dimension)?;
        override_parsed(&lookup, "RAGPIPE_RETRIEVAL_TOP_K", &mut self.retrieval.top_k)?;
        override_parsed(&lookup, "RAGPIPE_DENSE_WEIGHT", &mut self.retrieval.dense_weight)?;
        override_parsed(&lookup, "RAGPIPE_SPARSE_WEIGHT", &mut self.retrieval.sparse_weight)?;
        override_parsed(&lookup, "RAGPIPE_RERANK_TOP_N", &mut self.reranking.top_n)?;
        override_parsed(&lookup, "RAGPIPE_WEB_PROVIDER", &mut self.web_search.provider)?;
        override_parsed(&lookup, "RAGPIPE_WEB_MAX_RESULTS", &mut self.web_search.max_results)?;
        override_parsed(&lookup, "RAGPIPE_WEB_TIMEOUT_SECS", &mut self.web_search.timeout_secs)?;

        if let Some(key) = lookup("RAGPIPE_TAVILY_API_KEY").or_else(|| lookup("TAVILY_API_KEY")) {
            self.web_search.tavily_api_key = Some(key);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(invalid("chunking.chunk_size", "must be greater than 0"));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(invalid("chunking.chunk_overlap", "must be smaller than chunk_size"));
        }
        let (_, model_dim) = model_dimension(&self.embedding.model)?;
        if self.embedding.dimension != model_dim {
            return Err(invalid(
                "embedding.dimension",
                &format!("must be {model_dim} for {}", self.embedding.model),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k", "must be greater than 0"));
        }
        FusionWeights::new(self.retrieval.dense_weight, self.retrieval.sparse_weight)?;
        if self.reranking.top_n == 0 {
            return Err(invalid("reranking.top_n", "must be greater than 0"));
        }
        if self.web_search.provider == WebProvider::Tavily
            && self
                .web_search
                .tavily_api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(invalid("web_search.tavily_api_key", "required for the tavily provider"));
        }
        Ok(())
    }

    #[must_use]
    pub fn fusion_weights(&self) -> FusionWeights {
        FusionWeights::new(self.retrieval.dense_weight, self.retrieval.sparse_weight)
            .unwrap_or_default()
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| Error::Configuration(format!("{key}={raw}: {e}")))?;
    }
    Ok(())
}

fn invalid(field: &str, message: &str) -> Error {
    Error::Configuration(format!("{field} {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.chunking.chunk_size, 512);
        assert_eq!(settings.chunking.chunk_overlap, 128);
        assert_eq!(settings.chunking.min_chunk_chars, 10);
        assert_eq!(settings.embedding.dimension, 384);
        assert_eq!(settings.retrieval.top_k, 10);
        assert_eq!(settings.reranking.top_n, 5);
        assert_eq!(settings.web_search.provider, WebProvider::DuckDuckGo);
        assert_eq!(settings.web_search.max_results, 5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let settings = Settings::from_toml(
            r#"
            [chunking]
            chunk_size = 800

            [web_search]
            provider = "tavily"
            tavily_api_key = "tvly-test"
            "#,
        )
        .unwrap();

        assert_eq!(settings.chunking.chunk_size, 800);
        assert_eq!(settings.chunking.chunk_overlap, 128);
        assert_eq!(settings.web_search.provider, WebProvider::Tavily);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        let err = Settings::from_toml("[chunking\nchunk_size = ").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(env(&[
                ("RAGPIPE_CHUNK_SIZE", "256"),
                ("RAGPIPE_CHUNK_OVERLAP", "32"),
                ("RAGPIPE_DENSE_WEIGHT", "0.5"),
                ("RAGPIPE_SPARSE_WEIGHT", "0.5"),
                ("RAGPIPE_WEB_PROVIDER", "Tavily"),
                ("TAVILY_API_KEY", "tvly-env"),
            ]))
            .unwrap();

        assert_eq!(settings.chunking.chunk_size, 256);
        assert_eq!(settings.chunking.chunk_overlap, 32);
        assert_eq!(settings.retrieval.dense_weight, 0.5);
        assert_eq!(settings.web_search.provider, WebProvider::Tavily);
        assert_eq!(settings.web_search.tavily_api_key.as_deref(), Some("tvly-env"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unparseable_override() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(env(&[("RAGPIPE_RETRIEVAL_TOP_K", "ten")]))
            .unwrap_err();
        assert!(err.to_string().contains("RAGPIPE_RETRIEVAL_TOP_K"));
    }

    #[test]
    fn test_validation_failures() {
        let mut settings = Settings::default();
        settings.chunking.chunk_overlap = 512;
        assert!(settings.validate().unwrap_err().is_configuration());

        let mut settings = Settings::default();
        settings.retrieval.sparse_weight = 0.2;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.reranking.top_n = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.web_search.provider = WebProvider::Tavily;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_embedding_model_validation() {
        let mut settings = Settings::default();
        settings.embedding.model = "no-such-model".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("no-such-model"));

        let mut settings = Settings::default();
        settings.embedding.dimension = 768;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("embedding.dimension"));

        let mut settings = Settings::default();
        settings
            .apply_overrides(env(&[
                ("RAGPIPE_EMBEDDING_MODEL", "BAAI/bge-base-en-v1.5"),
                ("RAGPIPE_EMBEDDING_DIMENSION", "768"),
            ]))
            .unwrap();
        assert_eq!(settings.embedding.model, "BAAI/bge-base-en-v1.5");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ragpipe-settings-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[reranking]\ntop_n = 3").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.reranking.top_n, 3);

        std::fs::remove_file(&path).unwrap();
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("ddg".parse::<WebProvider>().unwrap(), WebProvider::DuckDuckGo);
        assert!("bing".parse::<WebProvider>().is_err());
        assert_eq!(WebProvider::Tavily.to_string(), "tavily");
    }
}
