//! Shared test fixtures: a deterministic embedder, canned corpora and
//! collaborators that always fail.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::chunk::{chunk_id, Chunk, DocumentMetadata, FileType};
use crate::embed::{Embedder, Embedding, EmbeddingClient};
use crate::pipeline::Generator;
use crate::rerank::RerankedResult;
use crate::store::{MetadataFilter, RetrievalHit, StoreStats, VectorStore};
use crate::web::{WebResult, WebSearch};
use crate::{Error, Result};

pub const TEST_DIMENSION: usize = 256;

/// Hashes lowercase alphanumeric tokens into a fixed number of buckets.
///
/// Texts sharing words get positive cosine similarity, texts sharing none
/// get zero.
pub struct BagOfWordsEmbedder {
    dimension: usize,
    fail: bool,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: TEST_DIMENSION,
            fail: false,
        }
    }

    /// An embedder whose model calls always fail.
    pub fn failing() -> Self {
        Self {
            dimension: TEST_DIMENSION,
            fail: true,
        }
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimension as u64) as usize
    }
}

impl Embedder for BagOfWordsEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if self.fail {
            return Err(Error::Embedding("model unavailable".to_string()));
        }

        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; self.dimension];
                let lower = text.to_lowercase();
                for token in lower.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
                    vector[self.bucket(token)] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "bag-of-words"
    }
}

/// Bag-of-words embedder that remembers which thread ran each model call.
pub struct ThreadRecordingEmbedder {
    inner: BagOfWordsEmbedder,
    threads: Mutex<Vec<ThreadId>>,
}

impl ThreadRecordingEmbedder {
    pub fn new() -> Self {
        Self {
            inner: BagOfWordsEmbedder::new(),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().clone()
    }
}

impl Embedder for ThreadRecordingEmbedder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.threads.lock().push(thread::current().id());
        self.inner.encode(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        "thread-recording"
    }
}

pub fn client() -> Arc<EmbeddingClient> {
    Arc::new(EmbeddingClient::new(Arc::new(BagOfWordsEmbedder::new())))
}

/// A chunk of a `.txt` document with a canonical id.
pub fn make_chunk(doc_id: &str, index: usize, content: &str) -> Chunk {
    let document = DocumentMetadata::new(doc_id, format!("{doc_id}.txt"), FileType::Txt);
    let mut metadata = document.chunk_metadata(None);
    metadata.chunk_index = index;
    metadata.total_chunks = index + 1;

    Chunk {
        id: chunk_id(doc_id, index),
        content: content.to_string(),
        metadata,
    }
}

/// Two documents, six chunks: a paged RAG guide and markdown search notes.
pub fn rag_corpus() -> Vec<Chunk> {
    let guide = DocumentMetadata::new("rag-guide", "rag-guide.pdf", FileType::Pdf);
    let notes = DocumentMetadata::new("search-notes", "search-notes.md", FileType::Md);

    let sections: [(&DocumentMetadata, Option<u32>, &str); 6] = [
        (
            &guide,
            Some(1),
            "RAG stands for retrieval augmented generation, a technique that grounds language model answers in retrieved documents.",
        ),
        (
            &guide,
            Some(1),
            "A RAG system first retrieves relevant chunks from a vector store, then passes them to the generator as context.",
        ),
        (
            &guide,
            Some(2),
            "Retrieval augmented generation reduces hallucination because answers cite the source passages.",
        ),
        (&notes, None, "BM25 ranks documents by term frequency and inverse document frequency."),
        (&notes, None, "Dense retrieval embeds queries and passages into the same vector space."),
        (&notes, None, "Reciprocal rank fusion merges ranked lists from several retrievers."),
    ];

    let mut chunks: Vec<Chunk> = sections
        .iter()
        .map(|(document, page, content)| Chunk {
            id: String::new(),
            content: (*content).to_string(),
            metadata: document.chunk_metadata(*page),
        })
        .collect();
    crate::chunk::renumber(&mut chunks);
    chunks
}

pub fn web_result(i: usize) -> WebResult {
    WebResult {
        title: format!("Result {i}"),
        url: format!("https://example.com/{i}"),
        snippet: format!("snippet {i}"),
        source: "test".to_string(),
    }
}

/// Vector store whose backend is unreachable.
pub struct FailingStore;

fn store_down() -> Error {
    Error::unavailable("vector store", "connection refused")
}

#[async_trait]
impl VectorStore for FailingStore {
    async fn upsert(&self, _chunks: &[Chunk]) -> Result<usize> {
        Err(store_down())
    }

    async fn similarity_search(
        &self,
        _query: &str,
        _top_k: usize,
        _filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalHit>> {
        Err(store_down())
    }

    async fn delete_document(&self, _doc_id: &str) -> Result<usize> {
        Err(store_down())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Err(store_down())
    }
}

/// Web provider returning canned results.
pub struct StaticWebSearch {
    results: Vec<WebResult>,
}

impl StaticWebSearch {
    pub fn new(results: Vec<WebResult>) -> Self {
        Self { results }
    }
}

#[async_trait]
impl WebSearch for StaticWebSearch {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        Ok(self.results.iter().take(max_results).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

pub struct FailingWebSearch;

#[async_trait]
impl WebSearch for FailingWebSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<WebResult>> {
        Err(Error::unavailable("web search", "connection refused"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _query: &str, _chunks: &[RerankedResult], _web: &[WebResult]) -> Result<String> {
        Err(Error::Generation("model offline".to_string()))
    }
}
