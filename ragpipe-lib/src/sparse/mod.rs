//! Lexical (BM25) index over the chunk corpus
//!
//! Okapi BM25 with whitespace, lowercase tokenization and no stemming. The
//! index is rebuilt wholesale by [`SparseIndex::build`]; searches run against
//! an immutable snapshot, so a rebuild never disturbs an in-flight search.
//!
//! Terms that occur in more than half the corpus would get a negative IDF;
//! those are floored at `epsilon * mean_idf` instead.
//!
//! # Usage
//!
//! ```ignore
//! use ragpipe_lib::sparse::SparseIndex;
//!
//! let index = SparseIndex::new();
//! assert!(index.search("anything", 5).is_empty()); // not built yet
//!
//! index.build(&chunks);
//! let hits = index.search("retrieval augmented generation", 20);
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use crate::chunk::Chunk;
use crate::store::RetrievalHit;

/// Term frequency saturation.
pub const BM25_K1: f64 = 1.5;
/// Document length normalization.
pub const BM25_B: f64 = 0.75;
/// Floor for negative IDF values, as a fraction of the mean IDF.
pub const BM25_EPSILON: f64 = 0.25;

/// Lowercase, then split on whitespace.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Immutable scoring snapshot built from one corpus.
#[derive(Debug)]
struct Corpus {
    chunks: Vec<Chunk>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
}

impl Corpus {
    fn new(chunks: Vec<Chunk>) -> Self {
        let mut term_freqs = Vec::with_capacity(chunks.len());
        let mut doc_lens = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for chunk in &chunks {
            let tokens = tokenize(&chunk.content);
            doc_lens.push(tokens.len());

            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let n = chunks.len() as f64;
        let total_len: usize = doc_lens.iter().sum();
        let avg_doc_len = if total_len == 0 { 1.0 } else { total_len as f64 / n };

        let mut idf: HashMap<String, f64> = HashMap::with_capacity(doc_freq.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, df) in doc_freq {
            let df = df as f64;
            let value = (n - df + 0.5).ln() - (df + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term, value);
        }

        if !idf.is_empty() {
            let floor = BM25_EPSILON * idf_sum / idf.len() as f64;
            for term in negative {
                idf.insert(term, floor);
            }
        }

        Self {
            chunks,
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    fn score(&self, doc: usize, query: &[String]) -> f64 {
        let freqs = &self.term_freqs[doc];
        let norm = 1.0 - BM25_B + BM25_B * self.doc_lens[doc] as f64 / self.avg_doc_len;

        query
            .iter()
            .map(|term| {
                let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * norm)
            })
            .sum()
    }
}

/// BM25 index with atomic rebuilds.
///
/// Safe to share across queries (`Arc<SparseIndex>`): `search` clones the
/// current snapshot handle and scores without holding the lock.
#[derive(Debug, Default)]
pub struct SparseIndex {
    corpus: RwLock<Option<Arc<Corpus>>>,
}

impl SparseIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole index with one built from `chunks`.
    ///
    /// Chunks failing validation are skipped. An empty corpus leaves the
    /// index unbuilt. Returns the number of chunks indexed.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub fn build(&self, chunks: &[Chunk]) -> usize {
        let valid: Vec<Chunk> = chunks
            .iter()
            .filter(|chunk| match chunk.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "skipping chunk");
                    false
                }
            })
            .cloned()
            .collect();

        let indexed = valid.len();
        let snapshot = (indexed > 0).then(|| Arc::new(Corpus::new(valid)));

        *self.corpus.write() = snapshot;
        debug!(indexed, "sparse index rebuilt");
        indexed
    }

    /// Top-`k` chunks by BM25 score, strictly positive scores only.
    ///
    /// Returns an empty list when the index has not been built.
    #[must_use]
    pub fn search(&self, query: &str, k: usize) -> Vec<RetrievalHit> {
        let Some(corpus) = self.snapshot() else {
            debug!("sparse index not built, returning no hits");
            return Vec::new();
        };

        let terms = tokenize(query);
        let mut scored: Vec<(usize, f64)> = (0..corpus.chunks.len())
            .map(|doc| (doc, corpus.score(doc, &terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // stable: ties keep corpus order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(doc, score)| RetrievalHit::from_chunk(&corpus.chunks[doc], score as f32))
            .collect()
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.corpus.read().is_some()
    }

    /// Number of indexed chunks (0 when unbuilt).
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().map_or(0, |c| c.chunks.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the index; searches return nothing until the next build.
    pub fn clear(&self) {
        *self.corpus.write() = None;
    }

    fn snapshot(&self) -> Option<Arc<Corpus>> {
        self.corpus.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_chunk;
    use std::thread;

    fn languages() -> Vec<Chunk> {
        vec![
            make_chunk("d", 0, "rust is fast"),
            make_chunk("d", 1, "python is slow"),
            make_chunk("d", 2, "go is simple"),
        ]
    }

    #[test]
    fn test_search_before_build_is_empty() {
        let index = SparseIndex::new();
        assert!(!index.is_built());
        assert!(index.search("rust", 5).is_empty());
    }

    #[test]
    fn test_build_empty_corpus_stays_unbuilt() {
        let index = SparseIndex::new();
        assert_eq!(index.build(&[]), 0);
        assert!(!index.is_built());
        assert!(index.is_empty());
    }

    #[test]
    fn test_tokenize_lowercases_without_stemming() {
        assert_eq!(tokenize("  Running\tRUST\nfast  "), vec!["running", "rust", "fast"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_bm25_score_matches_formula() {
        let index = SparseIndex::new();
        index.build(&languages());

        let hits = index.search("rust", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "d_chunk_0");

        // every document has the average length, so tf normalization is 1
        let idf = (2.5f64).ln() - (1.5f64).ln();
        assert!((f64::from(hits[0].score) - idf).abs() < 1e-5);
    }

    #[test]
    fn test_common_terms_use_epsilon_floor() {
        let index = SparseIndex::new();
        index.build(&languages());

        // "is" appears everywhere: negative idf floored to epsilon * mean idf
        let hits = index.search("is", 10);
        assert_eq!(hits.len(), 3);

        let rare = (2.5f64).ln() - (1.5f64).ln();
        let common = (0.5f64).ln() - (3.5f64).ln();
        let floor = BM25_EPSILON * (6.0 * rare + common) / 7.0;
        for hit in &hits {
            assert!((f64::from(hit.score) - floor).abs() < 1e-5);
        }

        // equal scores keep corpus order
        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["d_chunk_0", "d_chunk_1", "d_chunk_2"]);
    }

    #[test]
    fn test_results_sorted_and_truncated() {
        let index = SparseIndex::new();
        index.build(&[
            make_chunk("d", 0, "dense retrieval uses vectors"),
            make_chunk("d", 1, "sparse retrieval uses terms terms terms"),
            make_chunk("d", 2, "cooking pasta at home"),
            make_chunk("d", 3, "gardening in spring"),
        ]);

        let hits = index.search("sparse terms", 10);
        assert_eq!(hits[0].chunk_id, "d_chunk_1");
        for window in hits.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        assert!(hits.iter().all(|h| h.score > 0.0));

        assert_eq!(index.search("sparse vectors pasta", 10).len(), 3);
        assert_eq!(index.search("sparse vectors pasta", 1).len(), 1);
    }

    #[test]
    fn test_unknown_terms_return_nothing() {
        let index = SparseIndex::new();
        index.build(&languages());
        assert!(index.search("haskell", 10).is_empty());
        assert!(index.search("", 10).is_empty());
    }

    #[test]
    fn test_rebuild_replaces_corpus() {
        let index = SparseIndex::new();
        index.build(&languages());
        assert_eq!(index.len(), 3);

        index.build(&[
            make_chunk("e", 0, "kotlin on the jvm"),
            make_chunk("e", 1, "swift on apple platforms"),
            make_chunk("e", 2, "zig for systems work"),
        ]);
        assert!(index.search("rust", 10).is_empty());
        assert_eq!(index.search("kotlin", 10)[0].chunk_id, "e_chunk_0");

        index.clear();
        assert!(!index.is_built());
    }

    #[test]
    fn test_invalid_chunks_skipped() {
        let mut broken = make_chunk("d", 3, "rust again");
        broken.id.clear();
        let mut chunks = languages();
        chunks.push(broken);

        let index = SparseIndex::new();
        assert_eq!(index.build(&chunks), 3);
    }

    #[test]
    fn test_search_during_rebuild() {
        let jvm = vec![
            make_chunk("jvm", 0, "java is verbose"),
            make_chunk("jvm", 1, "kotlin is concise"),
            make_chunk("jvm", 2, "scala is terse"),
        ];
        let index = Arc::new(SparseIndex::new());
        index.build(&languages());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for _ in 0..200 {
                        // every term is unique to one corpus, so a mixed
                        // result would mean a search saw a half-built index
                        let hits = index.search("rust python go java kotlin scala", 10);
                        assert_eq!(hits.len(), 3);
                        let doc = &hits[0].metadata.doc_id;
                        assert!(doc == "d" || doc == "jvm");
                        assert!(hits.iter().all(|h| &h.metadata.doc_id == doc));
                    }
                })
            })
            .collect();

        for round in 0..50 {
            if round % 2 == 0 {
                index.build(&jvm);
            } else {
                index.build(&languages());
            }
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
