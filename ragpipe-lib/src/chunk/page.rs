use regex::Regex;
use tracing::debug;

use crate::chunk::{
    chunk_id, Chunk, ChunkMetadata, Chunker, DocumentMetadata, RecursiveSplitter, MIN_CHUNK_CHARS,
};
use crate::Result;

/// Placeholder upstream extraction writes for pages without text.
const EMPTY_PAGE_PLACEHOLDER: &str = "[No text content]";

/// Page-aware chunker - splits page by page when `[Page N]` markers exist
///
/// Good for: extracted PDFs (markers present), plain text and markdown
/// (no markers, the whole text is split at once).
///
/// Chunks never span two pages. Chunks whose trimmed text is shorter than
/// `min_chunk_chars` are dropped before indices are assigned, so
/// `chunk_index` is always contiguous.
pub struct PageChunker {
    splitter: RecursiveSplitter,
    min_chunk_chars: usize,
    page_marker: Regex,
}

impl PageChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        Ok(Self::with_splitter(RecursiveSplitter::new(chunk_size, overlap)?))
    }

    #[must_use]
    pub fn with_splitter(splitter: RecursiveSplitter) -> Self {
        Self {
            splitter,
            min_chunk_chars: MIN_CHUNK_CHARS,
            page_marker: Regex::new(r"\[Page (\d+)\][ \t]*\r?\n").expect("page marker pattern is valid"),
        }
    }

    #[must_use]
    pub fn with_min_chunk_chars(mut self, min_chunk_chars: usize) -> Self {
        self.min_chunk_chars = min_chunk_chars;
        self
    }

    /// Page sections in document order, or `None` when the text has no markers.
    ///
    /// Text before the first marker is not part of any page and is skipped.
    fn pages<'a>(&self, content: &'a str) -> Option<Vec<(u32, &'a str)>> {
        let markers: Vec<_> = self.page_marker.captures_iter(content).collect();
        if markers.is_empty() {
            return None;
        }

        let mut pages = Vec::with_capacity(markers.len());
        for (i, caps) in markers.iter().enumerate() {
            let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = markers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(content.len(), |m| m.start());

            let Ok(page_number) = number.as_str().parse::<u32>() else {
                debug!(marker = whole.as_str(), "skipping page with unparseable number");
                continue;
            };

            let text = content[whole.end()..end].trim();
            if text.is_empty() || text == EMPTY_PAGE_PLACEHOLDER {
                continue;
            }
            pages.push((page_number, text));
        }
        Some(pages)
    }
}

impl Chunker for PageChunker {
    fn name(&self) -> &str {
        "page"
    }

    fn chunk(&self, content: &str, metadata: &DocumentMetadata) -> Vec<Chunk> {
        // split first, keeping the page each piece came from
        let pieces: Vec<(Option<u32>, String)> = match self.pages(content) {
            Some(pages) => pages
                .into_iter()
                .flat_map(|(page, text)| {
                    self.splitter
                        .split(text)
                        .into_iter()
                        .map(move |piece| (Some(page), piece))
                })
                .collect(),
            None => self
                .splitter
                .split(content)
                .into_iter()
                .map(|piece| (None, piece))
                .collect(),
        };

        // drop noise, then number what is left
        let mut chunks: Vec<Chunk> = pieces
            .into_iter()
            .filter(|(_, piece)| piece.trim().chars().count() >= self.min_chunk_chars)
            .enumerate()
            .map(|(index, (page, piece))| {
                let mut m: ChunkMetadata = metadata.chunk_metadata(page);
                m.chunk_index = index;

                Chunk {
                    id: chunk_id(&metadata.doc_id, index),
                    content: piece.trim().to_string(),
                    metadata: m,
                }
            })
            .collect();

        // second pass once the final count is known
        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.metadata.total_chunks = total;
        }

        debug!(doc_id = %metadata.doc_id, chunks = total, "chunked document");
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::FileType;
    use proptest::prelude::*;

    fn meta() -> DocumentMetadata {
        DocumentMetadata::new("doc1", "report.pdf", FileType::Pdf)
    }

    fn assert_contiguous(chunks: &[Chunk]) {
        let n = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.chunk_index, i);
            assert_eq!(chunk.metadata.total_chunks, n);
            assert_eq!(chunk.id, format!("doc1_chunk_{i}"));
        }
    }

    #[test]
    fn test_plain_text_has_no_page_numbers() {
        let chunker = PageChunker::new(60, 10).unwrap();
        let content = "Retrieval augmented generation combines search with generation.\n\n\
                       Dense retrieval uses embeddings. Sparse retrieval uses term statistics.";
        let chunks = chunker.chunk(content, &meta());

        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.metadata.page_number.is_none()));
        assert_contiguous(&chunks);
    }

    #[test]
    fn test_page_markers_keep_chunks_within_pages() {
        let chunker = PageChunker::new(100, 20).unwrap();
        let content = "[Page 1]\nThe first page talks about vector databases.\n\
                       [Page 2]\nThe second page talks about lexical indexes.\n";
        let chunks = chunker.chunk(content, &meta());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.page_number, Some(1));
        assert!(chunks[0].content.contains("vector databases"));
        assert!(!chunks[0].content.contains("lexical"));
        assert_eq!(chunks[1].metadata.page_number, Some(2));
        assert!(chunks[1].content.contains("lexical indexes"));
        assert_contiguous(&chunks);
    }

    #[test]
    fn test_empty_pages_are_skipped() {
        let chunker = PageChunker::new(100, 20).unwrap();
        let content = "[Page 1]\n[No text content]\n[Page 2]\n\n[Page 3]\nOnly the third page has any text.\n";
        let chunks = chunker.chunk(content, &meta());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.page_number, Some(3));
        assert_contiguous(&chunks);
    }

    #[test]
    fn test_noise_is_filtered_and_indices_stay_contiguous() {
        let chunker = PageChunker::new(100, 20).unwrap();
        let content = "[Page 1]\nok\n[Page 2]\nA page with enough text to keep.\n[Page 3]\n42\n\
                       [Page 4]\nAnother page with enough text.\n";
        let chunks = chunker.chunk(content, &meta());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.page_number, Some(2));
        assert_eq!(chunks[1].metadata.page_number, Some(4));
        assert_contiguous(&chunks);
    }

    #[test]
    fn test_text_before_first_marker_is_ignored() {
        let chunker = PageChunker::new(100, 20).unwrap();
        let content = "Extraction banner text\n[Page 1]\nBody text of the first page.\n";
        let chunks = chunker.chunk(content, &meta());

        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].content.contains("banner"));
    }

    #[test]
    fn test_empty_content() {
        let chunker = PageChunker::new(100, 20).unwrap();
        assert!(chunker.chunk("", &meta()).is_empty());
        assert!(chunker.chunk("tiny", &meta()).is_empty());
    }

    #[test]
    fn test_metadata_copied_from_document() {
        let chunker = PageChunker::new(100, 20).unwrap();
        let doc = meta();
        let chunks = chunker.chunk("Some content that is long enough.", &doc);

        assert_eq!(chunks[0].metadata.doc_id, "doc1");
        assert_eq!(chunks[0].metadata.filename, "report.pdf");
        assert_eq!(chunks[0].metadata.file_type, FileType::Pdf);
        assert_eq!(chunks[0].metadata.upload_timestamp, doc.upload_timestamp);
    }

    proptest! {
        #[test]
        fn indices_are_contiguous_for_any_document(
            pages in prop::collection::vec(
                prop::collection::vec("[a-z]{1,12}", 0..60),
                0..6,
            ),
            paged in any::<bool>(),
        ) {
            let content = if paged {
                pages
                    .iter()
                    .enumerate()
                    .map(|(i, words)| format!("[Page {}]\n{}\n", i + 1, words.join(" ")))
                    .collect::<String>()
            } else {
                pages.iter().map(|words| words.join(" ")).collect::<Vec<_>>().join("\n\n")
            };

            let chunker = PageChunker::new(80, 20).unwrap();
            let chunks = chunker.chunk(&content, &meta());
            let n = chunks.len();

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.metadata.chunk_index, i);
                prop_assert_eq!(chunk.metadata.total_chunks, n);
                prop_assert!(chunk.content.trim().chars().count() >= MIN_CHUNK_CHARS);
                prop_assert_eq!(chunk.metadata.page_number.is_some(), paged);
            }
        }
    }
}
