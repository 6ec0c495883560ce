//! Document chunking
//!
//! Extracted document text is cut into bounded, overlapping chunks that keep
//! track of where they came from: the document, the ordinal position within
//! it and, for paged sources, the page number.
//!
//! Upstream extraction marks page boundaries with a `[Page N]` line. When the
//! markers are present every chunk stays inside a single page.
//!
//! # Usage
//!
//! ```ignore
//! use ragpipe_lib::chunk::{Chunker, DocumentMetadata, FileType, PageChunker};
//!
//! let chunker = PageChunker::new(512, 128)?;
//! let meta = DocumentMetadata::new("doc-1", "report.pdf", FileType::Pdf);
//! let chunks = chunker.chunk(&extracted_text, &meta);
//! let chunks = merge_small(chunks, 100);
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Chunks whose trimmed content is shorter than this are extraction noise.
pub const MIN_CHUNK_CHARS: usize = 10;

/// A chunk of text with its metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `{doc_id}_chunk_{chunk_index}`
    pub id: String,
    /// Trimmed text content of this chunk
    pub content: String,
    /// Metadata about the source and position
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Check that the chunk carries everything retrieval relies on.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Data("chunk has an empty id".to_string()));
        }
        if self.metadata.doc_id.trim().is_empty() {
            return Err(Error::Data(format!("chunk '{}' has no doc_id", self.id)));
        }
        if self.content.trim().is_empty() {
            return Err(Error::Data(format!("chunk '{}' has no content", self.id)));
        }
        Ok(())
    }
}

/// Builds the canonical chunk identifier.
#[must_use]
pub fn chunk_id(doc_id: &str, chunk_index: usize) -> String {
    format!("{doc_id}_chunk_{chunk_index}")
}

/// Metadata associated with a chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Source document identifier
    pub doc_id: String,
    /// Original file name
    pub filename: String,
    /// Source file type
    pub file_type: FileType,
    /// Position within the source document (0-indexed, contiguous)
    pub chunk_index: usize,
    /// Page the chunk was cut from, for paged sources only
    pub page_number: Option<u32>,
    /// Number of chunks in the final set for this document
    pub total_chunks: usize,
    /// When the source document was uploaded
    pub upload_timestamp: DateTime<Utc>,
}

/// Per-document information handed to a [`Chunker`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub doc_id: String,
    pub filename: String,
    pub file_type: FileType,
    pub upload_timestamp: DateTime<Utc>,
}

impl DocumentMetadata {
    /// Metadata for a document uploaded now.
    pub fn new(doc_id: impl Into<String>, filename: impl Into<String>, file_type: FileType) -> Self {
        Self {
            doc_id: doc_id.into(),
            filename: filename.into(),
            file_type,
            upload_timestamp: Utc::now(),
        }
    }

    pub(crate) fn chunk_metadata(&self, page_number: Option<u32>) -> ChunkMetadata {
        ChunkMetadata {
            doc_id: self.doc_id.clone(),
            filename: self.filename.clone(),
            file_type: self.file_type,
            chunk_index: 0,
            page_number,
            total_chunks: 0,
            upload_timestamp: self.upload_timestamp,
        }
    }
}

/// Supported source file types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Txt,
    Md,
}

impl FileType {
    /// Resolve the file type from a file name's extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                Error::Configuration(format!("'{}' has no file extension", path.display()))
            })?;
        ext.parse()
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Txt => "txt",
            FileType::Md => "md",
        }
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Ok(FileType::Pdf),
            "txt" | "text" => Ok(FileType::Txt),
            "md" | "markdown" => Ok(FileType::Md),
            other => Err(Error::Configuration(format!("unsupported file type: {other}"))),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for document chunking strategies
pub trait Chunker: Send + Sync {
    /// Split content into chunks
    ///
    /// # Arguments
    /// * `content` - The extracted text of one document
    /// * `metadata` - Document metadata copied onto each chunk
    ///
    /// # Returns
    /// Chunks with contiguous `chunk_index` values and a stamped
    /// `total_chunks`. May be empty.
    fn chunk(&self, content: &str, metadata: &DocumentMetadata) -> Vec<Chunk>;

    /// Returns the name of this chunking strategy
    fn name(&self) -> &str;
}

/// Size statistics over a chunk set, in characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkStats {
    pub total_chunks: usize,
    pub avg_chunk_size: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
}

#[must_use]
pub fn chunk_stats(chunks: &[Chunk]) -> ChunkStats {
    if chunks.is_empty() {
        return ChunkStats::default();
    }

    let sizes: Vec<usize> = chunks.iter().map(|c| c.content.chars().count()).collect();
    ChunkStats {
        total_chunks: chunks.len(),
        avg_chunk_size: sizes.iter().sum::<usize>() / sizes.len(),
        min_chunk_size: sizes.iter().copied().min().unwrap_or(0),
        max_chunk_size: sizes.iter().copied().max().unwrap_or(0),
    }
}

mod merge;
mod page;
mod splitter;

pub use merge::*;
pub use page::*;
pub use splitter::*;
