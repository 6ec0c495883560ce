use std::collections::VecDeque;

use crate::{Error, Result};

/// Separators tried in priority order: paragraph, line, sentence end,
/// clause punctuation, whitespace, then a hard cut between characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; ", ": ", " ", ""];

/// Recursive separator splitter - bounded chunks with overlap
///
/// Splits on the highest-priority separator present in the text, packs the
/// pieces into chunks of at most `chunk_size` characters, and carries up to
/// `overlap` characters of trailing pieces into the next chunk. Pieces that
/// are still too large are split again with the next separators.
///
/// Sizes are measured in characters, not bytes.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::Configuration(format!(
                "chunk_overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
            separators: DEFAULT_SEPARATORS.iter().map(ToString::to_string).collect(),
        })
    }

    /// Replace the separator priority list.
    #[must_use]
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into trimmed, non-empty chunks.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// Pack small pieces into chunks, keeping a tail of at most `overlap`
    /// characters as the head of the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                chunks.extend(join(&window));

                while total > self.overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        chunks.extend(join(&window));
        chunks
    }
}

/// First separator present in the text, and the finer separators after it.
fn pick_separator<'s>(text: &str, separators: &'s [String]) -> (&'s str, &'s [String]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return ("", &[]);
        }
        if text.contains(sep.as_str()) {
            return (sep.as_str(), &separators[i + 1..]);
        }
    }
    (separators.last().map_or("", String::as_str), &[])
}

/// Split on `separator`, keeping it attached to the start of the following
/// piece. An empty separator splits between characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    pieces.push(&text[start..]);

    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join(window: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = RecursiveSplitter::new(100, 10).unwrap();
        let chunks = splitter.split("  A short sentence.  ");
        assert_eq!(chunks, vec!["A short sentence."]);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let splitter = RecursiveSplitter::new(30, 5).unwrap();
        let chunks = splitter.split("First paragraph here.\n\nSecond paragraph here.");

        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn test_word_overlap() {
        let splitter = RecursiveSplitter::new(20, 10).unwrap();
        let chunks = splitter.split("alpha beta gamma delta epsilon zeta eta theta");

        assert_eq!(
            chunks,
            vec![
                "alpha beta gamma",
                "gamma delta epsilon",
                "epsilon zeta eta",
                "zeta eta theta",
            ]
        );
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let splitter = RecursiveSplitter::new(10, 0).unwrap();
        let chunks = splitter.split("abcdefghijklmnopqrstuvwxyz");

        assert_eq!(chunks, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn test_sentence_split_keeps_punctuation_with_next_piece() {
        let pieces = split_keeping_separator("One. Two. Three", ". ");
        assert_eq!(pieces, vec!["One", ". Two", ". Three"]);
    }

    #[test]
    fn test_unicode_safety() {
        let splitter = RecursiveSplitter::new(5, 1).unwrap();
        let chunks = splitter.split("Hello 👋 World ünïcödé");

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 5);
        }
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(RecursiveSplitter::new(0, 0).unwrap_err().is_configuration());
        assert!(RecursiveSplitter::new(100, 100).unwrap_err().is_configuration());
    }

    #[test]
    fn test_empty_and_whitespace() {
        let splitter = RecursiveSplitter::new(50, 10).unwrap();
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("\n\n   \n").is_empty());
    }

    proptest! {
        #[test]
        fn chunks_never_exceed_chunk_size(
            words in prop::collection::vec("[a-z]{1,15}[.!?;:]?", 0..200),
            chunk_size in 20usize..200,
        ) {
            let text = words.join(" ");
            let splitter = RecursiveSplitter::new(chunk_size, chunk_size / 4).unwrap();

            for chunk in splitter.split(&text) {
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.chars().count() <= chunk_size);
            }
        }
    }
}
