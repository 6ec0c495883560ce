use std::collections::HashMap;

use crate::chunk::{chunk_id, Chunk};

/// Merge runs of undersized chunks from the same document.
///
/// Consecutive chunks shorter than `min_size` characters are joined with a
/// single space into one chunk that keeps the first chunk's metadata (and so
/// its page number). A chunk at or above `min_size`, or a chunk from another
/// document, ends the run. Order is preserved, and the result is renumbered
/// with [`renumber`].
#[must_use]
pub fn merge_small(chunks: Vec<Chunk>, min_size: usize) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    let mut buffer: Option<Chunk> = None;

    for chunk in chunks {
        let undersized = chunk.content.chars().count() < min_size;

        // a run never crosses a document boundary
        if let Some(buf) = buffer.take_if(|b| b.metadata.doc_id != chunk.metadata.doc_id) {
            merged.push(buf);
        }

        if !undersized {
            merged.extend(buffer.take());
            merged.push(chunk);
            continue;
        }

        match buffer.as_mut() {
            Some(buf) => {
                buf.content.push(' ');
                buf.content.push_str(&chunk.content);
            }
            None => buffer = Some(chunk),
        }
    }
    merged.extend(buffer);

    renumber(&mut merged);
    merged
}

/// Re-establish per-document `chunk_index`, `total_chunks` and ids.
///
/// Indices follow slice order within each document.
pub fn renumber(chunks: &mut [Chunk]) {
    let mut totals: HashMap<String, usize> = HashMap::new();
    for chunk in chunks.iter_mut() {
        let next = totals.entry(chunk.metadata.doc_id.clone()).or_insert(0);
        chunk.metadata.chunk_index = *next;
        chunk.id = chunk_id(&chunk.metadata.doc_id, *next);
        *next += 1;
    }

    for chunk in chunks.iter_mut() {
        chunk.metadata.total_chunks = totals[&chunk.metadata.doc_id];
    }
}
