//! Fixed-size, overlapping character chunking.
//!
//! Offsets and sizes count `char`s so multi-byte text is never split inside a
//! code point. Starts advance by `chunk_size - overlap`; the final chunk is
//! truncated to whatever text remains. Identical input always yields identical
//! boundaries and ids.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, DocumentMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 800, overlap: 150 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Position of one chunk inside the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub index: usize,
    /// First character of the chunk.
    pub start: usize,
    /// Number of characters in the chunk.
    pub len: usize,
    byte_start: usize,
    byte_end: usize,
}

impl Span {
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.byte_start..self.byte_end]
    }
}

pub fn chunk_id(doc_id: &str, index: usize) -> String {
    format!("{doc_id}:{index:05}")
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Restartable: clone the iterator (or call again) to replay from the start.
    pub fn spans(&self, text: &str) -> Spans {
        let boundaries: Vec<usize> =
            text.char_indices().map(|(b, _)| b).chain(std::iter::once(text.len())).collect();
        Spans { boundaries, size: self.config.chunk_size, step: self.config.step(), next_start: 0, index: 0, done: text.is_empty() }
    }

    pub fn chunk_document(&self, meta: &DocumentMetadata, text: &str) -> Vec<Chunk> {
        self.spans(text)
            .map(|span| {
                let body = span.slice(text);
                Chunk {
                    chunk_id: chunk_id(&meta.doc_id, span.index),
                    chunk_index: span.index,
                    text: body.to_string(),
                    start_offset: span.start,
                    char_length: span.len,
                    embedding: None,
                    metadata: meta.clone(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Spans {
    /// Byte offset of every char plus the end of text.
    boundaries: Vec<usize>,
    size: usize,
    step: usize,
    next_start: usize,
    index: usize,
    done: bool,
}

impl Iterator for Spans {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        if self.done {
            return None;
        }
        let total = self.boundaries.len() - 1;
        let start = self.next_start;
        let end = (start + self.size).min(total);
        let span = Span {
            index: self.index,
            start,
            len: end - start,
            byte_start: self.boundaries[start],
            byte_end: self.boundaries[end],
        };
        if end == total {
            self.done = true;
        } else {
            self.next_start = start + self.step;
            self.index += 1;
        }
        Some(span)
    }
}

/// Content fingerprint of a document's chunk set.
///
/// Covers every chunk's text, offsets and the parent metadata, so a change to
/// the source text, the chunking parameters or the catalog entry changes it.
pub fn fingerprint_chunks(chunks: &[Chunk]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in chunks {
        hasher.update(c.chunk_id.as_bytes());
        hasher.update(&(c.start_offset as u64).to_le_bytes());
        hasher.update(&(c.char_length as u64).to_le_bytes());
        hasher.update(c.text.as_bytes());
    }
    if let Some(first) = chunks.first() {
        if let Ok(meta) = serde_json::to_vec(&first.metadata) {
            hasher.update(&meta);
        }
    }
    hasher.finalize().to_hex().to_string()
}
