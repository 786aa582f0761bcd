//! Word-window chunker.
//!
//! Splits a [`Document`]'s text on whitespace into windows of
//! `chunk_size_words`, advancing by `chunk_size_words - overlap_words`.
//! The last window keeps whatever remains, so every chunk has at least one
//! word and an empty document produces no chunks at all.
//!
//! Chunking is lazy: [`Chunks`] walks the text as it is iterated and can be
//! cloned to restart from the same position.

use std::str::SplitWhitespace;

use crate::config::ChunkingConfig;
use crate::models::{chunk_id, content_hash, Chunk, ChunkMetadata, Document};

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    step: usize,
}

impl Chunker {
    /// `overlap_words` is clamped below `chunk_size_words`.
    pub fn new(chunk_size_words: usize, overlap_words: usize) -> Self {
        let size = chunk_size_words.max(1);
        let overlap = overlap_words.min(size - 1);
        Self {
            size,
            step: size - overlap,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size_words, config.overlap_words)
    }

    pub fn chunks<'a>(&self, document: &'a Document, priority: u32) -> Chunks<'a> {
        Chunks {
            document,
            priority,
            size: self.size,
            step: self.step,
            rest: document.raw_text.split_whitespace(),
            offset: 0,
            index: 0,
            done: false,
        }
    }
}

/// Lazy iterator over the chunks of one document.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    priority: u32,
    size: usize,
    step: usize,
    rest: SplitWhitespace<'a>,
    offset: usize,
    index: i64,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let mut window = self.rest.clone();
        let words: Vec<&str> = window.by_ref().take(self.size).collect();
        if words.is_empty() {
            self.done = true;
            return None;
        }
        // A window that reaches the end of the text is the last one.
        if words.len() < self.size || window.next().is_none() {
            self.done = true;
        } else {
            self.rest.nth(self.step - 1);
        }

        let chunk = self.build(&words);
        self.offset += self.step;
        self.index += 1;
        Some(chunk)
    }
}

impl Chunks<'_> {
    fn build(&self, words: &[&str]) -> Chunk {
        let doc = self.document;
        let text = words.join(" ");
        Chunk {
            id: chunk_id(&doc.id, self.index),
            document_id: doc.id.clone(),
            chunk_index: self.index,
            word_count: words.len(),
            source_id: doc.source_id.clone(),
            priority: self.priority,
            hash: content_hash(&text),
            metadata: ChunkMetadata {
                title: doc.title.clone(),
                origin_ref: doc.origin_ref.clone(),
                version_tag: doc.version_tag.clone(),
                section: doc.section_at(self.offset).map(str::to_string),
                tags: doc.tags.clone(),
            },
            text,
        }
    }
}
