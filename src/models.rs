//! Core data models for the retrieval layer.
//!
//! Raw items come out of discovery, normalizers turn them into
//! [`Document`]s, the chunker splits documents into [`Chunk`]s, and the
//! query engine hands back [`SearchResult`]s with citations.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use uuid::Uuid;

/// One raw file (or one feed entry) handed over by the download stage.
#[derive(Debug, Clone)]
pub struct RawItem {
    pub source_id: String,
    /// Stable reference used for citations and document ids.
    pub origin_ref: String,
    pub content: String,
    pub path: PathBuf,
}

/// A heading in effect from `word_offset` onward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMark {
    pub word_offset: usize,
    pub heading: String,
}

/// Normalized plain-text document.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub origin_ref: String,
    pub version_tag: String,
    pub raw_text: String,
    pub sections: Vec<SectionMark>,
    pub tags: Vec<String>,
}

impl Document {
    pub fn new(
        source_id: &str,
        origin_ref: &str,
        title: String,
        version_tag: String,
        raw_text: String,
        sections: Vec<SectionMark>,
    ) -> Self {
        Self {
            id: document_id(source_id, origin_ref),
            source_id: source_id.to_string(),
            title,
            origin_ref: origin_ref.to_string(),
            version_tag,
            raw_text,
            sections,
            tags: Vec::new(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.raw_text.split_whitespace().count()
    }

    /// Heading in effect at `word_offset`, if any.
    pub fn section_at(&self, word_offset: usize) -> Option<&str> {
        self.sections
            .iter()
            .take_while(|s| s.word_offset <= word_offset)
            .last()
            .map(|s| s.heading.as_str())
    }
}

/// Metadata copied from the parent document onto every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub origin_ref: String,
    pub version_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A word window of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub word_count: usize,
    pub source_id: String,
    pub priority: u32,
    pub hash: String,
    pub metadata: ChunkMetadata,
}

/// A ranked hit returned by the query engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub text: String,
    pub title: String,
    pub origin_ref: String,
    pub source_id: String,
    pub source_name: String,
    pub version_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub tags: Vec<String>,
    pub score: f32,
    pub priority: u32,
    pub citation: String,
}

/// Deterministic document id: UUIDv5 over source and origin.
pub fn document_id(source_id: &str, origin_ref: &str) -> String {
    let name = format!("okb:doc:{}:{}", source_id, origin_ref);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// Deterministic chunk id: UUIDv5 over the parent id and position.
pub fn chunk_id(document_id: &str, chunk_index: i64) -> String {
    let name = format!("okb:chunk:{}:{}", document_id, chunk_index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_deterministic() {
        let a = document_id("arch", "wiki/Pacman");
        let b = document_id("arch", "wiki/Pacman");
        assert_eq!(a, b);
        assert_ne!(a, document_id("hyprland", "wiki/Pacman"));
        assert_eq!(chunk_id(&a, 3), chunk_id(&b, 3));
        assert_ne!(chunk_id(&a, 3), chunk_id(&a, 4));
    }

    #[test]
    fn test_section_at() {
        let doc = Document::new(
            "arch",
            "x",
            "X".into(),
            "any".into(),
            "one two three four five".into(),
            vec![
                SectionMark {
                    word_offset: 0,
                    heading: "Intro".into(),
                },
                SectionMark {
                    word_offset: 3,
                    heading: "Usage".into(),
                },
            ],
        );
        assert_eq!(doc.section_at(0), Some("Intro"));
        assert_eq!(doc.section_at(2), Some("Intro"));
        assert_eq!(doc.section_at(3), Some("Usage"));
        assert_eq!(doc.word_count(), 5);
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let h = content_hash("hello");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
