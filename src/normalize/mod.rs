//! Normalizers: raw markup to plain-text [`Document`]s.
//!
//! Each source family gets one implementation of [`Normalizer`]; the
//! registry entry's [`SourceFormat`] picks which one runs.
//!
//! ```text
//! RawItem ──▶ HtmlNormalizer      (distro wiki, curated manual)
//!         ──▶ MarkdownNormalizer  (window-manager wiki)
//!         ──▶ ReleaseNormalizer   (release feed entries)
//!                    │
//!                    ▼
//!               Document { raw_text, sections, ... }
//! ```
//!
//! Headings never appear inline in `raw_text`; they are recorded as
//! [`SectionMark`]s at the word offset where they take effect.

pub mod html;
pub mod markdown;
pub mod releases;

use crate::config::SourceFormat;
use crate::error::ParseError;
use crate::models::{Document, RawItem, SectionMark};
use crate::sources::SourceEntry;

pub use html::HtmlNormalizer;
pub use markdown::MarkdownNormalizer;
pub use releases::{split_feed, ReleaseNormalizer};

/// Turns one raw item into a normalized document.
pub trait Normalizer: Send + Sync {
    fn parse(&self, raw: &RawItem, entry: &SourceEntry) -> Result<Document, ParseError>;
}

/// The normalizer for a source's format.
pub fn normalizer_for(format: SourceFormat) -> &'static dyn Normalizer {
    match format {
        SourceFormat::Html => &HtmlNormalizer,
        SourceFormat::Markdown => &MarkdownNormalizer,
        SourceFormat::ReleaseFeed => &ReleaseNormalizer,
    }
}

/// Normalize a raw item with the normalizer its source calls for, then
/// tag it.
pub fn normalize(raw: &RawItem, entry: &SourceEntry) -> Result<Document, ParseError> {
    let mut doc = normalizer_for(entry.format).parse(raw, entry)?;
    doc.tags = document_tags(raw, entry);
    Ok(doc)
}

/// The source's tags plus, for pages, a category: the top-level directory
/// under the source root, or the page's own name when it sits at the root.
pub fn document_tags(raw: &RawItem, entry: &SourceEntry) -> Vec<String> {
    let mut tags = entry.tags.clone();
    if entry.format == SourceFormat::ReleaseFeed {
        return tags;
    }
    let relative = raw.path.strip_prefix(&entry.root).unwrap_or(&raw.path);
    let category = if relative.components().count() > 1 {
        relative
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
    } else {
        relative.file_stem().map(|s| s.to_string_lossy().to_string())
    };
    if let Some(tag) = category.map(|c| slug(&c)).filter(|t| !t.is_empty()) {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn slug(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split([' ', '_'])
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Accumulates plain text line by line and tracks section marks by word
/// offset.
#[derive(Debug, Default)]
pub(crate) struct TextBuilder {
    text: String,
    line: String,
    words: usize,
    sections: Vec<SectionMark>,
}

impl TextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append inline text to the current line.
    pub fn push_text(&mut self, s: &str) {
        self.line.push_str(s);
    }

    /// End the current line as a paragraph.
    pub fn push_break(&mut self) {
        let mut words = self.line.split_whitespace().peekable();
        if words.peek().is_some() {
            if !self.text.is_empty() {
                self.text.push_str("\n\n");
            }
            let mut first = true;
            for word in words {
                if !first {
                    self.text.push(' ');
                }
                self.text.push_str(word);
                self.words += 1;
                first = false;
            }
        }
        self.line.clear();
    }

    /// Start a new section at the current word offset.
    pub fn mark_section(&mut self, heading: &str) {
        self.push_break();
        let heading = collapse_whitespace(heading);
        if heading.is_empty() {
            return;
        }
        // A heading with no text under it is replaced by the next one.
        if let Some(last) = self.sections.last_mut() {
            if last.word_offset == self.words {
                last.heading = heading;
                return;
            }
        }
        self.sections.push(SectionMark {
            word_offset: self.words,
            heading,
        });
    }

    pub fn finish(mut self) -> (String, Vec<SectionMark>) {
        self.push_break();
        let words = self.words;
        self.sections.retain(|s| s.word_offset < words);
        (self.text, self.sections)
    }
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Human title from a file stem: `getting-started` becomes `Getting Started`.
pub(crate) fn title_from_stem(stem: &str) -> String {
    stem.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn stem_of(raw: &RawItem) -> String {
    raw.path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| raw.origin_ref.clone())
}
