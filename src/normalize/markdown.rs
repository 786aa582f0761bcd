//! Markdown normalizer for the Hyprland wiki (Hugo content).
//!
//! Works line by line: front matter is read for a title and dropped,
//! headings become section marks, and inline syntax is reduced to its
//! visible text. Code inside fences is kept verbatim.

use regex::Regex;
use std::sync::LazyLock;

use super::{stem_of, title_from_stem, Normalizer, TextBuilder};
use crate::error::ParseError;
use crate::models::{Document, RawItem, SectionMark};
use crate::sources::SourceEntry;

pub struct MarkdownNormalizer;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}(#{1,6})\s+(.*?)\s*#*\s*$").unwrap());
static SHORTCODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{[<%].*?[%>]\}\}").unwrap());
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\](?:\([^)]*\)|\[[^\]]*\])").unwrap());
static AUTOLINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(https?://[^>]+)>").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap());
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*{1,3}|~~|`+").unwrap());
static UNDERSCORE_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)_{1,2}([^_\s][^_]*?)_{1,2}(\s|$|[.,;:!?])").unwrap());
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(?:\[[ xX]\]\s+)?").unwrap());
static QUOTE_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(?:>\s?)+").unwrap());
static RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(?:[-*_]\s*){3,}$").unwrap());
static TABLE_DIVIDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\|?\s*:?-{3,}:?\s*(?:\|\s*:?-{3,}:?\s*)*\|?\s*$").unwrap());
static FRONT_MATTER_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^title\s*[:=]\s*["']?(.*?)["']?\s*$"#).unwrap());

/// Plain text extracted from a Markdown body.
#[derive(Debug, Default)]
pub(crate) struct MarkdownText {
    pub text: String,
    pub sections: Vec<SectionMark>,
    /// Title from front matter, else the first level-one heading.
    pub title: Option<String>,
}

impl Normalizer for MarkdownNormalizer {
    fn parse(&self, raw: &RawItem, entry: &SourceEntry) -> Result<Document, ParseError> {
        let md = markdown_to_text(&raw.content);
        if md.text.is_empty() {
            return Err(ParseError::empty(&raw.origin_ref));
        }
        let title = md
            .title
            .unwrap_or_else(|| title_from_stem(&stem_of(raw)));
        Ok(Document::new(
            &entry.id,
            &raw.origin_ref,
            title,
            entry.version_tag().to_string(),
            md.text,
            md.sections,
        ))
    }
}

pub(crate) fn markdown_to_text(source: &str) -> MarkdownText {
    let (front_title, body) = split_front_matter(source);
    let mut title = front_title;
    let mut builder = TextBuilder::new();
    let mut fence: Option<&str> = None;

    for line in body.lines() {
        let trimmed = line.trim_start();

        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
                builder.push_break();
            } else {
                builder.push_text(line);
                builder.push_break();
            }
            continue;
        }
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fence = Some(&trimmed[..3]);
            builder.push_break();
            continue;
        }

        let line = SHORTCODE.replace_all(line, "");
        if line.trim().is_empty() {
            builder.push_break();
            continue;
        }

        if let Some(caps) = HEADING.captures(&line) {
            let heading = clean_inline(&caps[2]);
            if caps[1].len() == 1 && title.is_none() && !heading.is_empty() {
                title = Some(heading.clone());
            }
            builder.mark_section(&heading);
            continue;
        }
        if RULE.is_match(&line) || TABLE_DIVIDER.is_match(&line) {
            builder.push_break();
            continue;
        }

        let before = line.len();
        let line = LIST_MARKER.replace(&line, "");
        let is_item = line.len() != before;
        let line = QUOTE_MARKER.replace(&line, "");
        let line = line.trim();
        if line.starts_with('|') {
            builder.push_break();
            builder.push_text(&clean_inline(&line.replace('|', " ")));
            builder.push_break();
            continue;
        }
        if is_item {
            builder.push_break();
        }
        builder.push_text(&clean_inline(line));
        builder.push_text(" ");
    }

    let (text, sections) = builder.finish();
    MarkdownText {
        text,
        sections,
        title,
    }
}

/// Reduce inline Markdown to its visible text.
fn clean_inline(s: &str) -> String {
    let s = IMAGE.replace_all(s, "");
    let s = LINK.replace_all(&s, "$1");
    let s = AUTOLINK.replace_all(&s, "$1");
    let s = HTML_TAG.replace_all(&s, "");
    let s = EMPHASIS.replace_all(&s, "");
    let s = UNDERSCORE_EMPHASIS.replace_all(&s, "$1$2$3");
    s.trim().to_string()
}

/// Split off `---` YAML or `+++` TOML front matter, returning its title.
fn split_front_matter(source: &str) -> (Option<String>, &str) {
    let source = source.trim_start_matches('\u{feff}');
    for delim in ["---", "+++"] {
        let Some(rest) = source.strip_prefix(delim) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
            continue;
        };
        let mut offset = 0;
        for line in rest.split_inclusive('\n') {
            if line.trim_end() == delim {
                let front = &rest[..offset];
                let body = &rest[offset + line.len()..];
                let title = front
                    .lines()
                    .find_map(|l| FRONT_MATTER_TITLE.captures(l.trim()))
                    .map(|c| c[1].trim().to_string())
                    .filter(|t| !t.is_empty());
                return (title, body);
            }
            offset += line.len();
        }
    }
    (None, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceFormat;
    use crate::sources::test_entry;
    use std::path::PathBuf;

    fn raw(content: &str, path: &str) -> RawItem {
        RawItem {
            source_id: "hyprland".into(),
            origin_ref: format!("https://wiki.hypr.land/{}", path),
            content: content.into(),
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_front_matter_title_and_sections() {
        let src = r#"---
weight: 5
title: Window Rules
---

Window rules let you act on windows. See [the variables](../Variables) page.

## Syntax

```ini
windowrule = float, class:kitty
```

- **bold** item
- another `code` item
"#;
        let entry = test_entry("hyprland", SourceFormat::Markdown);
        let doc = MarkdownNormalizer
            .parse(&raw(src, "Configuring/Window-Rules.md"), &entry)
            .unwrap();
        assert_eq!(doc.title, "Window Rules");
        assert!(!doc.raw_text.contains("weight"));
        assert!(doc.raw_text.contains("See the variables page."));
        assert!(doc.raw_text.contains("windowrule = float, class:kitty"));
        assert!(doc.raw_text.contains("bold item"));
        assert!(doc.raw_text.contains("another code item"));
        assert!(!doc.raw_text.contains("```"));
        assert!(!doc.raw_text.contains("##"));
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].heading, "Syntax");
        assert_eq!(doc.sections[0].word_offset, 11);
    }

    #[test]
    fn test_toml_front_matter_and_shortcodes() {
        let src = "+++\ntitle = \"Dispatchers\"\n+++\n{{< callout type=info >}}\nUse exec_once here.\n{{< /callout >}}\n";
        let entry = test_entry("hyprland", SourceFormat::Markdown);
        let doc = MarkdownNormalizer
            .parse(&raw(src, "Configuring/Dispatchers.md"), &entry)
            .unwrap();
        assert_eq!(doc.title, "Dispatchers");
        assert_eq!(doc.raw_text, "Use exec_once here.");
    }

    #[test]
    fn test_title_fallbacks() {
        let entry = test_entry("hyprland", SourceFormat::Markdown);
        let doc = MarkdownNormalizer
            .parse(&raw("# Installation\n\nGet it.", "Getting-Started/installation.md"), &entry)
            .unwrap();
        assert_eq!(doc.title, "Installation");

        let doc = MarkdownNormalizer
            .parse(&raw("Just text.", "Getting-Started/master-tutorial.md"), &entry)
            .unwrap();
        assert_eq!(doc.title, "Master Tutorial");
    }

    #[test]
    fn test_images_dropped_and_quotes_unwrapped() {
        let md = markdown_to_text("![screenshot](img.png)\n> **Note** keep this\n");
        assert_eq!(md.text, "Note keep this");
    }

    #[test]
    fn test_empty_markdown_is_parse_error() {
        let entry = test_entry("hyprland", SourceFormat::Markdown);
        let err = MarkdownNormalizer
            .parse(&raw("---\ntitle: X\n---\n\n", "x.md"), &entry)
            .unwrap_err();
        assert!(matches!(err, ParseError::Empty { .. }));
    }
}
