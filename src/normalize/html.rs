//! HTML normalizer for wiki pages and the curated manual.
//!
//! Non-content subtrees matching the profile's strip selectors are skipped,
//! the title comes from the first title selector with text, and the body
//! is taken from the first content selector that matches.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use super::{collapse_whitespace, stem_of, title_from_stem, Normalizer, TextBuilder};
use crate::error::ParseError;
use crate::models::{Document, RawItem};
use crate::sources::SourceEntry;

pub struct HtmlNormalizer;

const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "br",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "hr",
    "li",
    "main",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "td",
    "th",
    "tr",
    "ul",
];

const SECTION_HEADINGS: &[&str] = &["h1", "h2", "h3", "h4"];

impl Normalizer for HtmlNormalizer {
    fn parse(&self, raw: &RawItem, entry: &SourceEntry) -> Result<Document, ParseError> {
        if raw.content.trim().is_empty() {
            return Err(ParseError::empty(&raw.origin_ref));
        }
        let html = Html::parse_document(&raw.content);
        let profile = &entry.html;

        let mut stripped = Stripped::default();
        for sel in parse_selectors(&profile.strip_selectors) {
            stripped.0.extend(html.select(&sel));
        }

        let title = parse_selectors(&profile.title_selectors)
            .iter()
            .filter_map(|sel| html.select(sel).next())
            .map(|el| {
                let mut s = String::new();
                collect_text(el, &stripped, &mut s);
                collapse_whitespace(&s)
            })
            .find(|t| !t.is_empty())
            .unwrap_or_else(|| title_from_stem(&stem_of(raw)));

        let content_root = parse_selectors(&profile.content_selectors)
            .iter()
            .find_map(|sel| html.select(sel).next())
            .unwrap_or_else(|| html.root_element());

        let mut builder = TextBuilder::new();
        walk(content_root, &stripped, &mut builder);
        let (raw_text, sections) = builder.finish();

        if raw_text.is_empty() {
            return Err(ParseError::empty(&raw.origin_ref));
        }

        Ok(Document::new(
            &entry.id,
            &raw.origin_ref,
            title,
            entry.version_tag().to_string(),
            raw_text,
            sections,
        ))
    }
}

fn parse_selectors(list: &[String]) -> Vec<Selector> {
    list.iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(sel) => Some(sel),
            Err(e) => {
                warn!(selector = %s, error = %e, "ignoring invalid CSS selector");
                None
            }
        })
        .collect()
}

/// Elements whose whole subtree is skipped.
#[derive(Default)]
struct Stripped<'a>(Vec<ElementRef<'a>>);

impl Stripped<'_> {
    fn contains(&self, el: &ElementRef<'_>) -> bool {
        self.0.iter().any(|s| s.id() == el.id())
    }
}

fn walk(el: ElementRef<'_>, stripped: &Stripped<'_>, out: &mut TextBuilder) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if stripped.contains(&child_el) {
                continue;
            }
            let name = child_el.value().name();
            if SECTION_HEADINGS.contains(&name) {
                let mut heading = String::new();
                collect_text(child_el, stripped, &mut heading);
                out.mark_section(&heading);
            } else if BLOCK_ELEMENTS.contains(&name) {
                out.push_break();
                walk(child_el, stripped, out);
                out.push_break();
            } else {
                walk(child_el, stripped, out);
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_text(text);
        }
    }
}

fn collect_text(el: ElementRef<'_>, stripped: &Stripped<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if !stripped.contains(&child_el) {
                collect_text(child_el, stripped, out);
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}
