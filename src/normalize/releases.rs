//! Release feed normalizer.
//!
//! The download stage writes the product's release notes as one JSON array
//! per feed file. [`split_feed`] turns that array into one [`RawItem`] per
//! release (dropping releases newer than the pinned version), and
//! [`ReleaseNormalizer`] renders each release body through the Markdown
//! rules.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

use super::markdown::markdown_to_text;
use super::Normalizer;
use crate::error::ParseError;
use crate::models::{Document, RawItem};
use crate::sources::SourceEntry;

pub struct ReleaseNormalizer;

/// One entry of a release feed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

impl ReleaseEntry {
    /// Release version with any leading `v` removed.
    pub fn normalized_version(&self) -> Option<String> {
        self.version
            .as_deref()
            .or(self.tag_name.as_deref())
            .map(|v| v.trim().trim_start_matches(['v', 'V']).to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Split a release feed file into one raw item per release.
///
/// Releases newer than `max_version` are left out. Entries without a
/// version cannot be cited and fail the whole file.
pub fn split_feed(
    source_id: &str,
    path: &Path,
    relative: &str,
    content: &str,
    max_version: Option<&str>,
) -> Result<Vec<RawItem>, ParseError> {
    let entries: Vec<ReleaseEntry> = serde_json::from_str(content)
        .map_err(|e| ParseError::malformed(relative, format!("invalid release feed: {}", e)))?;

    let mut items = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let version = entry.normalized_version().ok_or_else(|| {
            ParseError::malformed(relative, format!("release #{} has no version", i))
        })?;
        if let Some(max) = max_version {
            if compare_versions(&version, max) == Ordering::Greater {
                continue;
            }
        }
        let origin_ref = entry
            .html_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("{}#v{}", relative, version));
        let content = serde_json::to_string(&entry)
            .map_err(|e| ParseError::malformed(relative, e.to_string()))?;
        items.push(RawItem {
            source_id: source_id.to_string(),
            origin_ref,
            content,
            path: path.to_path_buf(),
        });
    }
    Ok(items)
}

impl Normalizer for ReleaseNormalizer {
    fn parse(&self, raw: &RawItem, entry: &SourceEntry) -> Result<Document, ParseError> {
        let release: ReleaseEntry = serde_json::from_str(&raw.content)
            .map_err(|e| ParseError::malformed(&raw.origin_ref, e.to_string()))?;
        let version = release
            .normalized_version()
            .ok_or_else(|| ParseError::malformed(&raw.origin_ref, "release has no version"))?;

        let body = release.body.as_deref().unwrap_or("");
        let md = markdown_to_text(body);
        if md.text.is_empty() {
            return Err(ParseError::empty(&raw.origin_ref));
        }

        let title = release
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Release {}", version));

        Ok(Document::new(
            &entry.id,
            &raw.origin_ref,
            title,
            version,
            md.text,
            md.sections,
        ))
    }
}

/// Compare dotted versions numerically (`3.10.0` > `3.9.1`).
///
/// Non-numeric components compare as text; a missing component counts as
/// zero, so `3.2` == `3.2.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts = |s: &str| -> Vec<String> {
        s.trim_start_matches(['v', 'V'])
            .split(['.', '-', '+'])
            .map(str::to_string)
            .collect()
    };
    let (pa, pb) = (parts(a), parts(b));
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let x = pa.get(i).map(String::as_str).unwrap_or("0");
        let y = pb.get(i).map(String::as_str).unwrap_or("0");
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceFormat;
    use crate::sources::test_entry;

    const FEED: &str = r###"[
  {"version": "3.3.0", "name": "Omarchy 3.3.0", "published_at": "2025-12-01T00:00:00Z",
   "body": "## Features\n\n* New thing", "html_url": "https://github.com/basecamp/omarchy/releases/tag/v3.3.0"},
  {"tag_name": "v3.2.3", "name": "", "published_at": "2025-11-10T00:00:00Z",
   "body": "## Fixes\n\n* Fixed the **waybar** clock\n* Faster boot",
   "html_url": "https://github.com/basecamp/omarchy/releases/tag/v3.2.3"},
  {"version": "3.10.0", "name": "Future", "body": "far ahead"},
  {"version": "2.0.0", "name": "Omarchy 2", "body": ""}
]"###;

    #[test]
    fn test_split_feed_respects_pinned_version() {
        let items = split_feed(
            "omarchy-releases",
            Path::new("releases.json"),
            "releases.json",
            FEED,
            Some("3.2.3"),
        )
        .unwrap();
        let origins: Vec<&str> = items.iter().map(|i| i.origin_ref.as_str()).collect();
        assert_eq!(
            origins,
            vec![
                "https://github.com/basecamp/omarchy/releases/tag/v3.2.3",
                "releases.json#v2.0.0"
            ]
        );
    }

    #[test]
    fn test_release_document() {
        let items = split_feed("omarchy-releases", Path::new("r.json"), "r.json", FEED, None).unwrap();
        assert_eq!(items.len(), 4);
        let mut entry = test_entry("omarchy-releases", SourceFormat::ReleaseFeed);
        entry.version = Some("3.2.3".into());

        let doc = ReleaseNormalizer.parse(&items[1], &entry).unwrap();
        assert_eq!(doc.version_tag, "3.2.3");
        assert_eq!(doc.title, "Release 3.2.3");
        assert_eq!(doc.raw_text, "Fixed the waybar clock\n\nFaster boot");
        assert_eq!(doc.sections[0].heading, "Fixes");

        let err = ReleaseNormalizer.parse(&items[3], &entry).unwrap_err();
        assert!(matches!(err, ParseError::Empty { .. }));
    }

    #[test]
    fn test_malformed_feed() {
        let err = split_feed("r", Path::new("r.json"), "r.json", "{not json", None).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
        let err = split_feed("r", Path::new("r.json"), "r.json", r#"[{"body":"x"}]"#, None)
            .unwrap_err();
        assert!(err.to_string().contains("no version"));
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("3.10.0", "3.9.1"), Ordering::Greater);
        assert_eq!(compare_versions("v3.2", "3.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("3.2.3", "3.2.4"), Ordering::Less);
    }
}
