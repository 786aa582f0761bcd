//! Source registry.
//!
//! Static per-source configuration: priority (lower wins ties at query
//! time), input format, the pinned/live flag and where the download stage
//! leaves raw files.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::{Config, HtmlProfile, SourceConfig, SourceFormat};
use crate::error::QueryError;

/// Version tag used for documents of unpinned sources.
pub const UNVERSIONED: &str = "any";

#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub priority: u32,
    pub format: SourceFormat,
    pub root: PathBuf,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub base_url: Option<String>,
    pub pinned: bool,
    pub version: Option<String>,
    pub html: HtmlProfile,
    /// Labels copied onto every chunk of the source.
    pub tags: Vec<String>,
}

impl SourceEntry {
    pub fn from_config(id: &str, cfg: &SourceConfig) -> Self {
        Self {
            id: id.to_string(),
            display_name: cfg.display_name.clone(),
            description: cfg.description.clone(),
            priority: cfg.priority,
            format: cfg.format,
            root: cfg.root.clone(),
            include_globs: cfg.effective_include_globs(),
            exclude_globs: cfg.exclude_globs.clone(),
            base_url: cfg.base_url.clone(),
            pinned: cfg.pinned,
            version: cfg.version.clone(),
            html: cfg.html.clone(),
            tags: if cfg.tags.is_empty() {
                vec![id.to_string()]
            } else {
                cfg.tags.clone()
            },
        }
    }

    /// Version stamped on documents of this source.
    pub fn version_tag(&self) -> &str {
        self.version.as_deref().unwrap_or(UNVERSIONED)
    }
}

/// All configured sources, ordered by priority then id.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    entries: Vec<SourceEntry>,
}

impl SourceRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut entries: Vec<SourceEntry> = config
            .sources
            .iter()
            .map(|(id, cfg)| SourceEntry::from_config(id, cfg))
            .collect();
        entries.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&SourceEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn display_name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|e| e.display_name.as_str()).unwrap_or(id)
    }

    /// Split a comma-separated source list and check every id exists.
    pub fn resolve_list(&self, list: &str) -> Result<Vec<String>, QueryError> {
        let mut ids = Vec::new();
        for id in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if self.get(id).is_none() {
                return Err(QueryError::UnknownSource(id.to_string()));
            }
            if !ids.iter().any(|i: &String| i == id) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
pub(crate) fn test_entry(id: &str, format: SourceFormat) -> SourceEntry {
    SourceEntry {
        id: id.to_string(),
        display_name: id.to_string(),
        description: String::new(),
        priority: 1,
        format,
        root: PathBuf::from("/nonexistent"),
        include_globs: vec![],
        exclude_globs: vec![],
        base_url: None,
        pinned: false,
        version: None,
        html: HtmlProfile::default(),
        tags: vec![id.to_string()],
    }
}

/// Print the `okb sources` table.
pub fn print_sources(registry: &SourceRegistry, counts: &HashMap<String, u64>) {
    println!(
        "{:<18} {:<9} {:<13} {:<8} {:<10} CHUNKS",
        "SOURCE", "PRIORITY", "FORMAT", "PINNED", "VERSION"
    );
    for entry in registry.entries() {
        let raw_status = if entry.root.exists() {
            ""
        } else {
            "  (raw root missing)"
        };
        println!(
            "{:<18} {:<9} {:<13} {:<8} {:<10} {}{}",
            entry.id,
            entry.priority,
            entry.format.as_str(),
            entry.pinned,
            entry.version_tag(),
            counts.get(&entry.id).copied().unwrap_or(0),
            raw_status
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn registry() -> SourceRegistry {
        let cfg = parse_config(
            r#"
[db]
path = "/tmp/okb.sqlite"

[sources.arch]
display_name = "Arch Wiki"
priority = 3
format = "html"
root = "/tmp/arch"

[sources.omarchy]
display_name = "Omarchy Manual"
priority = 1
format = "html"
root = "/tmp/omarchy"
pinned = true
version = "3.2.3"
tags = ["omarchy", "manual"]

[sources.hyprland]
display_name = "Hyprland Wiki"
priority = 2
format = "markdown"
root = "/tmp/hyprland"
"#,
        )
        .unwrap();
        SourceRegistry::from_config(&cfg)
    }

    #[test]
    fn test_entries_sorted_by_priority() {
        assert_eq!(registry().ids(), vec!["omarchy", "hyprland", "arch"]);
    }

    #[test]
    fn test_version_tag() {
        let r = registry();
        assert_eq!(r.get("omarchy").unwrap().version_tag(), "3.2.3");
        assert_eq!(r.get("arch").unwrap().version_tag(), UNVERSIONED);
    }

    #[test]
    fn test_tags_default_to_source_id() {
        let r = registry();
        assert_eq!(r.get("arch").unwrap().tags, vec!["arch"]);
        assert_eq!(r.get("omarchy").unwrap().tags, vec!["omarchy", "manual"]);
    }

    #[test]
    fn test_resolve_list() {
        let r = registry();
        assert_eq!(
            r.resolve_list("arch, hyprland,arch").unwrap(),
            vec!["arch", "hyprland"]
        );
        assert!(matches!(
            r.resolve_list("arch,gentoo"),
            Err(QueryError::UnknownSource(s)) if s == "gentoo"
        ));
    }
}
