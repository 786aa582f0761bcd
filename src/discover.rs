//! Raw item discovery.
//!
//! Walks a source's download directory and yields the files matching its
//! include globs (minus excludes), sorted by relative path. Release feed
//! files are split into one item per release here.
//!
//! Citations drop the file extension, so two files can map to the same
//! origin (`Foo.html` and `Foo.htm`). The first in path order wins; the
//! others are recorded as failures.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::SourceFormat;
use crate::error::{IngestError, ParseError};
use crate::models::RawItem;
use crate::normalize::split_feed;
use crate::sources::SourceEntry;

/// Items found for one source, plus files that could not be read.
#[derive(Debug, Default)]
pub struct Discovery {
    pub items: Vec<RawItem>,
    pub failures: Vec<ParseError>,
}

pub fn discover(entry: &SourceEntry) -> Result<Discovery, IngestError> {
    let root = &entry.root;
    if !root.is_dir() {
        return Err(IngestError::Discovery {
            source_id: entry.id.clone(),
            reason: format!("raw directory does not exist: {}", root.display()),
        });
    }

    let include_set = build_globset(&entry.id, &entry.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(entry.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&entry.id, &excludes)?;

    let mut files = Vec::new();
    for dirent in WalkDir::new(root).follow_links(true) {
        let dirent = dirent.map_err(|e| IngestError::Discovery {
            source_id: entry.id.clone(),
            reason: e.to_string(),
        })?;
        if !dirent.file_type().is_file() {
            continue;
        }
        let path = dirent.path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        if exclude_set.is_match(&relative) || !include_set.is_match(&relative) {
            continue;
        }
        files.push((relative, path.to_path_buf()));
    }
    files.sort();

    let mut found = Discovery::default();
    let mut claimed: HashMap<String, String> = HashMap::new();
    for (relative, path) in files {
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                found
                    .failures
                    .push(ParseError::malformed(&relative, format!("unreadable: {}", e)));
                continue;
            }
        };

        if entry.format == SourceFormat::ReleaseFeed {
            let max_version = if entry.pinned {
                entry.version.as_deref()
            } else {
                None
            };
            match split_feed(&entry.id, &path, &relative, &content, max_version) {
                Ok(items) => found.items.extend(items),
                Err(e) => found.failures.push(e),
            }
            continue;
        }

        let origin = origin_ref(entry.base_url.as_deref(), &relative);
        if let Some(first) = claimed.get(&origin) {
            found.failures.push(ParseError::malformed(
                &relative,
                format!("same citation as {} ({}); skipped", first, origin),
            ));
            continue;
        }
        claimed.insert(origin.clone(), relative.clone());
        found.items.push(RawItem {
            source_id: entry.id.clone(),
            origin_ref: origin,
            content,
            path,
        });
    }

    Ok(found)
}

/// Citation for a file: `base_url` plus the extensionless relative path,
/// or the relative path itself.
pub fn origin_ref(base_url: Option<&str>, relative: &str) -> String {
    match base_url {
        Some(base) => {
            let stem = Path::new(relative)
                .with_extension("")
                .to_string_lossy()
                .replace('\\', "/");
            format!("{}/{}", base.trim_end_matches('/'), stem)
        }
        None => relative.to_string(),
    }
}

fn build_globset(source_id: &str, patterns: &[String]) -> Result<GlobSet, IngestError> {
    let invalid = |e: globset::Error| IngestError::Discovery {
        source_id: source_id.to_string(),
        reason: format!("invalid glob: {}", e),
    };
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(invalid)?);
    }
    builder.build().map_err(invalid)
}
