//! Query engine.
//!
//! Embeds a question, pulls `top_k × oversampling_factor` candidates from
//! the index, and re-ranks them strictly by source priority (lower first),
//! then score (higher first), then chunk id. Oversampling gives a
//! high-priority source that scored slightly lower a chance to make the cut.
//!
//! None of the entry points return errors for bad queries: empty queries,
//! unknown sources, an empty index or a failed embedding all come back as an
//! empty result list with a `note` explaining why.

use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};

use crate::config::Config;
use crate::embedding::{embed_query, Embedder};
use crate::error::{IndexError, QueryError};
use crate::models::SearchResult;
use crate::sources::SourceRegistry;
use crate::store::{IndexFilter, IndexStore, ScoredChunk};

/// Filesystem paths as they appear in config documentation.
static CONFIG_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:~/|/etc/|[\w.-]*\.config/)[^\s'"`<>()\[\],;]*"#).unwrap()
});

const LOCATION_EXCERPT_CHARS: usize = 500;
const COMPARE_EXCERPT_CHARS: usize = 300;
const COMPARE_HITS: usize = 3;
const MAX_LOCATIONS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SearchResponse {
    fn failed(err: QueryError) -> Self {
        Self {
            results: Vec::new(),
            note: Some(err.note()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigLocation {
    pub source_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub origin_ref: String,
    pub paths: Vec<String>,
    pub excerpt: String,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigLocationResponse {
    pub app: String,
    pub source: String,
    pub locations: Vec<ConfigLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Excerpt {
    pub source_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub origin_ref: String,
    pub score: f32,
    pub excerpt: String,
}

/// The `rank`-th hit of each side.
#[derive(Debug, Clone, Serialize)]
pub struct ComparePair {
    pub rank: usize,
    pub a: Option<Excerpt>,
    pub b: Option<Excerpt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareResponse {
    pub topic: String,
    pub source_a: Vec<String>,
    pub source_b: Vec<String>,
    pub pairs: Vec<ComparePair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub priority: u32,
    pub format: &'static str,
    pub pinned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub documents: u64,
    pub chunks: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub total_documents: u64,
    pub total_chunks: u64,
    pub sources: Vec<SourceInfo>,
    pub embedding_model: String,
    pub embedding_dims: usize,
    pub chunk_size_words: usize,
    pub capabilities: Vec<&'static str>,
}

/// Tool-facing retrieval core. Cheap to share: everything is behind `Arc`.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    registry: SourceRegistry,
    default_top_k: usize,
    max_top_k: usize,
    oversampling: usize,
    max_input_words: usize,
    chunk_size_words: usize,
}

impl QueryEngine {
    pub fn new(
        config: &Config,
        registry: SourceRegistry,
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store,
            embedder,
            registry,
            default_top_k: config.retrieval.default_top_k,
            max_top_k: config.retrieval.max_top_k,
            oversampling: config.retrieval.oversampling_factor.max(1),
            max_input_words: config.embedding.max_input_words,
            chunk_size_words: config.chunking.chunk_size_words,
        }
    }

    /// `(default_top_k, max_top_k)` as configured.
    pub fn top_k_limits(&self) -> (usize, usize) {
        (self.default_top_k, self.max_top_k)
    }

    /// `top_k` falls back to the default and is clamped to `1..=max_top_k`.
    pub fn clamp_top_k(&self, top_k: Option<usize>) -> usize {
        top_k
            .unwrap_or(self.default_top_k)
            .clamp(1, self.max_top_k.max(1))
    }

    /// Semantic search with source-priority re-ranking.
    ///
    /// `source_filter` is a comma-separated list of source ids; `version`
    /// restricts results to chunks with that version tag.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        source_filter: Option<&str>,
        version: Option<&str>,
    ) -> SearchResponse {
        let k = self.clamp_top_k(top_k);
        match self.ranked(query, k, source_filter, version).await {
            Ok(hits) => SearchResponse {
                results: hits.into_iter().map(|h| self.to_result(h)).collect(),
                note: None,
            },
            Err(e) => SearchResponse::failed(e),
        }
    }

    async fn ranked(
        &self,
        query: &str,
        k: usize,
        source_filter: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let sources = match source_filter.filter(|s| !s.trim().is_empty()) {
            Some(list) => self.registry.resolve_list(list)?,
            None => Vec::new(),
        };
        let filter = IndexFilter::sources(sources).with_version(
            version
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().trim_start_matches(['v', 'V']).to_string()),
        );

        if self.store.count(&filter).await? == 0 {
            return Err(QueryError::EmptyIndex);
        }

        let vector = embed_query(self.embedder.as_ref(), query, self.max_input_words).await?;
        let mut candidates = self
            .store
            .query(&vector, k.saturating_mul(self.oversampling), &filter)
            .await?;
        rerank(&mut candidates);
        candidates.truncate(k);
        Ok(candidates)
    }

    fn to_result(&self, hit: ScoredChunk) -> SearchResult {
        let c = hit.chunk;
        let citation = cite(&c.metadata.title, c.metadata.section.as_deref(), &c.metadata.origin_ref);
        SearchResult {
            source_name: self.registry.display_name_of(&c.source_id).to_string(),
            chunk_id: c.id,
            text: c.text,
            title: c.metadata.title,
            origin_ref: c.metadata.origin_ref,
            source_id: c.source_id,
            version_tag: c.metadata.version_tag,
            section: c.metadata.section,
            tags: c.metadata.tags,
            score: hit.score,
            priority: c.priority,
            citation,
        }
    }

    /// Find configuration file paths for an application.
    ///
    /// Searches `source` (default `omarchy`) for the app's configuration,
    /// keeps only hits that mention a path, and lists chunks naming the app
    /// first.
    pub async fn find_config_location(
        &self,
        app_name: &str,
        source: Option<&str>,
    ) -> ConfigLocationResponse {
        let app = app_name.trim();
        let source = source
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("omarchy")
            .to_string();
        let mut response = ConfigLocationResponse {
            app: app.to_string(),
            source: source.clone(),
            locations: Vec::new(),
            note: None,
        };
        if app.is_empty() {
            response.note = Some(QueryError::EmptyQuery.note());
            return response;
        }

        let query = format!("{} configuration file path location", app);
        let hits = match self
            .ranked(&query, self.max_top_k.max(1), Some(&source), None)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                response.note = Some(e.note());
                return response;
            }
        };

        let needle = app.to_lowercase();
        let mut located: Vec<(bool, ConfigLocation)> = hits
            .into_iter()
            .filter_map(|h| {
                let paths = extract_paths(&h.chunk.text);
                if paths.is_empty() {
                    return None;
                }
                let mentions_app = h.chunk.text.to_lowercase().contains(&needle)
                    || paths.iter().any(|p| p.to_lowercase().contains(&needle));
                let c = h.chunk;
                Some((
                    mentions_app,
                    ConfigLocation {
                        excerpt: excerpt(&c.text, LOCATION_EXCERPT_CHARS),
                        source_id: c.source_id,
                        title: c.metadata.title,
                        section: c.metadata.section,
                        origin_ref: c.metadata.origin_ref,
                        paths,
                        priority: c.priority,
                    },
                ))
            })
            .collect();
        // Stable: keeps rank order within each group.
        located.sort_by_key(|(mentions_app, _)| !mentions_app);
        response.locations = located
            .into_iter()
            .map(|(_, loc)| loc)
            .take(MAX_LOCATIONS)
            .collect();

        if response.locations.is_empty() {
            response.note = Some(format!(
                "no config location found for {} in {}; try search_documentation(\"{} config\") instead",
                app, source, app
            ));
        }
        response
    }

    /// Run the same topic against two source groups in parallel and pair
    /// the hits by rank.
    pub async fn compare_sources(
        &self,
        topic: &str,
        source_a: Option<&str>,
        source_b: Option<&str>,
    ) -> CompareResponse {
        let a = source_a.filter(|s| !s.trim().is_empty()).unwrap_or("omarchy");
        let b = source_b
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("arch,hyprland");
        let mut response = CompareResponse {
            topic: topic.to_string(),
            source_a: split_list(a),
            source_b: split_list(b),
            pairs: Vec::new(),
            note: None,
        };

        let (left, right) = tokio::join!(
            self.ranked(topic, COMPARE_HITS, Some(a), None),
            self.ranked(topic, COMPARE_HITS, Some(b), None)
        );

        let mut notes = Vec::new();
        let left = left.unwrap_or_else(|e| {
            notes.push(format!("{}: {}", a, e.note()));
            Vec::new()
        });
        let right = right.unwrap_or_else(|e| {
            notes.push(format!("{}: {}", b, e.note()));
            Vec::new()
        });
        if !notes.is_empty() {
            response.note = Some(notes.join("; "));
        }

        let mut left = left.into_iter().map(to_excerpt);
        let mut right = right.into_iter().map(to_excerpt);
        for rank in 1.. {
            let (a, b) = (left.next(), right.next());
            if a.is_none() && b.is_none() {
                break;
            }
            response.pairs.push(ComparePair { rank, a, b });
        }
        response
    }

    /// Index statistics and capabilities for `get_server_info`.
    pub async fn server_info(&self) -> Result<ServerInfo, IndexError> {
        let mut sources = Vec::with_capacity(self.registry.entries().len());
        for entry in self.registry.entries() {
            let filter = IndexFilter::source(&entry.id);
            sources.push(SourceInfo {
                id: entry.id.clone(),
                display_name: entry.display_name.clone(),
                description: entry.description.clone(),
                priority: entry.priority,
                format: entry.format.as_str(),
                pinned: entry.pinned,
                version: entry.version.clone(),
                documents: self.store.count_documents(&filter).await?,
                chunks: self.store.count(&filter).await?,
            });
        }
        Ok(ServerInfo {
            name: "omarchy-kb",
            version: env!("CARGO_PKG_VERSION"),
            total_documents: self.store.count_documents(&IndexFilter::all()).await?,
            total_chunks: self.store.count(&IndexFilter::all()).await?,
            sources,
            embedding_model: self.embedder.model_name().to_string(),
            embedding_dims: self.embedder.dims(),
            chunk_size_words: self.chunk_size_words,
            capabilities: vec![
                "semantic search across all documentation",
                "config file location lookup",
                "side-by-side source comparison",
                "version-aware queries for pinned sources",
                "priority-based ranking (lower priority value wins)",
            ],
        })
    }
}

/// Priority ascending, then score descending, then chunk id ascending.
pub fn rerank(hits: &mut [ScoredChunk]) {
    hits.sort_by(|a, b| {
        a.chunk
            .priority
            .cmp(&b.chunk.priority)
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

fn cite(title: &str, section: Option<&str>, origin_ref: &str) -> String {
    match section {
        Some(s) if s != title => format!("{} › {} ({})", title, s, origin_ref),
        _ => format!("{} ({})", title, origin_ref),
    }
}

fn to_excerpt(hit: ScoredChunk) -> Excerpt {
    let c = hit.chunk;
    Excerpt {
        excerpt: excerpt(&c.text, COMPARE_EXCERPT_CHARS),
        source_id: c.source_id,
        title: c.metadata.title,
        section: c.metadata.section,
        origin_ref: c.metadata.origin_ref,
        score: hit.score,
    }
}

/// First `max_chars` characters of `text`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Config-looking paths in order of first appearance.
pub fn extract_paths(text: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for m in CONFIG_PATH.find_iter(text) {
        let path = m.as_str().trim_end_matches(['.', ':', '!', '?']);
        if path.len() < 3 || paths.iter().any(|p| p == path) {
            continue;
        }
        paths.push(path.to_string());
    }
    paths
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Print results for `okb search`.
pub fn print_results(response: &SearchResponse) {
    if let Some(ref note) = response.note {
        println!("{}", note);
    }
    if response.results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (priority {}, {})",
            i + 1,
            r.score,
            r.citation,
            r.priority,
            r.source_name
        );
        println!("    {}", excerpt(&r.text, 200).replace('\n', " "));
    }
}
