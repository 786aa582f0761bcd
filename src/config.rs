//! TOML configuration.
//!
//! Everything the pipeline and query engine need (chunk size, embedding
//! model, oversampling factor, per-source priorities) comes from this file
//! and is threaded through calls as an explicit [`Config`] value.
//!
//! ```toml
//! [db]
//! path = "./data/okb.sqlite"
//!
//! [chunking]
//! chunk_size_words = 400
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [sources.arch]
//! display_name = "Arch Wiki"
//! priority = 3
//! format = "html"
//! root = "./data/raw/archwiki/html/en"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size_words: usize,
    #[serde(default)]
    pub overlap_words: usize,
    /// Documents with fewer words than this are skipped.
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_words: default_chunk_size(),
            overlap_words: 0,
            min_words: default_min_words(),
        }
    }
}

fn default_chunk_size() -> usize {
    400
}
fn default_min_words() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Inputs longer than this are truncated before embedding.
    #[serde(default = "default_max_input_words")]
    pub max_input_words: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            max_input_words: default_max_input_words(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_words() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_oversampling")]
    pub oversampling_factor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            oversampling_factor: default_oversampling(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    20
}
fn default_oversampling() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Embedded batches allowed to wait for the upsert consumer.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

fn default_queue_depth() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
        }
    }
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("./snapshots")
}

/// Raw input format of a source, selecting its normalizer.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    Html,
    Markdown,
    ReleaseFeed,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Html => "html",
            SourceFormat::Markdown => "markdown",
            SourceFormat::ReleaseFeed => "release-feed",
        }
    }

    fn default_globs(&self) -> Vec<String> {
        match self {
            SourceFormat::Html => vec!["**/*.html".to_string(), "**/*.htm".to_string()],
            SourceFormat::Markdown => vec!["**/*.md".to_string()],
            SourceFormat::ReleaseFeed => vec!["**/*.json".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub priority: u32,
    pub format: SourceFormat,
    /// Directory the download stage writes raw items to.
    pub root: PathBuf,
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Prefix turning relative paths into browsable citations.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Pinned sources are frozen at `version` and snapshotted.
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub html: HtmlProfile,
    /// Labels for every chunk of the source; defaults to the source id.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SourceConfig {
    pub fn effective_include_globs(&self) -> Vec<String> {
        if self.include_globs.is_empty() {
            self.format.default_globs()
        } else {
            self.include_globs.clone()
        }
    }
}

/// CSS selectors driving the HTML normalizer.
#[derive(Debug, Deserialize, Clone)]
pub struct HtmlProfile {
    #[serde(default = "default_title_selectors")]
    pub title_selectors: Vec<String>,
    #[serde(default = "default_content_selectors")]
    pub content_selectors: Vec<String>,
    #[serde(default = "default_strip_selectors")]
    pub strip_selectors: Vec<String>,
}

impl Default for HtmlProfile {
    fn default() -> Self {
        Self {
            title_selectors: default_title_selectors(),
            content_selectors: default_content_selectors(),
            strip_selectors: default_strip_selectors(),
        }
    }
}

fn default_title_selectors() -> Vec<String> {
    ["h1.firstHeading", "h1", "title"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_content_selectors() -> Vec<String> {
    ["#mw-content-text", "article", "main", "body"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_strip_selectors() -> Vec<String> {
    [
        "script",
        "style",
        "noscript",
        "nav",
        "header",
        "footer",
        "form",
        ".mw-navigation",
        ".mw-footer",
        ".mw-editsection",
        "#toc",
        ".toc",
        ".printfooter",
        ".catlinks",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let chunking = &config.chunking;
    if chunking.chunk_size_words == 0 {
        bail!("chunking.chunk_size_words must be > 0");
    }
    if chunking.overlap_words >= chunking.chunk_size_words {
        bail!("chunking.overlap_words must be smaller than chunking.chunk_size_words");
    }

    let retrieval = &config.retrieval;
    if retrieval.oversampling_factor == 0 {
        bail!("retrieval.oversampling_factor must be >= 1");
    }
    if retrieval.default_top_k == 0 || retrieval.default_top_k > retrieval.max_top_k {
        bail!("retrieval.default_top_k must be in [1, retrieval.max_top_k]");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.max_input_words == 0 {
        bail!("embedding.max_input_words must be > 0");
    }
    if config.pipeline.queue_depth == 0 {
        bail!("pipeline.queue_depth must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" | "hash" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, hash, openai, or ollama.",
            other
        ),
    }

    if config.sources.is_empty() {
        bail!("at least one [sources.<id>] entry is required");
    }
    for (id, source) in &config.sources {
        if id.trim().is_empty() || id.contains(',') || id.contains('@') {
            bail!("invalid source id '{}'", id);
        }
        if source.pinned && source.version.is_none() {
            bail!("sources.{}: pinned sources need a version", id);
        }
    }

    Ok(())
}
