use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use omarchy_kb::config::{parse_config, Config};
use omarchy_kb::embedding::{create_provider, Embedder, HashEmbedder};
use omarchy_kb::error::{EmbeddingError, IngestError};
use omarchy_kb::ingest::{IngestOptions, Pipeline};
use omarchy_kb::search::QueryEngine;
use omarchy_kb::snapshot::SnapshotManager;
use omarchy_kb::sources::SourceRegistry;
use omarchy_kb::store::{IndexFilter, IndexStore, MemoryIndex, SqliteIndex};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title}</title></head><body><nav>Home | Manual</nav>\
         <article><h1>{title}</h1><p>{body}</p></article><footer>(c) Omarchy</footer></body></html>"
    )
}

fn config(root: &Path) -> Config {
    parse_config(&format!(
        r#"
[db]
path = "{root}/data/okb.sqlite"

[chunking]
chunk_size_words = 400

[embedding]
provider = "hash"
dims = 128

[snapshots]
dir = "{root}/snapshots"

[sources.omarchy]
display_name = "Omarchy Manual"
description = "Omarchy-specific documentation"
priority = 1
format = "html"
root = "{root}/raw/omarchy"
base_url = "https://learn.omacom.io/manual"
pinned = true
version = "3.2.3"

[sources.omarchy-releases]
display_name = "Omarchy Release Notes"
priority = 1
format = "release-feed"
root = "{root}/raw/releases"
pinned = true
version = "3.2.3"

[sources.hyprland]
display_name = "Hyprland Wiki"
priority = 2
format = "markdown"
root = "{root}/raw/hyprland"

[sources.arch]
display_name = "Arch Wiki"
priority = 3
format = "html"
root = "{root}/raw/arch"
base_url = "https://wiki.archlinux.org/title"
"#,
        root = root.display()
    ))
    .unwrap()
}

fn pipeline(cfg: &Config, store: Arc<dyn IndexStore>) -> Pipeline {
    let embedder = create_provider(&cfg.embedding).unwrap();
    Pipeline::new(cfg.clone(), SourceRegistry::from_config(cfg), store, embedder)
}

fn engine(cfg: &Config, store: Arc<dyn IndexStore>) -> QueryEngine {
    let embedder = create_provider(&cfg.embedding).unwrap();
    QueryEngine::new(cfg, SourceRegistry::from_config(cfg), store, embedder)
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "raw/hyprland/Configuring/Binds.md", "# Binds\n\nbind = SUPER, Q, exec, kitty");
    write(root, "raw/hyprland/Configuring/Monitors.md", &format!("# Monitors\n\n{}", words(450)));

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(SqliteIndex::open(&cfg.db.path).await.unwrap());
    let p = pipeline(&cfg, store.clone());

    let first = p.ingest_source("hyprland", IngestOptions::default()).await.unwrap();
    assert_eq!(first.documents, 2);
    assert_eq!(first.chunks_total, 3);
    assert_eq!(first.chunks_embedded, 3);
    let before = store.list_source_chunks("hyprland").await.unwrap();
    let scores = |resp: omarchy_kb::search::SearchResponse| {
        resp.results
            .into_iter()
            .map(|r| (r.chunk_id, r.score))
            .collect::<Vec<_>>()
    };
    let scores_before = scores(engine(&cfg, store.clone()).search("bind kitty monitors", Some(3), None, None).await);
    assert_eq!(scores_before.len(), 3);

    let second = p.ingest_source("hyprland", IngestOptions::default()).await.unwrap();
    assert!(second.run_id > first.run_id);
    assert_eq!(second.chunks_embedded, 0);
    assert_eq!(second.chunks_reused, 3);
    assert_eq!(second.pruned, 0);

    let after = store.list_source_chunks("hyprland").await.unwrap();
    assert_eq!(before, after);
    let scores_after = scores(engine(&cfg, store.clone()).search("bind kitty monitors", Some(3), None, None).await);
    assert_eq!(scores_before, scores_after);

    // A fresh database embeds the same text to the same vectors.
    let other = TempDir::new().unwrap();
    let fresh: Arc<dyn IndexStore> =
        Arc::new(SqliteIndex::open(&other.path().join("okb.sqlite")).await.unwrap());
    pipeline(&cfg, fresh.clone()).ingest_source("hyprland", IngestOptions::default()).await.unwrap();
    let scores_fresh = scores(engine(&cfg, fresh).search("bind kitty monitors", Some(3), None, None).await);
    assert_eq!(scores_before, scores_fresh);
    let last = store.last_run("hyprland").await.unwrap().unwrap();
    assert_eq!(last.status, "completed");
}

#[tokio::test]
async fn test_thousand_words_make_three_chunks_and_shrink_prunes() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "raw/hyprland/Long.md", &words(1000));

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let p = pipeline(&cfg, store.clone());

    let report = p.ingest_source("hyprland", IngestOptions::default()).await.unwrap();
    assert_eq!(report.chunks_total, 3);
    let counts: Vec<usize> = store
        .list_source_chunks("hyprland")
        .await
        .unwrap()
        .iter()
        .map(|c| (c.chunk_index, c.word_count))
        .collect::<std::collections::BTreeMap<_, _>>()
        .into_values()
        .collect();
    assert_eq!(counts, vec![400, 400, 200]);

    write(root, "raw/hyprland/Long.md", &words(300));
    let report = p.ingest_source("hyprland", IngestOptions::default()).await.unwrap();
    assert_eq!(report.chunks_total, 1);
    assert_eq!(report.pruned, 2);
    assert_eq!(store.count(&IndexFilter::source("hyprland")).await.unwrap(), 1);
}

#[tokio::test]
async fn test_empty_documents_produce_no_chunks() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "raw/hyprland/Empty.md", "");
    write(root, "raw/hyprland/Blank.md", "   \n\n   ");
    write(root, "raw/hyprland/Real.md", "Some actual content.");

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let report = pipeline(&cfg, store.clone())
        .ingest_source("hyprland", IngestOptions::default())
        .await
        .unwrap();

    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks_total, 1);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.stage == "normalize"));
}

#[tokio::test]
async fn test_equal_scores_rank_by_source_priority() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let text = "Waybar lives in the top bar and shows workspaces";
    write(root, "raw/omarchy/waybar.html", &page("Waybar", text));
    write(root, "raw/arch/Waybar.html", &page("Waybar", text));

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let p = pipeline(&cfg, store.clone());
    p.ingest_source("arch", IngestOptions::default()).await.unwrap();
    p.ingest_source("omarchy", IngestOptions::default()).await.unwrap();

    let resp = engine(&cfg, store).search("waybar workspaces", Some(2), None, None).await;
    assert_eq!(resp.results.len(), 2);
    assert_eq!(resp.results[0].score, resp.results[1].score);
    assert_eq!(resp.results[0].source_id, "omarchy");
    assert_eq!(resp.results[0].origin_ref, "https://learn.omacom.io/manual/waybar");
    assert_eq!(resp.results[0].version_tag, "3.2.3");
    assert_eq!(resp.results[1].source_id, "arch");
    assert_eq!(resp.results[1].version_tag, "any");
}

#[tokio::test]
async fn test_pinned_source_restores_from_snapshot() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "raw/omarchy/hotkeys.html", &page("Hotkeys", "Super Space opens the launcher"));
    write(root, "raw/omarchy/themes.html", &page("Themes", "Super Ctrl Shift Space picks a theme"));

    let cfg = config(root);
    let first_store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let report = pipeline(&cfg, first_store.clone())
        .ingest_source("omarchy", IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(report.snapshot.as_deref(), Some("3.2.3"));
    assert!(root.join("snapshots/omarchy@3.2.3/manifest.json").is_file());
    assert!(root.join("snapshots/omarchy@3.2.3/chunks.json").is_file());

    // Upstream moved on: the raw pages are gone.
    fs::remove_dir_all(root.join("raw/omarchy")).unwrap();

    let fresh: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let p = pipeline(&cfg, fresh.clone());
    let restored = p.ingest_source("omarchy", IngestOptions::default()).await.unwrap();
    assert_eq!(restored.from_snapshot.as_deref(), Some("3.2.3"));
    assert_eq!(restored.documents, 2);
    assert_eq!(
        fresh.list_source_chunks("omarchy").await.unwrap(),
        first_store.list_source_chunks("omarchy").await.unwrap()
    );

    let refresh = p
        .ingest_source("omarchy", IngestOptions { refresh: true, ..Default::default() })
        .await;
    assert!(matches!(refresh, Err(IngestError::Discovery { .. })));
    // The failed refresh leaves the restored index alone.
    assert_eq!(fresh.count(&IndexFilter::source("omarchy")).await.unwrap(), 2);
}

#[tokio::test]
async fn test_release_feed_stops_at_pinned_version() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(
        root,
        "raw/releases/releases.json",
        r###"[
  {"tag_name": "v3.3.0", "name": "Omarchy 3.3.0", "body": "Not released for this pin."},
  {"tag_name": "v3.2.3", "name": "Omarchy 3.2.3", "body": "## Fixes\n\n* Faster boot", "html_url": "https://github.com/basecamp/omarchy/releases/tag/v3.2.3"},
  {"tag_name": "v3.1.0", "body": "First release with themes."}
]"###,
    );

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let report = pipeline(&cfg, store.clone())
        .ingest_source("omarchy-releases", IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(report.documents, 2);

    let chunks = store.list_source_chunks("omarchy-releases").await.unwrap();
    let mut tags: Vec<&str> = chunks.iter().map(|c| c.metadata.version_tag.as_str()).collect();
    tags.sort();
    assert_eq!(tags, vec!["3.1.0", "3.2.3"]);
    assert!(chunks.iter().any(|c| c.metadata.title == "Release 3.1.0"));
    assert!(chunks
        .iter()
        .any(|c| c.metadata.section.as_deref() == Some("Fixes")));
}

#[tokio::test]
async fn test_ingest_all_runs_every_source() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "raw/omarchy/hotkeys.html", &page("Hotkeys", "Super Space opens the launcher"));
    write(root, "raw/releases/releases.json", r#"[{"version": "3.2.3", "body": "Fixes"}]"#);
    write(root, "raw/hyprland/Binds.md", "bind = SUPER, Q, exec, kitty");
    fs::create_dir_all(root.join("raw/arch")).unwrap();

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let runs = pipeline(&cfg, store.clone())
        .ingest_all(IngestOptions::default())
        .await;

    assert_eq!(runs.len(), 4);
    assert!(runs.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(store.count(&IndexFilter::all()).await.unwrap(), 3);
    let run_ids: std::collections::BTreeSet<i64> = runs
        .iter()
        .map(|(_, r)| r.as_ref().unwrap().run_id)
        .collect();
    assert_eq!(run_ids.len(), 4);
}

#[tokio::test]
async fn test_oversampling_lifts_priority_source_above_better_score() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(
        root,
        "raw/omarchy/waybar.html",
        &page("Waybar", "Theme colors for the status bar follow the theme picker"),
    );
    write(root, "raw/arch/Waybar.html", &page("Waybar", "Waybar workspaces"));

    let mut cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let p = pipeline(&cfg, store.clone());
    p.ingest_source("arch", IngestOptions::default()).await.unwrap();
    p.ingest_source("omarchy", IngestOptions::default()).await.unwrap();

    cfg.retrieval.oversampling_factor = 1;
    let narrow = engine(&cfg, store.clone()).search("waybar workspaces", Some(1), None, None).await;
    assert_eq!(narrow.results.len(), 1);
    assert_eq!(narrow.results[0].source_id, "arch");

    cfg.retrieval.oversampling_factor = 3;
    let wide = engine(&cfg, store).search("waybar workspaces", Some(1), None, None).await;
    assert_eq!(wide.results.len(), 1);
    assert_eq!(wide.results[0].source_id, "omarchy");
    assert!(wide.results[0].score < narrow.results[0].score);
}

#[tokio::test]
async fn test_failed_feed_keeps_indexed_releases() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(
        root,
        "raw/releases/releases.json",
        r#"[{"version": "3.2.3", "body": "Faster boot"}, {"version": "3.1.0", "body": "Themes"}]"#,
    );

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let p = pipeline(&cfg, store.clone());
    let first = p.ingest_source("omarchy-releases", IngestOptions::default()).await.unwrap();
    assert_eq!(first.documents, 2);

    write(root, "raw/releases/releases.json", "not json {");
    let options = IngestOptions { refresh: true, ..Default::default() };
    let report = p.ingest_source("omarchy-releases", options).await.unwrap();
    assert!(report.prune_skipped);
    assert_eq!(report.pruned, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, "discover");
    assert_eq!(report.snapshot, None);
    assert_eq!(
        store.count(&IndexFilter::source("omarchy-releases")).await.unwrap(),
        2
    );
    let last = store.last_run("omarchy-releases").await.unwrap().unwrap();
    assert_eq!(last.status, "completed");
}

/// Hash embedder that rejects any text mentioning `marker`.
struct RejectingEmbedder {
    inner: HashEmbedder,
    marker: &'static str,
}

#[async_trait]
impl Embedder for RejectingEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
    fn dims(&self) -> usize {
        self.inner.dims()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.contains(self.marker)) {
            return Err(EmbeddingError::Rejected("input refused".into()));
        }
        self.inner.embed(texts).await
    }
}

#[tokio::test]
async fn test_snapshot_keeps_chunks_that_failed_to_embed() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "raw/omarchy/hotkeys.html", &page("Hotkeys", "Super Space opens the launcher"));
    write(root, "raw/omarchy/themes.html", &page("Themes", "Super Ctrl Shift Space picks a theme"));

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let embedder: Arc<dyn Embedder> = Arc::new(RejectingEmbedder {
        inner: HashEmbedder::new(128),
        marker: "picks a theme",
    });
    let report = Pipeline::new(cfg.clone(), SourceRegistry::from_config(&cfg), store.clone(), embedder)
        .ingest_source("omarchy", IngestOptions::default())
        .await
        .unwrap();

    assert_eq!(report.chunks_total, 2);
    assert_eq!(report.chunks_embedded, 1);
    assert!(report.failures.iter().any(|f| f.stage == "embed"));
    assert_eq!(store.count(&IndexFilter::source("omarchy")).await.unwrap(), 1);
    assert_eq!(report.snapshot.as_deref(), Some("3.2.3"));

    let snapshots = SnapshotManager::new(cfg.snapshots.dir.clone(), SourceRegistry::from_config(&cfg));
    let frozen = snapshots.restore("omarchy", "3.2.3").unwrap();
    assert_eq!(frozen.len(), 2);
    assert!(frozen.iter().any(|c| c.text.contains("picks a theme")));
}

#[tokio::test]
async fn test_refresh_does_not_replace_snapshot_without_overwrite() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "raw/omarchy/hotkeys.html", &page("Hotkeys", "Super Space opens the launcher"));

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    let p = pipeline(&cfg, store.clone());
    p.ingest_source("omarchy", IngestOptions::default()).await.unwrap();
    let snapshots = SnapshotManager::new(cfg.snapshots.dir.clone(), SourceRegistry::from_config(&cfg));
    let frozen = snapshots.restore("omarchy", "3.2.3").unwrap();

    // Upstream edited the page without bumping the version.
    write(root, "raw/omarchy/hotkeys.html", &page("Hotkeys", "Super Enter opens a terminal"));
    let refresh = IngestOptions { refresh: true, ..Default::default() };
    let report = p.ingest_source("omarchy", refresh).await.unwrap();
    assert_eq!(report.snapshot, None);
    assert_eq!(report.chunks_embedded, 1);
    assert_eq!(snapshots.restore("omarchy", "3.2.3").unwrap(), frozen);

    let overwrite = IngestOptions { refresh: true, overwrite_snapshot: true };
    let report = p.ingest_source("omarchy", overwrite).await.unwrap();
    assert_eq!(report.snapshot.as_deref(), Some("3.2.3"));
    let replaced = snapshots.restore("omarchy", "3.2.3").unwrap();
    assert_ne!(replaced, frozen);
    assert!(replaced[0].text.contains("Super Enter"));
}

#[tokio::test]
async fn test_chunks_carry_source_and_category_tags() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "raw/hyprland/Configuring/Binds.md", "# Binds\n\nbind = SUPER, Q, exec, kitty");

    let cfg = config(root);
    let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
    pipeline(&cfg, store.clone())
        .ingest_source("hyprland", IngestOptions::default())
        .await
        .unwrap();

    let resp = engine(&cfg, store).search("bind kitty", Some(1), None, None).await;
    assert_eq!(resp.results[0].tags, vec!["hyprland", "configuring"]);
}
