//! Ingestion pipeline orchestration.
//!
//! Per source: discovery → normalization → chunking → embedding → index
//! upsert → prune. Each run gets a run id from the index store; every entry
//! written or confirmed during the run is stamped with it, and whatever of
//! the source still carries an older run id afterwards is pruned.
//!
//! ```text
//!  raw files ─▶ normalize ─▶ chunk ─┬─ unchanged ─▶ touch_chunks
//!                                   └─ new/changed ─▶ [embed batches] ══▶ queue ══▶ [upsert]
//! ```
//!
//! Embedding (producer) and upserting (consumer) overlap through a bounded
//! channel. Per-item failures are recorded in the [`IngestReport`]; a
//! failing index or an unavailable embedding model aborts the run, which is
//! safe to repeat.
//!
//! Pinned sources with a snapshot for their pinned version are rebuilt from
//! that snapshot instead of raw files unless `refresh` is set. A raw ingest
//! of a pinned source freezes the chunks it derived; an existing snapshot of
//! the same version is only replaced with `overwrite_snapshot`.
//!
//! A release feed file that cannot be read or parsed hides every release it
//! held, so such a run neither prunes nor freezes.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chunk::Chunker;
use crate::config::{Config, SourceFormat};
use crate::discover::{discover, origin_ref};
use crate::embedding::{embed_batch, Embedder};
use crate::error::{IngestError, SnapshotError};
use crate::models::{document_id, Chunk};
use crate::normalize::normalize;
use crate::snapshot::SnapshotManager;
use crate::sources::{SourceEntry, SourceRegistry};
use crate::store::{IndexEntry, IndexStore, RunStatus};

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Re-derive pinned sources from raw files even when a snapshot exists.
    pub refresh: bool,
    /// Replace an existing snapshot of the pinned version.
    pub overwrite_snapshot: bool,
}

/// An item skipped during a run.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub stage: &'static str,
    pub origin: String,
    pub reason: String,
}

/// Outcome of one source's run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub source_id: String,
    pub run_id: i64,
    /// Snapshot version the chunks came from, when not from raw files.
    pub from_snapshot: Option<String>,
    pub documents: usize,
    pub skipped_short: usize,
    pub chunks_total: usize,
    pub chunks_embedded: usize,
    pub chunks_reused: usize,
    pub pruned: u64,
    /// Set when a failed feed file left the run without a full picture of
    /// the source.
    pub prune_skipped: bool,
    pub failures: Vec<ItemFailure>,
    /// Version frozen at the end of the run, if any.
    pub snapshot: Option<String>,
}

/// Everything a run needs, shared by all sources.
pub struct Pipeline {
    config: Config,
    registry: SourceRegistry,
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    snapshots: SnapshotManager,
}

impl Pipeline {
    pub fn new(
        config: Config,
        registry: SourceRegistry,
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let snapshots = SnapshotManager::new(config.snapshots.dir.clone(), registry.clone());
        Self {
            config,
            registry,
            store,
            embedder,
            snapshots,
        }
    }

    /// Ingest every registered source concurrently.
    pub async fn ingest_all(
        &self,
        options: IngestOptions,
    ) -> Vec<(String, Result<IngestReport, IngestError>)> {
        let runs = self.registry.entries().iter().map(|entry| async move {
            (entry.id.clone(), self.ingest_source(&entry.id, options).await)
        });
        join_all(runs).await
    }

    pub async fn ingest_source(
        &self,
        source_id: &str,
        options: IngestOptions,
    ) -> Result<IngestReport, IngestError> {
        let entry = self
            .registry
            .get(source_id)
            .ok_or_else(|| IngestError::UnknownSource(source_id.to_string()))?;

        let run_id = self.store.begin_run(&entry.id).await?;
        info!(source = %entry.id, run_id, "ingest started");

        match self.run(entry, run_id, options).await {
            Ok(report) => {
                self.store.finish_run(run_id, RunStatus::Completed).await?;
                info!(
                    source = %entry.id,
                    run_id,
                    documents = report.documents,
                    chunks = report.chunks_total,
                    embedded = report.chunks_embedded,
                    reused = report.chunks_reused,
                    pruned = report.pruned,
                    failures = report.failures.len(),
                    "ingest finished"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(source = %entry.id, run_id, error = %e, "ingest aborted");
                if let Err(finish) = self.store.finish_run(run_id, RunStatus::Failed).await {
                    warn!(run_id, error = %finish, "could not record failed run");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        entry: &SourceEntry,
        run_id: i64,
        options: IngestOptions,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport {
            source_id: entry.id.clone(),
            run_id,
            ..Default::default()
        };

        let restorable = match (&entry.pinned, &entry.version) {
            (true, Some(version)) if !options.refresh && self.snapshots.exists(&entry.id, version) => {
                Some(version.clone())
            }
            _ => None,
        };

        let chunks = match restorable {
            Some(version) => {
                let chunks = self.snapshots.restore(&entry.id, &version)?;
                report.documents = chunks
                    .iter()
                    .map(|c| c.document_id.as_str())
                    .collect::<BTreeSet<_>>()
                    .len();
                info!(source = %entry.id, version = %version, chunks = chunks.len(), "restored from snapshot");
                report.from_snapshot = Some(version);
                chunks
            }
            None => self.derive_chunks(entry, run_id, &mut report).await?,
        };
        report.chunks_total = chunks.len();

        let to_freeze = (entry.pinned && report.from_snapshot.is_none()).then(|| chunks.clone());
        self.embed_and_store(entry, run_id, chunks, &mut report).await?;

        if report.prune_skipped {
            warn!(source = %entry.id, "feed file failed; keeping every indexed chunk of the source");
            return Ok(report);
        }

        report.pruned = self.store.delete_where(&entry.id, run_id).await?;
        if report.pruned > 0 {
            debug!(source = %entry.id, pruned = report.pruned, "pruned stale chunks");
        }

        if let Some(derived) = to_freeze {
            self.freeze_derived(entry, derived, options, &mut report).await?;
        }

        Ok(report)
    }

    /// Freeze a pinned source from the chunks this run derived, plus the
    /// indexed chunks of documents that kept their previous version.
    async fn freeze_derived(
        &self,
        entry: &SourceEntry,
        derived: Vec<Chunk>,
        options: IngestOptions,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let Some(version) = entry.version.as_deref() else {
            return Ok(());
        };
        if self.snapshots.exists(&entry.id, version) && !options.overwrite_snapshot {
            warn!(
                source = %entry.id,
                version,
                "snapshot already exists; pass --overwrite-snapshot to replace it"
            );
            return Ok(());
        }

        let derived_ids: HashSet<String> = derived.iter().map(|c| c.id.clone()).collect();
        let mut chunks = derived;
        chunks.extend(
            self.store
                .list_source_chunks(&entry.id)
                .await?
                .into_iter()
                .filter(|c| !derived_ids.contains(&c.id)),
        );

        match self
            .snapshots
            .freeze_chunks(&entry.id, chunks, options.overwrite_snapshot)
        {
            Ok(manifest) => report.snapshot = Some(manifest.version),
            Err(SnapshotError::NothingToFreeze(_)) => {
                warn!(source = %entry.id, "pinned source produced no chunks; snapshot not written")
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Discover, normalize and chunk a source's raw files.
    async fn derive_chunks(
        &self,
        entry: &SourceEntry,
        run_id: i64,
        report: &mut IngestReport,
    ) -> Result<Vec<Chunk>, IngestError> {
        let discovery = discover(entry)?;
        for failure in discovery.failures {
            warn!(source = %entry.id, origin = failure.origin(), error = %failure, "skipping raw file");
            if entry.format == SourceFormat::ReleaseFeed {
                report.prune_skipped = true;
            } else {
                // Keep the last good version of an unreadable file.
                let origin = origin_ref(entry.base_url.as_deref(), failure.origin());
                self.store
                    .touch_document(&document_id(&entry.id, &origin), run_id)
                    .await?;
            }
            report.failures.push(ItemFailure {
                stage: "discover",
                origin: failure.origin().to_string(),
                reason: failure.to_string(),
            });
        }

        let chunker = Chunker::from_config(&self.config.chunking);
        let min_words = self.config.chunking.min_words;
        let mut chunks = Vec::new();

        for raw in &discovery.items {
            let doc = match normalize(raw, entry) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(source = %entry.id, origin = %raw.origin_ref, error = %e, "skipping item");
                    self.store
                        .touch_document(&document_id(&entry.id, &raw.origin_ref), run_id)
                        .await?;
                    report.failures.push(ItemFailure {
                        stage: "normalize",
                        origin: raw.origin_ref.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if doc.word_count() < min_words {
                debug!(origin = %doc.origin_ref, words = doc.word_count(), "below min_words");
                report.skipped_short += 1;
                continue;
            }

            report.documents += 1;
            chunks.extend(chunker.chunks(&doc, entry.priority));
        }

        Ok(chunks)
    }

    /// Embed new or changed chunks and upsert them; stamp unchanged ones.
    async fn embed_and_store(
        &self,
        entry: &SourceEntry,
        run_id: i64,
        chunks: Vec<Chunk>,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let stored = self.store.fingerprints(&entry.id).await?;
        let model = self.embedder.model_name().to_string();

        let (reused, pending): (Vec<Chunk>, Vec<Chunk>) = chunks.into_iter().partition(|c| {
            stored
                .get(&c.id)
                .is_some_and(|fp| fp.is_current(c, &model))
        });

        let reused_ids: Vec<String> = reused.into_iter().map(|c| c.id).collect();
        self.store.touch_chunks(&reused_ids, run_id).await?;
        report.chunks_reused = reused_ids.len();

        if pending.is_empty() {
            return Ok(());
        }

        let batch_size = self.config.embedding.batch_size.max(1);
        let max_input_words = self.config.embedding.max_input_words;
        let (tx, mut rx) = mpsc::channel::<Vec<IndexEntry>>(self.config.pipeline.queue_depth.max(1));
        let embedder = self.embedder.as_ref();
        let store = self.store.as_ref();

        let producer = async move {
            let mut failures = Vec::new();
            for (n, batch) in pending.chunks(batch_size).enumerate() {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let results = embed_batch(embedder, &texts, max_input_words)
                    .await
                    .map_err(IngestError::Embedder)?;

                let mut entries = Vec::with_capacity(batch.len());
                for (chunk, result) in batch.iter().zip(results) {
                    match result {
                        Ok(vector) => entries.push(IndexEntry {
                            chunk: chunk.clone(),
                            vector,
                            model: model.clone(),
                            run_id,
                        }),
                        Err(e) => {
                            warn!(chunk = %chunk.id, origin = %chunk.metadata.origin_ref, error = %e, "skipping chunk");
                            failures.push(ItemFailure {
                                stage: "embed",
                                origin: format!("{}#{}", chunk.metadata.origin_ref, chunk.chunk_index),
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                debug!(batch = n, size = batch.len(), embedded = entries.len(), "batch embedded");

                // A closed queue means the consumer failed; its error wins.
                if tx.send(entries).await.is_err() {
                    break;
                }
            }
            Ok::<_, IngestError>(failures)
        };

        let consumer = async move {
            let mut written = 0usize;
            while let Some(entries) = rx.recv().await {
                store.upsert_many(&entries).await?;
                written += entries.len();
            }
            Ok::<_, IngestError>(written)
        };

        let (failures, written) = tokio::try_join!(producer, consumer)?;
        report.chunks_embedded = written;
        report.failures.extend(failures);
        Ok(())
    }
}

/// Print a run summary in the CLI's report style.
pub fn print_report(report: &IngestReport) {
    println!("ingest {}", report.source_id);
    if let Some(ref version) = report.from_snapshot {
        println!("  restored from snapshot: {}", version);
    }
    println!("  run: {}", report.run_id);
    println!("  documents: {}", report.documents);
    if report.skipped_short > 0 {
        println!("  skipped (too short): {}", report.skipped_short);
    }
    println!("  chunks: {}", report.chunks_total);
    println!("  embedded: {}", report.chunks_embedded);
    println!("  unchanged: {}", report.chunks_reused);
    if report.prune_skipped {
        println!("  pruned: skipped (feed file failed)");
    } else {
        println!("  pruned: {}", report.pruned);
    }
    if !report.failures.is_empty() {
        println!("  failures: {}", report.failures.len());
        for f in report.failures.iter().take(10) {
            println!("    [{}] {}", f.stage, f.reason);
        }
        if report.failures.len() > 10 {
            println!("    ... {} more", report.failures.len() - 10);
        }
    }
    if let Some(ref version) = report.snapshot {
        println!("  snapshot: {}@{}", report.source_id, version);
    }
    println!("ok");
}
