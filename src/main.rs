//! # omarchy-kb CLI (`okb`)
//!
//! Builds and queries the documentation index, and serves it to AI tools
//! over MCP.
//!
//! ## Usage
//!
//! ```bash
//! okb --config ./config/okb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `okb init` | Create the index database and schema |
//! | `okb sources` | List sources with priority, version and chunk counts |
//! | `okb ingest <all\|source>` | Normalize, chunk, embed and index sources |
//! | `okb search "<query>"` | Ranked, cited search results |
//! | `okb config-location <app>` | Config file paths for an application |
//! | `okb compare "<topic>"` | Two source groups side by side |
//! | `okb info` | Index statistics as JSON |
//! | `okb snapshot freeze <source>` | Freeze a pinned source's chunks (`--overwrite` to replace) |
//! | `okb snapshot list` | List snapshots on disk |
//! | `okb serve` | MCP tools over stdio |
//!
//! Logs go to stderr (`RUST_LOG`, default `omarchy_kb=info`); stdout is
//! reserved for command output and the MCP stream.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use omarchy_kb::config::{self, Config};
use omarchy_kb::embedding::create_provider;
use omarchy_kb::ingest::{print_report, IngestOptions, Pipeline};
use omarchy_kb::mcp;
use omarchy_kb::search::{print_results, QueryEngine};
use omarchy_kb::snapshot::SnapshotManager;
use omarchy_kb::sources::{print_sources, SourceRegistry};
use omarchy_kb::store::{IndexFilter, IndexStore, SqliteIndex};

/// Local semantic search over the Omarchy, Hyprland and Arch documentation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/okb.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "okb", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/okb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index database and schema. Idempotent.
    Init,

    /// List configured sources and how many chunks each has indexed.
    Sources,

    /// Ingest one source, or `all` of them concurrently.
    ///
    /// Pinned sources are rebuilt from their snapshot when one exists for
    /// the pinned version.
    Ingest {
        /// `all` or a source id.
        target: String,

        /// Re-derive pinned sources from raw files.
        #[arg(long)]
        refresh: bool,

        /// Replace existing snapshots of pinned versions with the re-derived
        /// chunks.
        #[arg(long)]
        overwrite_snapshot: bool,
    },

    /// Search the index.
    Search {
        query: String,

        /// Comma-separated source ids to restrict the search to.
        #[arg(long)]
        source: Option<String>,

        /// Number of results (clamped to `retrieval.max_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Only chunks tagged with this version.
        #[arg(long)]
        version: Option<String>,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Find configuration file paths for an application.
    ConfigLocation {
        app: String,

        /// Source to search (default: omarchy).
        #[arg(long)]
        source: Option<String>,
    },

    /// Compare how two groups of sources cover a topic.
    Compare {
        topic: String,

        /// First source group (default: omarchy).
        #[arg(long)]
        a: Option<String>,

        /// Second source group (default: arch,hyprland).
        #[arg(long)]
        b: Option<String>,
    },

    /// Print index statistics as JSON.
    Info,

    /// Manage snapshots of pinned sources.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Serve the MCP tools over stdio.
    Serve,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Write the indexed chunks of a pinned source to the snapshot directory.
    Freeze {
        source: String,

        /// Replace an existing snapshot of the pinned version.
        #[arg(long)]
        overwrite: bool,
    },
    /// List snapshots on disk.
    List,
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("omarchy_kb=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn open_store(cfg: &Config) -> Result<Arc<SqliteIndex>> {
    let store = SqliteIndex::open(&cfg.db.path)
        .await
        .with_context(|| format!("failed to open index at {}", cfg.db.path.display()))?;
    Ok(Arc::new(store))
}

async fn query_engine(cfg: &Config, registry: SourceRegistry) -> Result<QueryEngine> {
    let store = open_store(cfg).await?;
    let embedder = create_provider(&cfg.embedding)?;
    Ok(QueryEngine::new(cfg, registry, store, embedder))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;
    let registry = SourceRegistry::from_config(&cfg);

    match cli.command {
        Commands::Init => {
            let store = open_store(&cfg).await?;
            store.close().await;
            println!("Database initialized at {}.", cfg.db.path.display());
        }
        Commands::Sources => {
            let store = open_store(&cfg).await?;
            let mut counts = HashMap::new();
            for id in registry.ids() {
                let n = store.count(&IndexFilter::source(&id)).await?;
                counts.insert(id, n);
            }
            store.close().await;
            print_sources(&registry, &counts);
        }
        Commands::Ingest {
            target,
            refresh,
            overwrite_snapshot,
        } => {
            let store = open_store(&cfg).await?;
            let embedder = create_provider(&cfg.embedding)?;
            let pipeline = Pipeline::new(cfg.clone(), registry, store.clone(), embedder);
            let options = IngestOptions {
                refresh,
                overwrite_snapshot,
            };

            let runs = if target == "all" {
                pipeline.ingest_all(options).await
            } else {
                let result = pipeline.ingest_source(&target, options).await;
                vec![(target.clone(), result)]
            };
            store.close().await;

            let mut failed = Vec::new();
            for (source, result) in runs {
                match result {
                    Ok(report) => print_report(&report),
                    Err(e) => {
                        println!("ingest {}", source);
                        println!("  error: {}", e);
                        failed.push(source);
                    }
                }
            }
            if !failed.is_empty() {
                bail!("ingest failed for: {}", failed.join(", "));
            }
        }
        Commands::Search {
            query,
            source,
            top_k,
            version,
            json,
        } => {
            let engine = query_engine(&cfg, registry).await?;
            let response = engine
                .search(&query, top_k, source.as_deref(), version.as_deref())
                .await;
            if json {
                print_json(&response)?;
            } else {
                print_results(&response);
            }
        }
        Commands::ConfigLocation { app, source } => {
            let engine = query_engine(&cfg, registry).await?;
            print_json(&engine.find_config_location(&app, source.as_deref()).await)?;
        }
        Commands::Compare { topic, a, b } => {
            let engine = query_engine(&cfg, registry).await?;
            print_json(
                &engine
                    .compare_sources(&topic, a.as_deref(), b.as_deref())
                    .await,
            )?;
        }
        Commands::Info => {
            let engine = query_engine(&cfg, registry).await?;
            print_json(&engine.server_info().await?)?;
        }
        Commands::Snapshot { action } => {
            let manager = SnapshotManager::new(cfg.snapshots.dir.clone(), registry);
            match action {
                SnapshotAction::Freeze { source, overwrite } => {
                    let store = open_store(&cfg).await?;
                    let manifest = manager.freeze(store.as_ref(), &source, overwrite).await?;
                    store.close().await;
                    println!("snapshot {}@{}", manifest.source_id, manifest.version);
                    println!("  documents: {}", manifest.document_count);
                    println!("  chunks: {}", manifest.chunk_count);
                    println!(
                        "  path: {}",
                        manager
                            .path_for(&manifest.source_id, &manifest.version)
                            .display()
                    );
                    println!("ok");
                }
                SnapshotAction::List => {
                    let manifests = manager.list()?;
                    if manifests.is_empty() {
                        println!("No snapshots in {}.", manager.dir().display());
                    }
                    for m in manifests {
                        println!(
                            "{}@{}  {} documents, {} chunks, created {}",
                            m.source_id, m.version, m.document_count, m.chunk_count, m.created_at
                        );
                    }
                }
            }
        }
        Commands::Serve => {
            let engine = query_engine(&cfg, registry).await?;
            mcp::run_stdio(Arc::new(engine)).await?;
        }
    }

    Ok(())
}
