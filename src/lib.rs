//! # omarchy-kb
//!
//! Local semantic search over the Omarchy manual, the Omarchy release
//! notes, the Hyprland wiki and the Arch wiki, served to AI tools over MCP.
//!
//! Four sources with different formats, update cadences and trust levels
//! are normalized into one chunk representation, embedded, indexed, and
//! queried with source-priority re-ranking: when the curated manual and an
//! upstream wiki are equally relevant, the manual wins.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//! │ raw files    │──▶│ Normalizer │──▶│ Chunker │──▶│ Embedder │──▶│ Index Store │
//! │ html/md/feed │   └────────────┘   └─────────┘   └──────────┘   │  (SQLite)   │
//! └──────────────┘          ▲ snapshots (pinned sources)          └──────┬──────┘
//!                                                                        │
//!                        ┌───────────────────────────────────────────────┤
//!                        ▼                                               ▼
//!                  ┌──────────┐                                   ┌─────────────┐
//!                  │   CLI    │                                   │ MCP (stdio) │
//!                  │  (okb)   │                                   │   tools     │
//!                  └──────────┘                                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! okb init                          # create the index database
//! okb ingest all                    # normalize, chunk, embed every source
//! okb search "waybar cpu widget"    # ranked, cited results
//! okb serve                         # MCP tools over stdio
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Documents, chunks, results and their ids |
//! | [`sources`] | Source registry (priority, format, pinned flag) |
//! | [`discover`] | Raw item enumeration under a source's root |
//! | [`normalize`] | HTML, Markdown and release-feed normalizers |
//! | [`chunk`] | Lazy word-window chunker |
//! | [`embedding`] | Embedding providers, batching and retry |
//! | [`store`] | Index store trait, SQLite and in-memory stores |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Query engine and re-ranking |
//! | [`snapshot`] | Snapshot manager for pinned sources |
//! | [`tools`] | Agent-facing tools |
//! | [`mcp`] | MCP bridge over stdio |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Error taxonomy |

pub mod chunk;
pub mod config;
pub mod db;
pub mod discover;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod search;
pub mod snapshot;
pub mod sources;
pub mod store;
pub mod tools;
