//! Error taxonomy for the retrieval layer.
//!
//! | Error | Raised by | Policy |
//! |-------|-----------|--------|
//! | [`ParseError`] | normalizers, feed splitting | skip the item, record it, continue |
//! | [`EmbeddingError`] | embedding providers | retry transient failures, then skip the item; `Disabled` / `ModelUnavailable` abort the run |
//! | [`IndexError`] | index stores | abort the current run; re-running is safe |
//! | [`QueryError`] | query engine | surfaced as an empty result list with a note |
//! | [`SnapshotError`] | snapshot manager | returned to the caller |
//! | [`IngestError`] | ingestion pipeline | infrastructure failure of a whole run |

use thiserror::Error;

/// Malformed or empty raw input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{origin}: no content left after normalization")]
    Empty { origin: String },

    #[error("{origin}: {reason}")]
    Malformed { origin: String, reason: String },
}

impl ParseError {
    pub fn empty(origin: impl Into<String>) -> Self {
        ParseError::Empty {
            origin: origin.into(),
        }
    }

    pub fn malformed(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    /// The raw item the error refers to.
    pub fn origin(&self) -> &str {
        match self {
            ParseError::Empty { origin } | ParseError::Malformed { origin, .. } => origin,
        }
    }
}

/// Failure of an embedding call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,

    /// The model cannot be reached or loaded at all.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Rate limits, server errors, dropped connections. Worth retrying.
    #[error("transient embedding failure: {0}")]
    Transient(String),

    /// The provider refused this input.
    #[error("embedding rejected: {0}")]
    Rejected(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl EmbeddingError {
    /// Errors that make every further call pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Disabled | EmbeddingError::ModelUnavailable(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::Transient(_))
    }
}

/// Failure of the index store.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt index entry {chunk_id}: {reason}")]
    Corrupt { chunk_id: String, reason: String },
}

impl From<sqlx::Error> for IndexError {
    fn from(err: sqlx::Error) -> Self {
        IndexError::Unavailable(err.to_string())
    }
}

/// Query-time failures. Never crash a tool call: the query engine turns
/// them into an empty result list plus [`QueryError::note`].
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("the index holds no documents for this filter")]
    EmptyIndex,

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl QueryError {
    /// Human-readable diagnostic attached to an empty result list.
    pub fn note(&self) -> String {
        match self {
            QueryError::EmptyQuery => "query must not be empty".to_string(),
            QueryError::EmptyIndex => {
                "no documents indexed for this filter yet; run `okb ingest all`".to_string()
            }
            QueryError::UnknownSource(s) => format!("unknown source '{}'", s),
            QueryError::Embedding(e) => format!("could not embed query: {}", e),
            QueryError::Index(e) => format!("index query failed: {}", e),
        }
    }
}

/// Failures of the snapshot manager.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("source '{0}' is not pinned; only pinned sources can be snapshotted")]
    NotPinned(String),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("no snapshot for {source_id}@{version}")]
    NotFound { source_id: String, version: String },

    #[error("snapshot {source_id}@{version} already exists and is not replaced without --overwrite")]
    AlreadyExists { source_id: String, version: String },

    #[error("source '{0}' has no chunks to freeze")]
    NothingToFreeze(String),

    #[error("snapshot {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("snapshot I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Infrastructure failure that aborts an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source '{source_id}': cannot read raw items: {reason}")]
    Discovery { source_id: String, reason: String },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("embedding model unavailable: {0}")]
    Embedder(EmbeddingError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("unknown source: {0}")]
    UnknownSource(String),
}
