//! Error types for the ingestion core.
//!
//! Normalization errors reject a reading outright. Sink errors are always
//! isolated to the sink that raised them and only ever logged by the caller.

use std::path::PathBuf;

use thiserror::Error;

// ---

/// A reading that cannot be normalized. Nothing is persisted for it.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// A field every reading must carry is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The timestamp does not match `YYYY-MM-DD HH:MM:SS`.
    #[error("unparseable timestamp `{value}`: {source}")]
    Format {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// A field that is required downstream is not numeric.
    #[error("field `{field}` is not numeric: `{value}`")]
    Conversion { field: &'static str, value: String },
}

/// Failure of one destination. Never propagated past the dispatch step.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{store} store: {source}")]
    Database {
        store: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{store} store unreachable after reconnect: {source}")]
    StaleConnection {
        store: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("transfer of {} failed: {reason}", path.display())]
    Transfer { path: PathBuf, reason: String },

    #[error("forward to {url} failed: {reason}")]
    Forward { url: String, reason: String },
}

/// A backfill run that stopped early. Batches committed before the failure stay
/// committed; the run is safe to repeat.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("{stage} on {store} store: {source}")]
    Store {
        stage: &'static str,
        store: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
}

impl SinkError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::File {
            path: path.into(),
            source,
        }
    }
}
