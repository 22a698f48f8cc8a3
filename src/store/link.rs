//! Lazily connected handle to the remote store.
//!
//! The remote is allowed to be down. A write that fails with a connection-level
//! error closes the pool, reconnects once, and retries the write once. Anything
//! else surfaces as a [`SinkError`] for the caller to log.

use tracing::{info, warn};

use super::ObservationStore;
use crate::error::SinkError;
use crate::models::NormalizedReading;

// ---

/// Whether `err` means the connection itself is gone rather than the statement
/// being rejected.
pub fn is_stale(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

pub struct RemoteLink<S> {
    url: String,
    max_connections: u32,
    store: Option<S>,
}

impl<S: ObservationStore> RemoteLink<S> {
    /// No connection is made until the first use.
    pub fn new(url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            url: url.into(),
            max_connections,
            store: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.store.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// The live store, connecting first if there is none.
    pub async fn acquire(&mut self) -> Result<&S, sqlx::Error> {
        // ---
        let usable = self.store.as_ref().is_some_and(|s| !s.is_closed());
        if !usable {
            let store = S::connect(&self.url, self.max_connections).await?;
            info!(store = S::KIND, "remote store connected");
            self.store = Some(store);
        }
        self.store.as_ref().ok_or(sqlx::Error::PoolClosed)
    }

    /// Drop the current pool and open a fresh one.
    pub async fn reconnect(&mut self) -> Result<&S, sqlx::Error> {
        // ---
        if let Some(old) = self.store.take() {
            old.close().await;
        }
        self.acquire().await
    }

    /// Insert one reading, with a single reconnect-and-retry on a stale
    /// connection.
    pub async fn insert(&mut self, reading: &NormalizedReading) -> Result<bool, SinkError> {
        // ---
        let first = match self.acquire().await {
            Ok(store) => store.insert(reading).await,
            Err(e) => Err(e),
        };

        let err = match first {
            Ok(inserted) => return Ok(inserted),
            Err(e) if is_stale(&e) => e,
            Err(source) => {
                return Err(SinkError::Database {
                    store: S::KIND,
                    source,
                })
            }
        };

        warn!(store = S::KIND, error = %err, "remote connection stale, reconnecting");
        let retried = match self.reconnect().await {
            Ok(store) => store.insert(reading).await,
            Err(e) => Err(e),
        };

        retried.map_err(|source| {
            if is_stale(&source) {
                self.store = None;
                SinkError::StaleConnection {
                    store: S::KIND,
                    source,
                }
            } else {
                SinkError::Database {
                    store: S::KIND,
                    source,
                }
            }
        })
    }

    pub async fn close(&mut self) {
        if let Some(store) = self.store.take() {
            store.close().await;
        }
    }
}
