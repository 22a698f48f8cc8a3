//! Observation stores: the local SQLite fallback and the remote primary.
//!
//! Both implement [`ObservationStore`], so the dual-sink writer and the
//! backfill coordinator can treat either side uniformly.

use std::future::Future;

use crate::models::{NormalizedReading, StoredObservation};

mod link;
mod local;
mod remote;

pub use link::{is_stale, RemoteLink};
pub use local::SqliteStore;
pub use remote::PgStore;

// ---

/// A durable store holding one row per reading.
pub trait ObservationStore: Send + Sync + Sized + 'static {
    /// Short name used in logs and errors.
    const KIND: &'static str;

    /// Open a pool against `url`.
    fn connect(
        url: &str,
        max_connections: u32,
    ) -> impl Future<Output = Result<Self, sqlx::Error>> + Send;

    /// Create the observation table if absent.
    fn create_schema(&self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Whether the observation table exists.
    fn schema_exists(&self) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Insert one reading. Returns `false` when its timestamp was already stored.
    fn insert(
        &self,
        reading: &NormalizedReading,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Insert readings in one transaction, skipping duplicates. Returns the
    /// number of rows actually inserted. Nothing is kept if any insert fails.
    fn insert_batch(
        &self,
        readings: &[NormalizedReading],
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    /// All rows in identity (insertion) order.
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<StoredObservation>, sqlx::Error>> + Send;

    /// Rewrite identities so they increase with timestamp, in one transaction.
    fn resequence(&self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Whether the underlying pool has been shut down.
    fn is_closed(&self) -> bool;

    fn close(&self) -> impl Future<Output = ()> + Send;
}
