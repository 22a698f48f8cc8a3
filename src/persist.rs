//! Failure-isolated write of one reading to the local and remote stores.

use serde::Serialize;
use tracing::{debug, error};

use crate::backfill::{BackfillCoordinator, BackfillReport};
use crate::error::{BackfillError, SinkError};
use crate::models::NormalizedReading;
use crate::store::{ObservationStore, RemoteLink};

// ---

/// Outcome of one sink write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkStatus {
    Stored,
    /// The timestamp was already present; nothing written.
    Duplicate,
    /// No remote store is configured.
    Disabled,
    Failed,
}

impl SinkStatus {
    fn from_insert(result: &Result<bool, SinkError>) -> Self {
        match result {
            Ok(true) => SinkStatus::Stored,
            Ok(false) => SinkStatus::Duplicate,
            Err(_) => SinkStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    pub local: SinkStatus,
    pub remote: SinkStatus,
}

/// Local store plus an optional lazily connected remote.
pub struct DualSink<L, R> {
    local: L,
    remote: Option<RemoteLink<R>>,
}

impl<L: ObservationStore, R: ObservationStore> DualSink<L, R> {
    pub fn new(local: L, remote: Option<RemoteLink<R>>) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    /// Write `reading` to both stores. Neither failure affects the other write;
    /// failures are logged here and reported as [`SinkStatus::Failed`].
    pub async fn persist(&mut self, reading: &NormalizedReading) -> PersistReport {
        // ---
        let local = self
            .local
            .insert(reading)
            .await
            .map_err(|source| SinkError::Database {
                store: L::KIND,
                source,
            });
        log_outcome("local", reading, &local);

        let remote = match self.remote.as_mut() {
            Some(link) => {
                let result = link.insert(reading).await;
                log_outcome("remote", reading, &result);
                SinkStatus::from_insert(&result)
            }
            None => SinkStatus::Disabled,
        };

        PersistReport {
            local: SinkStatus::from_insert(&local),
            remote,
        }
    }

    /// Backfill the remote from the local store. `None` when no remote is
    /// configured.
    pub async fn backfill_remote(
        &mut self,
        coordinator: &BackfillCoordinator,
        force: bool,
    ) -> Option<Result<BackfillReport, BackfillError>> {
        // ---
        let link = self.remote.as_mut()?;
        let remote = match link.acquire().await {
            Ok(remote) => remote,
            Err(source) => {
                return Some(Err(BackfillError::Store {
                    stage: "connect",
                    store: R::KIND,
                    source,
                }))
            }
        };

        let result = if force {
            coordinator.run_forced(&self.local, remote).await
        } else {
            coordinator.run(&self.local, remote).await
        };
        Some(result)
    }

    pub async fn close(&mut self) {
        if let Some(link) = self.remote.as_mut() {
            link.close().await;
        }
        self.local.close().await;
    }
}

fn log_outcome(sink: &str, reading: &NormalizedReading, result: &Result<bool, SinkError>) {
    // ---
    let timestamp = reading.timestamp.format("%Y-%m-%d %H:%M:%S");
    match result {
        Ok(true) => debug!(sink, %timestamp, "reading stored"),
        Ok(false) => debug!(sink, %timestamp, "duplicate timestamp ignored"),
        Err(e) => error!(sink, %timestamp, error = %e, "store write failed"),
    }
}
