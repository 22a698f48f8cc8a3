//! One-time replication of historical rows from the local store into the
//! remote store.
//!
//! Rows are copied in fixed-size batches, one transaction each, then the
//! remote identities are rewritten in timestamp order. An interrupted run
//! leaves committed batches in place; re-running is safe because duplicate
//! timestamps are ignored.

use serde::Serialize;
use tracing::{info, instrument};

use crate::error::BackfillError;
use crate::models::NormalizedReading;
use crate::store::ObservationStore;

pub const DEFAULT_BATCH_SIZE: usize = 500;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillOutcome {
    /// The remote table already existed; nothing was copied.
    AlreadyPresent,
    Migrated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub outcome: BackfillOutcome,
    pub rows_read: usize,
    pub rows_inserted: u64,
    pub batches: usize,
}

impl BackfillReport {
    fn already_present() -> Self {
        Self {
            outcome: BackfillOutcome::AlreadyPresent,
            rows_read: 0,
            rows_inserted: 0,
            batches: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackfillCoordinator {
    batch_size: usize,
}

impl Default for BackfillCoordinator {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BackfillCoordinator {
    pub fn new(batch_size: usize) -> Result<Self, BackfillError> {
        if batch_size == 0 {
            return Err(BackfillError::ZeroBatchSize);
        }
        Ok(Self { batch_size })
    }

    /// Copy everything from `source` into `target` unless `target` already
    /// has the observation table.
    pub async fn run<S, T>(&self, source: &S, target: &T) -> Result<BackfillReport, BackfillError>
    where
        S: ObservationStore,
        T: ObservationStore,
    {
        // ---
        let exists = target
            .schema_exists()
            .await
            .map_err(stage::<T>("schema check"))?;
        if exists {
            info!(store = T::KIND, "remote table present, backfill skipped");
            return Ok(BackfillReport::already_present());
        }

        self.copy(source, target).await
    }

    /// Copy and resequence even if the remote table exists. Used to finish a
    /// run that was interrupted after the table was created.
    pub async fn run_forced<S, T>(
        &self,
        source: &S,
        target: &T,
    ) -> Result<BackfillReport, BackfillError>
    where
        S: ObservationStore,
        T: ObservationStore,
    {
        self.copy(source, target).await
    }

    #[instrument(skip_all, fields(from = S::KIND, to = T::KIND, batch_size = self.batch_size))]
    async fn copy<S, T>(&self, source: &S, target: &T) -> Result<BackfillReport, BackfillError>
    where
        S: ObservationStore,
        T: ObservationStore,
    {
        // ---
        target
            .create_schema()
            .await
            .map_err(stage::<T>("create schema"))?;

        let rows: Vec<NormalizedReading> = source
            .fetch_all()
            .await
            .map_err(stage::<S>("read history"))?
            .into_iter()
            .map(|stored| stored.reading)
            .collect();
        info!(rows = rows.len(), "backfill started");

        let mut inserted = 0;
        let mut copied = 0;
        let mut batches = 0;
        for batch in rows.chunks(self.batch_size) {
            inserted += target
                .insert_batch(batch)
                .await
                .map_err(stage::<T>("insert batch"))?;
            copied += batch.len();
            batches += 1;
            info!(batch = batches, copied, total = rows.len(), "backfill progress");
        }

        target
            .resequence()
            .await
            .map_err(stage::<T>("resequence"))?;
        info!(rows = rows.len(), inserted, batches, "backfill complete");

        Ok(BackfillReport {
            outcome: BackfillOutcome::Migrated,
            rows_read: rows.len(),
            rows_inserted: inserted,
            batches,
        })
    }
}

fn stage<S: ObservationStore>(stage: &'static str) -> impl Fn(sqlx::Error) -> BackfillError {
    move |source| BackfillError::Store {
        stage,
        store: S::KIND,
        source,
    }
}
