//! The station context: every piece of process-wide state plus the
//! ingestion sequence that runs under one coarse lock.
//!
//! Per reading: normalize → lazy backfill → persist (local, remote) →
//! raw archive → forward → interval-gated series writes and transfers.
//! Only normalization can fail the reading; every later step is a sink whose
//! failure is logged and otherwise ignored.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::archive::ArchiveWriter;
use crate::backfill::{BackfillCoordinator, BackfillReport};
use crate::error::{BackfillError, NormalizeError, SinkError};
use crate::forward::Forwarder;
use crate::gate::{self, Interval, IntervalGate};
use crate::live::LiveFile;
use crate::models::{Observation, RawPayload};
use crate::normalize::{FieldLayout, Normalizer};
use crate::persist::{DualSink, PersistReport};
use crate::retention::{self, MetricSeriesStore, WindowedSeries};
use crate::store::{ObservationStore, SqliteStore};
use crate::transfer::{DisabledUploader, Uploader};

pub const LOCAL_DB_FILE: &str = "weather_data.db";

// ---

/// Static settings a station is built from.
#[derive(Debug, Clone)]
pub struct StationSettings {
    pub data_dir: PathBuf,
    pub layout: FieldLayout,
    pub display_offset: FixedOffset,
    pub backfill: BackfillCoordinator,
}

/// What happened to one accepted reading.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub reading_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub persisted: PersistReport,
    pub fired: Vec<&'static str>,
}

struct SeriesSet {
    day: WindowedSeries,
    week: WindowedSeries,
    month: WindowedSeries,
    year: WindowedSeries,
    custom: MetricSeriesStore,
}

impl SeriesSet {
    fn new(dir: &Path, offset: FixedOffset) -> Self {
        Self {
            day: WindowedSeries::new(dir.join("24h.json"), retention::DAY, offset),
            week: WindowedSeries::new(dir.join("1w.json"), retention::WEEK, offset),
            month: WindowedSeries::new(dir.join("1m.json"), retention::MONTH, offset),
            year: WindowedSeries::new(dir.join("1y.json"), retention::YEAR, offset),
            custom: MetricSeriesStore::new(dir.join("custom.json"), retention::DAY),
        }
    }
}

/// Progress of the one-time copy of local history into the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackfillState {
    Pending,
    /// A run failed part way; the remote table may exist but be incomplete.
    Interrupted,
    Done,
}

struct StationState<R> {
    gate: IntervalGate,
    sink: DualSink<SqliteStore, R>,
    backfill: BackfillState,
}

pub struct Station<R> {
    state: Mutex<StationState<R>>,
    normalizer: Normalizer,
    archive: ArchiveWriter,
    series: SeriesSet,
    live: LiveFile,
    local_db: PathBuf,
    uploader: Box<dyn Uploader>,
    forwarder: Option<Forwarder>,
    backfill: BackfillCoordinator,
    accepted: AtomicU64,
}

impl<R: ObservationStore> Station<R> {
    pub fn new(settings: StationSettings, sink: DualSink<SqliteStore, R>) -> Self {
        // ---
        let dir = settings.data_dir;
        Self {
            state: Mutex::new(StationState {
                gate: IntervalGate::new(),
                sink,
                backfill: BackfillState::Pending,
            }),
            normalizer: Normalizer::new(settings.layout, settings.display_offset),
            archive: ArchiveWriter::new(&dir),
            series: SeriesSet::new(&dir, settings.display_offset),
            live: LiveFile::new(dir.join("live.xml")),
            local_db: dir.join(LOCAL_DB_FILE),
            uploader: Box::new(DisabledUploader),
            forwarder: None,
            backfill: settings.backfill,
            accepted: AtomicU64::new(0),
        }
    }

    pub fn with_uploader(mut self, uploader: impl Uploader + 'static) -> Self {
        self.uploader = Box::new(uploader);
        self
    }

    pub fn with_forwarder(mut self, forwarder: Forwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Path of the local database file shipped by the six-hour gate.
    pub fn with_local_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_db = path.into();
        self
    }

    /// Readings accepted since start.
    pub fn readings_accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub async fn ingest(&self, payload: &RawPayload) -> Result<IngestReport, NormalizeError> {
        self.ingest_at(payload, Utc::now()).await
    }

    /// Process one reading as if received at `now`.
    pub async fn ingest_at(
        &self,
        payload: &RawPayload,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, NormalizeError> {
        // ---
        let reading_id = Uuid::new_v4();
        let span = info_span!("reading", id = %reading_id);
        self.process(reading_id, payload, now).instrument(span).await
    }

    async fn process(
        &self,
        reading_id: Uuid,
        payload: &RawPayload,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, NormalizeError> {
        // ---
        let mut state = self.state.lock().await;

        let observation = self.normalizer.normalize(payload).map_err(|e| {
            warn!(error = %e, "reading rejected");
            e
        })?;
        let timestamp = observation.reading.timestamp;
        debug!(%timestamp, "reading normalized");

        if state.backfill != BackfillState::Done {
            self.lazy_backfill(&mut state).await;
        }

        let persisted = state.sink.persist(&observation.reading).await;

        if let Err(e) = self.archive.append(&observation.archive) {
            sink_failed("archive", timestamp, &e);
        }

        if let Some(forwarder) = &self.forwarder {
            if let Err(e) = forwarder.forward(payload).await {
                sink_failed("forward", timestamp, &e);
            }
        }

        let fired = self.dispatch(&mut state.gate, &observation, now);
        drop(state);

        self.accepted.fetch_add(1, Ordering::Relaxed);
        info!(%timestamp, local = ?persisted.local, remote = ?persisted.remote, ?fired, "reading accepted");

        Ok(IngestReport {
            reading_id,
            timestamp,
            persisted,
            fired,
        })
    }

    async fn lazy_backfill(&self, state: &mut StationState<R>) {
        // ---
        let force = state.backfill == BackfillState::Interrupted;
        match state.sink.backfill_remote(&self.backfill, force).await {
            None => state.backfill = BackfillState::Done,
            Some(Ok(report)) => {
                info!(outcome = ?report.outcome, rows = report.rows_read, force, "remote store in sync");
                state.backfill = BackfillState::Done;
            }
            Some(Err(e)) => {
                error!(error = %e, force, "backfill failed, will retry on next reading");
                state.backfill = BackfillState::Interrupted;
            }
        }
    }

    /// Run a backfill now, excluded from ingestion by the station lock.
    ///
    /// Returns `Ok(None)` when no remote store is configured.
    pub async fn backfill(&self, force: bool) -> Result<Option<BackfillReport>, BackfillError> {
        // ---
        let mut state = self.state.lock().await;
        match state.sink.backfill_remote(&self.backfill, force).await {
            None => Ok(None),
            Some(Ok(report)) => {
                state.backfill = BackfillState::Done;
                Ok(Some(report))
            }
            Some(Err(e)) => {
                error!(error = %e, force, "backfill failed");
                state.backfill = BackfillState::Interrupted;
                Err(e)
            }
        }
    }

    fn dispatch(
        &self,
        gate: &mut IntervalGate,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Vec<&'static str> {
        // ---
        let mut fired = Vec::new();
        let mut due = |interval: Interval| {
            let armed = gate.check_at(interval.name, interval.minutes, now);
            if armed {
                fired.push(interval.name);
            }
            armed
        };
        let timestamp = observation.reading.timestamp;

        if due(gate::LIVE) {
            match self.live.write(timestamp, &observation.live) {
                Ok(()) => self.transfer(self.live.path(), "live.xml"),
                Err(e) => sink_failed("live", timestamp, &e),
            }
        }

        if due(gate::FIVE_MINUTES) {
            self.write_series(&self.series.day, observation, now, "24h.json");
            match self.series.custom.append(&observation.custom, now) {
                Ok(_) => self.transfer(self.series.custom.path(), "custom.json"),
                Err(e) => sink_failed("custom.json", timestamp, &e),
            }
        }

        if due(gate::TWENTY_FIVE_MINUTES) {
            self.write_series(&self.series.week, observation, now, "1w.json");
        }

        if due(gate::FIFTY_MINUTES) {
            self.write_series(&self.series.month, observation, now, "1m.json");
            self.write_series(&self.series.year, observation, now, "1y.json");
        }

        if due(gate::SIX_HOURS) {
            self.transfer(&self.local_db, LOCAL_DB_FILE);
        }

        fired
    }

    fn write_series(
        &self,
        series: &WindowedSeries,
        observation: &Observation,
        now: DateTime<Utc>,
        name: &'static str,
    ) {
        match series.append(&observation.display, now) {
            Ok(_) => self.transfer(series.path(), name),
            Err(e) => sink_failed(name, observation.reading.timestamp, &e),
        }
    }

    fn transfer(&self, local: &Path, remote_name: &str) {
        if let Err(e) = self.uploader.upload(local, remote_name) {
            error!(sink = "transfer", remote_name, error = %e, "transfer failed");
        }
    }

    /// Close both store pools.
    pub async fn shutdown(&self) {
        self.state.lock().await.sink.close().await;
    }
}

fn sink_failed(sink: &str, timestamp: DateTime<Utc>, err: &SinkError) {
    error!(sink, %timestamp, error = %err, "sink write failed");
}
