//! Time-windowed retention stores backed by whole-file JSON documents.
//!
//! Two flavors share the same write discipline: load the current document
//! (absent or unreadable means empty), drop everything older than the
//! horizon, add the new point, and atomically replace the file.
//!
//! - [`WindowedSeries`]: `{"data": [{"MM/DD/YYYY HH:MM": {..}}, ..]}`, entries
//!   kept in insertion order.
//! - [`MetricSeriesStore`]: one series per [`Metric`], emitted in the metric's
//!   fixed display order with points sorted by time.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::SinkError;
use crate::models::{CustomSample, DisplayRecord, Metric};

/// Key format of the flat series.
pub const DISPLAY_KEY_FORMAT: &str = "%m/%d/%Y %H:%M";

pub const DAY: i64 = 24;
pub const WEEK: i64 = 7 * DAY;
pub const MONTH: i64 = 30 * DAY;
pub const YEAR: i64 = 365 * DAY;

// ---

/// One entry of a flat series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesEntry {
    pub stamp: DateTime<FixedOffset>,
    pub values: Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeriesDocument {
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

/// Flat `{timestamp: values}` series bounded to a fixed horizon.
#[derive(Debug, Clone)]
pub struct WindowedSeries {
    path: PathBuf,
    horizon: Duration,
    offset: FixedOffset,
}

impl WindowedSeries {
    /// `offset` is the zone the entry keys are rendered in.
    pub fn new(path: impl Into<PathBuf>, horizon_hours: i64, offset: FixedOffset) -> Self {
        Self {
            path: path.into(),
            horizon: Duration::hours(horizon_hours),
            offset,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record`, evicting every entry at or beyond the horizon as seen
    /// from `now`. Returns the number of entries persisted.
    pub fn append(&self, record: &DisplayRecord, now: DateTime<Utc>) -> Result<usize, SinkError> {
        // ---
        let cutoff = now - self.horizon;
        let mut entries = self.recent(now);

        // Judge the record by the minute its key will carry, as reloads do.
        let stamp = truncate_to_minute(record.stamp.with_timezone(&self.offset));
        if stamp.with_timezone(&Utc) > cutoff {
            entries.push(SeriesEntry {
                stamp,
                values: Value::Object(record.values.clone()),
            });
        } else {
            debug!(
                path = %self.path.display(),
                %stamp,
                "record already outside horizon, not stored"
            );
        }

        let document = SeriesDocument {
            data: entries
                .iter()
                .map(|entry| {
                    let mut item = Map::with_capacity(1);
                    item.insert(
                        entry.stamp.format(DISPLAY_KEY_FORMAT).to_string(),
                        entry.values.clone(),
                    );
                    item
                })
                .collect(),
        };

        write_json(&self.path, &document)?;
        info!(path = %self.path.display(), entries = entries.len(), "series saved");
        Ok(entries.len())
    }

    /// Entries younger than the horizon as of `now`, in stored order.
    pub fn recent(&self, now: DateTime<Utc>) -> Vec<SeriesEntry> {
        let cutoff = now - self.horizon;
        self.load()
            .into_iter()
            .filter(|entry| entry.stamp.with_timezone(&Utc) > cutoff)
            .collect()
    }

    /// Everything currently on disk. Unreadable files and keys are skipped.
    pub fn load(&self) -> Vec<SeriesEntry> {
        // ---
        let Some(document) = read_json::<SeriesDocument>(&self.path) else {
            return Vec::new();
        };

        let mut entries = Vec::with_capacity(document.data.len());
        for item in document.data {
            for (key, values) in item {
                match self.parse_key(&key) {
                    Some(stamp) => entries.push(SeriesEntry { stamp, values }),
                    None => warn!(path = %self.path.display(), %key, "dropping entry with bad key"),
                }
            }
        }
        entries
    }

    fn parse_key(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        let naive = NaiveDateTime::parse_from_str(key, DISPLAY_KEY_FORMAT).ok()?;
        self.offset.from_local_datetime(&naive).single()
    }
}

fn truncate_to_minute(stamp: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    stamp
        .with_second(0)
        .and_then(|s| s.with_nanosecond(0))
        .unwrap_or(stamp)
}

/// One metric's series as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub id: String,
    pub name: String,
    pub data: Vec<(i64, f64)>,
    pub index: usize,
    pub unit: String,
}

impl MetricSeries {
    fn empty(metric: Metric) -> Self {
        Self {
            id: metric.id().to_string(),
            name: metric.name().to_string(),
            data: Vec::new(),
            index: metric.index(),
            unit: metric.unit().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoredMetric {
    id: String,
    #[serde(default)]
    data: Vec<(i64, f64)>,
}

/// Per-metric series bounded to a fixed horizon.
#[derive(Debug, Clone)]
pub struct MetricSeriesStore {
    path: PathBuf,
    horizon: Duration,
}

impl MetricSeriesStore {
    pub fn new(path: impl Into<PathBuf>, horizon_hours: i64) -> Self {
        Self {
            path: path.into(),
            horizon: Duration::hours(horizon_hours),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-bucket surviving history and the new sample by metric, then persist.
    ///
    /// Points older than `now - horizon` are dropped, including the new
    /// sample's. Unknown metric ids in the stored document are discarded.
    pub fn append(
        &self,
        sample: &CustomSample,
        now: DateTime<Utc>,
    ) -> Result<Vec<MetricSeries>, SinkError> {
        // ---
        let cutoff_ms = (now - self.horizon).timestamp_millis();
        let mut buckets: BTreeMap<Metric, Vec<(i64, f64)>> =
            Metric::ALL.into_iter().map(|m| (m, Vec::new())).collect();

        for stored in read_json::<Vec<StoredMetric>>(&self.path).unwrap_or_default() {
            let Some(metric) = Metric::from_id(&stored.id) else {
                warn!(path = %self.path.display(), id = %stored.id, "dropping unknown metric");
                continue;
            };
            if let Some(points) = buckets.get_mut(&metric) {
                points.extend(stored.data.into_iter().filter(|(ms, _)| *ms >= cutoff_ms));
            }
        }

        let sample_ms = sample.timestamp_ms();
        if sample_ms >= cutoff_ms {
            for (metric, value) in &sample.values {
                if let Some(points) = buckets.get_mut(metric) {
                    points.push((sample_ms, *value));
                }
            }
        }

        let series: Vec<MetricSeries> = buckets
            .into_iter()
            .map(|(metric, mut points)| {
                points.sort_by_key(|(ms, _)| *ms);
                MetricSeries {
                    data: points,
                    ..MetricSeries::empty(metric)
                }
            })
            .collect();

        write_json(&self.path, &series)?;
        info!(path = %self.path.display(), "metric series saved");
        Ok(series)
    }
}

/// Load an indexed-flavor document as-is.
pub fn load_metric_series(path: &Path) -> Option<Vec<MetricSeries>> {
    read_json(path)
}

/// Atomically write an indexed-flavor document.
pub fn write_metric_series(path: &Path, series: &[MetricSeries]) -> Result<(), SinkError> {
    write_json(path, &series)
}

/// Merge two indexed-flavor documents position by position.
///
/// Points are concatenated and sorted by time; metadata comes from `first`.
/// Positions whose ids disagree are skipped.
pub fn merge_metric_series(first: Vec<MetricSeries>, second: Vec<MetricSeries>) -> Vec<MetricSeries> {
    // ---
    first
        .into_iter()
        .zip(second)
        .filter_map(|(a, b)| {
            if a.id != b.id {
                warn!(first = %a.id, second = %b.id, "mismatched metric ids, skipping");
                return None;
            }
            let mut data = a.data;
            data.extend(b.data);
            data.sort_by_key(|(ms, _)| *ms);
            Some(MetricSeries { data, ..a })
        })
        .collect()
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    // ---
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %path.display(), "treating unreadable series as empty: {e}");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), "treating corrupt series as empty: {e}");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SinkError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| SinkError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    replace_file(path, &bytes)
}

/// Replace `path` with `contents` in one rename, creating parent directories.
pub(crate) fn replace_file(path: &Path, contents: &[u8]) -> Result<(), SinkError> {
    // ---
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| SinkError::file(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| SinkError::file(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.flush())
        .map_err(|e| SinkError::file(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| SinkError::file(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn cet() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()
    }

    fn record(at: DateTime<Utc>, temp: f64) -> DisplayRecord {
        // ---
        let mut values = Map::new();
        values.insert("TempOut".into(), json!(temp));
        values.insert("WindDirection".into(), json!("SW"));
        DisplayRecord {
            stamp: at.with_timezone(&cet()),
            values,
        }
    }

    #[test]
    fn test_24h_window_regardless_of_insertion_order() {
        // ---
        let dir = TempDir::new().unwrap();
        let series = WindowedSeries::new(dir.path().join("24h.json"), DAY, cet());
        let n = 48;
        let now = t0() + Duration::hours(n - 1);

        // 7 is coprime with 48, so this visits every hour exactly once.
        for i in 0..n {
            let hour = (i * 7) % n;
            series
                .append(&record(t0() + Duration::hours(hour), hour as f64), now)
                .unwrap();
        }

        let kept = series.recent(now);
        assert_eq!(kept.len(), 24);
        for entry in &kept {
            let age = now - entry.stamp.with_timezone(&Utc);
            assert!(age < Duration::hours(24), "entry {} too old", entry.stamp);
        }
        let mut hours: Vec<i64> = kept
            .iter()
            .map(|e| e.values["TempOut"].as_f64().unwrap() as i64)
            .collect();
        hours.sort();
        assert_eq!(hours, (24..48).collect::<Vec<_>>());
    }

    #[test]
    fn test_flat_series_preserves_insertion_order() {
        // ---
        let dir = TempDir::new().unwrap();
        let series = WindowedSeries::new(dir.path().join("1w.json"), WEEK, cet());
        let now = t0() + Duration::hours(10);

        for hour in [5, 1, 9, 3] {
            series
                .append(&record(t0() + Duration::hours(hour), hour as f64), now)
                .unwrap();
        }

        let temps: Vec<f64> = series
            .load()
            .iter()
            .map(|e| e.values["TempOut"].as_f64().unwrap())
            .collect();
        assert_eq!(temps, vec![5.0, 1.0, 9.0, 3.0]);
    }

    #[test]
    fn test_flat_series_document_shape() {
        // ---
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("24h.json");
        let series = WindowedSeries::new(&path, DAY, cet());
        let at = Utc.with_ymd_and_hms(2024, 12, 24, 14, 1, 20).unwrap();
        series.append(&record(at, 6.4), at).unwrap();

        let doc: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            doc,
            json!({"data": [{"12/24/2024 15:01": {"TempOut": 6.4, "WindDirection": "SW"}}]})
        );
    }

    #[test]
    fn test_corrupt_or_missing_file_is_empty() {
        // ---
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1m.json");
        let series = WindowedSeries::new(&path, MONTH, cet());
        assert!(series.load().is_empty());

        fs::write(&path, b"{not json").unwrap();
        assert!(series.load().is_empty());
        assert_eq!(series.append(&record(t0(), 1.0), t0()).unwrap(), 1);
    }

    #[test]
    fn test_stale_record_not_stored() {
        // ---
        let dir = TempDir::new().unwrap();
        let series = WindowedSeries::new(dir.path().join("24h.json"), DAY, cet());
        let now = t0() + Duration::days(3);
        assert_eq!(series.append(&record(t0(), 1.0), now).unwrap(), 0);
    }

    #[test]
    fn test_append_agrees_with_reload_at_horizon_minute() {
        // ---
        let dir = TempDir::new().unwrap();
        let series = WindowedSeries::new(dir.path().join("24h.json"), DAY, cet());
        let now = t0() + Duration::days(1);

        // Seconds inside the horizon, but its key minute sits on the cutoff.
        let edge = record(t0() + Duration::seconds(30), 1.0);
        let stored = series.append(&edge, now).unwrap();
        assert_eq!(stored, series.recent(now).len());
        assert_eq!(stored, 0);

        let inside = record(t0() + Duration::seconds(90), 2.0);
        assert_eq!(series.append(&inside, now).unwrap(), 1);
        assert_eq!(series.recent(now).len(), 1);
        assert_eq!(series.recent(now)[0].stamp.second(), 0);
    }

    fn sample(at: DateTime<Utc>, temp: f64) -> CustomSample {
        CustomSample {
            timestamp: at,
            values: vec![(Metric::Temperature, temp), (Metric::WindGust, 18.0)],
        }
    }

    #[test]
    fn test_metric_series_fixed_order_and_sorted_points() {
        // ---
        let dir = TempDir::new().unwrap();
        let store = MetricSeriesStore::new(dir.path().join("custom.json"), DAY);
        let now = t0() + Duration::hours(12);

        store.append(&sample(t0() + Duration::hours(3), 3.0), now).unwrap();
        let series = store.append(&sample(t0() + Duration::hours(1), 1.0), now).unwrap();

        let ids: Vec<&str> = series.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["temperature", "pressure", "rain", "wind_gust", "wind_degree", "solarradiation"]
        );
        assert!(series.iter().enumerate().all(|(i, s)| s.index == i));

        let temps = &series[0].data;
        assert_eq!(temps.len(), 2);
        assert!(temps[0].0 < temps[1].0);
        assert_eq!(temps[0].1, 1.0);
        assert!(series[1].data.is_empty());
        assert_eq!(series[3].data.len(), 2);
    }

    #[test]
    fn test_metric_series_prunes_history() {
        // ---
        let dir = TempDir::new().unwrap();
        let store = MetricSeriesStore::new(dir.path().join("custom.json"), DAY);

        store.append(&sample(t0(), 1.0), t0()).unwrap();
        let later = t0() + Duration::hours(25);
        let series = store.append(&sample(later, 2.0), later).unwrap();

        assert_eq!(series[0].data, vec![(later.timestamp_millis(), 2.0)]);
    }

    #[test]
    fn test_metric_series_drops_unknown_ids() {
        // ---
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.json");
        let now = t0();
        let doc = json!([
            {"id": "humidity", "name": "Humidity", "data": [[now.timestamp_millis(), 90.0]], "index": 9, "unit": "%"},
            {"id": "pressure", "data": [[now.timestamp_millis(), 1013]]}
        ]);
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let store = MetricSeriesStore::new(&path, DAY);
        let series = store
            .append(&CustomSample { timestamp: now, values: vec![] }, now)
            .unwrap();

        assert_eq!(series.len(), 6);
        assert_eq!(series[1].data, vec![(now.timestamp_millis(), 1013.0)]);
        assert_eq!(series[1].unit, " hPa");
    }

    #[test]
    fn test_merge_metric_series() {
        // ---
        let mk = |id: &str, data: Vec<(i64, f64)>| MetricSeries {
            id: id.into(),
            name: id.into(),
            data,
            index: 0,
            unit: String::new(),
        };
        let a = vec![mk("temperature", vec![(3, 3.0), (1, 1.0)]), mk("pressure", vec![])];
        let b = vec![mk("temperature", vec![(2, 2.0)]), mk("rain", vec![(5, 0.1)])];

        let merged = merge_metric_series(a, b);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].data, vec![(1, 1.0), (2, 2.0), (3, 3.0)]);
    }
}
