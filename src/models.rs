//! Data models for the station pipeline.
//!
//! One inbound payload is normalized into an [`Observation`], which bundles the
//! independent projections every sink consumes. None of them share mutable
//! state and none are updated after construction.

use std::collections::HashMap;
use std::fmt::Display;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---

/// Flat key/value form body as posted by the station.
pub type RawPayload = HashMap<String, String>;

/// Canonical metric-unit reading, written to both database sinks.
///
/// Instantaneous readings are `None` when the station did not report them.
/// Rain totals default to `0.0` when absent and are `None` only when the
/// station sent something that is not a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NormalizedReading {
    // ---
    pub timestamp: DateTime<Utc>,
    pub temp: Option<f64>,
    pub temp_in: Option<f64>,
    pub humidity: Option<i64>,
    pub humidity_in: Option<i64>,
    pub pressure_abs: Option<f64>,
    pub pressure_rel: Option<f64>,
    pub rain_rate: Option<f64>,
    pub rain_event: Option<f64>,
    pub rain_hourly: Option<f64>,
    pub rain_daily: Option<f64>,
    pub rain_weekly: Option<f64>,
    pub rain_monthly: Option<f64>,
    pub rain_yearly: Option<f64>,
    pub wind_degree: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_gust_maxdaily: Option<f64>,
    pub wind_speed: Option<f64>,
    pub solarradiation: Option<f64>,
    pub uv: Option<i64>,
}

/// A reading as stored, with the store's own identity.
///
/// Identities of the local and remote store are independent of each other.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredObservation {
    // ---
    pub id: i64,
    #[sqlx(flatten)]
    pub reading: NormalizedReading,
}

/// Dew point, wind chill and apparent temperature, all in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedQuantities {
    pub dew_point: Option<f64>,
    pub wind_chill: Option<f64>,
    pub feels_like: Option<f64>,
}

/// One archive line in fixed column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    // ---
    pub idx: DateTime<Utc>,
    pub delay: i64,
    pub hum_in: Option<i64>,
    pub temp_in: Option<f64>,
    pub hum_out: Option<i64>,
    pub temp_out: Option<f64>,
    pub abs_pressure: Option<f64>,
    pub wind_ave: Option<i64>,
    pub wind_gust: Option<i64>,
    pub wind_dir: Option<i64>,
    pub rain: f64,
    pub status: i64,
    pub illuminance: Option<f64>,
    pub uv: Option<i64>,
}

impl ArchiveRecord {
    /// Comma-joined line without trailing newline. Missing values are empty.
    pub fn to_line(&self) -> String {
        // ---
        fn int(v: Option<i64>) -> String {
            v.map(|v| v.to_string()).unwrap_or_default()
        }
        fn dec(v: Option<f64>) -> String {
            v.map(|v| format!("{v:.1}")).unwrap_or_default()
        }

        [
            self.idx.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.delay.to_string(),
            int(self.hum_in),
            dec(self.temp_in),
            int(self.hum_out),
            dec(self.temp_out),
            dec(self.abs_pressure),
            int(self.wind_ave),
            int(self.wind_gust),
            int(self.wind_dir),
            format!("{:.1}", self.rain),
            self.status.to_string(),
            dec(self.illuminance),
            int(self.uv),
        ]
        .join(",")
    }
}

/// Display-oriented record keyed by its local wall-clock minute.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRecord {
    pub stamp: DateTime<FixedOffset>,
    pub values: Map<String, Value>,
}

/// Metrics tracked in the indexed 24h series. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Temperature,
    Pressure,
    Rain,
    WindGust,
    WindDegree,
    SolarRadiation,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Temperature,
        Metric::Pressure,
        Metric::Rain,
        Metric::WindGust,
        Metric::WindDegree,
        Metric::SolarRadiation,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Pressure => "pressure",
            Metric::Rain => "rain",
            Metric::WindGust => "wind_gust",
            Metric::WindDegree => "wind_degree",
            Metric::SolarRadiation => "solarradiation",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::Pressure => "Air pressure",
            Metric::Rain => "Precipitation",
            Metric::WindGust => "Wind gust",
            Metric::WindDegree => "Wind direction",
            Metric::SolarRadiation => "Solar radiation",
        }
    }

    /// Chart suffix; the leading space is part of the unit.
    pub fn unit(self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Pressure => " hPa",
            Metric::Rain => " mm",
            Metric::WindGust => " km/h",
            Metric::WindDegree => "°",
            Metric::SolarRadiation => " W/m²",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_id(id: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.id() == id)
    }
}

/// The tracked metrics of one reading. Metrics the station did not report are
/// absent, never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSample {
    pub timestamp: DateTime<Utc>,
    pub values: Vec<(Metric, f64)>,
}

impl CustomSample {
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, v)| *v)
    }
}

/// Current conditions for the live snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSnapshot {
    // ---
    pub hum_in: Option<i64>,
    pub temp_in: Option<f64>,
    pub hum_out: Option<i64>,
    pub temp_out: Option<f64>,
    pub abs_pressure: Option<f64>,
    pub wind_ave: Option<i64>,
    pub wind_gust: Option<i64>,
    pub wind_dir: Option<&'static str>,
    pub rain: f64,
}

impl LiveSnapshot {
    /// Element name / text pairs in document order.
    pub fn elements(&self) -> Vec<(&'static str, String)> {
        // ---
        fn text<T: Display>(v: Option<T>) -> String {
            v.map(|v| v.to_string()).unwrap_or_default()
        }

        vec![
            ("hum_in", text(self.hum_in)),
            ("temp_in", text(self.temp_in)),
            ("hum_out", text(self.hum_out)),
            ("temp_out", text(self.temp_out)),
            ("abs_pressure", text(self.abs_pressure)),
            ("wind_ave", text(self.wind_ave)),
            ("wind_gust", text(self.wind_gust)),
            ("wind_dir", text(self.wind_dir)),
            ("rain", self.rain.to_string()),
        ]
    }
}

/// Everything derived from one inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub reading: NormalizedReading,
    pub derived: DerivedQuantities,
    pub archive: ArchiveRecord,
    pub display: DisplayRecord,
    pub custom: CustomSample,
    pub live: LiveSnapshot,
}
