//! Turns a raw station payload into the projections consumed by the sinks.
//!
//! The payload is the flat form body the station posts (imperial units, all
//! values as strings). Normalization is a pure transformation: it either
//! yields a complete [`Observation`] or fails without producing anything.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::convert::{
    degrees_to_direction, dew_point, f_to_c, feels_like, inches_to_mm, inhg_to_hpa, mph_to_kph,
    round0, round1, wind_chill,
};
use crate::error::NormalizeError;
use crate::models::{
    ArchiveRecord, CustomSample, DerivedQuantities, DisplayRecord, LiveSnapshot, Metric,
    NormalizedReading, Observation, RawPayload,
};

/// Format of the station's `dateutc` field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Keys accepted for the reading timestamp, in order of preference.
const TIMESTAMP_KEYS: [&str; 2] = ["dateutc", "timestamp"];

const INTERVAL_KEY: &str = "interval";

// ---

/// Field-mapping table used for the display projection.
///
/// Older station firmware and dashboards expect the legacy table; it lacks
/// solar radiation and charts the daily rain total instead of the rain rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldLayout {
    #[default]
    Current,
    Legacy,
}

impl FromStr for FieldLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "current" => Ok(FieldLayout::Current),
            "legacy" => Ok(FieldLayout::Legacy),
            other => Err(format!("unknown field layout `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DisplayField {
    AbsPressure,
    DewPoint,
    RainRate,
    RainDaily,
    FeelsLike,
    HumidityIn,
    HumidityOut,
    SolarRadiation,
    TempIn,
    TempOut,
    WindDirection,
    WindChill,
    WindGust,
    WindAvg,
}

impl DisplayField {
    fn key(self) -> &'static str {
        match self {
            DisplayField::AbsPressure => "AbsPressure",
            DisplayField::DewPoint => "DewPoint",
            DisplayField::RainRate | DisplayField::RainDaily => "Rain",
            DisplayField::FeelsLike => "FeelsLike",
            DisplayField::HumidityIn => "HumidityIn",
            DisplayField::HumidityOut => "HumidityOut",
            DisplayField::SolarRadiation => "SolarRadiation",
            DisplayField::TempIn => "TempIn",
            DisplayField::TempOut => "TempOut",
            DisplayField::WindDirection => "WindDirection",
            DisplayField::WindChill => "WindChill",
            DisplayField::WindGust => "WindGust",
            DisplayField::WindAvg => "WindAvg",
        }
    }
}

const CURRENT_LAYOUT: &[DisplayField] = &[
    DisplayField::AbsPressure,
    DisplayField::DewPoint,
    DisplayField::RainRate,
    DisplayField::FeelsLike,
    DisplayField::HumidityIn,
    DisplayField::HumidityOut,
    DisplayField::SolarRadiation,
    DisplayField::TempIn,
    DisplayField::TempOut,
    DisplayField::WindDirection,
    DisplayField::WindChill,
    DisplayField::WindGust,
    DisplayField::WindAvg,
];

const LEGACY_LAYOUT: &[DisplayField] = &[
    DisplayField::AbsPressure,
    DisplayField::DewPoint,
    DisplayField::RainDaily,
    DisplayField::FeelsLike,
    DisplayField::HumidityIn,
    DisplayField::HumidityOut,
    DisplayField::TempIn,
    DisplayField::TempOut,
    DisplayField::WindDirection,
    DisplayField::WindChill,
    DisplayField::WindGust,
    DisplayField::WindAvg,
];

impl FieldLayout {
    fn fields(self) -> &'static [DisplayField] {
        match self {
            FieldLayout::Current => CURRENT_LAYOUT,
            FieldLayout::Legacy => LEGACY_LAYOUT,
        }
    }
}

/// Stateless payload normalizer.
#[derive(Debug, Clone)]
pub struct Normalizer {
    layout: FieldLayout,
    display_offset: FixedOffset,
}

impl Normalizer {
    pub fn new(layout: FieldLayout, display_offset: FixedOffset) -> Self {
        Self {
            layout,
            display_offset,
        }
    }

    /// Normalize one payload into all projections.
    ///
    /// Fails with [`NormalizeError`] when the timestamp or interval is missing
    /// or malformed. Any other non-numeric field is logged and treated as not
    /// reported.
    pub fn normalize(&self, payload: &RawPayload) -> Result<Observation, NormalizeError> {
        // ---
        let fields = Fields(payload);
        let timestamp = fields.timestamp()?;
        let interval = fields.interval()?;

        let reading = NormalizedReading {
            timestamp,
            temp: fields.number("tempf").map(f_to_c).map(round1),
            temp_in: fields.number("tempinf").map(f_to_c).map(round1),
            humidity: fields.number("humidity").map(round0),
            humidity_in: fields.number("humidityin").map(round0),
            pressure_abs: fields.number("baromabsin").map(inhg_to_hpa).map(round1),
            pressure_rel: fields.number("baromrelin").map(inhg_to_hpa).map(round1),
            rain_rate: fields.rain_total("rainratein"),
            rain_event: fields.rain_total("eventrainin"),
            rain_hourly: fields.rain_total("hourlyrainin"),
            rain_daily: fields.rain_total("dailyrainin"),
            rain_weekly: fields.rain_total("weeklyrainin"),
            rain_monthly: fields.rain_total("monthlyrainin"),
            rain_yearly: fields.rain_total("yearlyrainin"),
            wind_degree: fields.number("winddir").map(round1),
            wind_gust: fields.speed("windgustmph").map(|v| v as f64),
            wind_gust_maxdaily: fields.speed("maxdailygust").map(|v| v as f64),
            wind_speed: fields.speed("windspeedmph").map(|v| v as f64),
            solarradiation: fields.number("solarradiation").map(round1),
            uv: fields.number("uv").map(round0),
        };

        let derived = derive_quantities(&reading);
        let display = self.display(&fields, &reading, &derived);

        let archive = ArchiveRecord {
            idx: timestamp,
            delay: interval / 60,
            hum_in: reading.humidity_in,
            temp_in: reading.temp_in,
            hum_out: reading.humidity,
            temp_out: reading.temp,
            abs_pressure: reading.pressure_abs,
            wind_ave: fields.speed("windspeedmph"),
            wind_gust: fields.speed("windgustmph"),
            wind_dir: fields.number("winddir").map(round0),
            rain: reading.rain_daily.unwrap_or(0.0),
            status: 0,
            illuminance: reading.solarradiation,
            uv: reading.uv,
        };

        let custom = CustomSample {
            timestamp,
            values: [
                (Metric::Temperature, reading.temp),
                (Metric::Pressure, reading.pressure_abs),
                (
                    Metric::Rain,
                    fields.number("dailyrainin").map(inches_to_mm).map(round1),
                ),
                (Metric::WindGust, reading.wind_gust),
                (Metric::WindDegree, reading.wind_degree),
                (Metric::SolarRadiation, reading.solarradiation),
            ]
            .into_iter()
            .filter_map(|(metric, value)| value.map(|v| (metric, v)))
            .collect(),
        };

        let live = LiveSnapshot {
            hum_in: reading.humidity_in,
            temp_in: reading.temp_in,
            hum_out: reading.humidity,
            temp_out: reading.temp,
            abs_pressure: reading.pressure_abs,
            wind_ave: fields.speed("windspeedmph"),
            wind_gust: fields.speed("windgustmph"),
            wind_dir: reading.wind_degree.map(degrees_to_direction),
            rain: reading.rain_daily.unwrap_or(0.0),
        };

        Ok(Observation {
            reading,
            derived,
            archive,
            display,
            custom,
            live,
        })
    }

    fn display(
        &self,
        fields: &Fields<'_>,
        reading: &NormalizedReading,
        derived: &DerivedQuantities,
    ) -> DisplayRecord {
        // ---
        let whole = |v: Option<f64>| v.map(round0);
        let mut values = Map::new();

        for field in self.layout.fields() {
            let value = match field {
                DisplayField::AbsPressure => json!(reading.pressure_abs),
                DisplayField::DewPoint => json!(whole(derived.dew_point)),
                DisplayField::RainRate => {
                    json!(fields.number("rainratein").map(inches_to_mm).map(round1))
                }
                DisplayField::RainDaily => {
                    json!(fields.number("dailyrainin").map(inches_to_mm).map(round1))
                }
                DisplayField::FeelsLike => json!(whole(derived.feels_like)),
                DisplayField::HumidityIn => json!(reading.humidity_in),
                DisplayField::HumidityOut => json!(reading.humidity),
                DisplayField::SolarRadiation => json!(reading.solarradiation),
                DisplayField::TempIn => json!(reading.temp_in),
                DisplayField::TempOut => json!(reading.temp),
                DisplayField::WindDirection => {
                    json!(reading.wind_degree.map(degrees_to_direction))
                }
                DisplayField::WindChill => json!(whole(derived.wind_chill)),
                DisplayField::WindGust => json!(fields.speed("windgustmph")),
                DisplayField::WindAvg => json!(fields.speed("windspeedmph")),
            };
            values.insert(field.key().to_string(), value);
        }

        DisplayRecord {
            stamp: reading.timestamp.with_timezone(&self.display_offset),
            values,
        }
    }
}

/// Dew point, wind chill and feels-like from the already converted reading.
///
/// Wind speed enters as the stored whole km/h value, so a stored row always
/// reproduces the derived values shown for it.
pub fn derive_quantities(reading: &NormalizedReading) -> DerivedQuantities {
    // ---
    let temp = reading.temp;
    let humidity = reading.humidity.filter(|h| *h > 0).map(|h| h as f64);
    let wind = reading.wind_speed;

    DerivedQuantities {
        dew_point: temp.zip(humidity).map(|(t, h)| round1(dew_point(t, h))),
        wind_chill: temp
            .zip(wind)
            .and_then(|(t, v)| wind_chill(t, v))
            .map(round1),
        feels_like: match (temp, humidity, wind) {
            (Some(t), Some(h), Some(v)) => Some(round1(feels_like(t, h, v))),
            _ => None,
        },
    }
}

/// Typed accessors over the raw payload.
struct Fields<'a>(&'a RawPayload);

impl Fields<'_> {
    fn raw(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim())
    }

    fn timestamp(&self) -> Result<DateTime<Utc>, NormalizeError> {
        // ---
        let value = TIMESTAMP_KEYS
            .iter()
            .find_map(|key| self.raw(key))
            .ok_or(NormalizeError::MissingField("dateutc"))?;

        NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|source| NormalizeError::Format {
                value: value.to_string(),
                source,
            })
    }

    fn interval(&self) -> Result<i64, NormalizeError> {
        // ---
        let value = self
            .raw(INTERVAL_KEY)
            .ok_or(NormalizeError::MissingField(INTERVAL_KEY))?;

        value
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs >= 0)
            .ok_or_else(|| NormalizeError::Conversion {
                field: INTERVAL_KEY,
                value: value.to_string(),
            })
    }

    /// Instantaneous reading: `None` when absent or not a finite number.
    fn number(&self, key: &str) -> Option<f64> {
        // ---
        let value = self.raw(key)?;
        match value.parse::<f64>() {
            Ok(number) if number.is_finite() => Some(number),
            _ => {
                warn!(field = key, value, "ignoring non-numeric field");
                None
            }
        }
    }

    /// Rain counter in mm: `0.0` when absent, `None` when malformed.
    fn rain_total(&self, key: &str) -> Option<f64> {
        if self.raw(key).is_none() {
            return Some(0.0);
        }
        self.number(key).map(inches_to_mm).map(round1)
    }

    /// Wind speed in whole km/h.
    fn speed(&self, key: &str) -> Option<i64> {
        self.number(key).map(mph_to_kph).map(round0)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn normalizer() -> Normalizer {
        Normalizer::new(
            FieldLayout::Current,
            FixedOffset::east_opt(3600).unwrap(),
        )
    }

    fn payload(pairs: &[(&str, &str)]) -> RawPayload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn christmas_eve() -> RawPayload {
        // ---
        payload(&[
            ("dateutc", "2024-12-24 14:01:20"),
            ("interval", "60"),
            ("tempf", "43.5"),
            ("humidity", "97"),
            ("windspeedmph", "4.70"),
            ("baromabsin", "30.233"),
            ("winddir", "227"),
            ("solarradiation", "23.06"),
            ("uv", "0"),
        ])
    }

    #[test]
    fn test_reference_payload() {
        // ---
        let obs = normalizer().normalize(&christmas_eve()).unwrap();
        let r = &obs.reading;

        assert_eq!(
            r.timestamp,
            Utc.with_ymd_and_hms(2024, 12, 24, 14, 1, 20).unwrap()
        );
        assert_eq!(r.temp, Some(6.4));
        assert_eq!(r.humidity, Some(97));
        assert_eq!(r.wind_speed, Some(8.0));
        assert_eq!(r.pressure_abs, Some(1023.8));
        assert_eq!(r.wind_degree, Some(227.0));
        assert_eq!(r.solarradiation, Some(23.1));
        assert_eq!(r.uv, Some(0));
        assert_eq!(obs.display.values["WindDirection"], json!("SW"));
        assert_eq!(obs.live.wind_dir, Some("SW"));

        assert_eq!(obs.derived.dew_point, Some(6.0));
        assert_eq!(obs.derived.wind_chill, Some(4.8));
        assert_eq!(obs.derived.feels_like, Some(4.8));
        assert_eq!(obs.display.values["DewPoint"], json!(6));
        assert_eq!(obs.display.values["WindChill"], json!(5));
    }

    #[test]
    fn test_absent_fields_are_null_not_zero() {
        // ---
        let obs = normalizer().normalize(&christmas_eve()).unwrap();
        let r = &obs.reading;

        assert_eq!(r.temp_in, None);
        assert_eq!(r.humidity_in, None);
        assert_eq!(r.pressure_rel, None);
        assert_eq!(r.wind_gust, None);
        assert_eq!(r.wind_gust_maxdaily, None);
        assert_eq!(obs.display.values["TempIn"], Value::Null);
        assert_eq!(obs.display.values["Rain"], Value::Null);

        // Rain counters carry a documented zero default.
        assert_eq!(r.rain_rate, Some(0.0));
        assert_eq!(r.rain_daily, Some(0.0));
        assert_eq!(r.rain_yearly, Some(0.0));
        assert_eq!(obs.archive.rain, 0.0);
    }

    #[test]
    fn test_custom_projection_omits_absent_metrics() {
        // ---
        let obs = normalizer().normalize(&christmas_eve()).unwrap();
        let metrics: Vec<Metric> = obs.custom.values.iter().map(|(m, _)| *m).collect();

        assert_eq!(
            metrics,
            vec![
                Metric::Temperature,
                Metric::Pressure,
                Metric::WindDegree,
                Metric::SolarRadiation
            ]
        );
        assert_eq!(obs.custom.get(Metric::Temperature), Some(6.4));
        assert_eq!(obs.custom.get(Metric::Rain), None);
        assert_eq!(obs.custom.timestamp_ms(), 1_735_048_880_000);
    }

    #[test]
    fn test_archive_projection() {
        // ---
        let obs = normalizer().normalize(&christmas_eve()).unwrap();
        assert_eq!(
            obs.archive.to_line(),
            "2024-12-24 14:01:20,1,,,97,6.4,1023.8,8,,227,0.0,0,23.1,0"
        );
    }

    #[test]
    fn test_display_stamp_uses_display_offset() {
        // ---
        let obs = normalizer().normalize(&christmas_eve()).unwrap();
        assert_eq!(obs.display.stamp.hour(), 15);
        assert_eq!(obs.display.stamp.minute(), 1);
    }

    #[test]
    fn test_display_layouts() {
        // ---
        let mut raw = christmas_eve();
        raw.insert("dailyrainin".into(), "0.028".into());
        raw.insert("rainratein".into(), "0.000".into());

        let current = normalizer().normalize(&raw).unwrap();
        let keys: Vec<&str> = current.display.values.keys().map(String::as_str).collect();
        assert_eq!(keys[0], "AbsPressure");
        assert_eq!(keys.len(), 13);
        assert_eq!(current.display.values["Rain"], json!(0.0));

        let legacy = Normalizer::new(FieldLayout::Legacy, FixedOffset::east_opt(0).unwrap())
            .normalize(&raw)
            .unwrap();
        assert_eq!(legacy.display.values.len(), 12);
        assert!(!legacy.display.values.contains_key("SolarRadiation"));
        assert_eq!(legacy.display.values["Rain"], json!(0.7));
    }

    #[test]
    fn test_missing_timestamp_is_fatal() {
        // ---
        let mut raw = christmas_eve();
        raw.remove("dateutc");
        let err = normalizer().normalize(&raw).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingField(_)));
    }

    #[test]
    fn test_missing_interval_is_fatal() {
        // ---
        let mut raw = christmas_eve();
        raw.remove("interval");
        let err = normalizer().normalize(&raw).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingField("interval")));
    }

    #[test]
    fn test_malformed_timestamp_is_format_error() {
        // ---
        let mut raw = christmas_eve();
        raw.insert("dateutc".into(), "24/12/2024 14:01".into());
        let err = normalizer().normalize(&raw).unwrap_err();
        assert!(matches!(err, NormalizeError::Format { .. }));
    }

    #[test]
    fn test_timestamp_key_fallback() {
        // ---
        let mut raw = christmas_eve();
        let value = raw.remove("dateutc").unwrap();
        raw.insert("timestamp".into(), value);
        assert!(normalizer().normalize(&raw).is_ok());
    }

    #[test]
    fn test_non_numeric_field_resolves_to_null() {
        // ---
        let mut raw = christmas_eve();
        raw.insert("tempf".into(), "n/a".into());
        raw.insert("dailyrainin".into(), "--".into());
        raw.insert("uv".into(), "NaN".into());

        let obs = normalizer().normalize(&raw).unwrap();
        assert_eq!(obs.reading.temp, None);
        assert_eq!(obs.reading.rain_daily, None);
        assert_eq!(obs.reading.uv, None);
        assert_eq!(obs.derived.dew_point, None);
        assert_eq!(obs.derived.wind_chill, None);
        assert_eq!(obs.custom.get(Metric::Temperature), None);
    }

    #[test]
    fn test_non_numeric_interval_is_conversion_error() {
        // ---
        let mut raw = christmas_eve();
        raw.insert("interval".into(), "sixty".into());
        let err = normalizer().normalize(&raw).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::Conversion {
                field: "interval",
                ..
            }
        ));
    }

    #[test]
    fn test_warm_reading_has_no_wind_chill() {
        // ---
        let mut raw = christmas_eve();
        raw.insert("tempf".into(), "68.0".into());
        raw.insert("windspeedmph".into(), "20".into());

        let obs = normalizer().normalize(&raw).unwrap();
        assert_eq!(obs.reading.temp, Some(20.0));
        assert_eq!(obs.derived.wind_chill, None);
        assert_eq!(obs.derived.feels_like, Some(20.0));
        assert_eq!(obs.display.values["WindChill"], Value::Null);
    }

    #[test]
    fn test_derived_quantities_use_stored_wind_speed() {
        // ---
        let obs = normalizer().normalize(&christmas_eve()).unwrap();
        assert_eq!(derive_quantities(&obs.reading), obs.derived);

        // 4.70 mph is 7.56 km/h before rounding; that speed would give 4.9.
        assert_eq!(wind_chill(6.4, mph_to_kph(4.70)).map(round1), Some(4.9));
        assert_eq!(obs.derived.wind_chill, Some(4.8));
    }
}
