//! Unit conversions and derived meteorological quantities.
//!
//! Everything in here is pure and total on its numeric domain. Rounding is left
//! to the caller (see [`round1`] / [`round0`]) so conversions can be chained
//! without accumulating rounding error.

/// hPa per inch of mercury.
const HPA_PER_INHG: f64 = 33.8639;

/// km/h per statute mile per hour.
const KPH_PER_MPH: f64 = 1.609344;

/// Millimetres per inch.
const MM_PER_INCH: f64 = 25.4;

/// Wind chill is only defined at or below this temperature (°C).
pub const WIND_CHILL_MAX_TEMP_C: f64 = 10.0;

/// Wind chill is only defined above this wind speed (km/h).
pub const WIND_CHILL_MIN_SPEED_KPH: f64 = 4.8;

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

// ---

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to the nearest integer, half away from zero.
pub fn round0(value: f64) -> i64 {
    value.round() as i64
}

pub fn inhg_to_hpa(inhg: f64) -> f64 {
    inhg * HPA_PER_INHG
}

pub fn f_to_c(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) / 1.8
}

pub fn c_to_f(celsius: f64) -> f64 {
    celsius * 1.8 + 32.0
}

pub fn mph_to_kph(mph: f64) -> f64 {
    mph * KPH_PER_MPH
}

pub fn inches_to_mm(inches: f64) -> f64 {
    inches * MM_PER_INCH
}

/// Map compass degrees onto a 16-point direction name.
///
/// Buckets are 22.5° wide and centred on the named direction, so `N` covers
/// `[348.75, 11.25)`. A value sitting exactly on an edge falls into the bucket
/// that the edge opens. Negative and >360 inputs wrap.
pub fn degrees_to_direction(degrees: f64) -> &'static str {
    // ---
    let normalized = degrees.rem_euclid(360.0);
    let index = ((normalized + 11.25) / 22.5).floor() as usize % COMPASS_POINTS.len();
    COMPASS_POINTS[index]
}

/// Dew point in °C from temperature (°C) and relative humidity (%).
///
/// Magnus approximation with a = 17.27, b = 237.7 °C. Humidity of zero has no
/// dew point; the caller is expected to treat it as missing.
pub fn dew_point(temp_c: f64, humidity: f64) -> f64 {
    // ---
    let a = 17.27;
    let b = 237.7;
    let gamma = (a * temp_c) / (b + temp_c) + (humidity / 100.0).ln();
    (b * gamma) / (a - gamma)
}

/// Wind chill in °C (Environment Canada / NWS 2001 formula).
///
/// Returns `None` outside the formula's domain: temperature above 10 °C or
/// wind speed at or below 4.8 km/h.
pub fn wind_chill(temp_c: f64, wind_kph: f64) -> Option<f64> {
    // ---
    if temp_c > WIND_CHILL_MAX_TEMP_C || wind_kph <= WIND_CHILL_MIN_SPEED_KPH {
        return None;
    }
    let v = wind_kph.powf(0.16);
    Some(13.12 + 0.6215 * temp_c - 11.37 * v + 0.3965 * temp_c * v)
}

/// Rothfusz heat index in °C.
///
/// Only meaningful for warm, humid air; see [`feels_like`] for the domain gate.
pub fn heat_index(temp_c: f64, humidity: f64) -> f64 {
    // ---
    let t = c_to_f(temp_c);
    let rh = humidity;
    let hi = -42.379 + 2.049_015_23 * t + 10.143_331_27 * rh
        - 0.224_755_41 * t * rh
        - 0.006_837_83 * t * t
        - 0.054_817_17 * rh * rh
        + 0.001_228_74 * t * t * rh
        + 0.000_852_82 * t * rh * rh
        - 0.000_001_99 * t * t * rh * rh;
    f_to_c(hi)
}

/// Apparent ("feels like") temperature in °C.
///
/// Wind chill when it is defined, heat index at or above 26.7 °C with at least
/// 40 % humidity, the air temperature otherwise.
pub fn feels_like(temp_c: f64, humidity: f64, wind_kph: f64) -> f64 {
    // ---
    if let Some(chill) = wind_chill(temp_c, wind_kph) {
        return chill;
    }
    if temp_c >= 26.7 && humidity >= 40.0 {
        return heat_index(temp_c, humidity);
    }
    temp_c
}
