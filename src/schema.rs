//! Database schema for the observation stores.
//!
//! Both stores carry the same column set, one row per reading, keyed by a
//! unique timestamp. Each store generates its own identity; the two identity
//! spaces are unrelated.

use sqlx::{PgPool, SqlitePool};

/// Observation table name, identical in both stores.
pub const TABLE: &str = "weather_observations";

/// Scratch table used while resequencing identities.
pub const RESEQUENCE_TABLE: &str = "weather_observations_resequence";

/// Every column except the identity, in insert order.
pub const COLUMNS: &str = "timestamp, temp, temp_in, humidity, humidity_in, \
    pressure_abs, pressure_rel, rain_rate, rain_event, rain_hourly, rain_daily, \
    rain_weekly, rain_monthly, rain_yearly, wind_degree, wind_gust, \
    wind_gust_maxdaily, wind_speed, solarradiation, uv";

/// Number of columns in [`COLUMNS`].
pub const COLUMN_COUNT: usize = 20;

// ---

/// Create the local (SQLite) schema. Safe to call on every startup.
pub async fn create_sqlite_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;

    // Timestamps are stored as `YYYY-MM-DD HH:MM:SS` UTC text, which sorts
    // chronologically.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather_observations (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp          TEXT    NOT NULL UNIQUE,
            temp               REAL,
            temp_in            REAL,
            humidity           INTEGER,
            humidity_in        INTEGER,
            pressure_abs       REAL,
            pressure_rel       REAL,
            rain_rate          REAL,
            rain_event         REAL,
            rain_hourly        REAL,
            rain_daily         REAL,
            rain_weekly        REAL,
            rain_monthly       REAL,
            rain_yearly        REAL,
            wind_degree        REAL,
            wind_gust          REAL,
            wind_gust_maxdaily REAL,
            wind_speed         REAL,
            solarradiation     REAL,
            uv                 INTEGER
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Create the remote (PostgreSQL) schema. Safe to call repeatedly.
pub async fn create_postgres_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather_observations (
            id                 BIGSERIAL PRIMARY KEY,
            timestamp          TIMESTAMPTZ NOT NULL UNIQUE,
            temp               DOUBLE PRECISION,
            temp_in            DOUBLE PRECISION,
            humidity           BIGINT,
            humidity_in        BIGINT,
            pressure_abs       DOUBLE PRECISION,
            pressure_rel       DOUBLE PRECISION,
            rain_rate          DOUBLE PRECISION,
            rain_event         DOUBLE PRECISION,
            rain_hourly        DOUBLE PRECISION,
            rain_daily         DOUBLE PRECISION,
            rain_weekly        DOUBLE PRECISION,
            rain_monthly       DOUBLE PRECISION,
            rain_yearly        DOUBLE PRECISION,
            wind_degree        DOUBLE PRECISION,
            wind_gust          DOUBLE PRECISION,
            wind_gust_maxdaily DOUBLE PRECISION,
            wind_speed         DOUBLE PRECISION,
            solarradiation     DOUBLE PRECISION,
            uv                 BIGINT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// `$1, $2, ..` or `?, ?, ..` placeholder list for [`COLUMNS`].
pub fn placeholders(numbered: bool) -> String {
    (1..=COLUMN_COUNT)
        .map(|i| if numbered { format!("${i}") } else { "?".to_string() })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_column_count_matches() {
        assert_eq!(COLUMNS.split(',').count(), COLUMN_COUNT);
    }

    #[test]
    fn test_placeholders() {
        // ---
        let numbered = placeholders(true);
        assert!(numbered.starts_with("$1, $2"));
        assert!(numbered.ends_with("$20"));
        assert_eq!(placeholders(false).matches('?').count(), COLUMN_COUNT);
    }
}
