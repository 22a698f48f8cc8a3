//! SQLite-backed observation store.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;

use super::ObservationStore;
use crate::models::{NormalizedReading, StoredObservation};
use crate::schema::{self, COLUMNS, RESEQUENCE_TABLE, TABLE};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self, sqlx::Error> {
        // ---
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        Self::with_options(options, max_connections).await
    }

    async fn with_options(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }
}

fn bind_reading<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    r: &NormalizedReading,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    // ---
    query
        .bind(r.timestamp.format(TIMESTAMP_FORMAT).to_string())
        .bind(r.temp)
        .bind(r.temp_in)
        .bind(r.humidity)
        .bind(r.humidity_in)
        .bind(r.pressure_abs)
        .bind(r.pressure_rel)
        .bind(r.rain_rate)
        .bind(r.rain_event)
        .bind(r.rain_hourly)
        .bind(r.rain_daily)
        .bind(r.rain_weekly)
        .bind(r.rain_monthly)
        .bind(r.rain_yearly)
        .bind(r.wind_degree)
        .bind(r.wind_gust)
        .bind(r.wind_gust_maxdaily)
        .bind(r.wind_speed)
        .bind(r.solarradiation)
        .bind(r.uv)
}

fn insert_sql() -> String {
    format!(
        "INSERT OR IGNORE INTO {TABLE} ({COLUMNS}) VALUES ({})",
        schema::placeholders(false)
    )
}

/// Stored timestamps are UTC; older rows may carry an RFC 3339 suffix.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

fn decode_row(row: &SqliteRow) -> Result<StoredObservation, sqlx::Error> {
    // ---
    let raw: String = row.try_get("timestamp")?;
    let timestamp = parse_timestamp(&raw).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "timestamp".into(),
        source: format!("unrecognized timestamp `{raw}`").into(),
    })?;

    Ok(StoredObservation {
        id: row.try_get("id")?,
        reading: NormalizedReading {
            timestamp,
            temp: row.try_get("temp")?,
            temp_in: row.try_get("temp_in")?,
            humidity: row.try_get("humidity")?,
            humidity_in: row.try_get("humidity_in")?,
            pressure_abs: row.try_get("pressure_abs")?,
            pressure_rel: row.try_get("pressure_rel")?,
            rain_rate: row.try_get("rain_rate")?,
            rain_event: row.try_get("rain_event")?,
            rain_hourly: row.try_get("rain_hourly")?,
            rain_daily: row.try_get("rain_daily")?,
            rain_weekly: row.try_get("rain_weekly")?,
            rain_monthly: row.try_get("rain_monthly")?,
            rain_yearly: row.try_get("rain_yearly")?,
            wind_degree: row.try_get("wind_degree")?,
            wind_gust: row.try_get("wind_gust")?,
            wind_gust_maxdaily: row.try_get("wind_gust_maxdaily")?,
            wind_speed: row.try_get("wind_speed")?,
            solarradiation: row.try_get("solarradiation")?,
            uv: row.try_get("uv")?,
        },
    })
}

impl ObservationStore for SqliteStore {
    const KIND: &'static str = "sqlite";

    async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        Self::with_options(options, max_connections).await
    }

    async fn create_schema(&self) -> Result<(), sqlx::Error> {
        schema::create_sqlite_schema(&self.pool).await
    }

    async fn schema_exists(&self) -> Result<bool, sqlx::Error> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(TABLE)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn insert(&self, reading: &NormalizedReading) -> Result<bool, sqlx::Error> {
        let sql = insert_sql();
        let result = bind_reading(sqlx::query(&sql), reading)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_batch(&self, readings: &[NormalizedReading]) -> Result<u64, sqlx::Error> {
        // ---
        let sql = insert_sql();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for reading in readings {
            inserted += bind_reading(sqlx::query(&sql), reading)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn fetch_all(&self) -> Result<Vec<StoredObservation>, sqlx::Error> {
        let sql = format!("SELECT id, {COLUMNS} FROM {TABLE} ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn resequence(&self) -> Result<(), sqlx::Error> {
        // ---
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {RESEQUENCE_TABLE}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE {RESEQUENCE_TABLE} AS SELECT * FROM {TABLE} ORDER BY timestamp"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM {TABLE}"))
            .execute(&mut *tx)
            .await?;

        // Only AUTOINCREMENT tables have a counter to reset.
        let has_sequence: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
        )
        .fetch_optional(&mut *tx)
        .await?;
        if has_sequence.is_some() {
            sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
                .bind(TABLE)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(&format!(
            "INSERT INTO {TABLE} ({COLUMNS}) \
             SELECT {COLUMNS} FROM {RESEQUENCE_TABLE} ORDER BY timestamp"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DROP TABLE {RESEQUENCE_TABLE}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    async fn close(&self) {
        self.pool.close().await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn reading_at(at: DateTime<Utc>) -> NormalizedReading {
        // ---
        NormalizedReading {
            timestamp: at,
            temp: Some(6.4),
            temp_in: None,
            humidity: Some(97),
            humidity_in: None,
            pressure_abs: Some(1023.8),
            pressure_rel: None,
            rain_rate: Some(0.0),
            rain_event: Some(7.6),
            rain_hourly: Some(0.2),
            rain_daily: Some(0.7),
            rain_weekly: Some(13.7),
            rain_monthly: Some(35.6),
            rain_yearly: Some(35.6),
            wind_degree: Some(227.0),
            wind_gust: Some(18.0),
            wind_gust_maxdaily: None,
            wind_speed: Some(8.0),
            solarradiation: Some(23.1),
            uv: Some(0),
        }
    }

    async fn open_store(dir: &TempDir) -> SqliteStore {
        let store = SqliteStore::open(&dir.path().join("weather_data.db"), 1)
            .await
            .unwrap();
        store.create_schema().await.unwrap();
        store
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 24, 14, 1, 20).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_fetch_round_trip() {
        // ---
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert!(store.insert(&reading_at(t0())).await.unwrap());
        let rows = store.fetch_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].reading, reading_at(t0()));
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_is_ignored() {
        // ---
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert!(store.insert(&reading_at(t0())).await.unwrap());
        assert!(!store.insert(&reading_at(t0())).await.unwrap());
        assert_eq!(store.fetch_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_schema_exists() {
        // ---
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("fresh.db"), 1)
            .await
            .unwrap();
        assert!(!store.schema_exists().await.unwrap());
        store.create_schema().await.unwrap();
        assert!(store.schema_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_resequence_orders_identities_by_time() {
        // ---
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let batch: Vec<NormalizedReading> = [3, 1, 4, 0, 2]
            .into_iter()
            .map(|m| reading_at(t0() + Duration::minutes(m)))
            .collect();
        assert_eq!(store.insert_batch(&batch).await.unwrap(), 5);

        store.resequence().await.unwrap();

        let rows = store.fetch_all().await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert!(rows
            .windows(2)
            .all(|w| w[0].reading.timestamp < w[1].reading.timestamp));
    }

    #[tokio::test]
    async fn test_failed_resequence_rolls_back() {
        // ---
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weather_data.db");
        let store = open_store(&dir).await;
        let batch: Vec<NormalizedReading> = [3, 1, 4, 0, 2]
            .into_iter()
            .map(|m| reading_at(t0() + Duration::minutes(m)))
            .collect();
        store.insert_batch(&batch).await.unwrap();
        let before = store.fetch_all().await.unwrap();

        // Refuse the copy back, after the table has already been emptied.
        let raw = SqlitePool::connect(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        sqlx::query(&format!(
            "CREATE TRIGGER frozen BEFORE INSERT ON {TABLE} \
             BEGIN SELECT RAISE(ABORT, 'frozen'); END"
        ))
        .execute(&raw)
        .await
        .unwrap();
        raw.close().await;

        assert!(store.resequence().await.is_err());

        let after = store.fetch_all().await.unwrap();
        assert_eq!(after, before);
        let ids: Vec<i64> = after.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(after[0].reading.timestamp, t0() + Duration::minutes(3));
    }

    #[test]
    fn test_parse_legacy_timestamps() {
        // ---
        assert_eq!(parse_timestamp("2024-12-24 14:01:20"), Some(t0()));
        assert_eq!(parse_timestamp("2024-12-24T14:01:20+00:00"), Some(t0()));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
