//! PostgreSQL-backed observation store, the primary sink.

use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, Postgres};
use sqlx::query::Query;

use super::ObservationStore;
use crate::models::{NormalizedReading, StoredObservation};
use crate::schema::{self, COLUMNS, RESEQUENCE_TABLE, TABLE};

// ---

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn bind_reading<'q>(
    query: Query<'q, Postgres, PgArguments>,
    r: &NormalizedReading,
) -> Query<'q, Postgres, PgArguments> {
    // ---
    query
        .bind(r.timestamp)
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
        "INSERT INTO {TABLE} ({COLUMNS}) VALUES ({}) ON CONFLICT (timestamp) DO NOTHING",
        schema::placeholders(true)
    )
}

impl ObservationStore for PgStore {
    const KIND: &'static str = "postgres";

    async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    async fn create_schema(&self) -> Result<(), sqlx::Error> {
        schema::create_postgres_schema(&self.pool).await
    }

    async fn schema_exists(&self) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(TABLE)
        .fetch_one(&self.pool)
        .await
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
        sqlx::query_as::<_, StoredObservation>(&sql)
            .fetch_all(&self.pool)
            .await
    }

    async fn resequence(&self) -> Result<(), sqlx::Error> {
        // ---
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {RESEQUENCE_TABLE}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE {RESEQUENCE_TABLE} (LIKE {TABLE} INCLUDING DEFAULTS)"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "INSERT INTO {RESEQUENCE_TABLE} SELECT * FROM {TABLE} ORDER BY timestamp"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("TRUNCATE {TABLE} RESTART IDENTITY"))
            .execute(&mut *tx)
            .await?;
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
