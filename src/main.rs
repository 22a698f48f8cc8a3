//! Entry point for the `stationflow` relay.
//!
//! Startup sequence:
//! - Initializing structured logging/tracing
//! - Loading configuration from environment variables or `.env`
//! - Opening the local SQLite store and creating its schema
//! - Preparing the lazily connected remote PostgreSQL link
//! - Mounting all routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving until Ctrl-C
//!
//! # Environment Variables
//! See [`stationflow::config::load_from_env`] for the relay settings, plus:
//! - `STATION_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `STATION_SPAN_EVENTS` (optional) – span event mode for tracing
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::sqlite::SqliteConnectOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use stationflow::backfill::BackfillCoordinator;
use stationflow::forward::Forwarder;
use stationflow::persist::DualSink;
use stationflow::store::{ObservationStore, PgStore, RemoteLink, SqliteStore};
use stationflow::transfer::CopyUploader;
use stationflow::{config, routes, Config, Station, StationSettings};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("Failed to create data dir {}", cfg.data_dir.display()))?;

    let local = SqliteStore::connect(&cfg.local_db_url, cfg.db_pool_max)
        .await
        .with_context(|| format!("Failed to open local database '{}'", cfg.local_db_url))?;
    local.create_schema().await?;
    tracing::info!("Local store ready");

    let remote = cfg
        .remote_db_url
        .as_deref()
        .map(|url| RemoteLink::<PgStore>::new(url, cfg.db_pool_max));
    if remote.is_none() {
        tracing::warn!("REMOTE_DATABASE_URL not set, readings are stored locally only");
    }

    let station = Arc::new(build_station(&cfg, DualSink::new(local, remote))?);

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(station.clone());

    tracing::info!("Listening on {}", cfg.listen_addr);
    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    station.shutdown().await;
    tracing::info!("Stopped");
    Ok(())
}

fn build_station(cfg: &Config, sink: DualSink<SqliteStore, PgStore>) -> Result<Station<PgStore>> {
    // ---
    let settings = StationSettings {
        data_dir: cfg.data_dir.clone(),
        layout: cfg.field_layout,
        display_offset: cfg.display_offset,
        backfill: BackfillCoordinator::new(cfg.backfill_batch_size)?,
    };

    let mut station = Station::new(settings, sink);
    if let Some(path) = local_db_path(&cfg.local_db_url) {
        station = station.with_local_db(path);
    }
    if let Some(dir) = &cfg.transfer_remote_dir {
        station = station.with_uploader(CopyUploader::new(dir));
    }
    if let Some(url) = &cfg.forward_url {
        station = station.with_forwarder(Forwarder::new(url.as_str())?);
    }
    Ok(station)
}

/// Database file behind a SQLite URL, if it names one.
fn local_db_path(url: &str) -> Option<PathBuf> {
    let options = SqliteConnectOptions::from_str(url).ok()?;
    let path = options.get_filename();
    (path.as_os_str() != ":memory:").then(|| path.to_path_buf())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// - Color output follows `FORCE_COLOR` (`1|true|yes` on, `0|false|no` off),
///   otherwise TTY detection
/// - `STATION_SPAN_EVENTS`: `"full"` for ENTER, EXIT and CLOSE with timing,
///   `"enter_exit"` for ENTER and EXIT, anything else for CLOSE only
/// - `RUST_LOG` wins when set, else `STATION_LOG_LEVEL` (default `info`)
///
/// Call once, before any logging macro runs.
fn init_tracing() {
    // ---
    let span_events = match env::var("STATION_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("STATION_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
