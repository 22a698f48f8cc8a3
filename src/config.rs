//! Configuration loader for the `stationflow` relay.
//!
//! All runtime settings come from environment variables (with optional `.env`
//! support provided by the caller) and are read exactly once at startup.
//! Loading goes through a lookup function so tests can supply their own
//! environment.
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::FixedOffset;

use crate::normalize::FieldLayout;

/// Parse an optional environment variable with a default value.
macro_rules! parse_env_or {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.parse())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string variable; empty counts as unset.
macro_rules! optional_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name).filter(|v: &String| !v.trim().is_empty())
    };
}

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8090";
const DEFAULT_DISPLAY_OFFSET: &str = "+01:00";

/// Strongly typed relay configuration, immutable after loading.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Root of the JSON series, live snapshot, archive tree and local DB.
    pub data_dir: PathBuf,

    /// SQLite connection string for the local store.
    pub local_db_url: String,

    /// PostgreSQL connection string; `None` disables the remote store.
    pub remote_db_url: Option<String>,

    /// Maximum number of connections per store pool.
    pub db_pool_max: u32,

    pub listen_addr: SocketAddr,

    /// Third-party consumer of the raw payload.
    pub forward_url: Option<String>,

    /// Directory artifacts are mirrored into; `None` disables transfer.
    pub transfer_remote_dir: Option<PathBuf>,

    /// Zone used for display keys of the windowed series.
    pub display_offset: FixedOffset,

    pub backfill_batch_size: usize,

    pub field_layout: FieldLayout,
}

/// Load configuration from the process environment.
///
/// Optional:
/// - `DATA_DIR` – data root (default: `./data`)
/// - `LOCAL_DATABASE_URL` – local store (default: `sqlite://<DATA_DIR>/weather_data.db`)
/// - `REMOTE_DATABASE_URL` – remote store (default: disabled)
/// - `DB_POOL_MAX` – max DB connections per store (default: 5)
/// - `LISTEN_ADDR` – bind address (default: `0.0.0.0:8090`)
/// - `FORWARD_URL` – raw payload forward target (default: disabled)
/// - `TRANSFER_REMOTE_DIR` – artifact transfer target (default: disabled)
/// - `DISPLAY_UTC_OFFSET` – display key offset (default: `+01:00`)
/// - `BACKFILL_BATCH_SIZE` – rows per migration batch (default: 500)
/// - `FIELD_LAYOUT` – `current` or `legacy` (default: `current`)
pub fn load_from_env() -> Result<Config> {
    load_with(|name| env::var(name).ok())
}

/// Load configuration through `lookup`.
pub fn load_with<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let data_dir: PathBuf = parse_env_or!(lookup, "DATA_DIR", PathBuf::from("./data"));
    let local_db_url = optional_env!(lookup, "LOCAL_DATABASE_URL").unwrap_or_else(|| {
        format!(
            "sqlite://{}",
            data_dir.join(crate::station::LOCAL_DB_FILE).display()
        )
    });
    let remote_db_url = optional_env!(lookup, "REMOTE_DATABASE_URL");
    let db_pool_max: u32 = parse_env_or!(lookup, "DB_POOL_MAX", 5);
    let listen_addr: SocketAddr = optional_env!(lookup, "LISTEN_ADDR")
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
        .parse()
        .map_err(|e| anyhow!("Invalid LISTEN_ADDR: {}", e))?;
    let forward_url = optional_env!(lookup, "FORWARD_URL");
    let transfer_remote_dir = optional_env!(lookup, "TRANSFER_REMOTE_DIR").map(PathBuf::from);
    let offset_text = optional_env!(lookup, "DISPLAY_UTC_OFFSET")
        .unwrap_or_else(|| DEFAULT_DISPLAY_OFFSET.to_string());
    let display_offset: FixedOffset = offset_text
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid DISPLAY_UTC_OFFSET `{}`: {}", offset_text, e))?;
    let backfill_batch_size: usize = parse_env_or!(lookup, "BACKFILL_BATCH_SIZE", 500);
    let field_layout: FieldLayout =
        parse_env_or!(lookup, "FIELD_LAYOUT", FieldLayout::default());

    if db_pool_max == 0 {
        return Err(anyhow!("DB_POOL_MAX must be greater than zero"));
    }
    if backfill_batch_size == 0 {
        return Err(anyhow!("BACKFILL_BATCH_SIZE must be greater than zero"));
    }

    Ok(Config {
        data_dir,
        local_db_url,
        remote_db_url,
        db_pool_max,
        listen_addr,
        forward_url,
        transfer_remote_dir,
        display_offset,
        backfill_batch_size,
        field_layout,
    })
}

/// Replace the password component of a connection URL with `****`.
fn mask_url(url: &str) -> String {
    // ---
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // A colon right after the scheme means there is no password.
            if !url[colon_pos..].starts_with("://") {
                return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}

impl Config {
    /// Log the loaded configuration, masking database passwords.
    pub fn log_config(&self) {
        // ---
        let disabled = || "(disabled)".to_string();

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATA_DIR            : {}", self.data_dir.display());
        tracing::info!("  LOCAL_DATABASE_URL  : {}", mask_url(&self.local_db_url));
        tracing::info!(
            "  REMOTE_DATABASE_URL : {}",
            self.remote_db_url.as_deref().map(mask_url).unwrap_or_else(disabled)
        );
        tracing::info!("  DB_POOL_MAX         : {}", self.db_pool_max);
        tracing::info!("  LISTEN_ADDR         : {}", self.listen_addr);
        tracing::info!(
            "  FORWARD_URL         : {}",
            self.forward_url.clone().unwrap_or_else(disabled)
        );
        tracing::info!(
            "  TRANSFER_REMOTE_DIR : {}",
            self.transfer_remote_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(disabled)
        );
        tracing::info!("  DISPLAY_UTC_OFFSET  : {}", self.display_offset);
        tracing::info!("  BACKFILL_BATCH_SIZE : {}", self.backfill_batch_size);
        tracing::info!("  FIELD_LAYOUT        : {:?}", self.field_layout);
    }
}
