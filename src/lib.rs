//! Weather station relay.
//!
//! Accepts readings posted by a personal weather station, normalizes them to
//! metric units and fans them out to a local SQLite store, a remote
//! PostgreSQL store, a date-partitioned line archive and a set of
//! time-windowed JSON series for the public dashboard.

pub mod archive;
pub mod backfill;
pub mod config;
pub mod convert;
pub mod error;
pub mod forward;
pub mod gate;
pub mod live;
pub mod models;
pub mod normalize;
pub mod persist;
pub mod retention;
pub mod routes;
pub mod schema;
pub mod station;
pub mod store;
pub mod transfer;

pub use config::Config;
pub use error::{BackfillError, NormalizeError, SinkError};
pub use models::{NormalizedReading, Observation, RawPayload};
pub use station::{Station, StationSettings};
