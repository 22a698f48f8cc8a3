use std::sync::Arc;

use axum::Router;

use crate::station::Station;
use crate::store::ObservationStore;

mod backfill;
mod health;
mod report;

// ---

pub fn router<R: ObservationStore>(station: Arc<Station<R>>) -> Router {
    // ---
    Router::new()
        .merge(report::router())
        .merge(backfill::router())
        .merge(health::router())
        .with_state(station)
}
