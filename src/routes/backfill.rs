// src/routes/backfill.rs
//! On-demand backfill of the remote store.
//!
//! `POST /admin/backfill` runs the same migration the first reading triggers.
//! `?force=true` copies and resequences even when the remote table already
//! exists, which finishes a run that was interrupted after schema creation.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::backfill::BackfillReport;
use crate::station::Station;
use crate::store::ObservationStore;

#[derive(Debug, Default, Deserialize)]
struct BackfillParams {
    #[serde(default)]
    force: bool,
}

async fn backfill<R: ObservationStore>(
    State(station): State<Arc<Station<R>>>,
    Query(params): Query<BackfillParams>,
) -> Result<Json<BackfillReport>, (StatusCode, String)> {
    // ---
    match station.backfill(params.force).await {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err((
            StatusCode::CONFLICT,
            "remote store not configured".to_string(),
        )),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub fn router<R: ObservationStore>() -> Router<Arc<Station<R>>> {
    Router::new().route("/admin/backfill", post(backfill::<R>))
}
