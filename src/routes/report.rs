// src/routes/report.rs
//! Inbound reading endpoint.
//!
//! The station posts its form body to `/data/report/`; some firmware drops the
//! trailing slash, so both paths are served. The reply only says whether the
//! reading could be normalized. Sink failures never change it.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Form, Router};

use crate::models::RawPayload;
use crate::station::Station;
use crate::store::ObservationStore;

/// Handle `POST /data/report/`.
async fn report<R: ObservationStore>(
    State(station): State<Arc<Station<R>>>,
    Form(payload): Form<RawPayload>,
) -> Result<StatusCode, (StatusCode, String)> {
    // ---
    station
        .ingest(&payload)
        .await
        .map(|_| StatusCode::OK)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

pub fn router<R: ObservationStore>() -> Router<Arc<Station<R>>> {
    Router::new()
        .route("/data/report/", post(report::<R>))
        .route("/data/report", post(report::<R>))
}
