use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;
use crate::error::Result;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: &'static str,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    state.db.ping().await?;

    Ok(Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    }))
}
