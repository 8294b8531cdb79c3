// Copyright (C) 2026 Fulfillment Engine Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process health.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    healthy: bool,
    version: &'static str,
    uptime_ms: i64,
}

/// `GET /health`. Pings the database via a cheap read so a dead connection
/// pool shows up as unhealthy rather than as a 500 on the next real request.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let healthy = state.persistence.list_admins().await.is_ok();
    Json(HealthResponse {
        healthy,
        version: env!("CARGO_PKG_VERSION"),
        uptime_ms: state.start_time.elapsed().as_millis() as i64,
    })
}
