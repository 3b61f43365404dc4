use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

const DB_PING_TIMEOUT: Duration = Duration::from_secs(2);

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(root)).route("/live", get(live))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_latency_ms: Option<u64>,
    events_published: u64,
    timestamp: String,
    uptime: u64,
}

#[derive(Serialize)]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
}

async fn root(State(state): State<AppState>) -> Response {
    let (database, latency) = match state.db_proxy() {
        None => ("memory", None),
        Some(proxy) => match proxy.ping(DB_PING_TIMEOUT).await {
            Ok(elapsed) => ("connected", Some(elapsed.as_millis() as u64)),
            Err(err) => {
                tracing::warn!(error = %err, "database health check failed");
                ("disconnected", None)
            }
        },
    };
    let ok = database != "disconnected";

    let response = HealthResponse {
        status: if ok { "ok" } else { "degraded" },
        database,
        database_latency_ms: latency,
        events_published: state.events().bus().event_count().await,
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.uptime_seconds(),
    };
    let status_code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime: state.uptime_seconds(),
    })
    .into_response()
}
