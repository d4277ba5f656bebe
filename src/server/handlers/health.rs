use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::warn;

use crate::cluster::StatusResponse;
use crate::server::state::AppState;

/// Liveness: the process is serving
pub async fn health() -> impl IntoResponse {
    Json(StatusResponse::new("healthy"))
}

/// Readiness: the default cluster answers a version probe
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.probe_default().await {
        Ok(_) => (StatusCode::OK, Json(StatusResponse::new("ready"))),
        Err(e) => {
            warn!(cluster = %state.registry.default_name(), error = %e, "default cluster not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(
                    StatusResponse::new("not ready")
                        .with_reason(format!("kubernetes connection failed: {}", e)),
                ),
            )
        }
    }
}
