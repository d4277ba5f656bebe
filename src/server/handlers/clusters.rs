use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::cluster::OnboardRequest;
use crate::error::Result;
use crate::server::extract::JsonBody;
use crate::server::state::AppState;

/// Onboarded clusters that answered a version probe
pub async fn list_clusters(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.list().await)
}

pub async fn get_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.registry.inspect(&name).await?))
}

pub async fn onboard_cluster(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<OnboardRequest>,
) -> Result<impl IntoResponse> {
    let info = state.registry.onboard(request).await?;
    Ok((StatusCode::CREATED, Json(info)))
}
