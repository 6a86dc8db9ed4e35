use axum::{Json, extract::Path, extract::State, http::StatusCode, response::IntoResponse};
use offerhub_core::events::Trigger;
use offerhub_sdk::objects::{StageName, StageQueued};

use crate::state::AppState;

use super::AdminApiError;

/// `POST /run/{stage}`: queue a manual run of a pipeline stage.
pub async fn run_stage(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> Result<impl IntoResponse, AdminApiError> {
    let stage: StageName = stage.parse().map_err(AdminApiError::UnknownStage)?;

    state
        .stages
        .enqueue(stage, Trigger::Manual)
        .await
        .map_err(|_| AdminApiError::StageWorkerStopped)?;
    tracing::info!(%stage, "Stage run queued by operator");

    Ok((StatusCode::ACCEPTED, Json(StageQueued { queued: stage })))
}
