//! Operator API handlers

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use crate::application::commands::SharedCommandManager;
use crate::application::registry::StatusRegistry;
use crate::domain::connector::StationSnapshot;

use super::dto::{ApiErrorDto, CommandSnapshotDto, EnqueueCommandRequest};

#[derive(Clone)]
pub struct ApiState {
    pub commands: SharedCommandManager,
    pub registry: Arc<StatusRegistry>,
    pub prometheus: Option<PrometheusHandle>,
}

#[utoipa::path(
    post,
    path = "/internal/commands",
    tag = "Commands",
    request_body = EnqueueCommandRequest,
    responses(
        (status = 202, description = "Command queued", body = CommandSnapshotDto),
        (status = 400, description = "Invalid request", body = ApiErrorDto)
    )
)]
pub async fn enqueue_command(
    State(state): State<ApiState>,
    Json(request): Json<EnqueueCommandRequest>,
) -> Result<(StatusCode, Json<CommandSnapshotDto>), (StatusCode, Json<ApiErrorDto>)> {
    match state
        .commands
        .enqueue(&request.station_id, &request.action, request.payload, None)
    {
        Ok(snapshot) => {
            info!(
                station_id = snapshot.station_id.as_str(),
                action = snapshot.action.as_str(),
                command_id = snapshot.id.as_str(),
                "operator command accepted"
            );
            Ok((StatusCode::ACCEPTED, Json(snapshot.into())))
        }
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(ApiErrorDto::new(e.to_string())),
        )),
    }
}

#[utoipa::path(
    get,
    path = "/internal/commands/{command_id}",
    tag = "Commands",
    params(("command_id" = String, Path, description = "Command id")),
    responses(
        (status = 200, description = "Command snapshot", body = CommandSnapshotDto),
        (status = 404, description = "Unknown command", body = ApiErrorDto)
    )
)]
pub async fn get_command(
    State(state): State<ApiState>,
    Path(command_id): Path<String>,
) -> Result<Json<CommandSnapshotDto>, (StatusCode, Json<ApiErrorDto>)> {
    state
        .commands
        .snapshot(&command_id)
        .map(|snapshot| Json(snapshot.into()))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiErrorDto::new(format!("command {} not found", command_id))),
            )
        })
}

#[utoipa::path(
    get,
    path = "/internal/stations/{station_id}/status",
    tag = "Stations",
    params(("station_id" = String, Path, description = "Station id")),
    responses(
        (status = 200, description = "Latest connector statuses for the station"),
        (status = 404, description = "Unknown station", body = ApiErrorDto)
    )
)]
pub async fn station_status(
    State(state): State<ApiState>,
    Path(station_id): Path<String>,
) -> Result<Json<StationSnapshot>, (StatusCode, Json<ApiErrorDto>)> {
    state.registry.snapshot(&station_id).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiErrorDto::new(format!("station {} not found", station_id))),
        )
    })
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn render_metrics(State(state): State<ApiState>) -> Result<String, StatusCode> {
    state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::NOT_FOUND)
}
