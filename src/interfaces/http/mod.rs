//! Operator-facing REST surface

pub mod dto;
pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use handlers::ApiState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::enqueue_command,
        handlers::get_command,
        handlers::station_status,
    ),
    components(schemas(
        dto::EnqueueCommandRequest,
        dto::CommandSnapshotDto,
        dto::ApiErrorDto,
    )),
    tags(
        (name = "Commands", description = "Operator command dispatch"),
        (name = "Stations", description = "Station status snapshots")
    ),
    info(
        title = "voltflow-csms operator API",
        description = "Internal control surface of the OCPP gateway"
    )
)]
struct ApiDoc;

pub fn create_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::render_metrics))
        .route("/internal/commands", post(handlers::enqueue_command))
        .route("/internal/commands/:command_id", get(handlers::get_command))
        .route(
            "/internal/stations/:station_id/status",
            get(handlers::station_status),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
