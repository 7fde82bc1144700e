//! Axum Router Configuration
//!
//! The WebSocket endpoint, the REST routes, and the OpenAPI documentation.

use crate::{
    handlers,
    models::{AnswerResponse, ErrorResponse, HealthResponse, OfferRequest},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health, handlers::create_avatar_answer),
    components(schemas(OfferRequest, AnswerResponse, HealthResponse, ErrorResponse)),
    tags(
        (name = "Cadence API", description = "Real-time session service for the voice and text agent")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_routes = Router::new().route("/avatar/offer", post(handlers::create_avatar_answer));

    let stateful = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(stateful)
}
