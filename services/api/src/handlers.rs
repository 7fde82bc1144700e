//! Axum Handlers for the REST API
//!
//! The HTTP surface next to the WebSocket endpoint: a liveness check and
//! the avatar offer relay. `utoipa` doc comments feed the OpenAPI document.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    avatar::RelayError,
    models::{AnswerResponse, ErrorResponse, HealthResponse, OfferRequest},
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::BadGateway(message) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = err.to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotConfigured(_) => Self::InternalServerError(err.into()),
            RelayError::Unreachable(_) | RelayError::Rejected(_) | RelayError::InvalidAnswer => {
                Self::BadGateway(err.to_string())
            }
        }
    }
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Cadence session service is running".to_string(),
    })
}

/// Relay a WebRTC offer to the avatar service and return its answer.
#[utoipa::path(
    post,
    path = "/api/avatar/offer",
    request_body = OfferRequest,
    responses(
        (status = 200, description = "Answer from the avatar service", body = AnswerResponse),
        (status = 400, description = "Missing SDP offer", body = ErrorResponse),
        (status = 500, description = "Avatar relay is not configured", body = ErrorResponse),
        (status = 502, description = "Avatar service failed or returned no answer", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn create_avatar_answer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OfferRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    if payload.sdp.trim().is_empty() {
        return Err(ApiError::BadRequest("sdp offer is required".to_string()));
    }
    let answer = state.avatar.post_offer(&payload).await?;
    info!("Avatar answer relayed");
    Ok(Json(answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_status_mapping() {
        let cases = [
            (RelayError::NotConfigured("API key"), StatusCode::INTERNAL_SERVER_ERROR),
            (RelayError::Rejected(503), StatusCode::BAD_GATEWAY),
            (RelayError::InvalidAnswer, StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_bad_request_status() {
        let response = ApiError::BadRequest("nope".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "healthy");
    }
}
