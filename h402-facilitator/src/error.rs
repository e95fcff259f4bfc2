//! Error responses of the facilitator service.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use h402::FacilitatorError;

/// Errors a facilitator endpoint can answer with.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request body is not a valid request.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),
    /// The facilitator backend failed.
    #[error(transparent)]
    Facilitator(#[from] FacilitatorError),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Facilitator(FacilitatorError::Unavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Facilitator(_) => StatusCode::BAD_GATEWAY,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
