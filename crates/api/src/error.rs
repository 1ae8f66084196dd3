use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tenancy_core::{NameError, ProvisionError};

use crate::Message;

/// Failures the boundary answers itself, before or instead of a core outcome.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error(transparent)]
    Unavailable(#[from] ProvisionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidName(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(Message { message: self.to_string() })).into_response()
    }
}
