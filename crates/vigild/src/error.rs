//! HTTP error mapping.
//!
//! Every handler failure becomes a status code plus a `{"detail": ...}` body.

use crate::engine::EngineError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use vigil_core::VerifyError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{detail}")]
    BadRequestBody { status: StatusCode, detail: String },
    #[error("Failed to process photo: {0}")]
    InvalidPhoto(String),
    #[error("No face detected in the provided photo.")]
    NoFaceDetected,
    #[error("User not found with the provided name and document number.")]
    UserNotFound,
    #[error("No stored landmarks for user {0}. Run the landmark generator first.")]
    MissingLandmarks(String),
    #[error("Verification rejected. Face similarity score ({similarity:.2}) is below the threshold ({threshold}).")]
    Rejected { similarity: f32, threshold: f32 },
    #[error("Verification engine unavailable.")]
    EngineUnavailable,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequestBody { status, .. } => *status,
            Self::InvalidPhoto(_) | Self::NoFaceDetected | Self::Rejected { .. } => StatusCode::BAD_REQUEST,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::MissingLandmarks(_) | Self::EngineUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequestBody {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Photo(e) => Self::InvalidPhoto(e.to_string()),
            EngineError::Extract(e) => Self::InvalidPhoto(e.to_string()),
            EngineError::NoFaceDetected => Self::NoFaceDetected,
            EngineError::ChannelClosed | EngineError::Spawn(_) => Self::EngineUnavailable,
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::UserNotFound => Self::UserNotFound,
            VerifyError::MissingLandmarks(id) => Self::MissingLandmarks(id),
            VerifyError::Rejected { similarity, threshold } => Self::Rejected { similarity, threshold },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = match &self {
            Self::Rejected { similarity, threshold } => json!({
                "detail": self.to_string(),
                "similarity": similarity,
                "threshold": threshold,
            }),
            _ => json!({ "detail": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
