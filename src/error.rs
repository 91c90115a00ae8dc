//! Error handling

use std::fmt;

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{error, info, warn};

use crate::gateway::{GenerationKind, ResultEnvelope};

/// Everything that can stop a generation request from producing an image.
#[derive(Debug)]
pub enum GatewayError {
    /// search-and-replace or sketch without an image
    MissingImage,
    /// upscale fetch without an id
    MissingGenerationId,
    /// upscale fetch with an id that isn't safe to use as a path segment
    InvalidGenerationId,
    /// Unknown `output_format` value
    InvalidOutputFormat(String),
    /// Body couldn't be read or parsed
    BadRequest(String),
    /// The upstream API answered with something other than success, passed through as-is
    Upstream {
        /// Upstream status code
        status: StatusCode,
        /// Upstream body as text
        body: String,
    },
    /// Network or disk failure, the detail is only logged
    Internal {
        /// Which operation failed
        kind: GenerationKind,
        /// What went wrong, never sent to the client
        detail: String,
    },
}

impl GatewayError {
    /// Wraps an unexpected failure during `kind`.
    pub fn internal(kind: GenerationKind, err: impl fmt::Display) -> Self {
        Self::Internal {
            kind,
            detail: err.to_string(),
        }
    }

    /// Status code the client gets.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingImage
            | Self::MissingGenerationId
            | Self::InvalidGenerationId
            | Self::InvalidOutputFormat(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => *status,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error text the client gets.
    pub fn client_message(&self) -> String {
        match self {
            Self::MissingImage => "Missing image file.".to_string(),
            Self::MissingGenerationId => "Missing generation_id.".to_string(),
            Self::InvalidGenerationId => "Invalid generation_id.".to_string(),
            Self::InvalidOutputFormat(_) => "Invalid output_format.".to_string(),
            Self::BadRequest(message) => message.clone(),
            Self::Upstream { body, .. } => body.clone(),
            Self::Internal { kind, .. } => kind.failure_message().to_string(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOutputFormat(value) => write!(f, "Invalid output_format: {value:?}"),
            Self::Upstream { status, body } => write!(f, "Upstream returned {status}: {body}"),
            Self::Internal { kind, detail } => write!(f, "{kind} failed: {detail}"),
            _ => f.write_str(&self.client_message()),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<JsonRejection> for GatewayError {
    fn from(err: JsonRejection) -> Self {
        GatewayError::BadRequest(err.body_text())
    }
}

impl From<MultipartRejection> for GatewayError {
    fn from(err: MultipartRejection) -> Self {
        GatewayError::BadRequest(err.body_text())
    }
}

impl From<MultipartError> for GatewayError {
    fn from(err: MultipartError) -> Self {
        GatewayError::BadRequest(err.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            GatewayError::Upstream { .. } => warn!("{}", self),
            GatewayError::Internal { .. } => error!("Internal server error: {}", self),
            _ => info!("Bad request received: {}", self),
        }
        let envelope = ResultEnvelope::failure(self.client_message());
        (self.status(), Json(envelope)).into_response()
    }
}
