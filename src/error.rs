use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Everything a handler can fail with. Converted to a JSON body at the route
/// boundary; nothing crashes the process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} is missing")]
    MissingField(&'static str),
    /// Render or upload failed. The caller only ever sees "Upload failed";
    /// the cause goes to the log.
    #[error("Upload failed")]
    ScreenshotFailed(#[source] anyhow::Error),
    #[error("Failed to store thumbnail")]
    Datastore(#[source] sqlx::Error),
    /// The chat-completion API answered with a non-success status. Its status
    /// and body are relayed to the caller as-is.
    #[error("chat API returned {status}")]
    ChatUpstream { status: u16, body: String },
    #[error("Failed to parse JSON from AI response.")]
    NoJsonBlock,
    #[error("Invalid JSON format from AI response.")]
    InvalidJson(#[source] serde_json::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingField(_) | Self::ScreenshotFailed(_) => StatusCode::BAD_REQUEST,
            Self::ChatUpstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Datastore(_) | Self::NoJsonBlock | Self::InvalidJson(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::ScreenshotFailed(source) => {
                warn!("screenshot pipeline failed: {source:#}");
                self.to_string()
            }
            Self::Datastore(source) => {
                error!(error = %source, "thumbnail update failed");
                self.to_string()
            }
            Self::ChatUpstream { status, body } => {
                warn!(status = *status, "chat API error relayed");
                body.clone()
            }
            Self::Internal(source) => {
                error!("unhandled error: {source:#}");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}
