use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The filing API answered, but not with usable data.
    #[error("Upstream API error: {0}")]
    Upstream(String),

    /// The email provider rejected the message.
    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("State persistence error: {0}")]
    Persist(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("A check cycle is already running")]
    CycleInProgress,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::CycleInProgress => StatusCode::CONFLICT,
            AppError::Http(_) | AppError::Upstream(_) | AppError::Timeout(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
