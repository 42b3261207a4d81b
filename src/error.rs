use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Failure of a single page request against the vacancy listing endpoint.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Vacancy listing returned HTTP {status}")]
    Transport { status: u16 },

    #[error("Vacancy request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to parse vacancy page: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Why one company's fetch-and-ingest task did not complete.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Fetch task panicked: {0}")]
    Panicked(String),
}

/// Error surface of the read API.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Persistence(e) => {
                tracing::error!("Persistence error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = axum::Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
