use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A transport-level failure (connect, timeout, body read).
    #[error("Network error: {0}")]
    Network(String),

    /// A well-formed response that is missing required fields.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Camera or location access denied by the user.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Missing required input or an expired session.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A non-2xx response from the backend.
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status returned by the backend.
        status: u16,
        /// The server's `detail` message, or the transport text when absent.
        message: String,
    },

    /// Every attempt of a retried operation failed.
    #[error("Failed to fetch QR code after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The error of the last attempt.
        source: Box<AppError>,
    },

    /// The camera could be opened but capturing a frame failed.
    #[error("Camera error: {0}")]
    Camera(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Network(e.to_string())
    }
}

impl AppError {
    /// The text shown to the user for this error.
    ///
    /// Server-provided messages are passed through verbatim; everything else
    /// gets actionable wording.
    pub fn user_message(&self) -> String {
        self.user_message_or(GENERIC_FAILURE_MESSAGE)
    }

    /// Like [`AppError::user_message`], with `fallback` for errors that carry
    /// nothing worth showing.
    pub fn user_message_or(&self, fallback: &str) -> String {
        match self {
            AppError::Server { message, .. } => message.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Permission(_) => "Please allow camera access when prompted".to_string(),
            AppError::Camera(_) => "Failed to access camera. Please try again.".to_string(),
            AppError::Network(msg) if !msg.is_empty() => msg.clone(),
            AppError::Protocol(msg) => msg.clone(),
            AppError::RetriesExhausted { .. } => "Failed to fetch QR code".to_string(),
            AppError::NotFound => "Resource not found".to_string(),
            _ => fallback.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Network(ref msg) => {
                tracing::warn!("Network error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Backend unreachable".to_string())
            }

            AppError::Protocol(ref msg) => {
                tracing::warn!("Protocol error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }

            AppError::Permission(ref msg) => {
                tracing::warn!("Permission denied: {}", msg);
                (StatusCode::FORBIDDEN, msg.clone())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Server {
                status,
                ref message,
            } => {
                tracing::warn!("Backend returned {}: {}", status, message);
                (StatusCode::BAD_GATEWAY, message.clone())
            }

            AppError::RetriesExhausted { attempts, ref source } => {
                tracing::warn!("Gave up after {} attempts: {}", attempts, source);
                (StatusCode::BAD_GATEWAY, "Failed to fetch QR code".to_string())
            }

            AppError::Camera(ref msg) => {
                tracing::error!("Camera error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Camera error".to_string())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "File system error".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
