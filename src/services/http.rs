use reqwest::{Client, StatusCode};
use sonic_rs::JsonValueTrait;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Builds the shared backend client with a whole-request timeout.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("rollcall/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Internal(format!("HTTP client setup failed: {}", e)))
}

/// Turns a non-2xx response body into a `Server` error.
///
/// A JSON `detail` field takes priority over the generic status text.
pub fn server_error(status: StatusCode, body: &[u8]) -> AppError {
    let detail = sonic_rs::from_slice::<sonic_rs::Value>(body)
        .ok()
        .and_then(|json| json.get("detail").and_then(|v| v.as_str()).map(str::to_string))
        .filter(|d| !d.trim().is_empty());

    AppError::Server {
        status: status.as_u16(),
        message: detail
            .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16())),
    }
}
