use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Url, header};

use crate::{
    config::Config,
    error::{AppError, Result},
    models::{attendance::SessionStatus, qr_session::QrSession},
    services::http,
};

/// Endpoint producing a fresh QR image.
pub const GENERATE_PATH: &str = "/api/qr/generate";
/// Prefix of the per-session status endpoint.
pub const SESSION_PATH: &str = "/api/qr/session";

/// Anything that can hand out the latest QR session.
pub trait QrSource: Send + Sync + 'static {
    fn fetch_latest(&self) -> impl Future<Output = Result<QrSession>> + Send;
}

/// Runs `fetch` up to `max_retries` times, sleeping `delay` between attempts.
///
/// The closure receives the 1-based attempt number. When every attempt fails
/// the error names the attempt count and carries the last failure.
pub async fn fetch_with_retry<T, F, Fut>(max_retries: u32, delay: Duration, mut fetch: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_retries = max_retries.max(1);
    let mut attempt = 1;
    loop {
        tracing::debug!("Attempting to fetch QR code (attempt {})", attempt);
        match fetch(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_retries => {
                tracing::error!("QR fetch attempt {} failed, giving up: {}", attempt, e);
                return Err(AppError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                tracing::warn!("QR fetch attempt {} failed: {}", attempt, e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Client for the QR endpoints of the attendance backend.
#[derive(Clone)]
pub struct QrClient {
    http: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
    status_timeout: Duration,
}

impl QrClient {
    /// Creates a new `QrClient` from the application's configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: http::build_client(config.http_timeout)?,
            base_url: config.api_base_url.clone(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            status_timeout: config.status_timeout,
        })
    }

    /// Performs a single `GET /api/qr/generate`.
    pub async fn fetch_once(&self) -> Result<QrSession> {
        let url = format!("{}{}", self.base_url, GENERATE_PATH);
        tracing::debug!("Requesting QR code from {}", url);

        let response = self
            .http
            .get(&url)
            .header(header::ACCEPT, "image/png")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_else(|e| {
                tracing::warn!("Failed to read error body from {}: {}", url, e);
                Default::default()
            });
            return Err(http::server_error(status, &body));
        }

        let session_id = header_value(response.headers(), "session-id");
        let expiry_time = header_value(response.headers(), "expiry-time");
        let (Some(session_id), Some(expiry_time)) = (session_id, expiry_time) else {
            return Err(AppError::Protocol(
                "Missing session ID or expiry time in response headers".to_string(),
            ));
        };

        let body = response.bytes().await?;
        ensure_png(&body)?;

        tracing::info!("Fetched QR code for session {} (expires {})", session_id, expiry_time);
        Ok(QrSession::from_png(&body, session_id, expiry_time))
    }

    /// Fetches a QR session, retrying with the configured bound and delay.
    pub async fn fetch_latest_qr(&self) -> Result<QrSession> {
        fetch_with_retry(self.max_retries, self.retry_delay, |_| self.fetch_once()).await
    }

    /// Asks the backend whether a session is still valid.
    ///
    /// Any failure counts as invalid.
    pub async fn check_status(&self, session_id: &str) -> bool {
        match self.try_check_status(session_id).await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!("QR status check for {} failed: {}", session_id, e);
                false
            }
        }
    }

    async fn try_check_status(&self, session_id: &str) -> Result<bool> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, SESSION_PATH))
            .map_err(|e| AppError::Internal(format!("Invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("Base URL cannot carry a path".to_string()))?
            .push(session_id)
            .push("status");

        let response = self
            .http
            .get(url)
            .timeout(self.status_timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(http::server_error(status, &body));
        }

        let parsed: SessionStatus = sonic_rs::from_slice(&body)
            .map_err(|e| AppError::Protocol(format!("Malformed status response: {}", e)))?;
        Ok(parsed.valid)
    }
}

impl QrSource for QrClient {
    fn fetch_latest(&self) -> impl Future<Output = Result<QrSession>> + Send {
        self.fetch_latest_qr()
    }
}

fn ensure_png(body: &[u8]) -> Result<()> {
    if infer::image::is_png(body) {
        return Ok(());
    }
    let found = infer::get(body).map_or("unknown", |k| k.mime_type());
    Err(AppError::Protocol(format!("QR response body is not a PNG (got {})", found)))
}

fn header_value(headers: &header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
