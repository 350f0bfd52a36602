use std::future::Future;

use reqwest::{Client, header};

use crate::{
    config::Config,
    error::Result,
    models::attendance::AttendanceSubmission,
    services::http,
};

/// Endpoint accepting attendance submissions.
pub const SUBMIT_PATH: &str = "/api/attendance/submit";

/// Anything that accepts a finished attendance submission.
///
/// Returns the backend's success payload, which is opaque to the client.
pub trait AttendanceSink {
    fn submit(&self, payload: &AttendanceSubmission) -> impl Future<Output = Result<String>> + Send;
}

/// Client for the attendance submission endpoint.
#[derive(Clone)]
pub struct AttendanceClient {
    http: Client,
    base_url: String,
}

impl AttendanceClient {
    /// Creates a new `AttendanceClient` from the application's configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: http::build_client(config.http_timeout)?,
            base_url: config.api_base_url.clone(),
        })
    }

    /// Posts one submission.
    ///
    /// A backend `detail` message is surfaced verbatim in the error.
    pub async fn submit_attendance(&self, payload: &AttendanceSubmission) -> Result<String> {
        let url = format!("{}{}", self.base_url, SUBMIT_PATH);
        tracing::info!(
            "Submitting attendance for session {} to {}",
            payload.session_id,
            url
        );

        let response = self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(payload)
            .send()
            .await
            .inspect_err(|e| tracing::error!("Attendance submission failed: {}", e))?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let err = http::server_error(status, &body);
            tracing::error!("Attendance submission rejected: {}", err);
            return Err(err);
        }

        tracing::info!("Attendance recorded for session {}", payload.session_id);
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

impl AttendanceSink for AttendanceClient {
    fn submit(&self, payload: &AttendanceSubmission) -> impl Future<Output = Result<String>> + Send {
        self.submit_attendance(payload)
    }
}

/// Free-form descriptor of this client, sent as `device_info`.
pub fn device_info() -> String {
    format!(
        "rollcall/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
