use chrono::{DateTime, Utc};
use reqwest::Url;

use crate::error::{AppError, Result};
use crate::models::qr_session::parse_timestamp;

/// Message shown when the page was opened without session parameters.
pub const INVALID_LINK_MESSAGE: &str = "Invalid attendance URL";
/// Message shown when the scanned code has already lapsed.
pub const EXPIRED_LINK_MESSAGE: &str = "This QR code has expired. Please scan a new QR code.";

/// The `sessionId` / `expiryTime` pair carried by a scanned attendance URL.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceLink {
    pub session_id: String,
    pub expiry_time: String,
}

impl AttendanceLink {
    /// Extracts the session parameters from a full URL.
    ///
    /// A bare query string (`?sessionId=...`) is accepted as well.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let url = if raw.starts_with('?') || !raw.contains("://") {
            let query = raw.trim_start_matches('?');
            Url::parse(&format!("http://localhost/?{query}"))
        } else {
            Url::parse(raw)
        }
        .map_err(|_| AppError::Validation(INVALID_LINK_MESSAGE.to_string()))?;

        let mut session_id = None;
        let mut expiry_time = None;
        for (key, value) in url.query_pairs() {
            match &*key {
                "sessionId" if !value.is_empty() => session_id = Some(value.into_owned()),
                "expiryTime" if !value.is_empty() => expiry_time = Some(value.into_owned()),
                _ => {}
            }
        }

        match (session_id, expiry_time) {
            (Some(session_id), Some(expiry_time)) => Ok(Self {
                session_id,
                expiry_time,
            }),
            _ => Err(AppError::Validation(INVALID_LINK_MESSAGE.to_string())),
        }
    }

    /// Fails with the expired message unless the session outlives `now`.
    ///
    /// An unparseable expiry counts as expired.
    pub fn ensure_live(&self, now: DateTime<Utc>) -> Result<()> {
        match parse_timestamp(&self.expiry_time) {
            Some(expiry) if expiry > now => Ok(()),
            _ => Err(AppError::Validation(EXPIRED_LINK_MESSAGE.to_string())),
        }
    }
}
