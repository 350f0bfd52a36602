use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// A server-issued QR code paired with its session id and expiry.
///
/// Immutable once fetched. The refresh controller replaces it wholesale on
/// every successful poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrSession {
    /// The QR image as a `data:image/png;base64,...` URI.
    pub qr_code: String,
    /// Opaque session identifier from the `session-id` header.
    pub session_id: String,
    /// Raw `expiry-time` header value, kept as received.
    pub expiry_time: String,
}

impl QrSession {
    /// Wraps a PNG body into a session.
    pub fn from_png(png: &[u8], session_id: String, expiry_time: String) -> Self {
        Self {
            qr_code: format!("{}{}", DATA_URI_PREFIX, general_purpose::STANDARD.encode(png)),
            session_id,
            expiry_time,
        }
    }

    /// The parsed expiry, or `None` when the header was not a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.expiry_time)
    }

    /// Decodes the PNG bytes back out of the data URI.
    pub fn png_bytes(&self) -> Option<Vec<u8>> {
        let encoded = self.qr_code.strip_prefix(DATA_URI_PREFIX)?;
        general_purpose::STANDARD.decode(encoded).ok()
    }

    /// Whether the session can still be used at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp > now)
    }
}

/// Parses an ISO-8601 timestamp.
///
/// Offsets are honoured; a timestamp without one is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
