use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    countdown::{format_remaining, is_urgent},
    error::{AppError, Result},
    state::KioskState,
};

/// Shown when no session has been fetched yet.
pub const NO_QR_MESSAGE: &str = "No QR code available";

/// The kiosk display model.
#[derive(Serialize, Debug)]
pub struct DisplayResponse {
    /// `active`, `expired` or `unavailable`.
    pub status: &'static str,
    pub message: String,
    pub session_id: Option<String>,
    pub qr_code: Option<String>,
    pub expiry_time: Option<String>,
    pub remaining_seconds: u64,
    pub remaining: String,
    pub urgent: bool,
    pub last_error: Option<String>,
}

/// Returns the current QR session and its countdown.
#[axum::debug_handler]
pub async fn display(State(state): State<KioskState>) -> Result<Response> {
    let last_error = state.last_error();

    let response = match state.snapshot() {
        Some(snap) => {
            let remaining = snap.countdown.remaining_secs;
            DisplayResponse {
                status: if snap.countdown.is_expired() { "expired" } else { "active" },
                message: snap.countdown.label(),
                session_id: Some(snap.session.session_id),
                qr_code: Some(snap.session.qr_code),
                expiry_time: Some(snap.session.expiry_time),
                remaining_seconds: remaining,
                remaining: format_remaining(remaining),
                urgent: is_urgent(remaining),
                last_error,
            }
        }
        None => DisplayResponse {
            status: "unavailable",
            message: last_error.clone().unwrap_or_else(|| NO_QR_MESSAGE.to_string()),
            session_id: None,
            qr_code: None,
            expiry_time: None,
            remaining_seconds: 0,
            remaining: format_remaining(0),
            urgent: true,
            last_error,
        },
    };

    let body = sonic_rs::to_string(&response)
        .map_err(|e| AppError::Internal(format!("Display serialization failed: {}", e)))?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Serves the current QR image as PNG, with the session headers echoed.
#[axum::debug_handler]
pub async fn qr_png(State(state): State<KioskState>) -> Result<Response> {
    let snap = state.snapshot().ok_or(AppError::NotFound)?;
    let png = snap
        .session
        .png_bytes()
        .ok_or_else(|| AppError::Internal("Held QR code is not a PNG data URI".to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
            (header::HeaderName::from_static("session-id"), snap.session.session_id),
            (header::HeaderName::from_static("expiry-time"), snap.session.expiry_time),
        ],
        png,
    )
        .into_response())
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
