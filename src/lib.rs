//! Attendance capture client.
//!
//! Keeps a rotating attendance QR code fresh on a kiosk display and drives the
//! student-side submission (form fields, selfie, session id) against the
//! attendance backend.
//!
//! - [`polling`] refreshes the QR session on a fixed interval with bounded retries.
//! - [`countdown`] derives the seconds left from the wall clock on every tick.
//! - [`submission`] is the form's state machine, from camera to POST.

pub mod auth;
pub mod config;
pub mod countdown;
pub mod error;
pub mod kiosk;
pub mod polling;
pub mod routes;
pub mod state;
pub mod submission;

pub mod models {
    pub mod attendance;
    pub mod link;
    pub mod qr_session;
}

pub mod services {
    pub mod attendance;
    pub mod http;
    pub mod qr;
}

pub mod handlers {
    pub mod display;
}
