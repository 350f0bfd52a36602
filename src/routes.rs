use std::time::Duration;

use axum::{Router, routing::get};
use http::{Method, header};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers::display, state::KioskState};

/// Builds the kiosk display router.
pub fn router(state: KioskState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .expose_headers([
            header::HeaderName::from_static("session-id"),
            header::HeaderName::from_static("expiry-time"),
        ])
        .max_age(Duration::from_secs(86400));

    Router::new()
        .route("/health", get(display::health))
        .route("/api/display", get(display::display))
        .route("/api/display/qr.png", get(display::qr_png))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(cors)
}
