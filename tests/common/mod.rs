#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};

use rollcall::config::Config;

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

/// Session id the mock rejects with a structured `detail`.
pub const REJECTED_SESSION: &str = "rejected-session";

#[derive(Default)]
pub struct Backend {
    pub generate_calls: Mutex<u32>,
    /// How many leading generate calls answer 503.
    pub fail_first: Mutex<u32>,
    /// When set, generate answers without the session headers.
    pub omit_headers: Mutex<bool>,
    pub issued: Mutex<Vec<String>>,
    pub submissions: Mutex<Vec<Value>>,
}

impl Backend {
    pub fn generate_calls(&self) -> u32 {
        *self.generate_calls.lock().unwrap()
    }

    pub fn submissions(&self) -> Vec<Value> {
        self.submissions.lock().unwrap().clone()
    }
}

// Shared test context
pub struct TestContext {
    pub backend: Arc<Backend>,
    pub base_url: String,
}

impl TestContext {
    pub async fn new() -> Self {
        let backend = Arc::new(Backend::default());
        let app = Router::new()
            .route("/api/qr/generate", get(generate))
            .route("/api/qr/session/{session_id}/status", get(status))
            .route("/api/attendance/submit", post(submit))
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            backend,
            base_url: format!("http://{}", addr),
        }
    }

    pub fn config(&self) -> Config {
        Config {
            api_base_url: self.base_url.clone(),
            retry_delay: Duration::from_millis(20),
            http_timeout: Duration::from_secs(5),
            status_timeout: Duration::from_secs(2),
            success_redirect: Duration::from_millis(50),
            ..Config::default()
        }
    }
}

async fn generate(State(backend): State<Arc<Backend>>) -> Response {
    let call = {
        let mut calls = backend.generate_calls.lock().unwrap();
        *calls += 1;
        *calls
    };

    if call <= *backend.fail_first.lock().unwrap() {
        return (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response();
    }

    let mut headers = HeaderMap::new();
    if !*backend.omit_headers.lock().unwrap() {
        let session_id = uuid::Uuid::new_v4().to_string();
        let expiry = (chrono::Utc::now() + chrono::Duration::seconds(150)).to_rfc3339();
        headers.insert("session-id", HeaderValue::from_str(&session_id).unwrap());
        headers.insert("expiry-time", HeaderValue::from_str(&expiry).unwrap());
        backend.issued.lock().unwrap().push(session_id);
    }
    headers.insert("content-type", HeaderValue::from_static("image/png"));

    (StatusCode::OK, headers, PNG.to_vec()).into_response()
}

async fn status(State(backend): State<Arc<Backend>>, Path(session_id): Path<String>) -> Json<Value> {
    let valid = backend.issued.lock().unwrap().contains(&session_id);
    Json(json!({ "valid": valid }))
}

async fn submit(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    backend.submissions.lock().unwrap().push(body.clone());
    if body["session_id"] == REJECTED_SESSION {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Attendance already marked for this session" })),
        )
            .into_response();
    }
    (StatusCode::OK, Json(json!({ "message": "Attendance recorded" }))).into_response()
}

/// Polls `check` every 20ms until it holds or `timeout` passes.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
