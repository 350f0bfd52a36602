use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::countdown::{Countdown, CountdownState};
use crate::error::AppError;
use crate::models::qr_session::QrSession;

struct Displayed {
    session: QrSession,
    countdown: Countdown,
    fetched_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    current: Option<Displayed>,
    last_error: Option<String>,
}

/// What the kiosk shows: the most recently fetched QR session and its countdown.
///
/// Only the refresh controller writes here, through [`KioskState::replace_session`]
/// and [`KioskState::record_error`]. Handlers only read.
#[derive(Clone)]
pub struct KioskState {
    inner: Arc<RwLock<Inner>>,
    countdown_buffer_secs: i64,
}

/// A read-only copy of the current session for one render.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub session: QrSession,
    pub countdown: CountdownState,
    pub fetched_at: DateTime<Utc>,
}

impl KioskState {
    /// Creates a new `KioskState`.
    pub fn new(countdown_buffer_secs: i64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            countdown_buffer_secs,
        }
    }

    /// Supersedes the held session and restarts its countdown.
    ///
    /// Must be called from within a tokio runtime.
    pub fn replace_session(&self, session: QrSession) {
        let countdown = Countdown::start(&session.expiry_time, self.countdown_buffer_secs);
        tracing::info!(
            "Displaying QR session {} ({})",
            session.session_id,
            countdown.current().label()
        );

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.current = Some(Displayed {
            session,
            countdown,
            fetched_at: Utc::now(),
        });
        inner.last_error = None;
    }

    /// Remembers a failed poll. The held session, if any, stays up.
    pub fn record_error(&self, error: &AppError) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.last_error = Some(error.user_message());
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.current.as_ref().map(|d| Snapshot {
            session: d.session.clone(),
            countdown: d.countdown.current(),
            fetched_at: d.fetched_at,
        })
    }

    pub fn last_error(&self) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.last_error.clone()
    }
}
