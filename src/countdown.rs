//! Expiry countdown for a displayed QR code.
//!
//! Remaining time is always derived from the absolute expiry and the current
//! wall clock. Nothing here keeps a counter that is decremented per tick, so a
//! suspended host that misses ticks still shows the right value on resume.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::models::qr_session::parse_timestamp;

/// Tick period of the countdown.
pub const TICK: Duration = Duration::from_secs(1);
/// Below this many seconds the display switches to its warning colour.
pub const URGENT_BELOW_SECS: u64 = 30;

/// Source of the current wall-clock time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Whole seconds left until `expires_at`, clamped at zero.
///
/// `buffer_secs` is added after flooring and before clamping.
pub fn remaining_seconds(expires_at: DateTime<Utc>, now: DateTime<Utc>, buffer_secs: i64) -> u64 {
    let diff_ms = (expires_at - now).num_milliseconds();
    let secs = diff_ms.div_euclid(1000).saturating_add(buffer_secs);
    secs.max(0) as u64
}

/// Same as [`remaining_seconds`] for a raw timestamp; unparseable input is expired.
pub fn remaining_for(raw_expiry: &str, now: DateTime<Utc>, buffer_secs: i64) -> u64 {
    match parse_timestamp(raw_expiry) {
        Some(expires_at) => remaining_seconds(expires_at, now, buffer_secs),
        None => {
            tracing::warn!("Unparseable expiry time {:?}, treating as expired", raw_expiry);
            0
        }
    }
}

/// Formats seconds as `m:ss`.
pub fn format_remaining(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub fn is_urgent(secs: u64) -> bool {
    secs < URGENT_BELOW_SECS
}

/// A single countdown reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownState {
    pub remaining_secs: u64,
}

impl CountdownState {
    pub fn is_expired(&self) -> bool {
        self.remaining_secs == 0
    }

    /// The line shown under the QR image.
    pub fn label(&self) -> String {
        if self.is_expired() {
            "QR Code expired".to_string()
        } else {
            format!("Time remaining: {}", format_remaining(self.remaining_secs))
        }
    }
}

/// A one-second ticker over a fixed expiry.
///
/// Already-expired input yields a terminal reading and no timer is started.
/// The ticker ends by itself once it reads zero, and is cancelled when the
/// `Countdown` is stopped or dropped.
pub struct Countdown {
    rx: watch::Receiver<CountdownState>,
    task: Option<JoinHandle<()>>,
}

impl Countdown {
    /// Starts a countdown against the system clock.
    pub fn start(raw_expiry: &str, buffer_secs: i64) -> Self {
        Self::start_with_clock(parse_timestamp(raw_expiry), buffer_secs, Arc::new(Utc::now))
    }

    /// Starts a countdown against an explicit clock. `None` means unparseable.
    pub fn start_with_clock(
        expires_at: Option<DateTime<Utc>>,
        buffer_secs: i64,
        clock: Clock,
    ) -> Self {
        let compute = move |clock: &Clock| match expires_at {
            Some(exp) => remaining_seconds(exp, clock(), buffer_secs),
            None => 0,
        };

        let initial = CountdownState {
            remaining_secs: compute(&clock),
        };
        let (tx, rx) = watch::channel(initial);

        if initial.is_expired() {
            tracing::debug!("Countdown started on an expired code");
            return Self { rx, task: None };
        }

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let state = CountdownState {
                    remaining_secs: compute(&clock),
                };
                if tx.send(state).is_err() {
                    break;
                }
                if state.is_expired() {
                    tracing::info!("QR code expired");
                    break;
                }
            }
        });

        Self {
            rx,
            task: Some(task),
        }
    }

    /// The latest reading.
    pub fn current(&self) -> CountdownState {
        *self.rx.borrow()
    }

    /// A receiver that sees every tick.
    pub fn subscribe(&self) -> watch::Receiver<CountdownState> {
        self.rx.clone()
    }

    /// Whether the ticker is still scheduled.
    pub fn is_ticking(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Clears the schedule.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.stop();
    }
}
