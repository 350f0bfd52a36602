use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::{error::AppError, models::qr_session::QrSession, services::qr::QrSource};

/// Handle to a running QR poll loop.
///
/// Cancellation is cooperative: `stop()` clears a flag that the loop checks
/// before every fetch. A fetch already in flight is allowed to finish and its
/// result is discarded. Dropping the handle stops the loop as well.
pub struct PollHandle {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Asks the loop to stop. No fetch is issued after this returns.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            tracing::info!("QR polling stopped");
        }
        self.wake.notify_one();
    }

    /// Whether the loop has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the loop and waits for the task to wind down.
    pub async fn join(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("QR poll task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fetches immediately, then once per `interval`, until stopped.
///
/// Fetches are strictly sequential: the next wait only starts after the
/// previous fetch (including its retries) has completed. Failures go to
/// `on_error` and never end the loop.
pub fn start_qr_polling<S, U, E>(
    source: Arc<S>,
    interval: Duration,
    mut on_update: U,
    mut on_error: E,
) -> PollHandle
where
    S: QrSource,
    U: FnMut(QrSession) + Send + 'static,
    E: FnMut(AppError) + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let wake = Arc::new(Notify::new());

    let flag = running.clone();
    let stop_signal = wake.clone();
    let task = tokio::spawn(async move {
        tracing::info!("QR polling started (interval {:?})", interval);
        while flag.load(Ordering::Acquire) {
            let result = source.fetch_latest().await;

            if !flag.load(Ordering::Acquire) {
                tracing::debug!("Discarding QR fetch result that completed after stop");
                break;
            }

            match result {
                Ok(session) => on_update(session),
                Err(e) => {
                    tracing::error!("QR poll failed: {}", e);
                    on_error(e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop_signal.notified() => {}
            }
        }
    });

    PollHandle {
        running,
        wake,
        task: Some(task),
    }
}
