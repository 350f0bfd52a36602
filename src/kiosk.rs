use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::{
    config::Config,
    polling::{PollHandle, start_qr_polling},
    routes,
    services::qr::{QrClient, QrSource},
    state::KioskState,
};

/// Wires the refresh controller's callbacks into the display state.
pub fn start_refresh<S: QrSource>(source: Arc<S>, interval: Duration, state: KioskState) -> PollHandle {
    let on_update = state.clone();
    let on_error = state;
    start_qr_polling(
        source,
        interval,
        move |session| on_update.replace_session(session),
        move |e| on_error.record_error(&e),
    )
}

/// Runs the kiosk until ctrl-c.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let client = Arc::new(QrClient::new(&config)?);
    let state = KioskState::new(config.countdown_buffer_secs);
    let poller = start_refresh(client, config.poll_interval, state.clone());

    let listener = tokio::net::TcpListener::bind(config.kiosk_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.kiosk_addr))?;
    tracing::info!("Kiosk display listening on http://{}", config.kiosk_addr);
    tracing::info!("Polling {} every {:?}", config.api_base_url, config.poll_interval);

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    poller.join().await;
    tracing::info!("Kiosk stopped");
    Ok(())
}
