//! Inbound HTTP surface.
//!
//! `POST /chat` targets text generation, `POST /image` image generation.
//! Both take `{"request": "<serialized upstream body>", "key": "<idempotency key>"}`.

mod routes;

pub use routes::{router, AppState, GenerateBody, IdempotencyKey};

use crate::config::ProxyConfig;
use crate::Result;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(config: ProxyConfig) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = router(state, config.server.cors);

    let listener = TcpListener::bind(&config.server.bind).await?;
    let addr = listener.local_addr()?;
    info!(
        %addr,
        upstream = %config.upstream.base_url,
        publish_mode = ?config.cache.publish_mode,
        max_entries = ?config.cache.max_entries,
        "proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
