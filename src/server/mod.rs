pub mod handlers;
pub mod routes;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::llm::ModelInvoker;

pub async fn serve(
    config: &Config,
    invoker: ModelInvoker,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let app = routes::build(invoker, config)?;
    let bind = config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| GatewayError::Config(format!("failed to bind {bind}: {e}")))?;

    info!(bind = %bind, "gateway listening (HTTP)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .map_err(|e| GatewayError::Config(format!("server error: {e}")))?;

    Ok(())
}
