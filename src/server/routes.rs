use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::llm::ModelInvoker;

use super::handlers;

/// State shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub invoker: ModelInvoker,
    /// Capacity of the per-request fragment channel.
    pub stream_buffer: usize,
}

pub fn build(invoker: ModelInvoker, config: &Config) -> Result<Router> {
    let client_key = HeaderName::try_from(config.server.client_key_header.as_str()).map_err(|e| {
        GatewayError::Config(format!(
            "invalid client_key_header \"{}\": {e}",
            config.server.client_key_header
        ))
    })?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, client_key]);

    let state = AppState {
        invoker,
        stream_buffer: config.server.stream_buffer,
    };

    Ok(Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/template", get(handlers::get_template))
        .route("/healthz", get(handlers::healthz))
        .layer(cors)
        .with_state(state))
}
