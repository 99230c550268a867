use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use super::routes::AppState;
use crate::chat::{ChatRequest, FileEntry};
use crate::relay::ChannelSink;

const BODY_REQUIRED: &str = "Request body is required";
const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Serialize)]
pub struct TemplateResponse {
    pub success: bool,
    pub files: Vec<FileEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parse a chat request body, or say why not.
fn parse_request(body: &Bytes) -> Result<ChatRequest, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BODY_REQUIRED.to_string());
    }
    serde_json::from_slice(body).map_err(|e| format!("invalid request body: {e}"))
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn text_response(status: StatusCode, body: Body) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

// -- Chat ----------------------------------------------------------------

pub async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(r) => r,
        Err(msg) => return json_error(StatusCode::BAD_REQUEST, &msg),
    };

    match state.invoker.complete(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!(project_id = %request.project_id, "chat: {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

/// Streaming chat.  Context selection and prompt assembly happen before the
/// response starts, so their failures still get a proper status code; once
/// the body is open, failures arrive in-band.
///
/// On a first prompt this means the filler fragment is not sent until the
/// template store has answered, so template fetch latency is not masked.
pub async fn chat_stream(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(r) => r,
        Err(msg) => return text_response(StatusCode::BAD_REQUEST, Body::from(format!("Error: {msg}"))),
    };

    let prepared = match state.invoker.prepare(&request).await {
        Ok(b) => b,
        Err(e) => {
            error!(project_id = %request.project_id, "chat stream: {e}");
            return text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Body::from(format!("Error: {INTERNAL_ERROR}")),
            );
        }
    };

    let (mut sink, rx) = ChannelSink::channel(state.stream_buffer);
    let invoker = state.invoker.clone();
    let project_id = request.project_id;
    tokio::spawn(async move {
        let outcome = invoker.relay(prepared, &mut sink).await;
        info!(project_id = %project_id, ?outcome, "chat stream finished");
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    text_response(StatusCode::OK, Body::from_stream(stream))
}

// -- Template ------------------------------------------------------------

pub async fn get_template(State(state): State<AppState>) -> (StatusCode, Json<TemplateResponse>) {
    match state.invoker.templates().load().await {
        Ok(files) => (
            StatusCode::OK,
            Json(TemplateResponse {
                success: true,
                files,
                error: None,
            }),
        ),
        Err(e) => {
            warn!("template: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TemplateResponse {
                    success: false,
                    files: Vec::new(),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

// -- Health --------------------------------------------------------------

pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "model": state.invoker.model_id(),
    }))
}
