use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{env_or, Config};
use crate::error::{GatewayError, Result};
use crate::llm::eventstream::{frame_stream, FrameStream};
use crate::llm::{InvokeResponse, ModelProvider};

const EVENT_STREAM_CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

/// Model provider backed by the hosted model runtime's HTTP API.
///
/// Authenticates with a bearer API key.  Unary calls go to
/// `/model/{id}/invoke`; streaming calls go to
/// `/model/{id}/invoke-with-response-stream` and are decoded from the
/// event-stream framing.
///
/// Configuration priority (highest → lowest):
///   1. Environment variables (`AWS_BEARER_TOKEN_BEDROCK`, `BEDROCK_ENDPOINT`, `AWS_REGION`)
///   2. `[llm]` section of `config.toml`
///   3. Built-in defaults
pub struct BedrockProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default, alias = "Message")]
    message: Option<String>,
}

impl BedrockProvider {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = env_or("AWS_BEARER_TOKEN_BEDROCK", &config.llm.api_key).ok_or_else(|| {
            GatewayError::Config(
                "model API key required: set AWS_BEARER_TOKEN_BEDROCK env var \
                 or api_key in the [llm] config section"
                    .into(),
            )
        })?;

        let region = env_or("AWS_REGION", &config.llm.region).unwrap_or_else(|| "us-east-1".to_string());
        let endpoint = env_or("BEDROCK_ENDPOINT", &config.llm.endpoint)
            .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"));

        let timeout_secs = config.llm.timeout_secs;
        let provider = Self::with_endpoint(endpoint, api_key, timeout_secs)?;

        info!(
            endpoint = %provider.endpoint,
            region = %region,
            timeout_secs,
            "model provider initialized"
        );

        Ok(provider)
    }

    /// Build against an explicit endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(if timeout_secs > 0 {
                Duration::from_secs(timeout_secs)
            } else {
                Duration::from_secs(300)
            })
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, model_id: &str, action: &str) -> String {
        format!(
            "{}/model/{}/{action}",
            self.endpoint,
            urlencoding::encode(model_id)
        )
    }

    async fn send(&self, url: &str, accept: &str, body: Bytes) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, accept)
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(format!("request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let error_text = resp.text().await.unwrap_or_default();
        let error_msg = serde_json::from_str::<ErrorResponse>(&error_text)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(error_text);

        warn!(status = %status, error = %error_msg, "model provider error");

        Err(GatewayError::Provider(format!(
            "model provider returned {status}: {error_msg}"
        )))
    }
}

#[async_trait::async_trait]
impl ModelProvider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock-runtime"
    }

    async fn invoke(&self, model_id: &str, body: Bytes) -> Result<InvokeResponse> {
        let url = self.url(model_id, "invoke");
        debug!(model = model_id, body_len = body.len(), "invoking model");

        let resp = self.send(&url, "application/json", body).await?;
        resp.json::<InvokeResponse>()
            .await
            .map_err(|e| GatewayError::Provider(format!("failed to parse model response: {e}")))
    }

    async fn invoke_stream(&self, model_id: &str, body: Bytes) -> Result<FrameStream> {
        let url = self.url(model_id, "invoke-with-response-stream");
        debug!(model = model_id, body_len = body.len(), "invoking model (streaming)");

        let resp = self.send(&url, EVENT_STREAM_CONTENT_TYPE, body).await?;
        Ok(frame_stream(resp.bytes_stream()))
    }
}
