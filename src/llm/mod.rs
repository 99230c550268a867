pub mod bedrock;
pub mod context;
pub mod eventstream;
pub mod frame;
pub mod prompts;

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chat::{ChatRequest, ChatResponse};
use crate::config::{env_or, Config};
use crate::error::{GatewayError, Result};
use crate::relay::{self, RelayOutcome, ResponseSink};
use crate::template::TemplateLoader;

pub use bedrock::BedrockProvider;
pub use context::FileContext;
pub use eventstream::FrameStream;
pub use frame::StreamFrame;
pub use prompts::PromptMessage;

// -- Provider trait ---------------------------------------------------------

/// A hosted model endpoint.  One instance is shared process-wide.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable name of this provider, used in logs.
    fn name(&self) -> &str;

    /// Send `body` and wait for the complete response.
    async fn invoke(&self, model_id: &str, body: Bytes) -> Result<InvokeResponse>;

    /// Send `body` and return the model's frames as they arrive.
    async fn invoke_stream(&self, model_id: &str, body: Bytes) -> Result<FrameStream>;
}

// -- Wire types -------------------------------------------------------------

/// Request body sent to the model, identical for unary and streaming calls.
#[derive(Debug, Clone, Serialize)]
pub struct InvokeBody {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub messages: Vec<PromptMessage>,
}

impl InvokeBody {
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvokeResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(default)]
    pub text: Option<String>,
}

impl InvokeResponse {
    /// Text of the first content element, if it is textual.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|b| b.text.as_deref())
    }
}

// -- ModelInvoker -----------------------------------------------------------

/// Prompt assembly plus unary/streaming invocation for one model.
///
/// Cheap to clone; the provider and template handles are shared.
#[derive(Clone)]
pub struct ModelInvoker {
    provider: Arc<dyn ModelProvider>,
    templates: TemplateLoader,
    model_id: String,
    anthropic_version: String,
    max_tokens: u32,
}

impl ModelInvoker {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        templates: TemplateLoader,
        model_id: impl Into<String>,
        anthropic_version: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            templates,
            model_id: model_id.into(),
            anthropic_version: anthropic_version.into(),
            max_tokens,
        }
    }

    /// Build from config.  `BEDROCK_MODEL_ID` overrides `llm.model_id`.
    pub fn from_config(config: &Config, provider: Arc<dyn ModelProvider>, templates: TemplateLoader) -> Self {
        let model_id = env_or("BEDROCK_MODEL_ID", &config.llm.model_id)
            .unwrap_or_else(|| config.llm.model_id.clone());

        info!(
            provider = provider.name(),
            model = %model_id,
            max_tokens = config.llm.max_tokens,
            system_prompt = prompts::SYSTEM_PROMPT_VERSION,
            "model invoker ready"
        );

        Self::new(
            provider,
            templates,
            model_id,
            config.llm.anthropic_version.clone(),
            config.llm.max_tokens,
        )
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn templates(&self) -> &TemplateLoader {
        &self.templates
    }

    /// Select context and assemble the request body.
    ///
    /// Template fetch failures surface here, before any output exists.
    pub async fn prepare(&self, request: &ChatRequest) -> Result<InvokeBody> {
        let context = context::select_context(request, &self.templates).await?;
        let messages = prompts::assemble(&request.messages, &context);

        debug!(
            project_id = %request.project_id,
            messages = messages.len(),
            context = context.kind(),
            "prompt assembled"
        );

        Ok(InvokeBody {
            anthropic_version: self.anthropic_version.clone(),
            max_tokens: self.max_tokens,
            messages,
        })
    }

    /// Unary mode: one call, whole answer.  No retry.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.prepare(request).await?;
        let response = self.provider.invoke(&self.model_id, body.encode()?).await?;

        let text = response
            .first_text()
            .ok_or_else(|| GatewayError::Provider("response has no text content".into()))?
            .to_string();

        info!(
            project_id = %request.project_id,
            response_len = text.len(),
            "model response received"
        );

        Ok(ChatResponse::assistant(text))
    }

    /// Open the streaming call for an already prepared body.
    pub async fn open_stream(&self, body: &InvokeBody) -> Result<FrameStream> {
        self.provider.invoke_stream(&self.model_id, body.encode()?).await
    }

    /// Streaming mode: relay the model's output into `sink`.
    ///
    /// Everything, including preparation failures, is reported in-band;
    /// callers that need a structured error for preparation should call
    /// [`prepare`](Self::prepare) first and then [`relay`](Self::relay).
    pub async fn stream<S: ResponseSink>(&self, request: &ChatRequest, sink: &mut S) -> RelayOutcome {
        let open = async {
            let body = self.prepare(request).await?;
            self.open_stream(&body).await
        };
        relay::relay(sink, open).await
    }

    /// Relay a prepared body into `sink`.
    pub async fn relay<S: ResponseSink>(&self, body: InvokeBody, sink: &mut S) -> RelayOutcome {
        relay::relay(sink, async move { self.open_stream(&body).await }).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use futures::stream;

    use crate::chat::{Message, Role};
    use crate::relay::tests::RecordingSink;
    use crate::relay::FILLER_TOKEN;
    use crate::template::tests::MemorySource;

    /// Provider returning scripted results and recording every body sent.
    pub(crate) struct ScriptedProvider {
        pub reply: std::result::Result<String, String>,
        pub frames: Vec<std::result::Result<StreamFrame, String>>,
        pub bodies: StdMutex<Vec<(String, Bytes)>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(reply: &str, frames: Vec<std::result::Result<StreamFrame, String>>) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                frames,
                bodies: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, model_id: &str, body: Bytes) -> Result<InvokeResponse> {
            self.bodies.lock().unwrap().push((model_id.to_string(), body));
            match &self.reply {
                Ok(text) => Ok(serde_json::from_value(serde_json::json!({
                    "content": [{"type": "text", "text": text}]
                }))?),
                Err(e) => Err(GatewayError::Provider(e.clone())),
            }
        }

        async fn invoke_stream(&self, model_id: &str, body: Bytes) -> Result<FrameStream> {
            self.bodies.lock().unwrap().push((model_id.to_string(), body));
            let frames: Vec<Result<StreamFrame>> = self
                .frames
                .iter()
                .cloned()
                .map(|f| f.map_err(GatewayError::Stream))
                .collect();
            Ok(Box::pin(stream::iter(frames)))
        }
    }

    pub(crate) fn templates() -> TemplateLoader {
        TemplateLoader::new(
            Arc::new(MemorySource::with(&[("tpl/app/main.tsx", "main")])),
            "bucket",
            "tpl/",
        )
    }

    fn invoker(provider: Arc<ScriptedProvider>) -> ModelInvoker {
        ModelInvoker::new(provider, templates(), "test-model", "bedrock-2023-05-31", 32000)
    }

    fn request(is_first_prompt: bool) -> ChatRequest {
        ChatRequest {
            messages: vec![Message {
                id: "1".into(),
                role: Role::User,
                content: "build a landing page".into(),
            }],
            is_first_prompt,
            project_id: "p".into(),
            project_files: None,
        }
    }

    #[test]
    fn first_text_takes_first_block() {
        let resp: InvokeResponse = serde_json::from_str(r#"{"content":[{"text":"a"},{"text":"b"}]}"#).unwrap();
        assert_eq!(resp.first_text(), Some("a"));
        assert_eq!(InvokeResponse::default().first_text(), None);
    }

    #[tokio::test]
    async fn complete_returns_assistant_response() {
        let provider = Arc::new(ScriptedProvider::new("Done", vec![]));
        let resp = invoker(provider.clone()).complete(&request(false)).await.unwrap();
        assert_eq!(resp.content, "Done");
        assert_eq!(resp.role, Role::Assistant);
        assert!(!resp.id.is_empty());

        let bodies = provider.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].0, "test-model");
        let body: serde_json::Value = serde_json::from_slice(&bodies[0].1).unwrap();
        assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(body["max_tokens"], 32000);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn complete_surfaces_provider_failure_without_retry() {
        let mut provider = ScriptedProvider::new("", vec![]);
        provider.reply = Err("throttled".into());
        let provider = Arc::new(provider);
        let err = invoker(provider.clone()).complete(&request(false)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Provider(_)));
        assert_eq!(provider.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn complete_rejects_response_without_text() {
        struct Empty;
        #[async_trait::async_trait]
        impl ModelProvider for Empty {
            fn name(&self) -> &str {
                "empty"
            }
            async fn invoke(&self, _: &str, _: Bytes) -> Result<InvokeResponse> {
                Ok(InvokeResponse::default())
            }
            async fn invoke_stream(&self, _: &str, _: Bytes) -> Result<FrameStream> {
                Ok(Box::pin(stream::empty::<Result<StreamFrame>>()))
            }
        }
        let invoker = ModelInvoker::new(Arc::new(Empty), templates(), "m", "v", 1);
        assert!(invoker.complete(&request(false)).await.is_err());
    }

    #[tokio::test]
    async fn unary_and_streaming_send_identical_bodies() {
        let provider = Arc::new(ScriptedProvider::new("x", vec![]));
        let inv = invoker(provider.clone());
        inv.complete(&request(true)).await.unwrap();
        let mut sink = RecordingSink::default();
        inv.stream(&request(true), &mut sink).await;

        let bodies = provider.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], bodies[1]);
        let text = String::from_utf8(bodies[0].1.to_vec()).unwrap();
        assert!(text.contains("Base template files:"));
    }

    #[tokio::test]
    async fn stream_relays_deltas() {
        let provider = Arc::new(ScriptedProvider::new(
            "",
            vec![Ok(StreamFrame::Start), Ok(StreamFrame::Delta("Hi".into())), Ok(StreamFrame::Stop)],
        ));
        let mut sink = RecordingSink::default();
        let outcome = invoker(provider).stream(&request(false), &mut sink).await;
        assert_eq!(outcome, RelayOutcome::Completed { fragments: 1 });
        assert_eq!(sink.writes, vec![FILLER_TOKEN.to_string(), "Hi".to_string()]);
        assert!(sink.closed);
    }

    #[tokio::test]
    async fn stream_reports_template_failure_in_band() {
        let mut source = MemorySource::with(&[]);
        source.fail = true;
        let loader = TemplateLoader::new(Arc::new(source), "b", "tpl/");
        let provider = Arc::new(ScriptedProvider::new("", vec![]));
        let inv = ModelInvoker::new(provider.clone(), loader, "m", "v", 1);

        let mut sink = RecordingSink::default();
        let outcome = inv.stream(&request(true), &mut sink).await;
        assert_eq!(outcome, RelayOutcome::Failed);
        assert_eq!(sink.writes.len(), 2);
        assert!(sink.writes[1].starts_with("Error: "));
        assert!(sink.closed);
        assert!(provider.bodies.lock().unwrap().is_empty());
    }
}
