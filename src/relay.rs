//! Relays streamed model output into a caller-owned sink.

use std::future::Future;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::llm::FrameStream;

/// Written before the provider is contacted, to mask first-token latency.
pub const FILLER_TOKEN: &str = "Thinking...\n\n";

/// Destination for streamed text fragments.
///
/// Closing is the only end-of-output signal; there is no trailing marker.
#[async_trait::async_trait]
pub trait ResponseSink: Send {
    /// Write one fragment verbatim.  An error means the reader is gone.
    async fn write(&mut self, fragment: &str) -> Result<()>;

    /// Signal that no more fragments will follow.  Idempotent.
    async fn close(&mut self);
}

/// Sink feeding a bounded channel; the receiver typically backs an HTTP body.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<String>>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }
}

#[async_trait::async_trait]
impl ResponseSink for ChannelSink {
    async fn write(&mut self, fragment: &str) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(GatewayError::SinkClosed)?;
        tx.send(fragment.to_string())
            .await
            .map_err(|_| GatewayError::SinkClosed)
    }

    async fn close(&mut self) {
        self.tx.take();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The model stream ended normally.
    Completed { fragments: usize },
    /// The stream could not be opened or broke; an error fragment was sent.
    Failed,
    /// The sink stopped accepting output.
    Cancelled,
}

/// Relay one model response into `sink`.
///
/// Writes [`FILLER_TOKEN`], awaits `open`, then forwards every text delta in
/// arrival order.  Failures become a single `"Error: ..."` fragment; the sink
/// is always closed on return and nothing propagates past it.
pub async fn relay<S, F>(sink: &mut S, open: F) -> RelayOutcome
where
    S: ResponseSink + ?Sized,
    F: Future<Output = Result<FrameStream>>,
{
    if sink.write(FILLER_TOKEN).await.is_err() {
        warn!("sink closed before streaming started");
        sink.close().await;
        return RelayOutcome::Cancelled;
    }

    let mut frames = match open.await {
        Ok(frames) => frames,
        Err(e) => return fail(sink, e).await,
    };

    let mut fragments = 0;
    while let Some(item) = frames.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => return fail(sink, e).await,
        };
        let Some(text) = frame.text() else {
            debug!(?frame, "frame not forwarded");
            continue;
        };
        if sink.write(text).await.is_err() {
            warn!(fragments, "sink closed mid-stream, abandoning model stream");
            sink.close().await;
            return RelayOutcome::Cancelled;
        }
        fragments += 1;
    }

    sink.close().await;
    debug!(fragments, "stream relayed");
    RelayOutcome::Completed { fragments }
}

async fn fail<S: ResponseSink + ?Sized>(sink: &mut S, err: GatewayError) -> RelayOutcome {
    warn!(err = %err, "model stream failed");
    // Best effort: the reader may already be gone.
    let _ = sink.write(&format!("Error: {err}")).await;
    sink.close().await;
    RelayOutcome::Failed
}
