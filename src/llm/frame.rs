use serde::Deserialize;

/// One decoded streaming frame from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Start,
    Delta(String),
    Stop,
    /// Metadata, unrecognised or undecodable frames.
    Unknown,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<RawDelta>,
}

#[derive(Deserialize)]
struct RawDelta {
    #[serde(default)]
    text: Option<String>,
}

impl StreamFrame {
    /// Decode a frame's JSON payload.  Never fails: anything unexpected is
    /// [`StreamFrame::Unknown`].
    pub fn decode(bytes: &[u8]) -> Self {
        let Ok(raw) = serde_json::from_slice::<RawFrame>(bytes) else {
            return StreamFrame::Unknown;
        };
        match raw.kind.as_str() {
            "message_start" | "content_block_start" => StreamFrame::Start,
            "content_block_stop" | "message_stop" => StreamFrame::Stop,
            "content_block_delta" => match raw.delta.and_then(|d| d.text) {
                Some(text) => StreamFrame::Delta(text),
                None => StreamFrame::Unknown,
            },
            _ => StreamFrame::Unknown,
        }
    }

    /// The text fragment to forward, if this frame carries one.
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamFrame::Delta(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}
