use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The template store could not be listed or read, or returned keys
    /// outside the requested prefix.
    #[error("template error: {0}")]
    Template(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("stream error: {0}")]
    Stream(String),

    /// The caller's output channel went away mid-stream.
    #[error("response sink closed")]
    SinkClosed,
}

pub type Result<T> = std::result::Result<T, GatewayError>;
