use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Channel send error")]
    ChannelSend,

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("unknown step {step_id} in session {session_id}")]
    UnknownStep { session_id: String, step_id: String },

    #[error("catalog error: {0}")]
    Catalog(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
