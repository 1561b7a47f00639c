use thiserror::Error;

/// All errors produced by the voice client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Microphone access was denied by the OS.
    #[error("microphone permission denied: {0}")]
    Permission(String),

    /// Capture or playback device is missing or unusable.
    #[error("audio device error: {0}")]
    Device(String),

    /// Transport failed to open, failed mid-stream, or closed unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single compressed chunk could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// An inbound message could not be parsed.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("conversation store error: {0}")]
    Store(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("cannot delete the active conversation {0}; start a new one first")]
    ActiveSessionDeletion(String),

    /// The client task has shut down and no longer accepts commands.
    #[error("client is not running")]
    ClientStopped,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
