use serde::Serialize;
use std::fmt;

use crate::playback::PlaybackStats;
use crate::session::{Message, SessionSummary};

/// Lifecycle of the single voice connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Streaming,
    Closing,
}

impl ConnectionState {
    /// Whether outbound frames may be written
    pub fn accepts_frames(self) -> bool {
        self == ConnectionState::Streaming
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Notification for whatever renders the conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RenderEvent {
    MessageAppended {
        session_id: String,
        message: Message,
    },
    HistoryChanged {
        sessions: Vec<SessionSummary>,
    },
    ActiveSessionChanged {
        session_id: String,
        messages: Vec<Message>,
    },
    ConnectionStateChanged {
        state: ConnectionState,
    },
    /// Non-fatal problem to show the user
    Notice {
        message: String,
    },
}

/// Point-in-time view of the client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatus {
    pub state: ConnectionState,
    pub active_session: String,
    pub persona: String,
    pub voice: String,
    /// Frames written to the current or previous transports
    pub frames_sent: u64,
    /// Frames dropped because no transport was accepting writes
    pub frames_dropped: u64,
    pub playback: PlaybackStats,
}
