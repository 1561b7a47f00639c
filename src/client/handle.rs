use tokio::sync::{mpsc, oneshot};

use super::state::ClientStatus;
use crate::audio::AudioFrame;
use crate::error::{ClientError, Result};
use crate::playback::PlaybackStats;
use crate::session::{Session, SessionSummary};
use crate::transport::{TransportEvent, TransportLink};

/// Request from a handle to the dispatcher
pub(crate) enum Command {
    StartCapture(oneshot::Sender<Result<()>>),
    StopCapture(oneshot::Sender<()>),
    SetPersona(String, oneshot::Sender<()>),
    SetVoice(String, oneshot::Sender<()>),
    NewSession(oneshot::Sender<String>),
    SelectSession(String, oneshot::Sender<Result<()>>),
    DeleteSession(String, oneshot::Sender<Result<bool>>),
    Status(oneshot::Sender<ClientStatus>),
    ListSessions(oneshot::Sender<Vec<SessionSummary>>),
    GetSession(String, oneshot::Sender<Option<Session>>),
    Shutdown(oneshot::Sender<PlaybackStats>),
}

/// Everything the dispatcher consumes, in arrival order
pub(crate) enum ClientEvent {
    Command(Command),
    /// A connect attempt finished; its result waits in the pending slot
    TransportReady { generation: u64 },
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    Frame { generation: u64, frame: AudioFrame },
    /// The microphone stopped delivering audio without being asked to
    CaptureEnded { generation: u64 },
}

/// Result slot filled by a connect task
pub(crate) type ConnectResult = Result<TransportLink>;

/// Cheap, cloneable front door to a running client
#[derive(Clone)]
pub struct ClientHandle {
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl ClientHandle {
    pub(crate) fn new(events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { events }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(ClientEvent::Command(make(tx)))
            .map_err(|_| ClientError::ClientStopped)?;
        rx.await.map_err(|_| ClientError::ClientStopped)
    }

    /// Begin capturing and open a transport. Resolves once the microphone
    /// is acquired; the transport may still be connecting.
    pub async fn start_capture(&self) -> Result<()> {
        self.request(Command::StartCapture).await?
    }

    /// Stop capture and close the transport. Safe from any state.
    pub async fn stop_capture(&self) -> Result<()> {
        self.request(Command::StopCapture).await
    }

    pub async fn set_persona(&self, persona: impl Into<String>) -> Result<()> {
        let persona = persona.into();
        self.request(|tx| Command::SetPersona(persona, tx)).await
    }

    pub async fn set_voice(&self, voice: impl Into<String>) -> Result<()> {
        let voice = voice.into();
        self.request(|tx| Command::SetVoice(voice, tx)).await
    }

    pub async fn new_session(&self) -> Result<String> {
        self.request(Command::NewSession).await
    }

    pub async fn select_session(&self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        self.request(|tx| Command::SelectSession(id, tx)).await?
    }

    pub async fn delete_session(&self, id: impl Into<String>) -> Result<bool> {
        let id = id.into();
        self.request(|tx| Command::DeleteSession(id, tx)).await?
    }

    pub async fn status(&self) -> Result<ClientStatus> {
        self.request(Command::Status).await
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        self.request(Command::ListSessions).await
    }

    pub async fn session(&self, id: impl Into<String>) -> Result<Option<Session>> {
        let id = id.into();
        self.request(|tx| Command::GetSession(id, tx)).await
    }

    /// Tear everything down and stop the dispatcher
    pub async fn shutdown(&self) -> Result<PlaybackStats> {
        self.request(Command::Shutdown).await
    }
}
