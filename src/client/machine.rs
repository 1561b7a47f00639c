use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handle::{ClientEvent, ClientHandle, Command, ConnectResult};
use super::state::{ClientStatus, ConnectionState, RenderEvent};
use crate::audio::{AudioFrame, CapturePipeline};
use crate::config::TransportConfig;
use crate::error::{ClientError, Result};
use crate::playback::{PlaybackScheduler, PlaybackStats};
use crate::session::{Message, SessionRegistry};
use crate::transport::{
    decode_audio_payload, endpoint_url, parse_server_message, ConnectionParams, Connector,
    Outbound, ServerMessage, TransportEvent, TransportLink,
};

/// Collaborators the client takes ownership of
pub struct ClientParts {
    pub capture: CapturePipeline,
    pub playback: PlaybackScheduler,
    pub registry: SessionRegistry,
    pub connector: Arc<dyn Connector>,
    pub transport: TransportConfig,
}

/// A connect attempt that has not been adopted yet
struct PendingConnect {
    generation: u64,
    task: JoinHandle<()>,
    result: oneshot::Receiver<ConnectResult>,
}

/// The open transport, with its inbound side owned by a forwarding task
struct ActiveLink {
    outbound: mpsc::Sender<Outbound>,
    stop: oneshot::Sender<()>,
    forwarder: JoinHandle<mpsc::Receiver<TransportEvent>>,
}

/// Voice client dispatcher.
///
/// Single owner of the connection state, the capture pipeline, the transport
/// and the session registry. Everything reaches it through one event queue,
/// so no two handlers ever run concurrently. Each connection attempt gets a
/// new generation; events tagged with an older generation are discarded.
pub struct VoiceClient {
    state: ConnectionState,
    generation: u64,
    persona: String,
    voice: String,
    capture: CapturePipeline,
    playback: Option<PlaybackScheduler>,
    registry: SessionRegistry,
    connector: Arc<dyn Connector>,
    transport: TransportConfig,
    pending: Option<PendingConnect>,
    link: Option<ActiveLink>,
    frames_sent: u64,
    frames_dropped: u64,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    render: mpsc::UnboundedSender<RenderEvent>,
}

impl VoiceClient {
    /// Start the dispatcher task.
    ///
    /// Returns the command handle and the ordered stream of render events.
    /// The first events describe the history and the active session.
    pub fn spawn(parts: ClientParts) -> (ClientHandle, mpsc::UnboundedReceiver<RenderEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (render_tx, render_rx) = mpsc::unbounded_channel();

        let (persona, voice) = match parts.registry.active() {
            Some(session) => (session.persona.clone(), session.voice.clone()),
            None => (String::new(), String::new()),
        };

        let client = VoiceClient {
            state: ConnectionState::Idle,
            generation: 0,
            persona,
            voice,
            capture: parts.capture,
            playback: Some(parts.playback),
            registry: parts.registry,
            connector: parts.connector,
            transport: parts.transport,
            pending: None,
            link: None,
            frames_sent: 0,
            frames_dropped: 0,
            events_tx: events_tx.clone(),
            render: render_tx,
        };

        client.emit_history();
        client.emit_active_session();

        tokio::spawn(client.run(events_rx));
        (ClientHandle::new(events_tx), render_rx)
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<ClientEvent>) {
        info!(
            "Voice client started (persona={}, voice={}, session={})",
            self.persona,
            self.voice,
            self.registry.active_id()
        );

        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Command(command) => {
                    if !self.handle_command(command).await {
                        info!("Voice client stopped");
                        return;
                    }
                }
                ClientEvent::TransportReady { generation } => {
                    self.handle_transport_ready(generation).await
                }
                ClientEvent::Transport { generation, event } => {
                    self.handle_transport_event(generation, event).await
                }
                ClientEvent::Frame { generation, frame } => self.handle_frame(generation, frame),
                ClientEvent::CaptureEnded { generation } => {
                    self.handle_capture_ended(generation).await
                }
            }
        }
    }

    /// Returns false once the client has shut down
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::StartCapture(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::StopCapture(reply) => {
                self.teardown().await;
                let _ = reply.send(());
            }
            Command::SetPersona(persona, reply) => {
                if persona != self.persona {
                    self.rebind(persona, self.voice.clone()).await;
                }
                let _ = reply.send(());
            }
            Command::SetVoice(voice, reply) => {
                if voice != self.voice {
                    self.rebind(self.persona.clone(), voice).await;
                }
                let _ = reply.send(());
            }
            Command::NewSession(reply) => {
                self.teardown().await;
                let id = self
                    .registry
                    .create_bound(self.persona.clone(), self.voice.clone());
                self.emit_history();
                self.emit_active_session();
                let _ = reply.send(id);
            }
            Command::SelectSession(id, reply) => {
                let result = self.select(&id).await;
                let _ = reply.send(result);
            }
            Command::DeleteSession(id, reply) => {
                let result = self.registry.delete_session(&id);
                if matches!(result, Ok(true)) {
                    self.emit_history();
                }
                let _ = reply.send(result);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::ListSessions(reply) => {
                let _ = reply.send(self.registry.summaries());
            }
            Command::GetSession(id, reply) => {
                let _ = reply.send(self.registry.get(&id).cloned());
            }
            Command::Shutdown(reply) => {
                let stats = self.shutdown().await;
                let _ = reply.send(stats);
                return false;
            }
        }
        true
    }

    /// idle → connecting. Any live connection is torn down first.
    async fn start(&mut self) -> Result<()> {
        if self.state != ConnectionState::Idle || self.capture.needs_stop() {
            info!("Start requested while {}, restarting", self.state);
            self.teardown().await;
        }

        let params = ConnectionParams {
            persona: self.persona.clone(),
            voice: self.voice.clone(),
            credentials: self.transport.credentials.clone(),
        };
        let url = match endpoint_url(&self.transport.endpoint, &params) {
            Ok(url) => url,
            Err(e) => {
                self.notice(format!("Cannot connect: {}", e));
                return Err(e);
            }
        };

        self.generation += 1;
        let generation = self.generation;
        self.set_state(ConnectionState::Connecting);

        // Transport open and device acquisition proceed concurrently.
        self.pending = Some(self.spawn_connect(generation, url));

        let events = self.events_tx.clone();
        let sink = Box::new(move |frame: AudioFrame| {
            let _ = events.send(ClientEvent::Frame { generation, frame });
        });
        let events = self.events_tx.clone();
        let on_end = Box::new(move || {
            let _ = events.send(ClientEvent::CaptureEnded { generation });
        });

        if let Err(e) = self.capture.start(sink, on_end).await {
            error!("Capture failed to start: {}", e);
            self.notice(e.to_string());
            self.teardown().await;
            return Err(e);
        }

        info!("Capture started on {}", self.capture.backend_name());
        Ok(())
    }

    fn spawn_connect(&self, generation: u64, url: String) -> PendingConnect {
        let connector = Arc::clone(&self.connector);
        let events = self.events_tx.clone();
        let (result_tx, result_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let result = connector.connect(&url).await;
            let _ = result_tx.send(result);
            let _ = events.send(ClientEvent::TransportReady { generation });
        });

        PendingConnect {
            generation,
            task,
            result: result_rx,
        }
    }

    /// connecting → streaming, or back to idle if the open failed
    async fn handle_transport_ready(&mut self, generation: u64) {
        let current = matches!(&self.pending, Some(p) if p.generation == generation)
            && generation == self.generation
            && self.state == ConnectionState::Connecting;
        if !current {
            debug!("Ignoring stale transport open (generation {})", generation);
            return;
        }

        let Some(mut pending) = self.pending.take() else {
            return;
        };

        match pending.result.try_recv() {
            Ok(Ok(link)) => {
                self.link = Some(self.adopt(generation, link));
                self.set_state(ConnectionState::Streaming);
            }
            Ok(Err(e)) => {
                error!("Transport failed to open: {}", e);
                self.notice(e.to_string());
                self.teardown().await;
            }
            Err(_) => {
                warn!("Connect task ended without a result");
                self.notice("Connection attempt was lost".to_string());
                self.teardown().await;
            }
        }
    }

    fn adopt(&self, generation: u64, link: TransportLink) -> ActiveLink {
        let TransportLink {
            outbound,
            mut inbound,
        } = link;
        let events = self.events_tx.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let forwarder = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    event = inbound.recv() => {
                        let event = event.unwrap_or(TransportEvent::Closed(None));
                        let terminal =
                            matches!(event, TransportEvent::Closed(_) | TransportEvent::Error(_));
                        let _ = events.send(ClientEvent::Transport { generation, event });
                        if terminal {
                            break;
                        }
                    }
                }
            }
            inbound
        });

        ActiveLink {
            outbound,
            stop: stop_tx,
            forwarder,
        }
    }

    async fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || self.state != ConnectionState::Streaming {
            debug!("Ignoring transport event from generation {}", generation);
            return;
        }

        match event {
            TransportEvent::Text(text) => self.handle_server_text(&text),
            TransportEvent::Binary(bytes) => {
                debug!("Ignoring {} unexpected binary bytes from server", bytes.len())
            }
            TransportEvent::Closed(reason) => {
                info!(
                    "Server closed the connection{}",
                    reason.map(|r| format!(": {}", r)).unwrap_or_default()
                );
                self.notice("Connection closed".to_string());
                self.teardown().await;
            }
            TransportEvent::Error(e) => {
                let err = ClientError::Transport(e);
                error!("{}", err);
                self.notice(err.to_string());
                self.teardown().await;
            }
        }
    }

    fn handle_server_text(&mut self, text: &str) {
        let message = match parse_server_message(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring inbound message: {}", e);
                return;
            }
        };

        match message {
            ServerMessage::Transcription { text } => self.append(Message::user(text)),
            ServerMessage::LlmChunk { data } => self.append(Message::assistant(data)),
            ServerMessage::Audio { data } => match decode_audio_payload(&data) {
                Ok(bytes) => {
                    if let Some(playback) = &self.playback {
                        playback.enqueue(bytes);
                    }
                }
                Err(e) => warn!("Ignoring audio message: {}", e),
            },
            ServerMessage::Error { message } => {
                warn!("Server reported an error: {}", message);
                self.notice(message);
            }
            ServerMessage::Unknown => debug!("Ignoring message of unknown type"),
        }
    }

    fn append(&mut self, message: Message) {
        let session_id = self.registry.active_id().to_string();
        match self.registry.append_message(&session_id, message.clone()) {
            Ok(outcome) => {
                self.emit(RenderEvent::MessageAppended {
                    session_id,
                    message,
                });
                if outcome.title_changed {
                    self.emit_history();
                }
            }
            Err(e) => error!("Failed to record message: {}", e),
        }
    }

    fn handle_frame(&mut self, generation: u64, frame: AudioFrame) {
        let link = match &self.link {
            Some(link) if generation == self.generation && self.state.accepts_frames() => link,
            _ => {
                self.frames_dropped += 1;
                return;
            }
        };

        match link.outbound.try_send(Outbound::Binary(frame.pcm)) {
            Ok(()) => self.frames_sent += 1,
            Err(TrySendError::Full(_)) => {
                self.frames_dropped += 1;
                debug!("Transport busy, dropped frame {}", frame.sequence);
            }
            Err(TrySendError::Closed(_)) => {
                self.frames_dropped += 1;
                debug!("Transport gone, dropped frame {}", frame.sequence);
            }
        }
    }

    /// Persona/voice bind at open time, so a change ends the live connection
    async fn rebind(&mut self, persona: String, voice: String) {
        if self.state != ConnectionState::Idle || self.capture.needs_stop() {
            info!("Persona/voice changed while {}, stopping", self.state);
            self.teardown().await;
        }

        self.persona = persona;
        self.voice = voice;
        let active = self.registry.active_id().to_string();
        if let Err(e) = self.registry.bind_voice(&active, &self.persona, &self.voice) {
            warn!("Could not rebind session {}: {}", active, e);
        }
        info!("Now using persona={} voice={}", self.persona, self.voice);
        self.emit_history();
    }

    async fn select(&mut self, id: &str) -> Result<()> {
        if self.registry.get(id).is_none() {
            return Err(ClientError::SessionNotFound(id.to_string()));
        }
        if id == self.registry.active_id() {
            return Ok(());
        }

        self.teardown().await;
        self.registry.select_session(id)?;
        if let Some(session) = self.registry.active() {
            self.persona = session.persona.clone();
            self.voice = session.voice.clone();
        }
        self.emit_history();
        self.emit_active_session();
        Ok(())
    }

    /// The device went away mid-session; nothing more can be streamed
    async fn handle_capture_ended(&mut self, generation: u64) {
        if generation != self.generation || self.state == ConnectionState::Idle {
            debug!("Ignoring capture end from generation {}", generation);
            return;
        }
        warn!("Microphone stopped delivering audio");
        self.notice("Microphone disconnected; capture stopped".to_string());
        self.teardown().await;
    }

    /// Return to idle from any state. Never fails; releases the device and
    /// closes (or abandons) any transport.
    async fn teardown(&mut self) {
        let has_resources =
            self.pending.is_some() || self.link.is_some() || self.capture.needs_stop();
        if self.state == ConnectionState::Idle && !has_resources {
            return;
        }

        self.generation += 1;
        self.set_state(ConnectionState::Closing);

        if let Some(pending) = self.pending.take() {
            pending.task.abort();
            let _ = pending.task.await;
            let mut result = pending.result;
            if let Ok(Ok(link)) = result.try_recv() {
                info!("Closing transport that opened after it was abandoned");
                link.close(self.transport.close_timeout()).await;
            }
        }

        self.capture.stop().await;

        if let Some(link) = self.link.take() {
            let _ = link.stop.send(());
            match link.forwarder.await {
                Ok(inbound) => {
                    TransportLink {
                        outbound: link.outbound,
                        inbound,
                    }
                    .close(self.transport.close_timeout())
                    .await;
                }
                Err(e) => {
                    warn!("Transport forwarder failed: {}", e);
                    let _ = link.outbound.try_send(Outbound::Close);
                }
            }
        }

        self.set_state(ConnectionState::Idle);
    }

    async fn shutdown(&mut self) -> PlaybackStats {
        info!("Shutting down voice client");
        self.teardown().await;
        match self.playback.take() {
            Some(playback) => playback.shutdown().await,
            None => PlaybackStats::default(),
        }
    }

    fn status(&self) -> ClientStatus {
        ClientStatus {
            state: self.state,
            active_session: self.registry.active_id().to_string(),
            persona: self.persona.clone(),
            voice: self.voice.clone(),
            frames_sent: self.frames_sent,
            frames_dropped: self.frames_dropped,
            playback: self
                .playback
                .as_ref()
                .map(PlaybackScheduler::stats)
                .unwrap_or_default(),
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!("Connection {} -> {}", self.state, state);
        self.state = state;
        self.emit(RenderEvent::ConnectionStateChanged { state });
    }

    fn notice(&self, message: String) {
        self.emit(RenderEvent::Notice { message });
    }

    fn emit_history(&self) {
        self.emit(RenderEvent::HistoryChanged {
            sessions: self.registry.summaries(),
        });
    }

    fn emit_active_session(&self) {
        let messages = self
            .registry
            .active()
            .map(|s| s.messages.clone())
            .unwrap_or_default();
        self.emit(RenderEvent::ActiveSessionChanged {
            session_id: self.registry.active_id().to_string(),
            messages,
        });
    }

    fn emit(&self, event: RenderEvent) {
        let _ = self.render.send(event);
    }
}
