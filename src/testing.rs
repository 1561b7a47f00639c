//! In-process fakes for the device, network and decoder seams.
//!
//! Integration tests drive a real `VoiceClient` through these and observe
//! what it opened, sent and scheduled.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::audio::{CaptureBackend, CaptureConfig, CapturedBlock};
use crate::error::{ClientError, Result};
use crate::playback::{ChunkDecoder, CompressedChunk, DecodedAudio, PlaybackOutput};
use crate::transport::{Connector, Outbound, TransportEvent, TransportLink};

fn raise_peak(peak: &AtomicUsize, live: usize) {
    peak.fetch_max(live, Ordering::SeqCst);
}

/// How a fake device refuses to start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFailure {
    Permission,
    Device,
}

#[derive(Default)]
struct CaptureShared {
    live: AtomicUsize,
    peak: AtomicUsize,
    starts: AtomicUsize,
    failure: Mutex<Option<CaptureFailure>>,
    blocks: Mutex<Option<mpsc::Sender<CapturedBlock>>>,
}

/// Observer/controller for a `FakeCapture` after it moves into a pipeline
#[derive(Clone, Default)]
pub struct CaptureProbe {
    shared: Arc<CaptureShared>,
}

impl CaptureProbe {
    /// Devices currently open
    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Most devices ever open at once
    pub fn peak(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    /// Make every following start fail (or succeed again with `None`)
    pub fn set_failure(&self, failure: Option<CaptureFailure>) {
        *self.shared.failure.lock() = failure;
    }

    /// Deliver a block as if the device callback fired. False if not capturing.
    pub fn push(&self, block: CapturedBlock) -> bool {
        match self.shared.blocks.lock().as_ref() {
            Some(tx) => tx.try_send(block).is_ok(),
            None => false,
        }
    }

    /// Drop the block stream without stopping the device, as an unplug would
    pub fn disconnect(&self) {
        *self.shared.blocks.lock() = None;
    }

    /// Deliver `frames` full windows of a constant mono signal at 16 kHz
    pub fn push_windows(&self, frames: usize, window_size: usize, level: f32) -> bool {
        self.push(CapturedBlock {
            samples: vec![level; frames * window_size],
            sample_rate: 16000,
            channels: 1,
        })
    }
}

/// Capture backend that opens nothing and emits only what the probe pushes
pub struct FakeCapture {
    probe: CaptureProbe,
    capturing: bool,
}

impl FakeCapture {
    pub fn new() -> (Self, CaptureProbe) {
        let probe = CaptureProbe::default();
        (
            Self {
                probe: probe.clone(),
                capturing: false,
            },
            probe,
        )
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FakeCapture {
    async fn start(&mut self, config: &CaptureConfig) -> Result<mpsc::Receiver<CapturedBlock>> {
        let shared = &self.probe.shared;
        shared.starts.fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = *shared.failure.lock() {
            return Err(match failure {
                CaptureFailure::Permission => {
                    ClientError::Permission("access to the microphone was denied".to_string())
                }
                CaptureFailure::Device => ClientError::Device("no input device".to_string()),
            });
        }

        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        *shared.blocks.lock() = Some(tx);
        let live = shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        raise_peak(&shared.peak, live);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) {
        if !self.capturing {
            return;
        }
        self.capturing = false;
        *self.probe.shared.blocks.lock() = None;
        self.probe.shared.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "fake-capture"
    }
}

/// Server side of one fake transport
#[derive(Clone)]
pub struct ServerHandle {
    url: String,
    events: mpsc::Sender<TransportEvent>,
    received: Arc<Mutex<Vec<Outbound>>>,
    closed: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Text(text.into())).await;
    }

    pub async fn send_json(&self, value: serde_json::Value) {
        self.send_text(value.to_string()).await;
    }

    /// Server-initiated close
    pub async fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed(None)).await;
    }

    pub async fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error(reason.into())).await;
    }

    /// Binary frames the client wrote
    pub fn binary_frames(&self) -> Vec<Vec<u8>> {
        self.received
            .lock()
            .iter()
            .filter_map(|o| match o {
                Outbound::Binary(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether the client has closed this transport
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ConnectorShared {
    live: AtomicUsize,
    peak: AtomicUsize,
    attempts: AtomicUsize,
    stalled: AtomicBool,
    delay: Mutex<Option<Duration>>,
    failure: Mutex<Option<String>>,
    servers: Mutex<Vec<ServerHandle>>,
}

/// Connector whose transports are in-memory channels
#[derive(Clone, Default)]
pub struct FakeConnector {
    shared: Arc<ConnectorShared>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports currently open
    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Most transports ever open at once
    pub fn peak(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Delay every following open handshake
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.shared.delay.lock() = delay;
    }

    /// Make every following open fail with this reason (or succeed with `None`)
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.shared.failure.lock() = reason.map(str::to_string);
    }

    /// Transports opened from now on never read what the client sends and
    /// never acknowledge a close; their outbound queue holds 4 frames
    pub fn set_stalled(&self, stalled: bool) {
        self.shared.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Every transport opened so far, oldest first
    pub fn servers(&self) -> Vec<ServerHandle> {
        self.shared.servers.lock().clone()
    }

    pub fn last_server(&self) -> Option<ServerHandle> {
        self.shared.servers.lock().last().cloned()
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.shared.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.shared.failure.lock().clone();
        if let Some(reason) = failure {
            return Err(ClientError::Transport(reason));
        }

        let stalled = self.shared.stalled.load(Ordering::SeqCst);
        let depth = if stalled { 4 } else { 64 };
        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(depth);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(64);
        let server = ServerHandle {
            url: url.to_string(),
            events: in_tx.clone(),
            received: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };

        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        raise_peak(&self.shared.peak, live);
        self.shared.servers.lock().push(server.clone());

        let shared = Arc::clone(&self.shared);
        if stalled {
            tokio::spawn(async move {
                // Holds the queue unread until the client abandons the link.
                let _unread = out_rx;
                in_tx.closed().await;
                server.closed.store(true, Ordering::SeqCst);
                shared.live.fetch_sub(1, Ordering::SeqCst);
            });
        } else {
            tokio::spawn(async move {
                loop {
                    match out_rx.recv().await {
                        Some(Outbound::Close) | None => break,
                        Some(other) => server.received.lock().push(other),
                    }
                }
                server.closed.store(true, Ordering::SeqCst);
                shared.live.fetch_sub(1, Ordering::SeqCst);
                let _ = in_tx.send(TransportEvent::Closed(None)).await;
            });
        }

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[derive(Debug, Clone)]
struct DecodeScript {
    latency: Duration,
    /// Decoded duration in seconds, or `None` to fail
    duration: Option<f64>,
}

/// Decoder whose latency and result are scripted per chunk payload
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecoder {
    scripts: HashMap<Vec<u8>, DecodeScript>,
}

/// Sample rate of the silence a `ScriptedDecoder` produces
pub const SCRIPTED_RATE: u32 = 1000;

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `payload` decodes after `latency` into `duration` seconds of audio
    pub fn ok(mut self, payload: &[u8], latency: Duration, duration: f64) -> Self {
        self.scripts.insert(
            payload.to_vec(),
            DecodeScript {
                latency,
                duration: Some(duration),
            },
        );
        self
    }

    /// `payload` fails to decode after `latency`
    pub fn fail(mut self, payload: &[u8], latency: Duration) -> Self {
        self.scripts.insert(
            payload.to_vec(),
            DecodeScript {
                latency,
                duration: None,
            },
        );
        self
    }
}

#[async_trait::async_trait]
impl ChunkDecoder for ScriptedDecoder {
    async fn decode(&self, chunk: &CompressedChunk) -> Result<DecodedAudio> {
        let script = self
            .scripts
            .get(&chunk.bytes)
            .cloned()
            .ok_or_else(|| ClientError::Decode(format!("unscripted chunk {}", chunk.sequence)))?;

        tokio::time::sleep(script.latency).await;

        let duration = script
            .duration
            .ok_or_else(|| ClientError::Decode(format!("scripted failure for chunk {}", chunk.sequence)))?;
        let frames = (duration * SCRIPTED_RATE as f64).round() as usize;
        Ok(DecodedAudio {
            samples: vec![0.0; frames],
            sample_rate: SCRIPTED_RATE,
            channels: 1,
        })
    }
}

/// One placement on the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub start: f64,
    pub duration: f64,
    /// Output clock reading when the placement was made
    pub now: f64,
}

/// Output that records placements against tokio's (pausable) clock
#[derive(Debug)]
pub struct RecordingOutput {
    origin: tokio::time::Instant,
    placements: Mutex<Vec<Placement>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            placements: Mutex::new(Vec::new()),
        }
    }

    pub fn placements(&self) -> Vec<Placement> {
        self.placements.lock().clone()
    }
}

impl Default for RecordingOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackOutput for RecordingOutput {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn schedule(&self, audio: DecodedAudio, start_at: f64) -> Result<()> {
        let now = self.now();
        self.placements.lock().push(Placement {
            start: start_at,
            duration: audio.duration(),
            now,
        });
        Ok(())
    }
}
