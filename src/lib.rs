pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod session;
pub mod testing;
pub mod transport;
pub mod voices;

pub use audio::{encode_pcm16, AudioFrame, CaptureBackend, CaptureConfig, CapturePipeline, CpalMicrophone};
pub use client::{ClientHandle, ClientParts, ClientStatus, ConnectionState, RenderEvent, VoiceClient};
pub use config::Config;
pub use error::{ClientError, Result};
pub use http::{create_router, AppState};
pub use playback::{PlaybackScheduler, PlaybackStats};
pub use session::{JsonFileStore, Message, Sender, Session, SessionRegistry};
pub use transport::{Connector, WebSocketConnector};
pub use voices::{Voice, VoiceCatalog};
