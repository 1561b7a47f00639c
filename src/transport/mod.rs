pub mod client;
pub mod messages;

pub use client::{endpoint_url, ConnectionParams, Connector, TransportLink, WebSocketConnector};
pub use messages::{decode_audio_payload, parse_server_message, Outbound, ServerMessage, TransportEvent};
