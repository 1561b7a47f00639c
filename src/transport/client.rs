use futures::{SinkExt, StreamExt};
use reqwest::Url;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::messages::{Outbound, TransportEvent};
use crate::error::{ClientError, Result};

/// Parameters bound to a connection when it is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub persona: String,
    pub voice: String,
    /// Optional API tokens, forwarded as extra query parameters
    pub credentials: BTreeMap<String, String>,
}

/// Build the WebSocket URL for one connection.
///
/// `persona` and `voice` are always present; credentials with empty values are skipped.
pub fn endpoint_url(endpoint: &str, params: &ConnectionParams) -> Result<String> {
    let mut pairs: Vec<(&str, &str)> = vec![
        ("persona", params.persona.as_str()),
        ("voice", params.voice.as_str()),
    ];
    for (key, token) in &params.credentials {
        if !token.trim().is_empty() && key != "persona" && key != "voice" {
            pairs.push((key.as_str(), token.as_str()));
        }
    }

    let url = Url::parse_with_params(endpoint, &pairs)
        .map_err(|e| ClientError::Config(format!("invalid transport endpoint {}: {}", endpoint, e)))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url.to_string()),
        other => Err(ClientError::Config(format!(
            "transport endpoint must be ws:// or wss://, got {}://",
            other
        ))),
    }
}

/// An open duplex channel, as a pair of queues
pub struct TransportLink {
    pub outbound: mpsc::Sender<Outbound>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

impl TransportLink {
    /// Request close and wait (bounded) for the peer to acknowledge it.
    ///
    /// The whole exchange, including queueing the close request behind a full
    /// outbound queue, shares one deadline. Returns within `timeout` even when
    /// the peer has stopped reading.
    pub async fn close(self, timeout: Duration) {
        let TransportLink {
            outbound,
            mut inbound,
        } = self;

        let ack = tokio::time::timeout(timeout, async move {
            if outbound.send(Outbound::Close).await.is_err() {
                debug!("Transport writer already gone");
            }
            drop(outbound);
            while let Some(event) = inbound.recv().await {
                if matches!(event, TransportEvent::Closed(_) | TransportEvent::Error(_)) {
                    break;
                }
            }
        })
        .await;

        // On timeout the link is dropped here; its tasks observe the closed
        // inbound queue and release the connection.
        if ack.is_err() {
            warn!("Transport close was not acknowledged within {:?}, abandoning", timeout);
        }
    }
}

/// Opens transports; the seam between the state machine and the network
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<TransportLink>;
}

/// WebSocket connector built on tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    /// Outbound queue capacity; frames beyond it are dropped by the sender
    queue_depth: usize,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self { queue_depth: 32 }
    }

    pub fn with_queue_depth(queue_depth: usize) -> Self {
        Self {
            queue_depth: queue_depth.max(1),
        }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink> {
        info!("Connecting to {}", redact_query(url));

        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ClientError::Transport(format!("failed to connect: {}", e)))?;

        info!("WebSocket connected");

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(self.queue_depth);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(self.queue_depth);

        let writer_gone = in_tx.clone();
        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                let message = match outbound {
                    Outbound::Binary(bytes) => Message::Binary(bytes),
                    Outbound::Close => break,
                };
                // A stalled peer must not pin the writer once the link is dropped.
                let result = tokio::select! {
                    result = sink.send(message) => result,
                    _ = writer_gone.closed() => return,
                };
                if let Err(e) = result {
                    debug!("WebSocket write failed: {}", e);
                    return;
                }
            }
            // Sends a close frame; the reader observes the peer's reply.
            tokio::select! {
                result = sink.close() => {
                    if let Err(e) = result {
                        debug!("WebSocket close failed: {}", e);
                    }
                }
                _ = writer_gone.closed() => {}
            }
        });

        tokio::spawn(async move {
            let mut terminal = TransportEvent::Closed(None);
            loop {
                let item = tokio::select! {
                    item = stream.next() => item,
                    _ = in_tx.closed() => return,
                };
                let event = match item {
                    Some(Ok(Message::Text(text))) => TransportEvent::Text(text),
                    Some(Ok(Message::Binary(bytes))) => TransportEvent::Binary(bytes),
                    Some(Ok(Message::Close(frame))) => {
                        terminal = TransportEvent::Closed(frame.map(|f| f.reason.to_string()));
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        terminal = TransportEvent::Error(e.to_string());
                        break;
                    }
                    None => break,
                };
                if in_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = in_tx.send(terminal).await;
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Strip query values (credentials) from a URL before logging it
pub fn redact_query(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let keys: Vec<String> = parsed.query_pairs().map(|(k, _)| k.into_owned()).collect();
            if keys.is_empty() {
                return parsed.to_string();
            }
            parsed.set_query(None);
            format!("{}?{}", parsed, keys.join("&"))
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams {
            persona: "friendly".to_string(),
            voice: "en-IN-isha".to_string(),
            credentials: BTreeMap::new(),
        }
    }

    #[test]
    fn test_endpoint_carries_persona_and_voice() {
        let url = endpoint_url("ws://127.0.0.1:8000/ws", &params()).unwrap();
        assert_eq!(url, "ws://127.0.0.1:8000/ws?persona=friendly&voice=en-IN-isha");
    }

    #[test]
    fn test_endpoint_appends_non_empty_credentials() {
        let mut p = params();
        p.credentials.insert("gemini".to_string(), "g 1".to_string());
        p.credentials.insert("murf".to_string(), String::new());
        let url = endpoint_url("wss://agent.example/ws", &p).unwrap();
        assert!(url.contains("gemini=g+1"));
        assert!(!url.contains("murf"));
    }

    #[test]
    fn test_endpoint_rejects_http_scheme() {
        assert!(matches!(
            endpoint_url("http://127.0.0.1:8000/ws", &params()),
            Err(ClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_bounded_when_outbound_queue_is_full() {
        let (outbound, _unread) = mpsc::channel(1);
        let (_events, inbound) = mpsc::channel(1);
        outbound.try_send(Outbound::Binary(vec![0; 4])).unwrap();

        let link = TransportLink { outbound, inbound };
        let started = tokio::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(2), link.close(Duration::from_millis(100)))
            .await
            .expect("close blocked behind a full queue");
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_close_returns_on_acknowledgment() {
        let (outbound, mut server_rx) = mpsc::channel(4);
        let (events, inbound) = mpsc::channel(4);
        tokio::spawn(async move {
            if let Some(Outbound::Close) = server_rx.recv().await {
                let _ = events.send(TransportEvent::Closed(None)).await;
            }
        });

        let link = TransportLink { outbound, inbound };
        let started = tokio::time::Instant::now();
        link.close(Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_redact_query_hides_tokens() {
        let redacted = redact_query("ws://h/ws?persona=friendly&gemini=secret");
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("gemini"));
    }
}
