// Inbound message parsing, endpoint construction and the WebSocket connector

use base64::Engine;
use futures::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use voice_agent_client::transport::{
    decode_audio_payload, endpoint_url, parse_server_message, ConnectionParams, Connector,
    Outbound, ServerMessage, TransportEvent, WebSocketConnector,
};
use voice_agent_client::ClientError;

#[test]
fn test_known_message_types() {
    assert_eq!(
        parse_server_message(r#"{"type":"transcription","text":"hello"}"#).unwrap(),
        ServerMessage::Transcription {
            text: "hello".to_string()
        }
    );
    assert_eq!(
        parse_server_message(r#"{"type":"llm_chunk","data":"Hi"}"#).unwrap(),
        ServerMessage::LlmChunk {
            data: "Hi".to_string()
        }
    );
    assert_eq!(
        parse_server_message(r#"{"type":"error","message":"boom"}"#).unwrap(),
        ServerMessage::Error {
            message: "boom".to_string()
        }
    );
}

#[test]
fn test_unknown_type_is_not_an_error() {
    assert_eq!(
        parse_server_message(r#"{"type":"turn_end","extra":1}"#).unwrap(),
        ServerMessage::Unknown
    );
}

#[test]
fn test_malformed_messages() {
    for text in ["not json", r#"{"text":"no type"}"#, r#"{"type":"transcription"}"#] {
        assert!(
            matches!(parse_server_message(text), Err(ClientError::MalformedMessage(_))),
            "{} should be malformed",
            text
        );
    }
}

#[test]
fn test_audio_payload_accepts_data_url() {
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"\xff\xfb\x90\x00");
    assert_eq!(decode_audio_payload(&encoded).unwrap(), b"\xff\xfb\x90\x00");
    assert_eq!(
        decode_audio_payload(&format!("data:audio/mpeg;base64,{}", encoded)).unwrap(),
        b"\xff\xfb\x90\x00"
    );
    assert!(decode_audio_payload("data:audio/mpeg;base64,@@@").is_err());
}

#[test]
fn test_endpoint_url_includes_credentials() {
    let mut credentials = BTreeMap::new();
    credentials.insert("assembly".to_string(), "a-key".to_string());
    credentials.insert("news".to_string(), "  ".to_string());
    let params = ConnectionParams {
        persona: "pirate".to_string(),
        voice: "en-US-ken".to_string(),
        credentials,
    };

    let url = endpoint_url("ws://127.0.0.1:8000/ws", &params).unwrap();
    assert_eq!(
        url,
        "ws://127.0.0.1:8000/ws?persona=pirate&voice=en-US-ken&assembly=a-key"
    );
}

#[tokio::test]
async fn test_websocket_connector_round_trip() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut ws = tokio_tungstenite::accept_async(stream).await?;

        let mut received = 0usize;
        if let Some(Ok(Message::Binary(bytes))) = ws.next().await {
            received = bytes.len();
            ws.send(Message::Text(format!(
                r#"{{"type":"transcription","text":"got {} bytes"}}"#,
                received
            )))
            .await?;
        }
        while let Some(Ok(_)) = ws.next().await {}
        anyhow::Ok(received)
    });

    let url = format!("ws://{}/ws?persona=friendly&voice=en-IN-isha", addr);
    let mut link = WebSocketConnector::new().connect(&url).await?;

    link.outbound.send(Outbound::Binary(vec![0u8; 320])).await?;
    let event = tokio::time::timeout(Duration::from_secs(5), link.inbound.recv()).await?;
    assert_eq!(
        event,
        Some(TransportEvent::Text(
            r#"{"type":"transcription","text":"got 320 bytes"}"#.to_string()
        ))
    );

    link.close(Duration::from_secs(2)).await;
    let received = tokio::time::timeout(Duration::from_secs(5), server).await???;
    assert_eq!(received, 320);
    Ok(())
}

#[tokio::test]
async fn test_websocket_connector_reports_refused_connection() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let err = WebSocketConnector::new()
        .connect(&format!("ws://{}/ws", addr))
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, ClientError::Transport(_)));
    Ok(())
}
