// Control API routes, exercised with tower's oneshot against fake devices

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use voice_agent_client::audio::{CaptureConfig, CapturePipeline};
use voice_agent_client::config::TransportConfig;
use voice_agent_client::playback::PlaybackScheduler;
use voice_agent_client::session::{MemoryStore, SessionRegistry};
use voice_agent_client::testing::{
    CaptureFailure, CaptureProbe, FakeCapture, FakeConnector, RecordingOutput, ScriptedDecoder,
};
use voice_agent_client::{create_router, AppState, ClientParts, Voice, VoiceCatalog, VoiceClient};

struct TestApp {
    router: Router,
    capture: CaptureProbe,
}

fn test_app() -> TestApp {
    let (backend, capture) = FakeCapture::new();
    let registry = SessionRegistry::resume(
        Arc::new(MemoryStore::new()),
        None,
        "friendly",
        "en-IN-isha",
    );
    let (client, _render) = VoiceClient::spawn(ClientParts {
        capture: CapturePipeline::new(Box::new(backend), CaptureConfig::default()),
        playback: PlaybackScheduler::spawn(
            Arc::new(ScriptedDecoder::new()),
            Arc::new(RecordingOutput::new()),
            0.05,
        ),
        registry,
        connector: Arc::new(FakeConnector::new()),
        transport: TransportConfig::default(),
    });

    let voices = VoiceCatalog::new(vec![
        Voice {
            id: "en-IN-isha".to_string(),
            name: "Isha".to_string(),
            language: "English - India".to_string(),
        },
        Voice {
            id: "en-US-ken".to_string(),
            name: "Ken".to_string(),
            language: "English - US".to_string(),
        },
    ]);

    TestApp {
        router: create_router(AppState::new(client, voices)),
        capture,
    }
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_reports_idle_defaults() {
    let app = test_app();
    let (status, body) = call(&app.router, "GET", "/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
    assert_eq!(body["persona"], "friendly");
    assert_eq!(body["voice"], "en-IN-isha");
}

#[tokio::test]
async fn test_voices_are_listed() {
    let app = test_app();
    let (status, body) = call(&app.router, "GET", "/voices", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));
    assert_eq!(body[0]["id"], "en-IN-isha");
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = test_app();

    let (_, status) = call(&app.router, "GET", "/status", None).await;
    let first = status["active_session"].as_str().unwrap().to_string();

    let (code, created) = call(&app.router, "POST", "/sessions", None).await;
    assert_eq!(code, StatusCode::CREATED);
    let second = created["session_id"].as_str().unwrap().to_string();

    let (code, list) = call(&app.router, "GET", "/sessions", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(list[0]["id"], second.as_str());
    assert_eq!(list[0]["active"], true);
    assert_eq!(list[1]["title"], "New Conversation");

    let (code, _) = call(&app.router, "DELETE", &format!("/sessions/{}", second), None).await;
    assert_eq!(code, StatusCode::CONFLICT);

    let (code, body) = call(
        &app.router,
        "POST",
        &format!("/sessions/{}/select", first),
        None,
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["active_session"], first.as_str());

    let (code, body) = call(&app.router, "DELETE", &format!("/sessions/{}", second), None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["removed"], true);

    let (code, _) = call(&app.router, "DELETE", &format!("/sessions/{}", second), None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);

    let (code, session) = call(&app.router, "GET", &format!("/sessions/{}", first), None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(session["messages"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = test_app();

    let (code, body) = call(&app.router, "GET", "/sessions/nope", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (code, _) = call(&app.router, "POST", "/sessions/nope/select", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_update_and_validation() {
    let app = test_app();

    let (code, body) = call(
        &app.router,
        "PUT",
        "/settings",
        Some(json!({"persona": "pirate", "voice": "en-US-ken"})),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["persona"], "pirate");
    assert_eq!(body["voice"], "en-US-ken");

    let (code, _) = call(
        &app.router,
        "PUT",
        "/settings",
        Some(json!({"voice": "xx-XX-nobody"})),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, _) = call(&app.router, "PUT", "/settings", Some(json!({"persona": " "}))).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capture_start_and_stop() {
    let app = test_app();

    let (code, body) = call(&app.router, "POST", "/capture/start", None).await;
    assert_eq!(code, StatusCode::OK);
    assert!(body["status"] == "connecting" || body["status"] == "streaming");
    assert_eq!(app.capture.live(), 1);

    let mut state = Value::Null;
    for _ in 0..200 {
        let (_, status) = call(&app.router, "GET", "/status", None).await;
        state = status["state"].clone();
        if state == "streaming" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(state, "streaming");

    let (code, body) = call(&app.router, "POST", "/capture/stop", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    assert_eq!(app.capture.live(), 0);
}

#[tokio::test]
async fn test_capture_permission_denied_is_403() {
    let app = test_app();
    app.capture.set_failure(Some(CaptureFailure::Permission));

    let (code, body) = call(&app.router, "POST", "/capture/start", None).await;
    assert_eq!(code, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("permission"));

    let (_, status) = call(&app.router, "GET", "/status", None).await;
    assert_eq!(status["state"], "idle");
}
