use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_agent_client::audio::CaptureConfig;
use voice_agent_client::playback::{CpalOutput, NullOutput, PlaybackOutput, SymphoniaDecoder};
use voice_agent_client::{
    create_router, AppState, CapturePipeline, ClientParts, Config, CpalMicrophone,
    JsonFileStore, PlaybackScheduler, RenderEvent, SessionRegistry, VoiceCatalog, VoiceClient,
    WebSocketConnector,
};

#[derive(Debug, Parser)]
#[command(name = "voice-agent-client", version, about = "Streaming voice agent client")]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/voice-client")]
    config: String,

    /// Conversation to resume; a new one is created if it does not exist
    #[arg(long)]
    session_id: Option<String>,

    /// Override the default persona
    #[arg(long)]
    persona: Option<String>,

    /// Override the default voice
    #[arg(long)]
    voice: Option<String>,

    /// Do not start the HTTP control API
    #[arg(long)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(persona) = args.persona {
        cfg.defaults.persona = persona;
    }
    if let Some(voice) = args.voice {
        cfg.defaults.voice = voice;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Transport endpoint: {}", cfg.transport.endpoint);

    let voices = VoiceCatalog::load(&cfg.voices.catalog).await;
    if !voices.is_empty() && !voices.contains(&cfg.defaults.voice) {
        warn!("Default voice {} is not in the catalog", cfg.defaults.voice);
    }

    let store = JsonFileStore::open(&cfg.storage.sessions_path)
        .context("Failed to open conversation store")?;
    let registry = SessionRegistry::resume(
        Arc::new(store),
        args.session_id.as_deref(),
        cfg.defaults.persona.clone(),
        cfg.defaults.voice.clone(),
    );

    let output: Arc<dyn PlaybackOutput> = match CpalOutput::open() {
        Ok(output) => {
            info!("Playback on default output device at {} Hz", output.sample_rate());
            Arc::new(output)
        }
        Err(e) => {
            warn!("No playback device ({}), audio replies will be discarded", e);
            Arc::new(NullOutput::new())
        }
    };
    let playback = PlaybackScheduler::spawn(
        Arc::new(SymphoniaDecoder::new()),
        output,
        cfg.audio.playback_epsilon(),
    );

    let capture = CapturePipeline::new(
        Box::new(CpalMicrophone::new()),
        CaptureConfig::from(&cfg.audio),
    );

    let (client, render) = VoiceClient::spawn(ClientParts {
        capture,
        playback,
        registry,
        connector: Arc::new(WebSocketConnector::new()),
        transport: cfg.transport.clone(),
    });
    tokio::spawn(log_render_events(render));

    if args.no_http {
        info!("HTTP control API disabled; press Ctrl-C to exit");
        client.start_capture().await?;
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    } else {
        let addr = format!("{}:{}", cfg.http.bind, cfg.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("Control API listening on http://{}", addr);

        let app = create_router(AppState::new(client.clone(), voices));
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .context("HTTP server failed")?;
    }

    info!("Shutting down");
    let stats = client.shutdown().await?;
    info!(
        "Playback: {} chunks scheduled, {} skipped",
        stats.scheduled, stats.failed
    );
    Ok(())
}

/// Terminal rendering of conversation events
async fn log_render_events(mut events: mpsc::UnboundedReceiver<RenderEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RenderEvent::MessageAppended { message, .. } => {
                info!("[{:?}] {}", message.sender, message.text)
            }
            RenderEvent::HistoryChanged { sessions } => {
                info!("History: {} conversations", sessions.len())
            }
            RenderEvent::ActiveSessionChanged {
                session_id,
                messages,
            } => info!("Active conversation {} ({} messages)", session_id, messages.len()),
            RenderEvent::ConnectionStateChanged { state } => info!("Connection: {}", state),
            RenderEvent::Notice { message } => warn!("{}", message),
        }
    }
}
