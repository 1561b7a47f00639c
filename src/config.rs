use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub transport: TransportConfig,
    pub audio: AudioConfig,
    pub defaults: DefaultsConfig,
    pub voices: VoicesConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-agent-client".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket endpoint; persona, voice and credentials are appended as query parameters
    pub endpoint: String,
    /// How long to wait for the server to acknowledge a close before giving up
    pub close_timeout_ms: u64,
    /// Optional per-user API tokens forwarded as query parameters (key -> token)
    pub credentials: BTreeMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000/ws".to_string(),
            close_timeout_ms: 1000,
            credentials: BTreeMap::new(),
        }
    }
}

impl TransportConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Outbound PCM sample rate
    pub sample_rate: u32,
    /// Samples per outbound frame
    pub window_size: usize,
    /// Minimum lead time between "now" and a scheduled chunk
    pub playback_epsilon_ms: u64,
    /// Capacity of the device-to-pipeline block queue
    pub input_queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            window_size: 4096,
            playback_epsilon_ms: 50,
            input_queue_depth: 64,
        }
    }
}

impl AudioConfig {
    pub fn playback_epsilon(&self) -> f64 {
        self.playback_epsilon_ms as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub persona: String,
    pub voice: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            persona: "friendly".to_string(),
            voice: "en-IN-isha".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    /// HTTP(S) URL or local file path of the voice catalog JSON
    pub catalog: String,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            catalog: "static/voices.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub sessions_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_path: "data/sessions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl Config {
    /// Load from an optional config file, then `VOICE_CLIENT__*` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_CLIENT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .context("Failed to deserialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = Config::load("does/not/exist/voice-client").unwrap();
        assert_eq!(cfg.transport.endpoint, "ws://127.0.0.1:8000/ws");
        assert_eq!(cfg.audio.sample_rate, 16000);
        assert_eq!(cfg.audio.window_size, 4096);
        assert_eq!(cfg.defaults.persona, "friendly");
        assert!(cfg.transport.credentials.is_empty());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(
            &path,
            r#"
[transport]
endpoint = "ws://example.test/ws"

[transport.credentials]
gemini = "g-key"

[audio]
playback_epsilon_ms = 80
"#,
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.transport.endpoint, "ws://example.test/ws");
        assert_eq!(cfg.transport.credentials.get("gemini").unwrap(), "g-key");
        assert!((cfg.audio.playback_epsilon() - 0.08).abs() < 1e-9);
        assert_eq!(cfg.audio.window_size, 4096);
    }
}
