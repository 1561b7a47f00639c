use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One selectable TTS voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
}

impl Voice {
    /// Display label, e.g. "Isha (English - India)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.language)
    }
}

/// Voices offered for selection, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    voices: Vec<Voice>,
}

impl VoiceCatalog {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self { voices }
    }

    /// Load from an http(s) URL or a local JSON file.
    ///
    /// Any failure yields an empty catalog.
    pub async fn load(source: &str) -> Self {
        match fetch(source).await {
            Ok(voices) => {
                info!("Loaded {} voices from {}", voices.len(), source);
                Self { voices }
            }
            Err(e) => {
                warn!("Voice catalog unavailable ({}): {:#}", source, e);
                Self::default()
            }
        }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn get(&self, id: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

async fn fetch(source: &str) -> anyhow::Result<Vec<Voice>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let voices = reqwest::get(source)
            .await
            .context("Request failed")?
            .error_for_status()
            .context("Catalog endpoint returned an error")?
            .json::<Vec<Voice>>()
            .await
            .context("Invalid catalog JSON")?;
        Ok(voices)
    } else {
        let bytes = tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read {}", source))?;
        serde_json::from_slice(&bytes).context("Invalid catalog JSON")
    }
}
