use crate::client::ClientHandle;
use crate::voices::VoiceCatalog;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Command handle of the running voice client
    pub client: ClientHandle,

    /// Voices offered for selection
    pub voices: Arc<VoiceCatalog>,
}

impl AppState {
    pub fn new(client: ClientHandle, voices: VoiceCatalog) -> Self {
        Self {
            client,
            voices: Arc::new(voices),
        }
    }
}
