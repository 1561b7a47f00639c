use std::sync::Arc;
use tracing::{info, warn};

use super::session::{Message, Session, SessionSummary};
use super::store::ConversationStore;
use crate::error::{ClientError, Result};

/// What an append changed, for the render side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub title_changed: bool,
}

/// Ordered conversation history (newest first) plus the active session.
///
/// The active id always names an entry in `sessions`. Every mutation is
/// written through to the store; store failures are logged and do not
/// roll back the in-memory state.
pub struct SessionRegistry {
    sessions: Vec<Session>,
    active: String,
    store: Arc<dyn ConversationStore>,
    default_persona: String,
    default_voice: String,
}

impl SessionRegistry {
    /// Load stored conversations and pick the active one.
    ///
    /// `requested` is the resume context: if it names a stored session that
    /// session becomes active, otherwise a fresh one is created.
    pub fn resume(
        store: Arc<dyn ConversationStore>,
        requested: Option<&str>,
        default_persona: impl Into<String>,
        default_voice: impl Into<String>,
    ) -> Self {
        let mut sessions = match store.load_all() {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("Could not load stored conversations: {}", e);
                Vec::new()
            }
        };
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut registry = Self {
            sessions,
            active: String::new(),
            store,
            default_persona: default_persona.into(),
            default_voice: default_voice.into(),
        };

        match requested.filter(|id| registry.get(id).is_some()) {
            Some(id) => {
                info!("Resuming session {}", id);
                registry.active = id.to_string();
            }
            None => {
                if let Some(id) = requested {
                    warn!("Session {} not found, starting a new one", id);
                }
                let persona = registry.default_persona.clone();
                let voice = registry.default_voice.clone();
                registry.create_bound(persona, voice);
            }
        }

        info!(
            "Session registry ready: {} sessions, active {}",
            registry.sessions.len(),
            registry.active
        );
        registry
    }

    /// Create a session with the default persona/voice and make it active
    pub fn create_session(&mut self) -> String {
        let persona = self.default_persona.clone();
        let voice = self.default_voice.clone();
        self.create_bound(persona, voice)
    }

    /// Create a session bound to the given persona/voice and make it active
    pub fn create_bound(&mut self, persona: impl Into<String>, voice: impl Into<String>) -> String {
        let session = Session::new(persona, voice);
        let id = session.id.clone();
        self.persist(&session);
        self.sessions.insert(0, session);
        self.active = id.clone();
        info!("Created session {}", id);
        id
    }

    pub fn select_session(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(ClientError::SessionNotFound(id.to_string()));
        }
        self.active = id.to_string();
        info!("Selected session {}", id);
        Ok(())
    }

    pub fn append_message(&mut self, id: &str, message: Message) -> Result<AppendOutcome> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ClientError::SessionNotFound(id.to_string()))?;

        let title_changed = session.push(message);
        if title_changed {
            info!("Session {} titled {:?}", id, session.title);
        }

        let snapshot = session.clone();
        self.persist(&snapshot);
        Ok(AppendOutcome { title_changed })
    }

    /// Remove a session. Returns whether anything was removed.
    ///
    /// The active session cannot be deleted; unknown ids are a no-op.
    pub fn delete_session(&mut self, id: &str) -> Result<bool> {
        if id == self.active {
            return Err(ClientError::ActiveSessionDeletion(id.to_string()));
        }

        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        let removed = self.sessions.len() != before;

        if removed {
            if let Err(e) = self.store.remove(id) {
                warn!("Failed to remove stored session {}: {}", id, e);
            }
            info!("Deleted session {}", id);
        }
        Ok(removed)
    }

    /// Rebind a session's persona/voice
    pub fn bind_voice(&mut self, id: &str, persona: &str, voice: &str) -> Result<()> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ClientError::SessionNotFound(id.to_string()))?;

        if session.persona == persona && session.voice == voice {
            return Ok(());
        }
        session.persona = persona.to_string();
        session.voice = voice.to_string();

        let snapshot = session.clone();
        self.persist(&snapshot);
        Ok(())
    }

    pub fn active_id(&self) -> &str {
        &self.active
    }

    pub fn active(&self) -> Option<&Session> {
        self.get(&self.active)
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Newest first
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|s| s.summary(s.id == self.active))
            .collect()
    }

    fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save(session) {
            warn!("Failed to persist session {}: {}", session.id, e);
        }
    }
}
