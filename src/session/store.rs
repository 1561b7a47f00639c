use anyhow::Context;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::session::Session;
use crate::error::{ClientError, Result};

/// Persistence for conversations, keyed by session id
pub trait ConversationStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Session>>;
    fn save(&self, session: &Session) -> Result<()>;
    fn remove(&self, id: &str) -> Result<()>;
}

/// One JSON document per session under a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory {}", dir.display()))
            .map_err(|e| ClientError::Store(format!("{:#}", e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(ClientError::Store(format!("invalid session id {:?}", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    fn write_session(&self, session: &Session) -> anyhow::Result<()> {
        let path = self
            .path_for(&session.id)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(session).context("Failed to serialize session")?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

impl ConversationStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<Session>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))
            .map_err(|e| ClientError::Store(format!("{:#}", e)))?;

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let parsed = std::fs::read(&path)
                .map_err(anyhow::Error::from)
                .and_then(|bytes| serde_json::from_slice::<Session>(&bytes).map_err(Into::into));
            match parsed {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Skipping unreadable session file {}: {}", path.display(), e),
            }
        }

        debug!("Loaded {} sessions from {}", sessions.len(), self.dir.display());
        Ok(sessions)
    }

    fn save(&self, session: &Session) -> Result<()> {
        self.write_session(session)
            .map_err(|e| ClientError::Store(format!("{:#}", e)))
    }

    fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Store(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Store that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<BTreeMap<String, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(sessions: impl IntoIterator<Item = Session>) -> Self {
        let store = Self::new();
        {
            let mut map = store.sessions.lock();
            for session in sessions {
                map.insert(session.id.clone(), session);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.lock().get(id).cloned()
    }
}

impl ConversationStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<Session>> {
        Ok(self.sessions.lock().values().cloned().collect())
    }

    fn save(&self, session: &Session) -> Result<()> {
        self.sessions
            .lock()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.sessions.lock().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;

    #[test]
    fn test_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(store.remove("../escape").is_err());
    }

    #[test]
    fn test_file_store_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let mut session = Session::new("friendly", "en-IN-isha");
        session.push(Message::user("hello"));
        store.save(&session).unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![session]);
    }

    #[test]
    fn test_memory_store_remove_is_idempotent() {
        let store = MemoryStore::new();
        let session = Session::new("friendly", "en-IN-isha");
        store.save(&session).unwrap();
        store.remove(&session.id).unwrap();
        store.remove(&session.id).unwrap();
        assert!(store.is_empty());
    }
}
