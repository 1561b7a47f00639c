// Session registry behavior over the in-memory and file stores

use std::sync::Arc;
use voice_agent_client::session::{
    ConversationStore, JsonFileStore, MemoryStore, Message, SessionRegistry, DEFAULT_TITLE,
};
use voice_agent_client::ClientError;

fn fresh_registry() -> SessionRegistry {
    SessionRegistry::resume(Arc::new(MemoryStore::new()), None, "friendly", "en-IN-isha")
}

#[test]
fn test_empty_registry_creates_default_session() {
    let registry = fresh_registry();

    assert_eq!(registry.sessions().len(), 1);
    let active = registry.active().unwrap();
    assert_eq!(active.id, registry.active_id());
    assert_eq!(active.title, DEFAULT_TITLE);
    assert!(active.messages.is_empty());
    assert_eq!(active.persona, "friendly");
    assert_eq!(active.voice, "en-IN-isha");
    assert!(uuid::Uuid::parse_str(&active.id).is_ok());
}

#[test]
fn test_deleting_active_session_is_rejected() {
    let mut registry = fresh_registry();
    let active = registry.active_id().to_string();

    let err = registry.delete_session(&active).unwrap_err();
    assert!(matches!(err, ClientError::ActiveSessionDeletion(id) if id == active));
    assert!(registry.get(&active).is_some());
}

#[test]
fn test_deleting_inactive_session_is_idempotent() {
    let mut registry = fresh_registry();
    let old = registry.active_id().to_string();
    registry.create_session();

    assert!(registry.delete_session(&old).unwrap());
    assert!(!registry.delete_session(&old).unwrap());
    assert!(!registry.delete_session("never-existed").unwrap());
    assert_eq!(registry.sessions().len(), 1);
}

#[test]
fn test_title_comes_from_first_user_message_only() {
    let mut registry = fresh_registry();
    let id = registry.active_id().to_string();

    let first = registry
        .append_message(&id, Message::assistant("Hello! I'm your assistant."))
        .unwrap();
    assert!(!first.title_changed);

    let second = registry
        .append_message(&id, Message::user("Tell me a story about a dragon and a knight"))
        .unwrap();
    assert!(second.title_changed);

    let third = registry
        .append_message(&id, Message::user("Make it shorter"))
        .unwrap();
    assert!(!third.title_changed);

    let session = registry.get(&id).unwrap();
    assert_eq!(session.title, "Tell me a story about a dragon...");
    assert_eq!(session.messages.len(), 3);
}

#[test]
fn test_append_to_unknown_session_fails() {
    let mut registry = fresh_registry();
    let err = registry
        .append_message("missing", Message::user("hi"))
        .unwrap_err();
    assert!(matches!(err, ClientError::SessionNotFound(_)));
}

#[test]
fn test_summaries_mark_active_session() {
    let mut registry = fresh_registry();
    let older = registry.active_id().to_string();
    let newer = registry.create_session();

    let summaries = registry.summaries();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, newer);
    assert!(summaries[0].active);
    assert_eq!(summaries[1].id, older);
    assert!(!summaries[1].active);

    registry.select_session(&older).unwrap();
    assert_eq!(registry.active_id(), older);
    // Selection does not reorder history
    assert_eq!(registry.sessions()[0].id, newer);
}

#[test]
fn test_file_store_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let id = {
        let store = Arc::new(JsonFileStore::open(dir.path())?);
        let mut registry = SessionRegistry::resume(store, None, "friendly", "en-IN-isha");
        let id = registry.active_id().to_string();
        registry.append_message(&id, Message::user("remember me"))?;
        registry.append_message(&id, Message::assistant("I will."))?;
        id
    };

    let store = Arc::new(JsonFileStore::open(dir.path())?);
    let registry = SessionRegistry::resume(store, Some(&id), "friendly", "en-IN-isha");

    assert_eq!(registry.active_id(), id);
    let session = registry.get(&id).unwrap();
    assert_eq!(session.title, "remember me");
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].text, "I will.");
    Ok(())
}

#[test]
fn test_file_store_removes_deleted_sessions() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(JsonFileStore::open(dir.path())?);
    let mut registry = SessionRegistry::resume(store.clone(), None, "friendly", "en-IN-isha");

    let old = registry.active_id().to_string();
    registry.create_session();
    registry.delete_session(&old)?;

    let remaining = store.load_all()?;
    assert_eq!(remaining.len(), 1);
    assert!(!dir.path().join(format!("{}.json", old)).exists());
    Ok(())
}
