use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title every session starts with until the first user message arrives
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Characters of the first user message kept in a derived title
pub const TITLE_MAX_CHARS: usize = 30;

/// Who produced a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One conversation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A conversation and the persona/voice it is bound to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub persona: String,
    pub voice: String,
    pub created_at: DateTime<Utc>,
    /// Set once the title has been derived from a user message
    #[serde(default)]
    pub title_derived: bool,
}

impl Session {
    pub fn new(persona: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            persona: persona.into(),
            voice: voice.into(),
            created_at: Utc::now(),
            title_derived: false,
        }
    }

    /// Append an entry; returns true if this entry changed the title
    pub fn push(&mut self, message: Message) -> bool {
        let retitle = message.sender == Sender::User
            && !self.title_derived
            && self.title == DEFAULT_TITLE
            && !message.text.is_empty();

        if retitle {
            self.title = derive_title(&message.text);
            self.title_derived = true;
        }
        self.messages.push(message);
        retitle
    }

    pub fn summary(&self, active: bool) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            message_count: self.messages.len(),
            persona: self.persona.clone(),
            voice: self.voice.clone(),
            active,
        }
    }
}

/// Title from the first user message: its first 30 characters taken as-is,
/// plus "..." if cut
pub fn derive_title(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// History list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub persona: String,
    pub voice: String,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_title_is_kept_whole() {
        assert_eq!(derive_title("Hello there"), "Hello there");
    }

    #[test]
    fn test_long_title_is_truncated_with_ellipsis() {
        let text = "What is the weather like in Bengaluru today?";
        let title = derive_title(text);
        assert_eq!(title, "What is the weather like in Be...");
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn test_exactly_thirty_chars_has_no_ellipsis() {
        let text = "a".repeat(TITLE_MAX_CHARS);
        assert_eq!(derive_title(&text), text);
    }

    #[test]
    fn test_title_truncation_respects_char_boundaries() {
        let text = "नमस्ते".repeat(10);
        let title = derive_title(&text);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn test_title_keeps_surrounding_whitespace() {
        let mut session = Session::new("friendly", "en-IN-isha");
        assert!(session.push(Message::user("  hello ")));
        assert_eq!(session.title, "  hello ");
    }

    #[test]
    fn test_assistant_message_does_not_retitle() {
        let mut session = Session::new("friendly", "en-IN-isha");
        assert!(!session.push(Message::assistant("Hi, how can I help?")));
        assert_eq!(session.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_title_derived_once() {
        let mut session = Session::new("friendly", "en-IN-isha");
        assert!(session.push(Message::user("first question")));
        assert!(!session.push(Message::user("second question")));
        assert_eq!(session.title, "first question");
        assert_eq!(session.messages.len(), 2);
    }

    #[test]
    fn test_session_serializes_lowercase_sender() {
        let mut session = Session::new("friendly", "en-IN-isha");
        session.push(Message::user("hi"));
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"sender\":\"user\""));
    }
}
