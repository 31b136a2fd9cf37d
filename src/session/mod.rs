//! Session management
//!
//! A chat session owns its conversation history; sessions are persisted as
//! JSON so a conversation can be resumed from the CLI.
use crate::error::{RagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Append-only turn log. Storage is unbounded; only the view handed to the
/// generator is windowed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// The most recent `n` messages, oldest first
    pub fn window(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session identifier
    pub id: Uuid,

    /// Human-readable session name
    pub name: String,

    /// When the session was started
    pub started_at: DateTime<Utc>,

    /// Last time a turn was recorded
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub history: ConversationHistory,
}

impl ChatSession {
    /// Create a new session
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            started_at: Utc::now(),
            updated_at: None,
            history: ConversationHistory::new(),
        }
    }

    /// Create a new session named after the current time
    pub fn new_with_timestamp() -> Self {
        let name = format!("chat_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        Self::new(name)
    }

    /// Record one completed exchange
    pub fn record_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.history.push(ChatMessage::user(user));
        self.history.push(ChatMessage::assistant(assistant));
        self.updated_at = Some(Utc::now());
    }

    /// Save session to `<sessions_dir>/<id>/state.json`
    pub fn save(&self, sessions_dir: &Path) -> Result<()> {
        let session_dir = self.session_dir(sessions_dir);
        std::fs::create_dir_all(&session_dir).map_err(|e| RagError::Io {
            source: e,
            context: format!(
                "Failed to create session directory: {}",
                session_dir.display()
            ),
        })?;

        let state_file = session_dir.join("state.json");
        let content = serde_json::to_string_pretty(self).map_err(|e| RagError::Json {
            source: e,
            context: "Failed to serialize session state".to_string(),
        })?;
        std::fs::write(&state_file, content).map_err(|e| RagError::Io {
            source: e,
            context: format!(
                "Failed to write session state file: {}",
                state_file.display()
            ),
        })?;

        Ok(())
    }

    /// Load session from file
    pub fn load(sessions_dir: &Path, id: &Uuid) -> Result<Self> {
        let state_file = sessions_dir.join(id.to_string()).join("state.json");

        if !state_file.exists() {
            return Err(RagError::SessionNotFound { id: id.to_string() });
        }

        let content = std::fs::read_to_string(&state_file).map_err(|e| RagError::Io {
            source: e,
            context: format!(
                "Failed to read session state file: {}",
                state_file.display()
            ),
        })?;
        serde_json::from_str(&content).map_err(|e| RagError::Json {
            source: e,
            context: "Failed to deserialize session state".to_string(),
        })
    }

    pub fn session_dir(&self, sessions_dir: &Path) -> PathBuf {
        sessions_dir.join(self.id.to_string())
    }
}

/// CRUD over persisted chat sessions
pub struct SessionManager {
    sessions_dir: PathBuf,
}

impl SessionManager {
    pub fn new(sessions_dir: PathBuf) -> Self {
        Self { sessions_dir }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Create and persist a new session
    pub fn create(&self, name: Option<String>) -> Result<ChatSession> {
        let session = match name {
            Some(n) => ChatSession::new(n),
            None => ChatSession::new_with_timestamp(),
        };
        session.save(&self.sessions_dir)?;
        tracing::info!(id = %session.id, name = %session.name, "Created chat session");
        Ok(session)
    }

    /// Resume the newest session with this name, or start one
    pub fn open_or_create(&self, name: &str) -> Result<ChatSession> {
        match self.find_by_name(name)? {
            Some(session) => {
                tracing::debug!(id = %session.id, turns = session.history.len(), "Resuming session");
                Ok(session)
            }
            None => self.create(Some(name.to_string())),
        }
    }

    pub fn save(&self, session: &ChatSession) -> Result<()> {
        session.save(&self.sessions_dir)
    }

    pub fn load(&self, id: &Uuid) -> Result<ChatSession> {
        ChatSession::load(&self.sessions_dir, id)
    }

    /// All sessions, newest first. Unreadable entries are skipped.
    pub fn list(&self) -> Result<Vec<ChatSession>> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.sessions_dir).map_err(|e| RagError::Io {
            source: e,
            context: format!(
                "Failed to read sessions directory: {}",
                self.sessions_dir.display()
            ),
        })?;

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RagError::Io {
                source: e,
                context: "Failed to read directory entry".to_string(),
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let Ok(id) = Uuid::parse_str(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            match ChatSession::load(&self.sessions_dir, &id) {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("Skipping session {}: {}", id, e),
            }
        }

        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<ChatSession>> {
        Ok(self.list()?.into_iter().find(|s| s.name == name))
    }

    pub fn delete(&self, id: &Uuid) -> Result<()> {
        let session_dir = self.sessions_dir.join(id.to_string());

        if !session_dir.exists() {
            return Err(RagError::SessionNotFound { id: id.to_string() });
        }

        std::fs::remove_dir_all(&session_dir).map_err(|e| RagError::Io {
            source: e,
            context: format!(
                "Failed to delete session directory: {}",
                session_dir.display()
            ),
        })
    }
}
