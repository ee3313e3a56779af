//! Persistence of past chats.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatError;
use crate::types::{DisplayMessage, Message};

const TITLE_MAX_CHARS: usize = 50;

/// Both logs of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedChat {
    pub id: Uuid,
    pub title: String,
    pub display: Vec<DisplayMessage>,
    pub messages: Vec<Message>,
    pub saved_at: DateTime<Utc>,
}

impl SavedChat {
    pub fn new(id: Uuid, display: Vec<DisplayMessage>, messages: Vec<Message>) -> Self {
        Self {
            id,
            title: title_for(&display),
            display,
            messages,
            saved_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> ChatSummary {
        ChatSummary {
            id: self.id,
            title: self.title.clone(),
            saved_at: self.saved_at,
        }
    }
}

/// Listing entry for a saved chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub title: String,
    pub saved_at: DateTime<Utc>,
}

/// First user turn, shortened.
fn title_for(display: &[DisplayMessage]) -> String {
    let first = display
        .iter()
        .find(|m| m.is_user())
        .map(|m| m.content.trim())
        .unwrap_or("New chat");
    let mut title: String = first.chars().take(TITLE_MAX_CHARS).collect();
    if first.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Storage abstraction for past chats. `save` upserts by id.
pub trait HistoryStore: Send + Sync {
    fn save(&self, chat: &SavedChat) -> Result<(), ChatError>;
    fn load(&self, id: Uuid) -> Result<Option<SavedChat>, ChatError>;
    /// Saved chats, most recent first.
    fn list(&self) -> Result<Vec<ChatSummary>, ChatError>;
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    chats: Mutex<HashMap<Uuid, SavedChat>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn save(&self, chat: &SavedChat) -> Result<(), ChatError> {
        self.chats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chat.id, chat.clone());
        Ok(())
    }

    fn load(&self, id: Uuid) -> Result<Option<SavedChat>, ChatError> {
        Ok(self
            .chats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<ChatSummary>, ChatError> {
        let mut summaries: Vec<_> = self
            .chats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(SavedChat::summary)
            .collect();
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFile {
    version: u32,
    chat: SavedChat,
}

/// One JSON file per chat under a directory.
///
/// # Example
/// ```no_run
/// use roci_chat::session::{FileHistoryStore, HistoryStore};
///
/// let store = FileHistoryStore::new_default();
/// for chat in store.list()? {
///     println!("{} {}", chat.id, chat.title);
/// }
/// # Ok::<(), roci_chat::error::ChatError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    base_dir: PathBuf,
}

impl FileHistoryStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Store under `~/.roci/chats`.
    pub fn new_default() -> Self {
        Self::new(crate::config::default_roci_dir().join("chats"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn chat_path(&self, id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{id}.json"))
    }

    fn read(path: &Path) -> Result<Option<SavedChat>, ChatError> {
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let file: ChatFile = serde_json::from_str(&raw).map_err(|e| {
            ChatError::History(format!("corrupt chat file {}: {e}", path.display()))
        })?;
        Ok(Some(file.chat))
    }
}

impl HistoryStore for FileHistoryStore {
    fn save(&self, chat: &SavedChat) -> Result<(), ChatError> {
        fs::create_dir_all(&self.base_dir)?;
        let path = self.chat_path(chat.id);
        let file = ChatFile {
            version: 1,
            chat: chat.clone(),
        };
        fs::write(&path, serde_json::to_vec_pretty(&file)?)?;
        tracing::debug!(chat_id = %chat.id, path = %path.display(), "chat saved");
        Ok(())
    }

    fn load(&self, id: Uuid) -> Result<Option<SavedChat>, ChatError> {
        Self::read(&self.chat_path(id))
    }

    fn list(&self) -> Result<Vec<ChatSummary>, ChatError> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut summaries = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path) {
                Ok(Some(chat)) => summaries.push(chat.summary()),
                Ok(None) => {}
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping unreadable chat"),
            }
        }
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }
}
