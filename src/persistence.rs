use crate::types::{Turn, TurnId};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Append-only history of finished turns
pub trait ChatSessionStore: Send + Sync {
    /// Persist a terminal turn. A turn id may only be stored once.
    fn append_turn(&self, turn: &Turn) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryChatStore {
    turns: Mutex<Vec<Turn>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> Result<Vec<Turn>> {
        let turns = self
            .turns
            .lock()
            .map_err(|e| anyhow::anyhow!("Chat store lock poisoned: {e}"))?;
        Ok(turns.clone())
    }
}

impl ChatSessionStore for InMemoryChatStore {
    fn append_turn(&self, turn: &Turn) -> Result<()> {
        let mut turns = self
            .turns
            .lock()
            .map_err(|e| anyhow::anyhow!("Chat store lock poisoned: {e}"))?;
        if turns.iter().any(|stored| stored.id == turn.id) {
            anyhow::bail!("Turn {} is already stored", turn.id);
        }
        turns.push(turn.clone());
        Ok(())
    }
}

/// Stores one JSON document per line
pub struct FileChatStore {
    path: PathBuf,
    stored_ids: Mutex<HashSet<TurnId>>,
}

impl FileChatStore {
    /// Open a history file, picking up ids already stored in it
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let stored_ids = Self::read_turns(&path)?.into_iter().map(|turn| turn.id).collect();
        Ok(Self {
            path,
            stored_ids: Mutex::new(stored_ids),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<Turn>> {
        Self::read_turns(&self.path)
    }

    fn read_turns(path: &Path) -> Result<Vec<Turn>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        debug!("Loading chat history from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chat history: {}", path.display()))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("Invalid turn on line {} of {}", number + 1, path.display())
                })
            })
            .collect()
    }
}

impl ChatSessionStore for FileChatStore {
    fn append_turn(&self, turn: &Turn) -> Result<()> {
        let mut stored_ids = self
            .stored_ids
            .lock()
            .map_err(|e| anyhow::anyhow!("Chat store lock poisoned: {e}"))?;
        if stored_ids.contains(&turn.id) {
            anyhow::bail!("Turn {} is already stored", turn.id);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(turn)?;
        line.push('\n');

        debug!("Appending turn {} to {}", turn.id, self.path.display());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open chat history: {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;

        stored_ids.insert(turn.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentScope, TurnState};

    fn finished_turn(id: TurnId) -> Turn {
        let mut turn = Turn::new(id, format!("question {id}"), DocumentScope::new(), 4);
        turn.transition(TurnState::Streaming).unwrap();
        turn.reasoning_mut().append("thinking");
        turn.complete(Some(format!("answer {id}")), vec![], Some(2))
            .unwrap();
        turn
    }

    #[test]
    fn test_in_memory_rejects_duplicates() {
        let store = InMemoryChatStore::new();
        store.append_turn(&finished_turn(1)).unwrap();
        store.append_turn(&finished_turn(2)).unwrap();
        assert!(store.append_turn(&finished_turn(1)).is_err());

        let ids: Vec<_> = store.turns().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_file_store_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("history").join("chat.jsonl");

        let store = FileChatStore::new(&path)?;
        assert!(store.load()?.is_empty());
        store.append_turn(&finished_turn(1))?;
        store.append_turn(&finished_turn(2))?;

        let loaded = store.load()?;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].final_answer(), Some("answer 2"));
        assert_eq!(loaded[1].state(), TurnState::Completed);
        assert_eq!(loaded[0].reasoning_lines(), vec!["thinking".to_string()]);
        assert_eq!(loaded[0].message_count(), Some(2));

        // Reopening remembers what is already stored
        let reopened = FileChatStore::new(&path)?;
        assert!(reopened.append_turn(&finished_turn(2)).is_err());
        reopened.append_turn(&finished_turn(3))?;
        assert_eq!(reopened.load()?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_corrupt_history_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("chat.jsonl");
        std::fs::write(&path, "{\"id\": 1}\n")?;

        let err = FileChatStore::new(&path).err().unwrap();
        assert!(err.to_string().contains("line 1"));
        Ok(())
    }
}
