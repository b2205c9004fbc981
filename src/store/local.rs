//! Local Key-Value Store
//!
//! SQLite-backed durable storage for the current device. One `kv`
//! table of string keys and string values; each key is an independent
//! unit with no cross-key transactions:
//!
//! - `problems`   - JSON array of problems
//! - `nextId`     - stringified integer
//! - `q<id>`      - completion flag ("true"/"false")
//! - `retry-<id>` - presence = marked for retry
//! - `notes_<id>` - raw note text
//! - `activities` - JSON array, newest first, capped at 20
//!
//! All calls are synchronous; the local store never suspends. Callers
//! must tolerate partial application across keys.

use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::domain::{push_activity, ActivityEntry, DomainError, DomainResult, Problem};

const KEY_PROBLEMS: &str = "problems";
const KEY_NEXT_ID: &str = "nextId";
const KEY_ACTIVITIES: &str = "activities";

fn completion_key(id: u32) -> String {
    format!("q{}", id)
}

fn retry_key(id: u32) -> String {
    format!("retry-{}", id)
}

fn notes_key(id: u32) -> String {
    format!("notes_{}", id)
}

/// SQLite-backed key-value store
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// Open (and migrate) a store at the given path
    pub fn open(path: &Path) -> DomainResult<Self> {
        let conn = Connection::open(path).map_err(|e| DomainError::Storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store, used by tests and throwaway sessions
    pub fn open_in_memory() -> DomainResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DomainError::Storage(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> DomainResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| DomainError::Storage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> DomainResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DomainError::Storage(format!("store lock poisoned: {}", e)))
    }

    /// Get a raw value
    pub fn get(&self, key: &str) -> DomainResult<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT value FROM kv WHERE key = ?1")
            .map_err(|e| DomainError::Storage(e.to_string()))?;
        let mut rows = stmt
            .query([key])
            .map_err(|e| DomainError::Storage(e.to_string()))?;

        match rows.next().map_err(|e| DomainError::Storage(e.to_string()))? {
            Some(row) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| DomainError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Set a raw value, replacing any existing one
    pub fn set(&self, key: &str, value: &str) -> DomainResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )
        .map_err(|e| DomainError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete a key if present
    pub fn delete(&self, key: &str) -> DomainResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(|e| DomainError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All keys starting with the given prefix
    fn keys_with_prefix(&self, prefix: &str) -> DomainResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT key FROM kv WHERE key LIKE ?1")
            .map_err(|e| DomainError::Storage(e.to_string()))?;
        let pattern = format!("{}%", prefix);
        let mut stmt_rows = stmt
            .query(rusqlite::params![pattern])
            .map_err(|e| DomainError::Storage(e.to_string()))?;

        let mut keys = Vec::new();
        while let Some(row) = stmt_rows
            .next()
            .map_err(|e| DomainError::Storage(e.to_string()))?
        {
            keys.push(
                row.get::<_, String>(0)
                    .map_err(|e| DomainError::Storage(e.to_string()))?,
            );
        }
        Ok(keys)
    }

    // --- Problem list ---

    /// Save the full problem list.
    ///
    /// Also bumps `nextId` to one past the highest id so a later add
    /// can never collide.
    pub fn save_problem_list(&self, problems: &[Problem]) -> DomainResult<()> {
        let json =
            serde_json::to_string(problems).map_err(|e| DomainError::Storage(e.to_string()))?;
        self.set(KEY_PROBLEMS, &json)?;

        if let Some(max_id) = problems.iter().map(|p| p.id).max() {
            self.set_next_id(max_id + 1)?;
        }
        Ok(())
    }

    /// Load the stored problem list, `None` if nothing was ever saved
    pub fn load_problem_list(&self) -> DomainResult<Option<Vec<Problem>>> {
        match self.get(KEY_PROBLEMS)? {
            Some(json) => {
                let problems: Vec<Problem> = serde_json::from_str(&json)
                    .map_err(|e| DomainError::Storage(format!("corrupt problem list: {}", e)))?;
                Ok(Some(problems))
            }
            None => Ok(None),
        }
    }

    // --- NextId counter ---

    pub fn next_id(&self) -> DomainResult<Option<u32>> {
        Ok(self.get(KEY_NEXT_ID)?.and_then(|v| v.parse().ok()))
    }

    pub fn set_next_id(&self, next_id: u32) -> DomainResult<()> {
        self.set(KEY_NEXT_ID, &next_id.to_string())
    }

    // --- Completion flags ---

    pub fn is_completed(&self, id: u32) -> DomainResult<bool> {
        Ok(self.get(&completion_key(id))?.as_deref() == Some("true"))
    }

    pub fn set_completed(&self, id: u32, completed: bool) -> DomainResult<()> {
        self.set(&completion_key(id), if completed { "true" } else { "false" })
    }

    // --- Retry markers ---

    pub fn is_retry(&self, id: u32) -> DomainResult<bool> {
        Ok(self.get(&retry_key(id))?.as_deref() == Some("true"))
    }

    pub fn add_retry(&self, id: u32) -> DomainResult<()> {
        self.set(&retry_key(id), "true")
    }

    pub fn remove_retry(&self, id: u32) -> DomainResult<()> {
        self.delete(&retry_key(id))
    }

    // --- Notes ---

    pub fn notes(&self, id: u32) -> DomainResult<Option<String>> {
        self.get(&notes_key(id))
    }

    pub fn save_notes(&self, id: u32, notes: &str) -> DomainResult<()> {
        self.set(&notes_key(id), notes)
    }

    // --- Activities ---

    pub fn activities(&self) -> DomainResult<Vec<ActivityEntry>> {
        match self.get(KEY_ACTIVITIES)? {
            Some(json) => Ok(serde_json::from_str(&json).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    /// Prepend an activity entry, keeping only the most recent entries
    pub fn push_activity(&self, entry: ActivityEntry) -> DomainResult<()> {
        let mut log = self.activities()?;
        push_activity(&mut log, entry);
        self.set_activities(&log)
    }

    pub fn set_activities(&self, log: &[ActivityEntry]) -> DomainResult<()> {
        let json = serde_json::to_string(log).map_err(|e| DomainError::Storage(e.to_string()))?;
        self.set(KEY_ACTIVITIES, &json)
    }

    // --- Whole-category snapshots for the sync engine ---

    /// Completion flags for the given ids, only where a flag is stored
    pub fn completion_map(&self, ids: &[u32]) -> DomainResult<BTreeMap<u32, bool>> {
        let mut map = BTreeMap::new();
        for &id in ids {
            if let Some(value) = self.get(&completion_key(id))? {
                map.insert(id, value == "true");
            }
        }
        Ok(map)
    }

    /// Ids currently marked for retry
    pub fn retry_set(&self, ids: &[u32]) -> DomainResult<Vec<u32>> {
        let mut marked = Vec::new();
        for &id in ids {
            if self.is_retry(id)? {
                marked.push(id);
            }
        }
        Ok(marked)
    }

    /// Non-empty notes for the given ids. Empty notes are local-only
    /// and never transmitted.
    pub fn notes_map(&self, ids: &[u32]) -> DomainResult<BTreeMap<u32, String>> {
        let mut map = BTreeMap::new();
        for &id in ids {
            if let Some(text) = self.notes(id)? {
                if !text.is_empty() {
                    map.insert(id, text);
                }
            }
        }
        Ok(map)
    }

    pub fn apply_completion_map(&self, map: &BTreeMap<u32, bool>) -> DomainResult<()> {
        for (&id, &completed) in map {
            self.set_completed(id, completed)?;
        }
        Ok(())
    }

    /// Replace the local retry markers for the known ids with the given set
    pub fn apply_retry_set(&self, known_ids: &[u32], marked: &[u32]) -> DomainResult<()> {
        for &id in known_ids {
            if marked.contains(&id) {
                self.add_retry(id)?;
            } else {
                self.remove_retry(id)?;
            }
        }
        Ok(())
    }

    pub fn apply_notes_map(&self, map: &BTreeMap<u32, String>) -> DomainResult<()> {
        for (&id, text) in map {
            self.save_notes(id, text)?;
        }
        Ok(())
    }

    /// Delete completion and retry flags whose problem id is no longer
    /// in the list. Notes are kept; only flags are pruned.
    pub fn prune_orphan_flags(&self, valid_ids: &[u32]) -> DomainResult<()> {
        for key in self.keys_with_prefix("q")? {
            if let Ok(id) = key[1..].parse::<u32>() {
                if !valid_ids.contains(&id) {
                    log::debug!("pruning orphaned completion flag for problem {}", id);
                    self.delete(&key)?;
                }
            }
        }
        for key in self.keys_with_prefix("retry-")? {
            if let Ok(id) = key["retry-".len()..].parse::<u32>() {
                if !valid_ids.contains(&id) {
                    log::debug!("pruning orphaned retry marker for problem {}", id);
                    self.delete(&key)?;
                }
            }
        }
        Ok(())
    }
}
