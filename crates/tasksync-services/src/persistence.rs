//! SQLite-backed key/value mirror of local state.
//!
//! Holds the task snapshot, the theme preference and the session credential,
//! each under its own key. The mirror is write-through and read once at
//! startup; it never decides anything.

use std::path::Path;

use anyhow::Context;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tasksync_auth::CredentialStore;
use tasksync_core::error::RusqliteErrorExt;
use tasksync_core::StorageError;

use crate::task::Task;

pub const TASKS_KEY: &str = "todo_tasks_v1";
pub const THEME_KEY: &str = "todo_theme_v1";
pub const CREDENTIAL_KEY: &str = "auth_token";

/// Result of reading the persisted task snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Loaded(Vec<Task>),
    /// Nothing stored yet.
    Empty,
    /// Stored value could not be parsed; treated as empty.
    Corrupt,
}

impl Snapshot {
    pub fn into_tasks(self) -> Vec<Task> {
        match self {
            Snapshot::Loaded(tasks) => tasks,
            Snapshot::Empty | Snapshot::Corrupt => Vec::new(),
        }
    }
}

/// Local key/value store.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let conn = Connection::open(path).context("Failed to open local database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::debug!("Opened local store at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store (tests, ephemeral runs).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
            )
            .context("Failed to initialize schema")?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.conn
            .lock()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| e.into_storage_error())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map(|_| ())
            .map_err(|e| e.into_storage_error())
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map(|_| ())
            .map_err(|e| e.into_storage_error())
    }

    /// Read the persisted task snapshot. Never fails: unreadable or
    /// unparsable data comes back as `Snapshot::Corrupt`.
    pub fn load_tasks(&self) -> Snapshot {
        let raw = match self.get(TASKS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Snapshot::Empty,
            Err(e) => {
                tracing::warn!("Could not read task snapshot: {}", e);
                return Snapshot::Corrupt;
            }
        };

        match serde_json::from_str::<Vec<Task>>(&raw) {
            Ok(tasks) => {
                let total = tasks.len();
                let tasks: Vec<Task> = tasks
                    .into_iter()
                    .filter(|t| !t.id.is_empty() && !t.text.trim().is_empty())
                    .collect();
                if tasks.len() != total {
                    tracing::warn!(
                        "Dropped {} invalid task(s) from local snapshot",
                        total - tasks.len()
                    );
                }
                Snapshot::Loaded(tasks)
            }
            Err(e) => {
                tracing::warn!("Local task snapshot is corrupt, starting empty: {}", e);
                Snapshot::Corrupt
            }
        }
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        let json =
            serde_json::to_string(tasks).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(TASKS_KEY, &json)
    }

    /// Stored theme: `Some(true)` for dark, `None` when never chosen.
    pub fn load_theme(&self) -> Option<bool> {
        match self.get(THEME_KEY) {
            Ok(Some(value)) => match value.as_str() {
                "dark" => Some(true),
                "light" => Some(false),
                other => {
                    tracing::warn!("Ignoring unknown stored theme '{}'", other);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Could not read theme preference: {}", e);
                None
            }
        }
    }

    pub fn save_theme(&self, dark: bool) -> Result<(), StorageError> {
        self.set(THEME_KEY, if dark { "dark" } else { "light" })
    }
}

impl CredentialStore for LocalStore {
    fn load_credential(&self) -> Option<String> {
        match self.get(CREDENTIAL_KEY) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Could not read stored credential: {}", e);
                None
            }
        }
    }

    fn save_credential(&self, token: &str) -> Result<(), StorageError> {
        self.set(CREDENTIAL_KEY, token)
    }

    fn clear_credential(&self) -> Result<(), StorageError> {
        self.remove(CREDENTIAL_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tasks() -> Vec<Task> {
        vec![
            Task {
                id: "local-1-abcd1234".into(),
                text: "newest".into(),
                completed: false,
                created_at: 2,
            },
            Task {
                id: "650f1c2e9b1e8a0012345678".into(),
                text: "older".into(),
                completed: true,
                created_at: 1,
            },
        ]
    }

    #[test]
    fn test_empty_store() {
        let store = LocalStore::in_memory().unwrap();
        assert_eq!(store.load_tasks(), Snapshot::Empty);
        assert_eq!(store.load_theme(), None);
        assert_eq!(store.load_credential(), None);
    }

    #[test]
    fn test_tasks_round_trip_preserves_order() {
        let store = LocalStore::in_memory().unwrap();
        store.save_tasks(&sample_tasks()).unwrap();
        assert_eq!(store.load_tasks(), Snapshot::Loaded(sample_tasks()));
    }

    #[test]
    fn test_corrupt_snapshot_is_sentinel() {
        let store = LocalStore::in_memory().unwrap();
        store.set(TASKS_KEY, "{not json").unwrap();
        assert_eq!(store.load_tasks(), Snapshot::Corrupt);
        assert!(store.load_tasks().into_tasks().is_empty());

        store.set(TASKS_KEY, r#"{"error":"down"}"#).unwrap();
        assert_eq!(store.load_tasks(), Snapshot::Corrupt);
    }

    #[test]
    fn test_blank_text_dropped_on_load() {
        let store = LocalStore::in_memory().unwrap();
        store
            .set(
                TASKS_KEY,
                r#"[{"id":"a","text":"  ","completed":false,"createdAt":1},
                    {"id":"b","text":"keep","completed":false,"createdAt":2}]"#,
            )
            .unwrap();
        let tasks = store.load_tasks().into_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "b");
    }

    #[test]
    fn test_theme_and_credential_keys_are_independent() {
        let store = LocalStore::in_memory().unwrap();
        store.save_theme(true).unwrap();
        store.save_credential("jwt").unwrap();
        assert_eq!(store.load_theme(), Some(true));

        store.clear_credential().unwrap();
        assert_eq!(store.load_credential(), None);
        assert_eq!(store.load_theme(), Some(true));

        store.save_theme(false).unwrap();
        assert_eq!(store.load_theme(), Some(false));
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tasksync.db");
        {
            let store = LocalStore::open(&path).unwrap();
            store.save_tasks(&sample_tasks()).unwrap();
            store.save_credential("jwt").unwrap();
        }
        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.load_tasks().into_tasks().len(), 2);
        assert_eq!(store.load_credential().as_deref(), Some("jwt"));
    }
}
