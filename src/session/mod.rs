//! Session module - conversation state management
//!
//! This module provides session storage for ToolRelay:
//! - In-memory session map with async access
//! - Optional file-based persistence (one JSON file per session key,
//!   replaced atomically)
//! - Per-key locks so concurrent webhook requests for the same sender
//!   serialize their load/run/save window instead of clobbering each other
//!
//! # Example
//!
//! ```
//! use toolrelay::session::{SessionStore, Message};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SessionStore::new_memory();
//!
//!     let mut session = store.load("whatsapp:+15551234567").await.unwrap();
//!     session.add_message(Message::user("Hello!"));
//!     session.add_message(Message::assistant("Hi there!"));
//!
//!     store.save(&session).await.unwrap();
//!     assert_eq!(store.describe("whatsapp:+15551234567").await.unwrap(), 2);
//! }
//! ```

pub mod types;

pub use types::{Message, Role, Session, ToolCall};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};

use crate::error::{RelayError, Result};

/// Store for conversation sessions, keyed by sender identity.
///
/// Sessions live in memory for the lifetime of the process; with a storage
/// path they are additionally persisted as JSON files and survive restarts.
///
/// # Thread Safety
///
/// The store uses `Arc` internally, so it is cheap to clone and safe to
/// share across tasks. `key_lock` hands out a per-key mutex that callers
/// hold across a load/mutate/save window to get serializable updates for
/// one key; different keys never contend.
pub struct SessionStore {
    /// In-memory sessions.
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    /// Per-key locks for serialized load/save pairs.
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    /// Optional directory for file-based persistence.
    storage_path: Option<PathBuf>,
}

impl SessionStore {
    /// Create a store persisting sessions under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(DashMap::new()),
            storage_path: Some(path),
        })
    }

    /// Create an in-memory store without persistence.
    ///
    /// Useful for tests and for deployments that treat history as
    /// process-scoped.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(DashMap::new()),
            storage_path: None,
        }
    }

    /// Lock handle for one session key.
    ///
    /// Callers hold the guard across load → agent run → save so a
    /// concurrent request for the same sender cannot interleave and lose
    /// the other's appended history.
    pub fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load the session for `key`, creating an empty one if unseen.
    ///
    /// Checks memory first, then disk when persistence is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if a persisted session exists but cannot be read
    /// or parsed.
    pub async fn load(&self, key: &str) -> Result<Session> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(key) {
                return Ok(session.clone());
            }
        }

        if let Some(ref storage_path) = self.storage_path {
            let file_path = storage_path.join(format!("{}.json", Self::sanitize_key(key)));
            if file_path.exists() {
                let content = tokio::fs::read_to_string(&file_path).await?;
                let session: Session = serde_json::from_str(&content)
                    .map_err(|e| RelayError::Session(format!("corrupt session file for {key}: {e}")))?;

                let mut sessions = self.sessions.write().await;
                sessions.insert(key.to_string(), session.clone());
                return Ok(session);
            }
        }

        Ok(Session::new(key))
    }

    /// Save a session, replacing any previous state for its key.
    ///
    /// The file write goes through a temp file and rename so a concurrent
    /// `load` never observes a partially-written session.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to disk fails.
    pub async fn save(&self, session: &Session) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.key.clone(), session.clone());
        }

        if let Some(ref storage_path) = self.storage_path {
            let file_name = Self::sanitize_key(&session.key);
            let file_path = storage_path.join(format!("{file_name}.json"));
            let tmp_path = storage_path.join(format!("{file_name}.json.tmp"));
            let content = serde_json::to_string_pretty(session)?;
            tokio::fs::write(&tmp_path, content).await?;
            tokio::fs::rename(&tmp_path, &file_path).await?;
        }

        Ok(())
    }

    /// Clear the history for `key`. Idempotent: resetting an unseen key is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if removing the persisted file fails.
    pub async fn reset(&self, key: &str) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(key);
        }

        if let Some(ref storage_path) = self.storage_path {
            let file_path = storage_path.join(format!("{}.json", Self::sanitize_key(key)));
            if file_path.exists() {
                tokio::fs::remove_file(&file_path).await?;
            }
        }

        Ok(())
    }

    /// Number of messages in the session for `key` (0 if unseen).
    pub async fn describe(&self, key: &str) -> Result<usize> {
        Ok(self.load(key).await?.len())
    }

    /// Sanitize a session key for use as a filename.
    fn sanitize_key(key: &str) -> String {
        key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|', '+'], "_")
    }
}

impl Clone for SessionStore {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            locks: Arc::clone(&self.locks),
            storage_path: self.storage_path.clone(),
        }
    }
}

impl Default for SessionStore {
    /// Creates an in-memory store.
    fn default() -> Self {
        Self::new_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_unseen_returns_empty() {
        let store = SessionStore::new_memory();
        let session = store.load("whatsapp:+15550000001").await.unwrap();
        assert!(session.is_empty());
        assert_eq!(session.key, "whatsapp:+15550000001");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = SessionStore::new_memory();
        let mut session = store.load("k").await.unwrap();
        session.add_message(Message::user("Hello"));
        store.save(&session).await.unwrap();

        let loaded = store.load("k").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.messages[0].text(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_save_replaces_whole_history() {
        let store = SessionStore::new_memory();
        let mut session = store.load("k").await.unwrap();
        session.add_message(Message::user("one"));
        session.add_message(Message::assistant("two"));
        store.save(&session).await.unwrap();

        session.messages.truncate(1);
        store.save(&session).await.unwrap();

        assert_eq!(store.describe("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let store = SessionStore::new_memory();
        let mut session = store.load("k").await.unwrap();
        session.add_message(Message::user("Hello"));
        store.save(&session).await.unwrap();

        store.reset("k").await.unwrap();
        assert!(store.load("k").await.unwrap().is_empty());

        // Resetting again (and resetting an unseen key) is fine.
        store.reset("k").await.unwrap();
        store.reset("never-seen").await.unwrap();
        assert!(store.load("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_describe_counts_messages() {
        let store = SessionStore::new_memory();
        assert_eq!(store.describe("k").await.unwrap(), 0);

        let mut session = store.load("k").await.unwrap();
        session.add_message(Message::user("a"));
        session.add_message(Message::assistant("b"));
        store.save(&session).await.unwrap();

        assert_eq!(store.describe("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_file_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().to_path_buf();

        {
            let store = SessionStore::with_path(storage_path.clone()).unwrap();
            let mut session = store.load("whatsapp:+15557654321").await.unwrap();
            session.add_message(Message::user("Persisted message"));
            store.save(&session).await.unwrap();
        }

        {
            let store = SessionStore::with_path(storage_path).unwrap();
            let session = store.load("whatsapp:+15557654321").await.unwrap();
            assert_eq!(session.len(), 1);
            assert_eq!(session.messages[0].text(), Some("Persisted message"));
        }
    }

    #[tokio::test]
    async fn test_file_persistence_atomic_replace() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().to_path_buf();
        let store = SessionStore::with_path(storage_path.clone()).unwrap();

        let mut session = store.load("k").await.unwrap();
        session.add_message(Message::user("v1"));
        store.save(&session).await.unwrap();
        session.add_message(Message::assistant("v2"));
        store.save(&session).await.unwrap();

        // No temp-file residue after the rename.
        let leftovers: Vec<_> = std::fs::read_dir(&storage_path)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(store.describe("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_file_persistence_reset_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().to_path_buf();
        let store = SessionStore::with_path(storage_path.clone()).unwrap();

        let session = store.load("whatsapp:+15551112222").await.unwrap();
        store.save(&session).await.unwrap();
        let file_path = storage_path.join("whatsapp__15551112222.json");
        assert!(file_path.exists());

        store.reset("whatsapp:+15551112222").await.unwrap();
        assert!(!file_path.exists());
    }

    #[tokio::test]
    async fn test_key_lock_serializes_same_key() {
        let store = Arc::new(SessionStore::new_memory());
        let mut handles = Vec::new();

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let lock = store.key_lock("shared");
                let _guard = lock.lock().await;
                let mut session = store.load("shared").await.unwrap();
                session.add_message(Message::user(format!("Message {i}")));
                store.save(&session).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // With the lock held across load/save no append is lost.
        assert_eq!(store.describe("shared").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_key_lock_distinct_keys_do_not_block() {
        let store = SessionStore::new_memory();
        let lock_a = store.key_lock("a");
        let _guard_a = lock_a.lock().await;

        // Holding "a" must not block "b".
        let lock_b = store.key_lock("b");
        let guard_b = tokio::time::timeout(std::time::Duration::from_millis(50), lock_b.lock())
            .await;
        assert!(guard_b.is_ok());
    }

    #[tokio::test]
    async fn test_store_clone_shares_state() {
        let store1 = SessionStore::new_memory();
        let store2 = store1.clone();

        let mut session = store1.load("shared").await.unwrap();
        session.add_message(Message::user("Test"));
        store1.save(&session).await.unwrap();

        assert_eq!(store2.describe("shared").await.unwrap(), 1);
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(SessionStore::sanitize_key("simple"), "simple");
        assert_eq!(
            SessionStore::sanitize_key("whatsapp:+14155238886"),
            "whatsapp__14155238886"
        );
        assert_eq!(SessionStore::sanitize_key("a/b\\c*d"), "a_b_c_d");
    }
}
