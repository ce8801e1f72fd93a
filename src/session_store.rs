//! Mapping from `sessionId` to session record (§4.3).
//!
//! Each session is individually `tokio::sync::Mutex`-guarded behind a
//! `DashMap`, so handling one session's message never blocks another
//! session's handler — the sharded-lock pattern grounded on the pack's
//! `SessionRegistry` (`DashMap<Uuid, Arc<SessionState>>` keyed per room).
//! A global lock would serialize unrelated sessions for no reason; this
//! gives per-session serialization instead, matching §5's requirement that
//! concurrent mutations to *one* session be linearized without constraining
//! ordering across sessions.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::model::Session;

/// Concurrent `sessionId → Session` map.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Returns the session handle for `session_id`, if present.
    pub fn get(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Inserts a freshly created session. Panics in debug builds would be
    /// inappropriate here — callers are expected to have already checked
    /// `get()` returned `None`; inserting over an existing id silently
    /// replaces it, matching a `DashMap::insert`'s normal semantics.
    pub fn put(&self, session: Session) -> Arc<Mutex<Session>> {
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(handle_session_id(&handle), Arc::clone(&handle));
        handle
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.remove(session_id).map(|(_, handle)| handle)
    }

    /// All session ids currently in the store. Snapshotted to a `Vec` so
    /// callers can lock each session in turn without holding a `DashMap`
    /// shard guard across an `.await`.
    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// `put` takes ownership of `Session` before it's behind the `Mutex`, so we
/// need a synchronous peek at its id; `try_lock` is safe here because the
/// handle was just constructed and nothing else can hold the lock yet.
fn handle_session_id(handle: &Arc<Mutex<Session>>) -> String {
    handle
        .try_lock()
        .expect("freshly constructed session mutex is uncontended")
        .session_id
        .clone()
}
