//! src/transfer/session_store.rs
//! Where download sessions are kept between attempts and between runs.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::model::download_session::DownloadSession;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub container: String,
    pub blob_name: String,
    pub local_path: PathBuf,
}

impl SessionKey {
    #[must_use]
    pub fn new(container: &str, blob_name: &str, local_path: &Path) -> Self {
        Self {
            container: container.to_string(),
            blob_name: blob_name.to_string(),
            local_path: local_path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn of(session: &DownloadSession) -> Self {
        Self::new(&session.container, &session.blob_name, &session.local_path)
    }
}

pub trait SessionStore: Send + Sync {
    fn find(&self, key: &SessionKey) -> Option<DownloadSession>;
    fn save(&self, session: &DownloadSession);
    fn remove(&self, key: &SessionKey);
    fn all(&self) -> Vec<DownloadSession>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionKey, DownloadSession>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn find(&self, key: &SessionKey) -> Option<DownloadSession> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    fn save(&self, session: &DownloadSession) {
        self.sessions.insert(SessionKey::of(session), session.clone());
    }

    fn remove(&self, key: &SessionKey) {
        self.sessions.remove(key);
    }

    fn all(&self) -> Vec<DownloadSession> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }
}
