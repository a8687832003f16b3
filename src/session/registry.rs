//! # Session Registry
//!
//! The only cross-session structure in the process. Owns the set of live
//! session ids and hands out read-only access to each session's metrics
//! recorder for the observability endpoints.
//!
//! ## Concurrency:
//! Exclusive access for insert/remove, shared access for lookups. The
//! registry is touched at session create/teardown and by REST reads, never
//! on the audio hot path.

use crate::session::metrics::MetricsRecorder;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Registry-visible handle to one live session.
pub struct SessionEntry {
    pub metrics: Arc<Mutex<MetricsRecorder>>,
    pub created_at: DateTime<Utc>,
}

/// Tracks live sessions keyed by session id and enforces the concurrent
/// session limit.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session.
    ///
    /// ## Returns:
    /// - **Ok(())**: Session registered
    /// - **Err(message)**: Capacity reached or the id is already live
    pub fn insert(&self, session_id: &str, metrics: Arc<Mutex<MetricsRecorder>>) -> Result<(), String> {
        let mut sessions = self.sessions.write().unwrap();

        if sessions.len() >= self.max_sessions {
            return Err(format!(
                "Maximum concurrent sessions ({}) reached",
                self.max_sessions
            ));
        }

        if sessions.contains_key(session_id) {
            return Err(format!("Session ID '{}' already exists", session_id));
        }

        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                metrics,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Remove a session on teardown. Returns whether it was present.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().unwrap().remove(session_id).is_some()
    }

    /// Look up the metrics recorder for one session.
    pub fn metrics(&self, session_id: &str) -> Option<Arc<Mutex<MetricsRecorder>>> {
        self.sessions
            .read()
            .unwrap()
            .get(session_id)
            .map(|entry| Arc::clone(&entry.metrics))
    }

    /// Ids of all live sessions.
    pub fn active_ids(&self) -> Vec<String> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured concurrent session limit.
    pub fn capacity(&self) -> usize {
        self.max_sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(id: &str) -> Arc<Mutex<MetricsRecorder>> {
        Arc::new(Mutex::new(MetricsRecorder::new(id.to_string())))
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = SessionRegistry::new(4);
        registry.insert("a", recorder("a")).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.metrics("a").is_some());
        assert!(registry.metrics("missing").is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = SessionRegistry::new(4);
        registry.insert("a", recorder("a")).unwrap();
        let err = registry.insert("a", recorder("a")).unwrap_err();
        assert!(err.contains("already exists"));
    }

    #[test]
    fn test_capacity_enforced() {
        let registry = SessionRegistry::new(2);
        registry.insert("a", recorder("a")).unwrap();
        registry.insert("b", recorder("b")).unwrap();

        let err = registry.insert("c", recorder("c")).unwrap_err();
        assert!(err.contains("Maximum concurrent sessions"));

        // Freeing a slot lets the next session in.
        assert!(registry.remove("a"));
        assert!(registry.insert("c", recorder("c")).is_ok());
    }

    #[test]
    fn test_remove_missing_session() {
        let registry = SessionRegistry::new(2);
        assert!(!registry.remove("ghost"));
    }
}
