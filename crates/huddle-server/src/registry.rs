//! Session registry: which connection is bound to which username.
//!
//! The registry maintains bidirectional mappings: connection → username (for
//! cleanup on disconnect and fan-out snapshots) and username → connection
//! (for private message routing). It is the liveness source of truth; the
//! persisted `online` flag only mirrors it.
//!
//! Binding a second connection to a username already in use is allowed and
//! wins the reverse index (last login wins). When the winning connection goes
//! away, the index falls back to the remaining connection for that username
//! that logged in most recently.
//!
//! The registry never performs I/O. Callers copy what they need out of it
//! (handles are cheap clones) and write to connections after the lock is
//! released.

#![allow(clippy::disallowed_types, reason = "Registry critical sections never await or do I/O")]

use std::{
    collections::{BTreeSet, HashMap},
    sync::RwLock,
};

use crate::connection::{ConnectionHandle, ConnectionId};

#[derive(Debug, Clone)]
struct SessionEntry {
    handle: ConnectionHandle,
    username: String,
    /// Order of this binding among all bindings
    login_seq: u64,
}

/// Registry for tracking authenticated connections.
///
/// Maintains bidirectional mappings for efficient lookups:
/// - Get the username bound to a connection (for cleanup)
/// - Get the connection for a username (for private messages) - O(1) lookup
/// - Copy out every (connection, username) pair (for fan-out)
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection → bound session
    sessions: HashMap<ConnectionId, SessionEntry>,
    /// Username → most recently bound connection (reverse index)
    user_sessions: HashMap<String, ConnectionId>,
    /// Next login sequence number
    next_login_seq: u64,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a username.
    ///
    /// Rebinding an already bound connection overwrites silently. The
    /// username's reverse index entry always points at the newest binding.
    pub fn register(&mut self, handle: ConnectionHandle, username: &str) {
        let id = handle.id();

        if let Some(previous) = self.sessions.remove(&id) {
            self.release_reverse_index(id, &previous.username);
        }

        let login_seq = self.next_login_seq;
        self.next_login_seq += 1;

        self.user_sessions.insert(username.to_string(), id);
        self.sessions
            .insert(id, SessionEntry { handle, username: username.to_string(), login_seq });
    }

    /// Remove a connection's binding.
    ///
    /// Returns the username that was bound, if any.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<String> {
        let entry = self.sessions.remove(&id)?;
        self.release_reverse_index(id, &entry.username);
        Some(entry.username)
    }

    /// Point the reverse index away from `id` after it stopped being bound
    /// to `username`.
    fn release_reverse_index(&mut self, id: ConnectionId, username: &str) {
        if self.user_sessions.get(username) != Some(&id) {
            return;
        }

        // Most recent remaining login.
        let fallback = self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.username == username)
            .max_by_key(|(_, entry)| entry.login_seq)
            .map(|(other, _)| *other);

        match fallback {
            Some(other) => {
                self.user_sessions.insert(username.to_string(), other);
            },
            None => {
                self.user_sessions.remove(username);
            },
        }
    }

    /// Connection currently routed to for `username`.
    pub fn lookup_connection_for(&self, username: &str) -> Option<&ConnectionHandle> {
        let id = self.user_sessions.get(username)?;
        self.sessions.get(id).map(|entry| &entry.handle)
    }

    /// Username bound to a connection.
    pub fn username_for(&self, id: ConnectionId) -> Option<&str> {
        self.sessions.get(&id).map(|entry| entry.username.as_str())
    }

    /// Whether any connection is bound to `username`.
    pub fn is_online(&self, username: &str) -> bool {
        self.user_sessions.contains_key(username)
    }

    /// Distinct usernames with at least one bound connection.
    pub fn online_usernames(&self) -> BTreeSet<String> {
        self.user_sessions.keys().cloned().collect()
    }

    /// Every bound connection with its username.
    pub fn snapshot(&self) -> Vec<(ConnectionHandle, String)> {
        self.sessions.values().map(|entry| (entry.handle.clone(), entry.username.clone())).collect()
    }

    /// Total number of bound connections.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Concurrent session registry shared by every connection task.
///
/// Every operation is atomic with respect to the others. Implementations
/// must not block on I/O, so a distributed backend would keep a local cache
/// behind this interface.
pub trait SessionRegistry: Send + Sync + 'static {
    /// Bind a connection to a username, overwriting any previous binding.
    fn register(&self, handle: ConnectionHandle, username: &str);

    /// Remove a connection's binding and return the username it had.
    fn unregister(&self, id: ConnectionId) -> Option<String>;

    /// Connection currently routed to for `username`.
    fn lookup_connection_for(&self, username: &str) -> Option<ConnectionHandle>;

    /// Username bound to a connection.
    fn username_for(&self, id: ConnectionId) -> Option<String>;

    /// Whether any connection is bound to `username`.
    fn is_online(&self, username: &str) -> bool;

    /// Distinct online usernames.
    fn online_usernames(&self) -> BTreeSet<String>;

    /// Copy of every (connection, username) binding.
    fn snapshot(&self) -> Vec<(ConnectionHandle, String)>;

    /// Number of bound connections.
    fn session_count(&self) -> usize;
}

/// In-process [`SessionRegistry`] over a [`ConnectionRegistry`] behind a
/// reader-writer lock.
///
/// Lock poisoning panics; no critical section can panic on its own.
#[derive(Debug, Default)]
pub struct LocalRegistry {
    inner: RwLock<ConnectionRegistry>,
}

impl LocalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::expect_used)]
impl SessionRegistry for LocalRegistry {
    fn register(&self, handle: ConnectionHandle, username: &str) {
        self.inner.write().expect("registry lock poisoned").register(handle, username);
    }

    fn unregister(&self, id: ConnectionId) -> Option<String> {
        self.inner.write().expect("registry lock poisoned").unregister(id)
    }

    fn lookup_connection_for(&self, username: &str) -> Option<ConnectionHandle> {
        self.inner.read().expect("registry lock poisoned").lookup_connection_for(username).cloned()
    }

    fn username_for(&self, id: ConnectionId) -> Option<String> {
        self.inner.read().expect("registry lock poisoned").username_for(id).map(str::to_string)
    }

    fn is_online(&self, username: &str) -> bool {
        self.inner.read().expect("registry lock poisoned").is_online(username)
    }

    fn online_usernames(&self) -> BTreeSet<String> {
        self.inner.read().expect("registry lock poisoned").online_usernames()
    }

    fn snapshot(&self) -> Vec<(ConnectionHandle, String)> {
        self.inner.read().expect("registry lock poisoned").snapshot()
    }

    fn session_count(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").session_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u64) -> ConnectionHandle {
        ConnectionHandle::new(ConnectionId(id), 8).0
    }

    fn routed(registry: &ConnectionRegistry, username: &str) -> Option<u64> {
        registry.lookup_connection_for(username).map(|h| h.id().0)
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ConnectionRegistry::new();

        registry.register(handle(1), "alice");

        assert_eq!(registry.username_for(ConnectionId(1)), Some("alice"));
        assert_eq!(routed(&registry, "alice"), Some(1));
        assert!(registry.lookup_connection_for("bob").is_none());
        assert!(registry.is_online("alice"));
    }

    #[test]
    fn unregister_returns_username() {
        let mut registry = ConnectionRegistry::new();
        registry.register(handle(1), "alice");

        assert_eq!(registry.unregister(ConnectionId(1)), Some("alice".to_string()));
        assert_eq!(registry.unregister(ConnectionId(1)), None);
        assert!(!registry.is_online("alice"));
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn rebinding_a_connection_overwrites() {
        let mut registry = ConnectionRegistry::new();

        registry.register(handle(1), "alice");
        registry.register(handle(1), "bob");

        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.username_for(ConnectionId(1)), Some("bob"));
        assert!(!registry.is_online("alice"));
        assert_eq!(registry.online_usernames(), BTreeSet::from(["bob".to_string()]));
    }

    #[test]
    fn last_login_wins() {
        let mut registry = ConnectionRegistry::new();

        registry.register(handle(1), "alice");
        registry.register(handle(2), "alice");

        assert_eq!(routed(&registry, "alice"), Some(2));

        // The older connection still carries its identity.
        assert_eq!(registry.username_for(ConnectionId(1)), Some("alice"));
    }

    #[test]
    fn reverse_index_falls_back_to_remaining_connection() {
        let mut registry = ConnectionRegistry::new();

        registry.register(handle(1), "alice");
        registry.register(handle(2), "alice");

        registry.unregister(ConnectionId(2));
        assert_eq!(routed(&registry, "alice"), Some(1));
        assert!(registry.is_online("alice"));

        registry.unregister(ConnectionId(1));
        assert!(!registry.is_online("alice"));
    }

    #[test]
    fn unregistering_older_connection_keeps_newest() {
        let mut registry = ConnectionRegistry::new();

        registry.register(handle(1), "alice");
        registry.register(handle(2), "alice");
        registry.unregister(ConnectionId(1));

        assert_eq!(routed(&registry, "alice"), Some(2));
    }

    #[test]
    fn fallback_follows_login_order_not_connection_id() {
        let mut registry = ConnectionRegistry::new();

        registry.register(handle(5), "alice");
        registry.register(handle(2), "alice");
        registry.register(handle(9), "alice");

        // Connection 5 was accepted later than 2 but logged in earlier.
        registry.unregister(ConnectionId(9));
        assert_eq!(routed(&registry, "alice"), Some(2));

        registry.unregister(ConnectionId(2));
        assert_eq!(routed(&registry, "alice"), Some(5));
    }

    #[test]
    fn snapshot_and_online_usernames() {
        let mut registry = ConnectionRegistry::new();

        registry.register(handle(1), "carol");
        registry.register(handle(2), "alice");
        registry.register(handle(3), "alice");

        let mut snapshot: Vec<_> =
            registry.snapshot().into_iter().map(|(h, user)| (h.id().0, user)).collect();
        snapshot.sort();
        assert_eq!(
            snapshot,
            vec![(1, "carol".to_string()), (2, "alice".to_string()), (3, "alice".to_string())]
        );

        let online: Vec<_> = registry.online_usernames().into_iter().collect();
        assert_eq!(online, vec!["alice", "carol"]);
    }

    #[test]
    fn local_registry_shares_state_across_threads() {
        use std::sync::Arc;

        let registry = Arc::new(LocalRegistry::new());

        let workers: Vec<_> = (0..8u64)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.register(handle(i), &format!("user{i}"));
                    if i % 2 == 0 {
                        registry.unregister(ConnectionId(i));
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(registry.session_count(), 4);
        let online = registry.online_usernames();
        assert!(online.iter().all(|user| user.ends_with(['1', '3', '5', '7'])));
    }
}
