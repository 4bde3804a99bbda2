//! Fuzz target for dispatcher session state
//!
//! # Strategy
//!
//! - Several connections issue commands drawn from a small vocabulary of
//!   users, passwords, and groups so that logins and memberships collide
//! - Connections disconnect at arbitrary points and may keep talking
//! - Raw lines mix in arbitrary text
//!
//! # Invariants
//!
//! - Dispatcher NEVER panics
//! - The registry holds exactly the authenticated, open sessions
//! - Every authenticated session's user is online in the registry
//! - A membership pair is never stored twice

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use huddle_server::{
    Argon2Hasher, ConnectionHandle, ConnectionId, Dispatcher, HashConfig, LocalRegistry,
    MemoryBus, MemoryStorage, Session, SessionRegistry, Storage,
};
use libfuzzer_sys::fuzz_target;
use tokio::sync::mpsc;

const USERS: [&str; 3] = ["alice", "bob", "carol"];
const PASSWORDS: [&str; 2] = ["pw", "wrong"];
const GROUPS: [&str; 2] = ["team", "ops"];
const CONNECTIONS: usize = 4;

#[derive(Debug, Clone, Arbitrary)]
enum Action {
    Register { conn: u8, user: u8, password: u8 },
    Login { conn: u8, user: u8, password: u8 },
    Logout { conn: u8 },
    Private { conn: u8, user: u8, body: String },
    Broadcast { conn: u8, body: String },
    GroupCreate { conn: u8, group: u8 },
    GroupJoin { conn: u8, group: u8 },
    GroupLeave { conn: u8, group: u8 },
    GroupMessage { conn: u8, group: u8, body: String },
    Raw { conn: u8, line: String },
    Disconnect { conn: u8 },
}

impl Action {
    fn conn(&self) -> usize {
        let conn = match self {
            Self::Register { conn, .. }
            | Self::Login { conn, .. }
            | Self::Logout { conn }
            | Self::Private { conn, .. }
            | Self::Broadcast { conn, .. }
            | Self::GroupCreate { conn, .. }
            | Self::GroupJoin { conn, .. }
            | Self::GroupLeave { conn, .. }
            | Self::GroupMessage { conn, .. }
            | Self::Raw { conn, .. }
            | Self::Disconnect { conn } => *conn,
        };
        conn as usize % CONNECTIONS
    }

    fn line(&self) -> Option<String> {
        let user = |i: &u8| USERS[*i as usize % USERS.len()];
        let password = |i: &u8| PASSWORDS[*i as usize % PASSWORDS.len()];
        let group = |i: &u8| GROUPS[*i as usize % GROUPS.len()];

        Some(match self {
            Self::Register { user: u, password: p, .. } => {
                format!("/register {} {}", user(u), password(p))
            },
            Self::Login { user: u, password: p, .. } => {
                format!("/login {} {}", user(u), password(p))
            },
            Self::Logout { .. } => "/logout".to_string(),
            Self::Private { user: u, body, .. } => format!("/pm {} {body}", user(u)),
            Self::Broadcast { body, .. } => format!("/broadcast {body}"),
            Self::GroupCreate { group: g, .. } => format!("/group_create {}", group(g)),
            Self::GroupJoin { group: g, .. } => format!("/group_join {}", group(g)),
            Self::GroupLeave { group: g, .. } => format!("/group_leave {}", group(g)),
            Self::GroupMessage { group: g, body, .. } => {
                format!("/group_msg {} {body}", group(g))
            },
            Self::Raw { line, .. } => line.clone(),
            Self::Disconnect { .. } => return None,
        })
    }
}

fuzz_target!(|actions: Vec<Action>| {
    let storage = MemoryStorage::new();
    let registry: Arc<dyn SessionRegistry> = Arc::new(LocalRegistry::new());
    let Ok(hasher) = Argon2Hasher::new(HashConfig::fast()) else {
        return;
    };
    let dispatcher =
        Dispatcher::new(storage.clone(), MemoryBus::new(), Arc::clone(&registry), Arc::new(hasher));

    let mut sessions: Vec<(Session, mpsc::Receiver<String>)> = (0..CONNECTIONS)
        .map(|i| {
            let (handle, outbound) = ConnectionHandle::new(ConnectionId(i as u64 + 1), 1024);
            (Session::new(handle), outbound)
        })
        .collect();

    for action in actions.iter().take(256) {
        let (session, _) = &mut sessions[action.conn()];

        match action.line() {
            Some(line) if !session.is_closed() => {
                if dispatcher.handle_line(session, &line).is_err() {
                    dispatcher.disconnect(session);
                }
            },
            Some(_) => {},
            None => dispatcher.disconnect(session),
        }

        for (_, outbound) in &mut sessions {
            while outbound.try_recv().is_ok() {}
        }

        let live: Vec<&Session> =
            sessions.iter().map(|(s, _)| s).filter(|s| s.username().is_some()).collect();
        assert_eq!(registry.session_count(), live.len());
        for session in live {
            assert!(!session.is_closed());
            let user = session.username().unwrap_or_default();
            assert!(registry.is_online(user));
            assert_eq!(registry.username_for(session.id()).as_deref(), Some(user));
        }
    }

    for group in GROUPS {
        let Ok(Some(group)) = storage.find_group_by_name(group) else {
            continue;
        };
        for user in USERS {
            if let Ok(Some(account)) = storage.find_account_by_username(user) {
                assert!(storage.membership_rows(account.id, group.id) <= 1);
            }
        }
    }
});
