//! Chaos tests for the dispatcher over a failing store
//!
//! `ChaoticStorage` fails a random share of store calls. Whatever fails, a
//! connection must get either its normal reply or the service-unavailable
//! reply, and the session registry must never claim a login that did not
//! complete.

use std::sync::Arc;

use huddle_proto::reply;
use huddle_server::{
    Argon2Hasher, ChaoticStorage, ConnectionHandle, ConnectionId, Dispatcher, HashConfig,
    LocalRegistry, MemoryBus, MemoryStorage, Session, SessionRegistry, Storage,
};
use proptest::prelude::*;
use tokio::sync::mpsc;

fn dispatcher<S: Storage>(
    storage: S,
    registry: Arc<dyn SessionRegistry>,
) -> Dispatcher<S, MemoryBus> {
    let hasher = Arc::new(Argon2Hasher::new(HashConfig::fast()).unwrap());
    Dispatcher::new(storage, MemoryBus::new(), registry, hasher)
}

fn session(id: u64) -> (Session, mpsc::Receiver<String>) {
    let (handle, outbound) = ConnectionHandle::new(ConnectionId(id), 64);
    (Session::new(handle), outbound)
}

/// Send a line and return everything it queued for this connection.
fn exchange<S: Storage>(
    dispatcher: &Dispatcher<S, MemoryBus>,
    session: &mut Session,
    outbound: &mut mpsc::Receiver<String>,
    line: &str,
) -> Vec<String> {
    dispatcher.handle_line(session, line).unwrap();
    let mut lines = Vec::new();
    while let Ok(line) = outbound.try_recv() {
        lines.push(line.trim_end_matches('\n').to_string());
    }
    lines
}

#[test]
fn prop_login_is_all_or_nothing() {
    proptest!(ProptestConfig::with_cases(64), |(
        failure_rate in 0.0..0.9,
        seed in any::<u64>(),
    )| {
        let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
        let registry: Arc<dyn SessionRegistry> = Arc::new(LocalRegistry::new());
        let dispatcher = dispatcher(storage.clone(), Arc::clone(&registry));
        let (mut session, mut outbound) = session(1);

        let registered = exchange(&dispatcher, &mut session, &mut outbound, "/register alice pw");
        prop_assert_eq!(registered.len(), 1);
        let account_exists = storage.inner().account_count() == 1;
        if registered[0] == reply::REGISTERED {
            prop_assert!(account_exists);
        } else {
            prop_assert_eq!(registered[0].as_str(), reply::SERVICE_UNAVAILABLE);
            prop_assert!(!account_exists);
        }

        let login = exchange(&dispatcher, &mut session, &mut outbound, "/login alice pw");
        if login.first().map(String::as_str) == Some(reply::LOGGED_IN) {
            prop_assert!(account_exists);
            let joined = login.get(1).map(String::as_str);
            prop_assert_eq!(joined, Some("System: 🟢 alice has joined the chat"));
            prop_assert_eq!(session.username(), Some("alice"));
            prop_assert!(registry.is_online("alice"));

            let online = storage.inner().find_accounts_online().unwrap();
            prop_assert_eq!(online.len(), 1);
        } else {
            prop_assert_eq!(login.len(), 1);
            let expected = if account_exists {
                reply::SERVICE_UNAVAILABLE
            } else {
                // Either the lookup failed or it found nothing.
                if login[0] == reply::INVALID_CREDENTIALS {
                    reply::INVALID_CREDENTIALS
                } else {
                    reply::SERVICE_UNAVAILABLE
                }
            };
            prop_assert_eq!(login[0].as_str(), expected);
            prop_assert_eq!(session.username(), None);
            prop_assert_eq!(registry.session_count(), 0);
            prop_assert!(storage.inner().find_accounts_online().unwrap().is_empty());
        }
    });
}

#[test]
fn prop_group_commands_reply_or_report_unavailable() {
    proptest!(ProptestConfig::with_cases(32), |(
        failure_rate in 0.0..0.9,
        seed in any::<u64>(),
        commands in prop::collection::vec(0usize..5, 1..20),
    )| {
        // Log in over a healthy store, then issue group commands through a
        // failing view of the same rows.
        let healthy = MemoryStorage::new();
        let registry: Arc<dyn SessionRegistry> = Arc::new(LocalRegistry::new());
        let setup = dispatcher(healthy.clone(), Arc::clone(&registry));
        let (mut session, mut outbound) = session(1);
        exchange(&setup, &mut session, &mut outbound, "/register alice pw");
        exchange(&setup, &mut session, &mut outbound, "/login alice pw");

        let chaotic = ChaoticStorage::with_seed(healthy.clone(), failure_rate, seed);
        let dispatcher = dispatcher(chaotic, Arc::clone(&registry));

        for command in commands {
            let (line, normal): (&str, Vec<&str>) = match command {
                0 => ("/group_create g", vec![reply::GROUP_CREATED, reply::GROUP_EXISTS]),
                1 => (
                    "/group_join g",
                    vec![reply::GROUP_JOINED, reply::ALREADY_MEMBER, reply::GROUP_NOT_FOUND],
                ),
                2 => (
                    "/group_leave g",
                    vec![reply::GROUP_LEFT, reply::NOT_MEMBER, reply::GROUP_NOT_FOUND],
                ),
                3 => ("/list_groups", vec![reply::NO_GROUPS, "Available Groups:"]),
                _ => (
                    "/group_msg g hi",
                    vec!["[g][alice]: hi", reply::NOT_MEMBER, reply::GROUP_NOT_FOUND],
                ),
            };

            let lines = exchange(&dispatcher, &mut session, &mut outbound, line);
            let first = lines.first().map(String::as_str).unwrap_or_default();
            prop_assert!(
                first == reply::SERVICE_UNAVAILABLE
                    || normal.iter().any(|n| first.starts_with(n)),
                "unexpected reply {:?} to {}", lines, line
            );

            // Membership never duplicates, whatever failed.
            if let Some(group) = healthy.find_group_by_name("g").unwrap() {
                prop_assert!(healthy.membership_rows(1, group.id) <= 1);
            }
        }

        // Commands never touch the session binding.
        prop_assert_eq!(session.username(), Some("alice"));
        prop_assert!(registry.is_online("alice"));
    });
}

#[test]
fn disconnect_unbinds_even_when_store_is_down() {
    let storage = MemoryStorage::new();
    let registry: Arc<dyn SessionRegistry> = Arc::new(LocalRegistry::new());
    let healthy = dispatcher(storage.clone(), Arc::clone(&registry));

    let (mut alice, mut alice_out) = session(1);
    let (mut bob, mut bob_out) = session(2);
    exchange(&healthy, &mut alice, &mut alice_out, "/register alice pw");
    exchange(&healthy, &mut alice, &mut alice_out, "/login alice pw");
    exchange(&healthy, &mut bob, &mut bob_out, "/register bob pw");
    exchange(&healthy, &mut bob, &mut bob_out, "/login bob pw");
    while bob_out.try_recv().is_ok() {}

    let broken = dispatcher(ChaoticStorage::new(storage.clone(), 1.0), Arc::clone(&registry));
    broken.disconnect(&mut alice);

    assert!(alice.is_closed());
    assert!(!registry.is_online("alice"));
    assert_eq!(registry.session_count(), 1);
    assert_eq!(bob_out.try_recv().unwrap(), "System: 🔴 alice has left the chat\n");

    // The persisted flag could not be cleared; it is only a mirror.
    let online: Vec<_> =
        storage.find_accounts_online().unwrap().into_iter().map(|a| a.username).collect();
    assert_eq!(online, vec!["alice", "bob"]);
}

#[test]
fn logout_with_store_down_still_logs_out() {
    let storage = MemoryStorage::new();
    let registry: Arc<dyn SessionRegistry> = Arc::new(LocalRegistry::new());
    let healthy = dispatcher(storage.clone(), Arc::clone(&registry));

    let (mut session, mut outbound) = session(1);
    exchange(&healthy, &mut session, &mut outbound, "/register alice pw");
    exchange(&healthy, &mut session, &mut outbound, "/login alice pw");

    let broken = dispatcher(ChaoticStorage::new(storage, 1.0), Arc::clone(&registry));
    let lines = exchange(&broken, &mut session, &mut outbound, "/logout");

    // The leave notice goes to the remaining users only.
    assert_eq!(lines, vec![reply::LOGGED_OUT]);
    assert_eq!(session.username(), None);
    assert_eq!(registry.session_count(), 0);
}
