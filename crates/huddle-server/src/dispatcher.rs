//! Command protocol dispatcher.
//!
//! Turns one inbound line into a typed command, enforces the per-connection
//! authentication state machine, and routes to the messaging engine or the
//! group coordinator. Every failure of a single command is rendered as a reply
//! line; the only error that escapes [`Dispatcher::handle_line`] is a
//! [`DeliveryFailure`] on the issuing connection itself, which ends it.
//!
//! # State machine
//!
//! ```text
//!                 /login ok
//! Unauthenticated ----------> Authenticated
//!        ^                          |
//!        +--------- /logout --------+
//!
//! disconnect: any state -> closed (cleanup runs once)
//! ```
//!
//! Checks run in a fixed order: unknown verb, authentication gate, argument
//! count, then the command itself. A rejected line never touches the store or
//! the bus.

use std::sync::Arc;

use huddle_proto::{Command, Verb, format, reply, tokenize};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::{
    bus::MessageBus,
    connection::{ConnectionHandle, ConnectionId, DeliveryFailure},
    error::{ChatError, Existing},
    groups::GroupCoordinator,
    hasher::CredentialHasher,
    messaging::MessagingEngine,
    registry::SessionRegistry,
    storage::{Storage, StorageError},
};

/// Authentication state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Only `/help`, `/register`, and `/login` are accepted
    Unauthenticated,
    /// Bound to an account in the registry
    Authenticated {
        /// Account username
        username: String,
        /// Account id in the store
        account_id: u64,
    },
}

/// Per-connection state owned by the connection task.
#[derive(Debug)]
pub struct Session {
    handle: ConnectionHandle,
    state: SessionState,
    closed: bool,
}

impl Session {
    /// Fresh unauthenticated session for a connection.
    pub fn new(handle: ConnectionHandle) -> Self {
        Self { handle, state: SessionState::Unauthenticated, closed: false }
    }

    /// Connection this session belongs to.
    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Current authentication state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Username, if authenticated.
    pub fn username(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { username, .. } => Some(username),
            SessionState::Unauthenticated => None,
        }
    }

    /// Whether disconnect cleanup already ran.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Queue a line for this connection.
    ///
    /// # Errors
    ///
    /// Propagates the queue's [`DeliveryFailure`].
    pub fn reply(&self, line: &str) -> Result<(), DeliveryFailure> {
        self.handle.deliver(line)
    }

    fn authenticated_user(&self) -> Result<String, ChatError> {
        self.username().map(str::to_string).ok_or(ChatError::NotAuthenticated)
    }
}

/// What a successful command sends back.
enum Outcome {
    /// Nothing for the issuer (the message itself reached it or was private)
    Silent,
    /// One reply line
    Reply(String),
    /// A reply line, then a system notice to everyone
    ReplyThenAnnounce(String, String),
}

/// Routes parsed commands to the components that implement them.
///
/// Shared by every connection task behind an `Arc`; all methods take
/// `&self`. The registry lock is only ever held inside registry calls, never
/// across store or bus calls.
pub struct Dispatcher<S: Storage, B: MessageBus> {
    storage: S,
    registry: Arc<dyn SessionRegistry>,
    hasher: Arc<dyn CredentialHasher>,
    messaging: MessagingEngine<S, B>,
    groups: GroupCoordinator<S, B>,
}

impl<S: Storage, B: MessageBus> Dispatcher<S, B> {
    /// Wire a dispatcher from its collaborators.
    pub fn new(
        storage: S,
        bus: B,
        registry: Arc<dyn SessionRegistry>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        let groups = GroupCoordinator::new(storage.clone(), bus.clone(), Arc::clone(&registry));
        let messaging = MessagingEngine::new(Arc::clone(&registry), bus, groups.clone());

        Self { storage, registry, hasher, messaging, groups }
    }

    /// Session registry shared with the connection layer.
    pub fn registry(&self) -> &Arc<dyn SessionRegistry> {
        &self.registry
    }

    /// Handle one inbound line. Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns the [`DeliveryFailure`] if a reply to this connection could
    /// not be queued. The caller must end the connection.
    pub fn handle_line(&self, session: &mut Session, line: &str) -> Result<(), DeliveryFailure> {
        let Some((token, args)) = tokenize(line) else {
            return Ok(());
        };

        match self.execute(session, token, &args) {
            Ok(Outcome::Silent) => Ok(()),
            Ok(Outcome::Reply(text)) => session.reply(&text),
            Ok(Outcome::ReplyThenAnnounce(text, notice)) => {
                // The login is already bound, so peers hear about it even if
                // this connection is about to be dropped.
                let sent = session.reply(&text);
                self.messaging.system(&notice);
                sent
            },
            Err(err) => {
                let connection = session.id();
                if err.is_service_failure() {
                    tracing::warn!(%connection, verb = token, error = %err, "command failed");
                } else {
                    tracing::debug!(%connection, verb = token, error = %err, "command rejected");
                }
                session.reply(&err.reply())
            },
        }
    }

    /// Run disconnect cleanup for a connection, at most once.
    ///
    /// Unbinds the session and, if no other connection remains for the
    /// username, clears the persisted online flag and announces the leave.
    pub fn disconnect(&self, session: &mut Session) {
        if session.closed {
            return;
        }
        session.closed = true;

        self.release(session);
        tracing::debug!(connection = %session.id(), "session closed");
    }

    fn execute(
        &self,
        session: &mut Session,
        token: &str,
        args: &[&str],
    ) -> Result<Outcome, ChatError> {
        let verb: Verb = token.parse().map_err(|()| ChatError::UnknownCommand)?;

        if verb.requires_auth() && session.username().is_none() {
            return Err(ChatError::NotAuthenticated);
        }

        match Command::parse(verb, args)? {
            Command::Help => Ok(Outcome::Reply(reply::HELP.to_string())),
            Command::Register { username, password } => self.register(&username, &password),
            Command::Login { username, password } => self.login(session, &username, &password),
            Command::Logout => {
                self.release(session);
                Ok(Outcome::Reply(reply::LOGGED_OUT.to_string()))
            },
            Command::ListUsers => {
                let online = self.registry.online_usernames();
                Ok(Outcome::Reply(reply::online_users(online.iter().map(String::as_str))))
            },
            Command::ListGroups => {
                let groups = self.groups.list()?;
                Ok(Outcome::Reply(reply::group_listing(
                    groups.iter().map(|(group, count)| (group.name.as_str(), *count)),
                )))
            },
            Command::PrivateMessage { recipient, body } => {
                let sender = session.authenticated_user()?;
                self.messaging.private(&sender, &recipient, &body)?;
                Ok(Outcome::Silent)
            },
            Command::Broadcast { body } => {
                let sender = session.authenticated_user()?;
                self.messaging.broadcast(&sender, &body);
                Ok(Outcome::Silent)
            },
            Command::GroupCreate { group } => {
                self.groups.create(&group)?;
                Ok(Outcome::Reply(reply::GROUP_CREATED.to_string()))
            },
            Command::GroupJoin { group } => {
                let user = session.authenticated_user()?;
                self.groups.join(&user, &group)?;
                Ok(Outcome::Reply(reply::GROUP_JOINED.to_string()))
            },
            Command::GroupLeave { group } => {
                let user = session.authenticated_user()?;
                self.groups.leave(&user, &group)?;
                Ok(Outcome::Reply(reply::GROUP_LEFT.to_string()))
            },
            Command::GroupMessage { group, body } => {
                let sender = session.authenticated_user()?;
                self.messaging.group_message(&sender, &group, &body)?;
                Ok(Outcome::Reply(reply::GROUP_MESSAGE_SENT.to_string()))
            },
        }
    }

    fn register(&self, username: &str, password: &str) -> Result<Outcome, ChatError> {
        if self.storage.find_account_by_username(username)?.is_some() {
            return Err(ChatError::AlreadyExists(Existing::Account));
        }

        let digest = off_reactor(|| self.hasher.hash(password))?;
        self.storage.create_account(username, &digest).map_err(|e| match e {
            StorageError::Duplicate { .. } => ChatError::AlreadyExists(Existing::Account),
            other => ChatError::StoreUnavailable(other),
        })?;

        tracing::info!(user = username, "account registered");
        Ok(Outcome::Reply(reply::REGISTERED.to_string()))
    }

    fn login(
        &self,
        session: &mut Session,
        username: &str,
        password: &str,
    ) -> Result<Outcome, ChatError> {
        if let Some(current) = session.username() {
            return Err(ChatError::AlreadyLoggedIn(current.to_string()));
        }

        let account = self
            .storage
            .find_account_by_username(username)?
            .ok_or(ChatError::InvalidCredentials)?;

        if !off_reactor(|| self.hasher.verify(&account.password_hash, password)) {
            return Err(ChatError::InvalidCredentials);
        }

        // Persist first: a store failure must leave no registry binding.
        self.storage.update_account_online(account.id, true)?;
        self.registry.register(session.handle.clone(), username);
        session.state =
            SessionState::Authenticated { username: username.to_string(), account_id: account.id };

        tracing::info!(connection = %session.id(), user = username, "logged in");
        Ok(Outcome::ReplyThenAnnounce(reply::LOGGED_IN.to_string(), format::joined(username)))
    }

    /// Drop the session's authentication and mirror it to the store and the
    /// other users.
    fn release(&self, session: &mut Session) {
        let SessionState::Authenticated { username, account_id } =
            std::mem::replace(&mut session.state, SessionState::Unauthenticated)
        else {
            return;
        };

        if self.registry.unregister(session.id()).is_none() {
            return;
        }

        if self.registry.is_online(&username) {
            tracing::debug!(user = %username, "another connection keeps the user online");
            return;
        }

        if let Err(e) = self.storage.update_account_online(account_id, false) {
            tracing::warn!(user = %username, error = %e, "failed to clear online flag");
        }
        self.messaging.system(&format::left(&username));

        tracing::info!(connection = %session.id(), user = %username, "logged out");
    }
}

/// Run CPU-bound work without starving the other tasks on this worker.
///
/// `block_in_place` panics on a current-thread runtime, so there (and outside
/// any runtime) the work runs inline.
fn off_reactor<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        },
        _ => work(),
    }
}
