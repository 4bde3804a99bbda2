//! Error types for command handling and the server runtime.

use std::fmt;

use huddle_proto::{UsageError, reply};
use thiserror::Error;

use crate::{hasher::HashError, storage::StorageError};

/// What a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// No group with the given name
    Group,
    /// No online user with the given name
    User,
    /// The caller is not a member of the group
    Membership,
}

/// What a creation attempt collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existing {
    /// Username taken
    Account,
    /// Group name taken
    Group,
}

/// Failure of a single command.
///
/// Every variant is recovered at the command boundary and rendered with
/// [`ChatError::reply`] as one line to the issuing connection. None of them
/// end the connection.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Wrong argument count for a known verb
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Command requires a logged-in session
    #[error("not authenticated")]
    NotAuthenticated,

    /// Group, user, or membership absent
    #[error("{0:?} not found")]
    NotFound(Missing),

    /// Duplicate account or group
    #[error("{0:?} already exists")]
    AlreadyExists(Existing),

    /// Membership for the (user, group) pair already exists
    #[error("already a member")]
    AlreadyMember,

    /// Unknown username or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// `/login` on an authenticated connection
    #[error("already logged in as {0}")]
    AlreadyLoggedIn(String),

    /// Verb token not in the command table
    #[error("unknown command")]
    UnknownCommand,

    /// Persistence call failed
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    /// Credential hashing failed
    #[error("credential hashing failed: {0}")]
    Hashing(#[from] HashError),
}

impl ChatError {
    /// Line sent back to the issuing connection.
    pub fn reply(&self) -> String {
        match self {
            Self::Usage(err) => err.to_string(),
            Self::NotAuthenticated => reply::NOT_LOGGED_IN.to_string(),
            Self::NotFound(Missing::Group) => reply::GROUP_NOT_FOUND.to_string(),
            Self::NotFound(Missing::User) => reply::USER_NOT_FOUND.to_string(),
            Self::NotFound(Missing::Membership) => reply::NOT_MEMBER.to_string(),
            Self::AlreadyExists(Existing::Account) => reply::USERNAME_TAKEN.to_string(),
            Self::AlreadyExists(Existing::Group) => reply::GROUP_EXISTS.to_string(),
            Self::AlreadyMember => reply::ALREADY_MEMBER.to_string(),
            Self::InvalidCredentials => reply::INVALID_CREDENTIALS.to_string(),
            Self::AlreadyLoggedIn(username) => reply::already_logged_in(username),
            Self::UnknownCommand => reply::UNKNOWN_COMMAND.to_string(),
            Self::StoreUnavailable(_) | Self::Hashing(_) => reply::SERVICE_UNAVAILABLE.to_string(),
        }
    }

    /// Whether this failure came from a backing service rather than from the
    /// client's request.
    pub fn is_service_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Hashing(_))
    }
}

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad hash costs, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, accept failure, I/O error).
    Transport(String),

    /// Storage could not be opened.
    Storage(StorageError),

    /// Internal error (unexpected state, task failure).
    ///
    /// Should never happen in correct implementation. Indicates a bug.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<HashError> for ServerError {
    fn from(err: HashError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use huddle_proto::Verb;

    use super::*;

    #[test]
    fn replies_use_canned_text() {
        assert_eq!(ChatError::NotFound(Missing::Group).reply(), reply::GROUP_NOT_FOUND);
        assert_eq!(ChatError::AlreadyExists(Existing::Account).reply(), reply::USERNAME_TAKEN);
        assert_eq!(ChatError::Usage(UsageError { verb: Verb::Login }).reply(), Verb::Login.usage());
        assert_eq!(
            ChatError::AlreadyLoggedIn("alice".into()).reply(),
            reply::already_logged_in("alice")
        );
    }

    #[test]
    fn service_failures_share_generic_reply() {
        let store = ChatError::from(StorageError::Io("disk".into()));
        let hash = ChatError::from(HashError::Salt("no entropy".into()));

        assert!(store.is_service_failure());
        assert_eq!(store.reply(), reply::SERVICE_UNAVAILABLE);
        assert_eq!(hash.reply(), reply::SERVICE_UNAVAILABLE);
        assert!(!ChatError::AlreadyMember.is_service_failure());
    }

    #[test]
    fn server_error_display() {
        let err = ServerError::from(std::io::Error::other("address in use"));
        assert_eq!(err.to_string(), "transport error: address in use");

        let err = ServerError::from(StorageError::Io("locked".into()));
        assert!(std::error::Error::source(&err).is_some());
    }
}
