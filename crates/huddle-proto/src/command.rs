//! Command tokenizing and parsing.
//!
//! Parsing is split in two steps so the caller can gate a verb on the
//! authentication state before looking at its arguments:
//!
//! 1. [`tokenize`] splits a line on whitespace into a verb token and
//!    positional arguments.
//! 2. [`Command::parse`] checks the argument count for a known [`Verb`] and
//!    builds the typed command.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// A command verb. Matching is exact and case-sensitive, leading `/`
/// included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `/help`
    Help,
    /// `/register <username> <password>`
    Register,
    /// `/login <username> <password>`
    Login,
    /// `/logout`
    Logout,
    /// `/list_user`
    ListUsers,
    /// `/list_groups`
    ListGroups,
    /// `/pm <username> <message>`
    PrivateMessage,
    /// `/broadcast <message>`
    Broadcast,
    /// `/group_create <group_name>`
    GroupCreate,
    /// `/group_join <group_name>`
    GroupJoin,
    /// `/group_leave <group_name>`
    GroupLeave,
    /// `/group_msg <group_name> <message>`
    GroupMessage,
}

impl Verb {
    /// Every verb, in help-listing order.
    pub const ALL: [Verb; 12] = [
        Verb::Help,
        Verb::Register,
        Verb::Login,
        Verb::Logout,
        Verb::ListUsers,
        Verb::ListGroups,
        Verb::PrivateMessage,
        Verb::Broadcast,
        Verb::GroupCreate,
        Verb::GroupJoin,
        Verb::GroupLeave,
        Verb::GroupMessage,
    ];

    /// Wire token for this verb.
    pub fn token(self) -> &'static str {
        match self {
            Verb::Help => "/help",
            Verb::Register => "/register",
            Verb::Login => "/login",
            Verb::Logout => "/logout",
            Verb::ListUsers => "/list_user",
            Verb::ListGroups => "/list_groups",
            Verb::PrivateMessage => "/pm",
            Verb::Broadcast => "/broadcast",
            Verb::GroupCreate => "/group_create",
            Verb::GroupJoin => "/group_join",
            Verb::GroupLeave => "/group_leave",
            Verb::GroupMessage => "/group_msg",
        }
    }

    /// Whether the verb is rejected on an unauthenticated connection.
    pub fn requires_auth(self) -> bool {
        !matches!(self, Verb::Help | Verb::Register | Verb::Login)
    }

    /// Canned usage line sent on an argument-count mismatch.
    pub fn usage(self) -> &'static str {
        match self {
            Verb::Help => "Usage: /help",
            Verb::Register => "Usage: /register <username> <password>",
            Verb::Login => "Usage: /login <username> <password>",
            Verb::Logout => "Usage: /logout",
            Verb::ListUsers => "Usage: /list_user",
            Verb::ListGroups => "Usage: /list_groups",
            Verb::PrivateMessage => "Usage: /pm <username> <message>",
            Verb::Broadcast => "Usage: /broadcast <message>",
            Verb::GroupCreate => "Usage: /group_create <group_name>",
            Verb::GroupJoin => "Usage: /group_join <group_name>",
            Verb::GroupLeave => "Usage: /group_leave <group_name>",
            Verb::GroupMessage => "Usage: /group_msg <group_name> <message>",
        }
    }

    /// Argument arity: `(leading fixed args, trailing body required)`.
    fn arity(self) -> (usize, bool) {
        match self {
            Verb::Help | Verb::Logout | Verb::ListUsers | Verb::ListGroups => (0, false),
            Verb::Register | Verb::Login => (2, false),
            Verb::GroupCreate | Verb::GroupJoin | Verb::GroupLeave => (1, false),
            Verb::Broadcast => (0, true),
            Verb::PrivateMessage | Verb::GroupMessage => (1, true),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Verb {
    type Err = ();

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Verb::ALL.into_iter().find(|verb| verb.token() == token).ok_or(())
    }
}

/// Argument-count mismatch for a known verb.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{}", verb.usage())]
pub struct UsageError {
    /// Verb whose usage was violated
    pub verb: Verb,
}

/// A fully parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the command listing
    Help,
    /// Create an account
    Register {
        /// Requested username
        username: String,
        /// Plaintext password
        password: String,
    },
    /// Authenticate this connection
    Login {
        /// Account username
        username: String,
        /// Plaintext password
        password: String,
    },
    /// Drop the authentication of this connection
    Logout,
    /// List online users
    ListUsers,
    /// List groups with member counts
    ListGroups,
    /// Direct message to one online user
    PrivateMessage {
        /// Recipient username
        recipient: String,
        /// Message body
        body: String,
    },
    /// Message to every connected user
    Broadcast {
        /// Message body
        body: String,
    },
    /// Create a group
    GroupCreate {
        /// Group name
        group: String,
    },
    /// Join a group
    GroupJoin {
        /// Group name
        group: String,
    },
    /// Leave a group
    GroupLeave {
        /// Group name
        group: String,
    },
    /// Message to the online members of a group
    GroupMessage {
        /// Group name
        group: String,
        /// Message body
        body: String,
    },
}

impl Command {
    /// Build a typed command from a verb and its positional arguments.
    ///
    /// Fixed-arity verbs need exactly their argument count. Verbs carrying a
    /// message need at least one body token; body tokens are re-joined with
    /// single spaces.
    pub fn parse(verb: Verb, args: &[&str]) -> Result<Self, UsageError> {
        let (fixed, body_required) = verb.arity();
        let arity_ok = if body_required { args.len() > fixed } else { args.len() == fixed };
        if !arity_ok {
            return Err(UsageError { verb });
        }

        let arg = |i: usize| args[i].to_string();
        let body = || args[fixed..].join(" ");

        Ok(match verb {
            Verb::Help => Command::Help,
            Verb::Register => Command::Register { username: arg(0), password: arg(1) },
            Verb::Login => Command::Login { username: arg(0), password: arg(1) },
            Verb::Logout => Command::Logout,
            Verb::ListUsers => Command::ListUsers,
            Verb::ListGroups => Command::ListGroups,
            Verb::PrivateMessage => Command::PrivateMessage { recipient: arg(0), body: body() },
            Verb::Broadcast => Command::Broadcast { body: body() },
            Verb::GroupCreate => Command::GroupCreate { group: arg(0) },
            Verb::GroupJoin => Command::GroupJoin { group: arg(0) },
            Verb::GroupLeave => Command::GroupLeave { group: arg(0) },
            Verb::GroupMessage => Command::GroupMessage { group: arg(0), body: body() },
        })
    }

    /// Verb this command was parsed from.
    pub fn verb(&self) -> Verb {
        match self {
            Command::Help => Verb::Help,
            Command::Register { .. } => Verb::Register,
            Command::Login { .. } => Verb::Login,
            Command::Logout => Verb::Logout,
            Command::ListUsers => Verb::ListUsers,
            Command::ListGroups => Verb::ListGroups,
            Command::PrivateMessage { .. } => Verb::PrivateMessage,
            Command::Broadcast { .. } => Verb::Broadcast,
            Command::GroupCreate { .. } => Verb::GroupCreate,
            Command::GroupJoin { .. } => Verb::GroupJoin,
            Command::GroupLeave { .. } => Verb::GroupLeave,
            Command::GroupMessage { .. } => Verb::GroupMessage,
        }
    }
}

/// Split a line into its verb token and positional arguments.
///
/// Returns `None` for a line with no tokens at all.
pub fn tokenize(line: &str) -> Option<(&str, Vec<&str>)> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next()?;
    Some((verb, tokens.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_line(line: &str) -> Result<Command, UsageError> {
        let (token, args) = tokenize(line).unwrap();
        let verb: Verb = token.parse().unwrap();
        Command::parse(verb, &args)
    }

    #[test]
    fn verb_tokens_round_trip() {
        for verb in Verb::ALL {
            assert_eq!(verb.token().parse::<Verb>(), Ok(verb));
        }
    }

    #[test]
    fn verb_matching_is_case_sensitive() {
        assert!("/HELP".parse::<Verb>().is_err());
        assert!("help".parse::<Verb>().is_err());
        assert!("/Login".parse::<Verb>().is_err());
    }

    #[test]
    fn only_help_register_login_skip_auth() {
        let open: Vec<_> = Verb::ALL.into_iter().filter(|v| !v.requires_auth()).collect();
        assert_eq!(open, vec![Verb::Help, Verb::Register, Verb::Login]);
    }

    #[test]
    fn tokenize_blank_line() {
        assert!(tokenize("").is_none());
        assert!(tokenize("   \t ").is_none());
    }

    #[test]
    fn tokenize_collapses_whitespace() {
        let (verb, args) = tokenize("  /pm   bob  hello   there \r").unwrap();
        assert_eq!(verb, "/pm");
        assert_eq!(args, vec!["bob", "hello", "there"]);
    }

    #[test]
    fn parse_login() {
        assert_eq!(
            parse_line("/login alice pw1"),
            Ok(Command::Login { username: "alice".into(), password: "pw1".into() })
        );
    }

    #[test]
    fn login_missing_password_is_usage_error() {
        let err = parse_line("/login alice").unwrap_err();
        assert_eq!(err.verb, Verb::Login);
        assert_eq!(err.to_string(), "Usage: /login <username> <password>");
    }

    #[test]
    fn register_with_extra_args_is_usage_error() {
        assert_eq!(parse_line("/register a b c"), Err(UsageError { verb: Verb::Register }));
    }

    #[test]
    fn message_body_is_rejoined() {
        assert_eq!(
            parse_line("/group_msg team hi   all"),
            Ok(Command::GroupMessage { group: "team".into(), body: "hi all".into() })
        );
        assert_eq!(
            parse_line("/broadcast hello world"),
            Ok(Command::Broadcast { body: "hello world".into() })
        );
    }

    #[test]
    fn message_verbs_need_a_body() {
        assert!(parse_line("/pm bob").is_err());
        assert!(parse_line("/broadcast").is_err());
        assert!(parse_line("/group_msg team").is_err());
    }

    #[test]
    fn zero_arity_verbs_reject_arguments() {
        assert_eq!(parse_line("/logout now"), Err(UsageError { verb: Verb::Logout }));
        assert_eq!(parse_line("/list_user"), Ok(Command::ListUsers));
    }

    #[test]
    fn parsed_command_reports_its_verb() {
        for line in ["/help", "/group_join team", "/pm bob yo", "/list_groups"] {
            let (token, _) = tokenize(line).unwrap();
            assert_eq!(parse_line(line).unwrap().verb().token(), token);
        }
    }
}
