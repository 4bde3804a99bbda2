//! Canned responses sent to the issuing connection.
//!
//! Texts carry no trailing newline; the connection layer terminates every
//! line it writes.

/// Successful `/register`.
pub const REGISTERED: &str = "Registration successful! Use /login <username> <password> to login.";
/// `/register` with a username that already exists.
pub const USERNAME_TAKEN: &str = "Username already taken";
/// Successful `/login`.
pub const LOGGED_IN: &str = "Login successful! You can now chat.";
/// Unknown username or wrong password. Deliberately identical for both.
pub const INVALID_CREDENTIALS: &str = "Invalid username or password";
/// Successful `/logout`.
pub const LOGGED_OUT: &str = "Logged out successfully";
/// Any gated command on an unauthenticated connection.
pub const NOT_LOGGED_IN: &str = "You must be logged in to use this command. Use /login <username> <password>.";
/// Verb token not in the command table.
pub const UNKNOWN_COMMAND: &str = "Unknown command. Type /help for available commands.";
/// `/pm` to a user with no live session.
pub const USER_NOT_FOUND: &str = "User not found or offline";
/// Successful `/group_create`.
pub const GROUP_CREATED: &str = "Group created successfully";
/// `/group_create` with an existing name.
pub const GROUP_EXISTS: &str = "Group already exists";
/// Group lookup by name failed.
pub const GROUP_NOT_FOUND: &str = "Group not found";
/// Successful `/group_join`.
pub const GROUP_JOINED: &str = "Joined group successfully";
/// `/group_join` for a group the user already belongs to.
pub const ALREADY_MEMBER: &str = "You are already a member of this group";
/// Successful `/group_leave`.
pub const GROUP_LEFT: &str = "Left group successfully";
/// Group operation that requires membership.
pub const NOT_MEMBER: &str = "You are not a member of this group";
/// Successful `/group_msg`.
pub const GROUP_MESSAGE_SENT: &str = "Message sent to group";
/// `/list_groups` with no groups.
pub const NO_GROUPS: &str = "No groups available";
/// Persistence or hashing failure.
pub const SERVICE_UNAVAILABLE: &str = "Service temporarily unavailable, please try again later";
/// Connection refused at accept because the server is at capacity.
pub const SERVER_FULL: &str = "Server is full, please try again later";
/// Inbound line exceeded the configured limit and was discarded.
pub const LINE_TOO_LONG: &str = "Line too long, ignored";

/// `/help` listing.
pub const HELP: &str = "Available Commands:
/help                           - Show this help message
/register <username> <password> - Create a new account
/login <username> <password>    - Login to your account
/logout                         - Logout from current session
/list_user                      - Show online users
/list_groups                    - Show all available groups
/pm <username> <message>        - Send private message
/broadcast <message>            - Send message to all users
/group_create <group_name>      - Create a new group
/group_join <group_name>        - Join an existing group
/group_leave <group_name>       - Leave a group
/group_msg <group_name> <msg>   - Send message to group";

/// `/login` on a connection that is already authenticated.
pub fn already_logged_in(username: &str) -> String {
    format!("Already logged in as {username}. Use /logout first.")
}

/// `/list_user` listing.
pub fn online_users<'a>(usernames: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::from("Online Users:");
    for name in usernames {
        out.push_str("\n- ");
        out.push_str(name);
    }
    out
}

/// `/list_groups` listing. Falls back to [`NO_GROUPS`] when empty.
pub fn group_listing<'a>(groups: impl IntoIterator<Item = (&'a str, u64)>) -> String {
    let mut out = String::from("Available Groups:");
    let mut any = false;
    for (name, members) in groups {
        any = true;
        out.push_str(&format!("\n- {name} (Members: {members})"));
    }
    if any { out } else { NO_GROUPS.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_lists_every_verb() {
        for verb in crate::Verb::ALL {
            assert!(HELP.contains(verb.token()), "help is missing {verb}");
        }
    }

    #[test]
    fn online_users_listing() {
        assert_eq!(online_users(["alice", "bob"]), "Online Users:\n- alice\n- bob");
        assert_eq!(online_users([]), "Online Users:");
    }

    #[test]
    fn group_listing_empty_and_populated() {
        assert_eq!(group_listing([]), NO_GROUPS);
        assert_eq!(
            group_listing([("team", 2), ("ops", 0)]),
            "Available Groups:\n- team (Members: 2)\n- ops (Members: 0)"
        );
    }
}
