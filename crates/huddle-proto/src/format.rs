//! Outbound lines fanned out to other connections and published on the
//! message bus, plus the bus channel names.

/// Bus channel for user broadcasts.
pub const BROADCAST_CHANNEL: &str = "broadcast";

/// Bus channel for join/leave notices.
pub const SYSTEM_CHANNEL: &str = "system";

/// Bus channel for a group. Named after the group itself.
pub fn group_channel(group: &str) -> &str {
    group
}

/// `Private from {sender}: {body}`
pub fn private(sender: &str, body: &str) -> String {
    format!("Private from {sender}: {body}")
}

/// `[{sender}]: {body}`
pub fn broadcast(sender: &str, body: &str) -> String {
    format!("[{sender}]: {body}")
}

/// `System: {message}`
pub fn system(message: &str) -> String {
    format!("System: {message}")
}

/// `[{group}][{sender}]: {body}`
pub fn group(group: &str, sender: &str, body: &str) -> String {
    format!("[{group}][{sender}]: {body}")
}

/// Join notice body, wrapped by [`system`] before delivery.
pub fn joined(username: &str) -> String {
    format!("🟢 {username} has joined the chat")
}

/// Leave notice body, wrapped by [`system`] before delivery.
pub fn left(username: &str) -> String {
    format!("🔴 {username} has left the chat")
}

/// Notice published on a group's channel when it is created.
pub fn group_created(group: &str) -> String {
    format!("Group created: {group}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_shapes() {
        assert_eq!(private("alice", "hi"), "Private from alice: hi");
        assert_eq!(broadcast("alice", "hi"), "[alice]: hi");
        assert_eq!(group("team", "alice", "hi"), "[team][alice]: hi");
        assert_eq!(system(&joined("alice")), "System: 🟢 alice has joined the chat");
        assert_eq!(system(&left("bob")), "System: 🔴 bob has left the chat");
    }
}
