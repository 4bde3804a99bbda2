//! Messaging engine: private, broadcast, system, and group delivery.
//!
//! Fan-out works on a copy of the registry taken at the moment of sending,
//! so connections that bind afterwards miss the message and connections that
//! went away produce a [`DeliveryFailure`] that is logged and dropped here.
//! Nothing in this module writes to a socket; it only queues lines.

use std::{collections::HashSet, sync::Arc};

use bytes::Bytes;
use huddle_proto::format;

use crate::{
    bus::MessageBus,
    connection::{ConnectionHandle, DeliveryFailure},
    error::{ChatError, Missing},
    groups::GroupCoordinator,
    registry::SessionRegistry,
    storage::Storage,
};

/// Routes chat text to connections and the message bus.
pub struct MessagingEngine<S: Storage, B: MessageBus> {
    registry: Arc<dyn SessionRegistry>,
    bus: B,
    groups: GroupCoordinator<S, B>,
}

impl<S: Storage, B: MessageBus> MessagingEngine<S, B> {
    /// Create an engine that resolves group membership through `groups`.
    pub fn new(registry: Arc<dyn SessionRegistry>, bus: B, groups: GroupCoordinator<S, B>) -> Self {
        Self { registry, bus, groups }
    }

    /// Send `body` from `sender` to the connection routed for `recipient`.
    ///
    /// Best effort: a delivery failure on the recipient is logged, not
    /// returned.
    ///
    /// # Errors
    ///
    /// `NotFound(User)` if `recipient` has no live session
    pub fn private(&self, sender: &str, recipient: &str, body: &str) -> Result<(), ChatError> {
        let handle = self
            .registry
            .lookup_connection_for(recipient)
            .ok_or(ChatError::NotFound(Missing::User))?;

        let line = format::private(sender, body);
        if let Err(e) = handle.deliver(&line) {
            log_delivery_failure(&handle, recipient, e);
        }
        Ok(())
    }

    /// Publish `[sender]: body` and deliver it to every connection,
    /// the sender's included.
    pub fn broadcast(&self, sender: &str, body: &str) {
        let line = format::broadcast(sender, body);
        self.bus.publish(format::BROADCAST_CHANNEL, Bytes::from(line.clone()));

        let delivered = fan_out(self.registry.snapshot(), &line);
        tracing::debug!(user = sender, delivered, "broadcast");
    }

    /// Publish `System: message` on the system channel and deliver it to
    /// every connection.
    pub fn system(&self, message: &str) {
        let line = format::system(message);
        self.bus.publish(format::SYSTEM_CHANNEL, Bytes::from(line.clone()));

        fan_out(self.registry.snapshot(), &line);
    }

    /// Deliver a group message to the online members of the group.
    ///
    /// Nothing is published or delivered unless `sender` is a member and the
    /// member list could be read.
    ///
    /// # Errors
    ///
    /// - `NotFound(Group)` if the group does not exist
    /// - `NotFound(Membership)` if `sender` is not a member
    /// - `StoreUnavailable` if the store fails
    pub fn group_message(
        &self,
        sender: &str,
        group_name: &str,
        body: &str,
    ) -> Result<(), ChatError> {
        let group = self.groups.membership_group(sender, group_name)?;
        let members: HashSet<String> =
            self.groups.member_usernames(group.id)?.into_iter().collect();

        // Every store read is done; nothing below can fail.
        let line = format::group(&group.name, sender, body);
        self.bus.publish(format::group_channel(&group.name), Bytes::from(line.clone()));

        let recipients =
            self.registry.snapshot().into_iter().filter(|(_, username)| members.contains(username));

        let delivered = fan_out(recipients, &line);
        tracing::debug!(user = sender, group = %group.name, delivered, "group message");
        Ok(())
    }
}

/// Queue `line` on every recipient, logging failures. Returns how many
/// queues accepted it.
fn fan_out(recipients: impl IntoIterator<Item = (ConnectionHandle, String)>, line: &str) -> usize {
    let mut delivered = 0;
    for (handle, username) in recipients {
        match handle.deliver(line) {
            Ok(()) => delivered += 1,
            Err(e) => log_delivery_failure(&handle, &username, e),
        }
    }
    delivered
}

fn log_delivery_failure(handle: &ConnectionHandle, username: &str, failure: DeliveryFailure) {
    tracing::warn!(
        connection = %handle.id(),
        user = username,
        error = %failure,
        "delivery dropped"
    );
}
