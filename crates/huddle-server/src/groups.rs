//! Group coordinator: create, join, leave, and list groups.
//!
//! Membership uniqueness per (account, group) pair is enforced here with a
//! check-then-insert, because the store does not enforce it. Two concurrent
//! joins for the same pair can both pass the check; this is accepted at the
//! current scale and surfaces as a duplicate row that a later leave removes
//! one at a time.

use std::sync::Arc;

use bytes::Bytes;
use huddle_proto::format;

use crate::{
    bus::MessageBus,
    error::{ChatError, Existing, Missing},
    registry::SessionRegistry,
    storage::{Account, Group, Membership, Storage, StorageError},
};

/// Group operations backed by the persistence service.
pub struct GroupCoordinator<S: Storage, B: MessageBus> {
    storage: S,
    bus: B,
    registry: Arc<dyn SessionRegistry>,
}

impl<S: Storage, B: MessageBus> Clone for GroupCoordinator<S, B> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            bus: self.bus.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: Storage, B: MessageBus> GroupCoordinator<S, B> {
    /// Create a coordinator over the given store, bus, and registry.
    pub fn new(storage: S, bus: B, registry: Arc<dyn SessionRegistry>) -> Self {
        Self { storage, bus, registry }
    }

    /// Create a group and announce it on the group's bus channel.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists(Group)` if the name is taken
    /// - `StoreUnavailable` if the store fails
    pub fn create(&self, name: &str) -> Result<Group, ChatError> {
        let group = self.storage.create_group(name).map_err(|e| match e {
            StorageError::Duplicate { .. } => ChatError::AlreadyExists(Existing::Group),
            other => ChatError::StoreUnavailable(other),
        })?;

        self.bus.publish(
            format::group_channel(&group.name),
            Bytes::from(format::group_created(&group.name)),
        );

        tracing::info!(group = %group.name, id = group.id, "group created");
        Ok(group)
    }

    /// Add `username` to a group.
    ///
    /// # Errors
    ///
    /// - `NotFound(Group)` if the group does not exist
    /// - `NotAuthenticated` if `username` has no live session
    /// - `AlreadyMember` if a membership row already exists
    /// - `StoreUnavailable` if the store fails
    pub fn join(&self, username: &str, group_name: &str) -> Result<Membership, ChatError> {
        let group = self.find_group(group_name)?;

        if !self.registry.is_online(username) {
            return Err(ChatError::NotAuthenticated);
        }
        let account = self.account(username)?;

        if self.storage.find_membership(account.id, group.id)?.is_some() {
            return Err(ChatError::AlreadyMember);
        }

        let membership = self.storage.create_membership(account.id, group.id)?;
        tracing::debug!(user = username, group = group_name, "joined group");
        Ok(membership)
    }

    /// Remove one membership row of `username` in a group.
    ///
    /// # Errors
    ///
    /// - `NotFound(Group)` if the group does not exist
    /// - `NotFound(Membership)` if `username` is not a member
    /// - `StoreUnavailable` if the store fails
    pub fn leave(&self, username: &str, group_name: &str) -> Result<(), ChatError> {
        let group = self.find_group(group_name)?;
        let account = self.account(username)?;

        let membership = self
            .storage
            .find_membership(account.id, group.id)?
            .ok_or(ChatError::NotFound(Missing::Membership))?;

        self.storage.delete_membership(membership.id)?;
        tracing::debug!(user = username, group = group_name, "left group");
        Ok(())
    }

    /// Every group with its member count, in creation order.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the store fails
    pub fn list(&self) -> Result<Vec<(Group, u64)>, ChatError> {
        let groups = self.storage.list_groups()?;

        let mut listed = Vec::with_capacity(groups.len());
        for group in groups {
            let count = self.storage.count_members(group.id)?;
            listed.push((group, count));
        }
        Ok(listed)
    }

    /// Resolve a group that `username` must belong to.
    ///
    /// # Errors
    ///
    /// - `NotFound(Group)` if the group does not exist
    /// - `NotFound(Membership)` if `username` is not a member
    /// - `StoreUnavailable` if the store fails
    pub fn membership_group(&self, username: &str, group_name: &str) -> Result<Group, ChatError> {
        let group = self.find_group(group_name)?;
        let account = self.account(username)?;

        match self.storage.find_membership(account.id, group.id)? {
            Some(_) => Ok(group),
            None => Err(ChatError::NotFound(Missing::Membership)),
        }
    }

    /// Usernames of every member of a group, in one store call.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the store fails
    pub fn member_usernames(&self, group_id: u64) -> Result<Vec<String>, ChatError> {
        Ok(self.storage.members_of_group(group_id)?)
    }

    fn find_group(&self, name: &str) -> Result<Group, ChatError> {
        self.storage.find_group_by_name(name)?.ok_or(ChatError::NotFound(Missing::Group))
    }

    /// Account behind a session. A session whose account vanished from the
    /// store is treated as unauthenticated.
    fn account(&self, username: &str) -> Result<Account, ChatError> {
        self.storage.find_account_by_username(username)?.ok_or(ChatError::NotAuthenticated)
    }
}
