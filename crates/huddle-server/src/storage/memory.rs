#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use super::{Account, Group, Membership, Storage, StorageError};

/// In-memory storage implementation for testing and simulation
///
/// Uses `BTreeMap`s keyed by id so listings come back in insertion order.
/// All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent
/// access. Thread-safe through Mutex, but uses `lock().expect()` which will
/// panic if the mutex is poisoned - acceptable for test code. Name lookups
/// are O(n) scans.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    accounts: BTreeMap<u64, Account>,
    groups: BTreeMap<u64, Group>,
    memberships: BTreeMap<u64, Membership>,
    next_account_id: u64,
    next_group_id: u64,
    next_membership_id: u64,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of membership rows for the pair.
    ///
    /// The store does not enforce pair uniqueness, so this can exceed one
    /// when callers skip the check-then-insert.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). This is acceptable for test/simulation code.
    #[allow(clippy::expect_used)]
    pub fn membership_rows(&self, account_id: u64, group_id: u64) -> usize {
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner
            .memberships
            .values()
            .filter(|m| m.account_id == account_id && m.group_id == group_id)
            .count()
    }

    /// Total number of accounts.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn account_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").accounts.len()
    }
}

impl Storage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.accounts.values().find(|a| a.username == username).cloned())
    }

    #[allow(clippy::expect_used)]
    fn create_account(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Account, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if inner.accounts.values().any(|a| a.username == username) {
            return Err(StorageError::Duplicate { entity: "account", key: username.to_string() });
        }

        inner.next_account_id += 1;
        let account = Account {
            id: inner.next_account_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            online: false,
        };
        inner.accounts.insert(account.id, account.clone());

        Ok(account)
    }

    #[allow(clippy::expect_used)]
    fn update_account_online(&self, account_id: u64, online: bool) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let account = inner
            .accounts
            .get_mut(&account_id)
            .ok_or(StorageError::NotFound { entity: "account", id: account_id })?;
        account.online = online;

        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn find_accounts_online(&self) -> Result<Vec<Account>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.accounts.values().filter(|a| a.online).cloned().collect())
    }

    #[allow(clippy::expect_used)]
    fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.groups.values().find(|g| g.name == name).cloned())
    }

    #[allow(clippy::expect_used)]
    fn create_group(&self, name: &str) -> Result<Group, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        if inner.groups.values().any(|g| g.name == name) {
            return Err(StorageError::Duplicate { entity: "group", key: name.to_string() });
        }

        inner.next_group_id += 1;
        let group = Group { id: inner.next_group_id, name: name.to_string() };
        inner.groups.insert(group.id, group.clone());

        Ok(group)
    }

    #[allow(clippy::expect_used)]
    fn list_groups(&self) -> Result<Vec<Group>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.groups.values().cloned().collect())
    }

    #[allow(clippy::expect_used)]
    fn count_members(&self, group_id: u64) -> Result<u64, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner.memberships.values().filter(|m| m.group_id == group_id).count() as u64)
    }

    #[allow(clippy::expect_used)]
    fn find_membership(
        &self,
        account_id: u64,
        group_id: u64,
    ) -> Result<Option<Membership>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");
        Ok(inner
            .memberships
            .values()
            .find(|m| m.account_id == account_id && m.group_id == group_id)
            .copied())
    }

    #[allow(clippy::expect_used)]
    fn create_membership(
        &self,
        account_id: u64,
        group_id: u64,
    ) -> Result<Membership, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        inner.next_membership_id += 1;
        let membership = Membership { id: inner.next_membership_id, account_id, group_id };
        inner.memberships.insert(membership.id, membership);

        Ok(membership)
    }

    #[allow(clippy::expect_used)]
    fn delete_membership(&self, membership_id: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        inner
            .memberships
            .remove(&membership_id)
            .map(|_| ())
            .ok_or(StorageError::NotFound { entity: "membership", id: membership_id })
    }

    #[allow(clippy::expect_used)]
    fn members_of_group(&self, group_id: u64) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        Ok(inner
            .memberships
            .values()
            .filter(|m| m.group_id == group_id)
            .filter_map(|m| inner.accounts.get(&m.account_id))
            .map(|a| a.username.clone())
            .collect())
    }
}
