//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Accounts, groups, and memberships survive server restarts; the `online`
//! projection does not, it is cleared when the database is opened.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Serialize, de::DeserializeOwned};

use super::{Account, Group, Membership, Storage, StorageError};

/// Table: accounts
/// Key: account id
/// Value: CBOR-encoded Account
const ACCOUNTS: TableDefinition<u64, &[u8]> = TableDefinition::new("accounts");

/// Table: account_names
/// Key: username
/// Value: account id (unique index)
const ACCOUNT_NAMES: TableDefinition<&str, u64> = TableDefinition::new("account_names");

/// Table: groups
/// Key: group id
/// Value: CBOR-encoded Group
const GROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("groups");

/// Table: group_names
/// Key: group name
/// Value: group id (unique index)
const GROUP_NAMES: TableDefinition<&str, u64> = TableDefinition::new("group_names");

/// Table: memberships
/// Key: membership id
/// Value: CBOR-encoded Membership
const MEMBERSHIPS: TableDefinition<u64, &[u8]> = TableDefinition::new("memberships");

/// Table: meta
/// Key: counter name
/// Value: last id handed out
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_ACCOUNT: &str = "next_account_id";
const NEXT_GROUP: &str = "next_group_id";
const NEXT_MEMBERSHIP: &str = "next_membership_id";

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist and clears every account's
    /// `online` flag, since no session outlives the process.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            let _ = txn.open_table(ACCOUNT_NAMES).map_err(io_err)?;
            let _ = txn.open_table(GROUPS).map_err(io_err)?;
            let _ = txn.open_table(GROUP_NAMES).map_err(io_err)?;
            let _ = txn.open_table(MEMBERSHIPS).map_err(io_err)?;
            let _ = txn.open_table(META).map_err(io_err)?;

            let mut accounts = txn.open_table(ACCOUNTS).map_err(io_err)?;

            let mut stale = Vec::new();
            for entry in accounts.iter().map_err(io_err)? {
                let (_, value) = entry.map_err(io_err)?;
                let account: Account = decode(value.value())?;
                if account.online {
                    stale.push(account);
                }
            }

            for mut account in stale {
                account.online = false;
                let bytes = encode(&account)?;
                accounts.insert(account.id, bytes.as_slice()).map_err(io_err)?;
            }
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Bump and return the named id counter inside `txn`.
    fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64, StorageError> {
        let mut meta = txn.open_table(META).map_err(io_err)?;
        let last = meta.get(counter).map_err(io_err)?.map_or(0, |guard| guard.value());
        let next = last + 1;
        meta.insert(counter, next).map_err(io_err)?;
        Ok(next)
    }
}

impl Storage for RedbStorage {
    fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let names = txn.open_table(ACCOUNT_NAMES).map_err(io_err)?;
        let accounts = txn.open_table(ACCOUNTS).map_err(io_err)?;

        let Some(id) = names.get(username).map_err(io_err)?.map(|guard| guard.value()) else {
            return Ok(None);
        };

        match accounts.get(id).map_err(io_err)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn create_account(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Account, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let account = {
            let mut names = txn.open_table(ACCOUNT_NAMES).map_err(io_err)?;
            if names.get(username).map_err(io_err)?.is_some() {
                return Err(StorageError::Duplicate {
                    entity: "account",
                    key: username.to_string(),
                });
            }

            let id = Self::next_id(&txn, NEXT_ACCOUNT)?;
            let account = Account {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                online: false,
            };

            let bytes = encode(&account)?;
            let mut accounts = txn.open_table(ACCOUNTS).map_err(io_err)?;
            accounts.insert(id, bytes.as_slice()).map_err(io_err)?;
            names.insert(username, id).map_err(io_err)?;

            account
        };

        txn.commit().map_err(io_err)?;

        Ok(account)
    }

    fn update_account_online(&self, account_id: u64, online: bool) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        {
            let mut accounts = txn.open_table(ACCOUNTS).map_err(io_err)?;

            let existing: Option<Account> = match accounts.get(account_id).map_err(io_err)? {
                Some(value) => Some(decode(value.value())?),
                None => None,
            };
            let mut account =
                existing.ok_or(StorageError::NotFound { entity: "account", id: account_id })?;

            account.online = online;
            let bytes = encode(&account)?;
            accounts.insert(account_id, bytes.as_slice()).map_err(io_err)?;
        }

        txn.commit().map_err(io_err)?;

        Ok(())
    }

    fn find_accounts_online(&self) -> Result<Vec<Account>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let accounts = txn.open_table(ACCOUNTS).map_err(io_err)?;

        let mut online = Vec::new();
        for entry in accounts.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let account: Account = decode(value.value())?;
            if account.online {
                online.push(account);
            }
        }

        Ok(online)
    }

    fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let names = txn.open_table(GROUP_NAMES).map_err(io_err)?;
        let groups = txn.open_table(GROUPS).map_err(io_err)?;

        let Some(id) = names.get(name).map_err(io_err)?.map(|guard| guard.value()) else {
            return Ok(None);
        };

        match groups.get(id).map_err(io_err)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn create_group(&self, name: &str) -> Result<Group, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let group = {
            let mut names = txn.open_table(GROUP_NAMES).map_err(io_err)?;
            if names.get(name).map_err(io_err)?.is_some() {
                return Err(StorageError::Duplicate { entity: "group", key: name.to_string() });
            }

            let id = Self::next_id(&txn, NEXT_GROUP)?;
            let group = Group { id, name: name.to_string() };

            let bytes = encode(&group)?;
            let mut groups = txn.open_table(GROUPS).map_err(io_err)?;
            groups.insert(id, bytes.as_slice()).map_err(io_err)?;
            names.insert(name, id).map_err(io_err)?;

            group
        };

        txn.commit().map_err(io_err)?;

        Ok(group)
    }

    fn list_groups(&self) -> Result<Vec<Group>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let groups = txn.open_table(GROUPS).map_err(io_err)?;

        let mut listed = Vec::new();
        for entry in groups.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            listed.push(decode(value.value())?);
        }

        Ok(listed)
    }

    fn count_members(&self, group_id: u64) -> Result<u64, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let memberships = txn.open_table(MEMBERSHIPS).map_err(io_err)?;

        let mut count = 0;
        for entry in memberships.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let membership: Membership = decode(value.value())?;
            if membership.group_id == group_id {
                count += 1;
            }
        }

        Ok(count)
    }

    fn find_membership(
        &self,
        account_id: u64,
        group_id: u64,
    ) -> Result<Option<Membership>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let memberships = txn.open_table(MEMBERSHIPS).map_err(io_err)?;

        for entry in memberships.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let membership: Membership = decode(value.value())?;
            if membership.account_id == account_id && membership.group_id == group_id {
                return Ok(Some(membership));
            }
        }

        Ok(None)
    }

    fn create_membership(
        &self,
        account_id: u64,
        group_id: u64,
    ) -> Result<Membership, StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        let membership = {
            let id = Self::next_id(&txn, NEXT_MEMBERSHIP)?;
            let membership = Membership { id, account_id, group_id };

            let bytes = encode(&membership)?;
            let mut memberships = txn.open_table(MEMBERSHIPS).map_err(io_err)?;
            memberships.insert(id, bytes.as_slice()).map_err(io_err)?;

            membership
        };

        txn.commit().map_err(io_err)?;

        Ok(membership)
    }

    fn delete_membership(&self, membership_id: u64) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io_err)?;

        {
            let mut memberships = txn.open_table(MEMBERSHIPS).map_err(io_err)?;
            let removed = memberships.remove(membership_id).map_err(io_err)?.is_some();
            if !removed {
                return Err(StorageError::NotFound { entity: "membership", id: membership_id });
            }
        }

        txn.commit().map_err(io_err)?;

        Ok(())
    }

    fn members_of_group(&self, group_id: u64) -> Result<Vec<String>, StorageError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let memberships = txn.open_table(MEMBERSHIPS).map_err(io_err)?;
        let accounts = txn.open_table(ACCOUNTS).map_err(io_err)?;

        let mut usernames = Vec::new();
        for entry in memberships.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            let membership: Membership = decode(value.value())?;
            if membership.group_id != group_id {
                continue;
            }

            if let Some(value) = accounts.get(membership.account_id).map_err(io_err)? {
                let account: Account = decode(value.value())?;
                usernames.push(account.username);
            }
        }

        Ok(usernames)
    }
}

fn io_err(err: impl std::fmt::Display) -> StorageError {
    StorageError::Io(err.to_string())
}

fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(row, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn open_temp() -> (TempDir, RedbStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("huddle.redb")).unwrap();
        (dir, storage)
    }

    #[test]
    fn account_lifecycle() {
        let (_dir, storage) = open_temp();

        let alice = storage.create_account("alice", "digest").unwrap();
        assert_eq!(alice.id, 1);
        assert!(matches!(
            storage.create_account("alice", "other"),
            Err(StorageError::Duplicate { entity: "account", .. })
        ));

        storage.update_account_online(alice.id, true).unwrap();
        let found = storage.find_account_by_username("alice").unwrap().unwrap();
        assert!(found.online);
        assert_eq!(found.password_hash, "digest");

        assert_eq!(storage.find_accounts_online().unwrap().len(), 1);
        assert!(storage.find_account_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn update_missing_account_is_not_found() {
        let (_dir, storage) = open_temp();
        assert_eq!(
            storage.update_account_online(9, true),
            Err(StorageError::NotFound { entity: "account", id: 9 })
        );
    }

    #[test]
    fn group_and_membership_queries() {
        let (_dir, storage) = open_temp();

        let alice = storage.create_account("alice", "a").unwrap();
        let bob = storage.create_account("bob", "b").unwrap();
        let team = storage.create_group("team").unwrap();
        let ops = storage.create_group("ops").unwrap();
        assert!(storage.create_group("team").is_err());

        let first = storage.create_membership(alice.id, team.id).unwrap();
        storage.create_membership(bob.id, team.id).unwrap();
        storage.create_membership(bob.id, ops.id).unwrap();

        assert_eq!(storage.count_members(team.id).unwrap(), 2);
        assert_eq!(storage.members_of_group(team.id).unwrap(), vec!["alice", "bob"]);
        assert_eq!(storage.find_membership(alice.id, team.id).unwrap(), Some(first));
        assert_eq!(storage.find_membership(alice.id, ops.id).unwrap(), None);

        storage.delete_membership(first.id).unwrap();
        assert_eq!(storage.count_members(team.id).unwrap(), 1);
        assert!(storage.delete_membership(first.id).is_err());

        let names: Vec<_> = storage.list_groups().unwrap().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["team", "ops"]);
    }

    #[test]
    fn reopen_preserves_rows_and_clears_online() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huddle.redb");

        {
            let storage = RedbStorage::open(&path).unwrap();
            let alice = storage.create_account("alice", "a").unwrap();
            let team = storage.create_group("team").unwrap();
            storage.create_membership(alice.id, team.id).unwrap();
            storage.update_account_online(alice.id, true).unwrap();
        }

        let storage = RedbStorage::open(&path).unwrap();
        let alice = storage.find_account_by_username("alice").unwrap().unwrap();
        assert!(!alice.online);
        assert!(storage.find_accounts_online().unwrap().is_empty());

        let team = storage.find_group_by_name("team").unwrap().unwrap();
        assert_eq!(storage.members_of_group(team.id).unwrap(), vec!["alice"]);

        // Counters survive too, so ids are never reused.
        let bob = storage.create_account("bob", "b").unwrap();
        assert_eq!(bob.id, 2);
    }
}
