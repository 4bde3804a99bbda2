//! Persistence service for accounts, groups, and memberships.
//!
//! Trait-based abstraction over the account/group store. The trait is
//! synchronous (no async): callers issue these calls from the connection
//! task and must never hold the session registry lock across them.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStorage;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Store-assigned identifier
    pub id: u64,
    /// Unique login name
    pub username: String,
    /// Credential digest produced by the hasher (PHC string)
    pub password_hash: String,
    /// Projection of "has a live session"
    pub online: bool,
}

/// A named chat group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Store-assigned identifier
    pub id: u64,
    /// Unique group name
    pub name: String,
}

/// Edge recording that an account belongs to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Store-assigned identifier
    pub id: u64,
    /// Member account
    pub account_id: u64,
    /// Group joined
    pub group_id: u64,
}

/// Storage abstraction for accounts, groups, and memberships.
///
/// Must be Clone (shared by the dispatcher, messaging engine, and group
/// coordinator), Send + Sync (used from every connection task), and
/// synchronous. Implementations share internal state via Arc, so clones
/// access the same underlying store.
///
/// Absence is reported as `Ok(None)` by lookups. Name uniqueness for
/// accounts and groups is enforced by the store; membership pair uniqueness
/// is NOT, callers check before inserting.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Account with this username, if any.
    fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, StorageError>;

    /// Insert a new offline account.
    ///
    /// Fails with [`StorageError::Duplicate`] if the username exists.
    fn create_account(&self, username: &str, password_hash: &str)
    -> Result<Account, StorageError>;

    /// Set the `online` flag of an account.
    ///
    /// Fails with [`StorageError::NotFound`] if no account has this id.
    fn update_account_online(&self, account_id: u64, online: bool) -> Result<(), StorageError>;

    /// Every account whose `online` flag is set.
    fn find_accounts_online(&self) -> Result<Vec<Account>, StorageError>;

    /// Group with this name, if any.
    fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, StorageError>;

    /// Insert a new group.
    ///
    /// Fails with [`StorageError::Duplicate`] if the name exists.
    fn create_group(&self, name: &str) -> Result<Group, StorageError>;

    /// All groups, ordered by id.
    fn list_groups(&self) -> Result<Vec<Group>, StorageError>;

    /// Number of membership rows for a group.
    fn count_members(&self, group_id: u64) -> Result<u64, StorageError>;

    /// First membership row for the pair, if any.
    fn find_membership(
        &self,
        account_id: u64,
        group_id: u64,
    ) -> Result<Option<Membership>, StorageError>;

    /// Insert a membership row. Does not check for an existing pair.
    fn create_membership(&self, account_id: u64, group_id: u64)
    -> Result<Membership, StorageError>;

    /// Delete exactly one membership row.
    ///
    /// Fails with [`StorageError::NotFound`] if no row has this id.
    fn delete_membership(&self, membership_id: u64) -> Result<(), StorageError>;

    /// Usernames of every member of a group, in one call.
    fn members_of_group(&self, group_id: u64) -> Result<Vec<String>, StorageError>;
}
