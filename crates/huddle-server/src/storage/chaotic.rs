//! Chaotic storage wrapper for fault injection testing
//!
//! Wraps another store and randomly fails operations so that the command
//! handlers can be exercised against an unavailable store. A failed call
//! never reaches the inner store.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use super::{Account, Group, Membership, Storage, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails operations
/// with [`StorageError::Io`] at a configured rate. Uses Arc<Mutex<>> for the
/// RNG state, making it Clone and thread-safe.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operations attempted, failed or not
    operation_count: Arc<Mutex<usize>>,
}

/// Linear congruential generator, so chaos runs replay from a seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner`, failing roughly `failure_rate` of all calls.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.operation_count.lock().expect("operation_count mutex poisoned")
    }

    fn increment_operation_count(&self) {
        #[allow(clippy::expect_used)]
        let mut count = self.operation_count.lock().expect("operation_count mutex poisoned");
        *count += 1;
    }

    /// Count the call and decide whether it fails.
    fn gate(&self) -> Result<(), StorageError> {
        self.increment_operation_count();

        #[allow(clippy::expect_used)]
        let roll = self.rng.lock().expect("ChaoticRng mutex poisoned").next();

        if roll < self.failure_rate {
            tracing::debug!(roll, "injecting storage failure");
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, StorageError> {
        self.gate()?;
        self.inner.find_account_by_username(username)
    }

    fn create_account(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Account, StorageError> {
        self.gate()?;
        self.inner.create_account(username, password_hash)
    }

    fn update_account_online(&self, account_id: u64, online: bool) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.update_account_online(account_id, online)
    }

    fn find_accounts_online(&self) -> Result<Vec<Account>, StorageError> {
        self.gate()?;
        self.inner.find_accounts_online()
    }

    fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, StorageError> {
        self.gate()?;
        self.inner.find_group_by_name(name)
    }

    fn create_group(&self, name: &str) -> Result<Group, StorageError> {
        self.gate()?;
        self.inner.create_group(name)
    }

    fn list_groups(&self) -> Result<Vec<Group>, StorageError> {
        self.gate()?;
        self.inner.list_groups()
    }

    fn count_members(&self, group_id: u64) -> Result<u64, StorageError> {
        self.gate()?;
        self.inner.count_members(group_id)
    }

    fn find_membership(
        &self,
        account_id: u64,
        group_id: u64,
    ) -> Result<Option<Membership>, StorageError> {
        self.gate()?;
        self.inner.find_membership(account_id, group_id)
    }

    fn create_membership(
        &self,
        account_id: u64,
        group_id: u64,
    ) -> Result<Membership, StorageError> {
        self.gate()?;
        self.inner.create_membership(account_id, group_id)
    }

    fn delete_membership(&self, membership_id: u64) -> Result<(), StorageError> {
        self.gate()?;
        self.inner.delete_membership(membership_id)
    }

    fn members_of_group(&self, group_id: u64) -> Result<Vec<String>, StorageError> {
        self.gate()?;
        self.inner.members_of_group(group_id)
    }
}
