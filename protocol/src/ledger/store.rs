//! Record stores behind the approval ledger.
//!
//! A [`RecordStore`] is a keyed map `nonce -> Proposal` with two atomic
//! primitives, and those two are what the ledger's guarantees rest on:
//!
//! - [`RecordStore::create`] inserts only if the nonce is free, so two
//!   racing proposers can't both win.
//! - [`RecordStore::update`] runs a read-modify-write that no other update
//!   of the same nonce can interleave with, so a duplicate check and the
//!   append it guards can't be split by a concurrent approval.
//!
//! [`MemoryStore`] gets atomicity from `DashMap`'s shard locks. The sled
//! store (see `sled_store.rs`) gets it from compare-and-swap.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use super::error::LedgerError;
use super::proposal::Proposal;

/// Failures of the storage backend itself, as opposed to lifecycle
/// violations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// An update lost the compare-and-swap race too many times in a row.
    #[error("gave up updating nonce {nonce} after {attempts} contended attempts")]
    Contention { nonce: u64, attempts: usize },
}

/// Mutation applied inside [`RecordStore::update`].
///
/// Backends that retry (compare-and-swap) call it again on a fresh copy
/// after losing a race, so it must only touch the proposal it's given and
/// state it resets itself.
pub type Mutation<'a> = &'a mut dyn FnMut(&mut Proposal) -> Result<(), LedgerError>;

/// Durable `nonce -> Proposal` storage.
pub trait RecordStore: Send + Sync {
    /// Fetch the proposal for `nonce`, if any.
    fn load(&self, nonce: u64) -> Result<Option<Proposal>, StoreError>;

    /// Insert `proposal` if its nonce is free.
    ///
    /// Returns `None` when inserted, or the already-stored proposal when the
    /// nonce was taken. Never overwrites.
    fn create(&self, proposal: &Proposal) -> Result<Option<Proposal>, StoreError>;

    /// Atomically apply `mutate` to the stored proposal and persist the
    /// result. If `mutate` fails nothing is written.
    fn update(&self, nonce: u64, mutate: Mutation<'_>) -> Result<Proposal, LedgerError>;

    /// Largest nonce with a stored proposal.
    fn highest_nonce(&self) -> Result<Option<u64>, StoreError>;

    /// Every stored proposal, ascending by nonce.
    fn list(&self) -> Result<Vec<Proposal>, StoreError>;
}

/// In-process [`RecordStore`]. Lost on restart; meant for tests and
/// single-process deployments that reconcile from chain on boot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    proposals: DashMap<u64, Proposal>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, nonce: u64) -> Result<Option<Proposal>, StoreError> {
        Ok(self.proposals.get(&nonce).map(|p| p.value().clone()))
    }

    fn create(&self, proposal: &Proposal) -> Result<Option<Proposal>, StoreError> {
        match self.proposals.entry(proposal.nonce()) {
            Entry::Occupied(existing) => Ok(Some(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(proposal.clone());
                Ok(None)
            }
        }
    }

    fn update(&self, nonce: u64, mutate: Mutation<'_>) -> Result<Proposal, LedgerError> {
        // The shard write lock is held until `stored` drops.
        let mut stored = self
            .proposals
            .get_mut(&nonce)
            .ok_or(LedgerError::NotFound { nonce })?;
        let mut next = stored.value().clone();
        mutate(&mut next)?;
        *stored.value_mut() = next.clone();
        Ok(next)
    }

    fn highest_nonce(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.proposals.iter().map(|entry| *entry.key()).max())
    }

    fn list(&self) -> Result<Vec<Proposal>, StoreError> {
        let mut all: Vec<Proposal> = self
            .proposals
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(Proposal::nonce);
        Ok(all)
    }
}
