//! # SledStore - Persistent Approval Ledger
//!
//! The on-disk [`RecordStore`], built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key               | Value                    |
//! |-------------|-------------------|--------------------------|
//! | `proposals` | `nonce` (8B BE)   | `bincode(ProposalRecord)`|
//!
//! Nonces are stored big-endian so sled's lexicographic ordering matches
//! numeric ordering. `list()` comes back sorted for free, and the highest
//! nonce is just `last()`.
//!
//! ## Atomicity
//!
//! sled has no row locks, so updates are optimistic: read the current bytes,
//! apply the mutation to a decoded copy, and `compare_and_swap` the new
//! bytes in only if nobody else wrote in between. Losing the race means
//! re-reading and re-applying. That's why mutations must be re-runnable.
//!
//! Inserts use the same primitive with an expected value of "absent", which
//! is what makes `create` insert-if-absent.
//!
//! ## Record Format
//!
//! Values are a plain-bytes mirror of [`Proposal`] (`ProposalRecord`), so
//! the on-disk format is pinned here rather than inherited from whatever
//! serde representation the in-memory types happen to have.

use std::path::Path;

use alloy_primitives::{Address, Bytes, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{Db, IVec, Tree};
use tracing::debug;

use super::error::LedgerError;
use super::proposal::{Confirmation, Proposal, ProposalStatus, Receipt};
use super::store::{Mutation, RecordStore, StoreError};
use crate::config::STORE_CAS_MAX_ATTEMPTS;
use crate::crypto::Signature;

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// On-disk records
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    fn from_datetime(dt: &DateTime<Utc>) -> Self {
        Self {
            secs: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
        }
    }

    fn to_datetime(&self) -> StoreResult<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.secs, self.nanos).ok_or_else(|| {
            StoreError::Serialization(format!("timestamp out of range: {}s", self.secs))
        })
    }
}

#[derive(Serialize, Deserialize)]
struct ConfirmationRecord {
    account: [u8; 20],
    signature: Vec<u8>,
    confirmed_at: Timestamp,
}

#[derive(Serialize, Deserialize)]
struct ReceiptRecord {
    tx_hash: [u8; 32],
    nonce: u64,
    signatures: u64,
    executed_at: Timestamp,
}

#[derive(Serialize, Deserialize)]
struct ProposalRecord {
    nonce: u64,
    action: Vec<u8>,
    status: ProposalStatus,
    confirmations_required: u64,
    confirmations: Vec<ConfirmationRecord>,
    created_at: Timestamp,
    receipt: Option<ReceiptRecord>,
}

impl ProposalRecord {
    fn from_proposal(proposal: &Proposal) -> Self {
        Self {
            nonce: proposal.nonce(),
            action: proposal.action().to_vec(),
            status: proposal.status(),
            confirmations_required: proposal.confirmations_required() as u64,
            confirmations: proposal
                .confirmations()
                .iter()
                .map(|c| ConfirmationRecord {
                    account: c.account.into(),
                    signature: c.signature.as_bytes().to_vec(),
                    confirmed_at: Timestamp::from_datetime(&c.confirmed_at),
                })
                .collect(),
            created_at: Timestamp::from_datetime(&proposal.created_at()),
            receipt: proposal.receipt().map(|r| ReceiptRecord {
                tx_hash: r.tx_hash.0,
                nonce: r.nonce,
                signatures: r.signatures as u64,
                executed_at: Timestamp::from_datetime(&r.executed_at),
            }),
        }
    }

    fn into_proposal(self) -> StoreResult<Proposal> {
        let confirmations = self
            .confirmations
            .into_iter()
            .map(|c| {
                let signature = Signature::try_from_slice(&c.signature)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Confirmation {
                    account: Address::from(c.account),
                    signature,
                    confirmed_at: c.confirmed_at.to_datetime()?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let receipt = match self.receipt {
            Some(r) => Some(Receipt {
                tx_hash: B256::from(r.tx_hash),
                nonce: r.nonce,
                signatures: r.signatures as usize,
                executed_at: r.executed_at.to_datetime()?,
            }),
            None => None,
        };

        Ok(Proposal::from_parts(
            self.nonce,
            Bytes::from(self.action),
            self.status,
            self.confirmations_required as usize,
            confirmations,
            self.created_at.to_datetime()?,
            receipt,
        ))
    }
}

fn encode(proposal: &Proposal) -> StoreResult<Vec<u8>> {
    bincode::serialize(&ProposalRecord::from_proposal(proposal))
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> StoreResult<Proposal> {
    let record: ProposalRecord =
        bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
    record.into_proposal()
}

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// Sled-backed [`RecordStore`].
///
/// Cheap to clone: clones share the same underlying database.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    proposals: Tree,
}

impl SledStore {
    /// Open or create a ledger at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A ledger that lives only as long as this handle. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Use an already-open database, e.g. one shared with other components.
    pub fn from_db(db: Db) -> StoreResult<Self> {
        let proposals = db.open_tree("proposals")?;
        Ok(Self { db, proposals })
    }

    /// Number of stored proposals.
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    /// Block until everything written so far is on disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl RecordStore for SledStore {
    fn load(&self, nonce: u64) -> StoreResult<Option<Proposal>> {
        match self.proposals.get(nonce.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn create(&self, proposal: &Proposal) -> StoreResult<Option<Proposal>> {
        let key = proposal.nonce().to_be_bytes();
        let bytes = encode(proposal)?;
        match self
            .proposals
            .compare_and_swap(key, None::<&[u8]>, Some(bytes))?
        {
            Ok(()) => {
                self.flush()?;
                Ok(None)
            }
            Err(conflict) => match conflict.current {
                Some(existing) => Ok(Some(decode(&existing)?)),
                // Only reachable if the expected value was `Some`.
                None => Err(StoreError::Serialization(
                    "compare-and-swap reported a conflict on an empty key".into(),
                )),
            },
        }
    }

    fn update(&self, nonce: u64, mutate: Mutation<'_>) -> Result<Proposal, LedgerError> {
        let key = nonce.to_be_bytes();
        for attempt in 1..=STORE_CAS_MAX_ATTEMPTS {
            let current: IVec = self
                .proposals
                .get(key)
                .map_err(StoreError::from)?
                .ok_or(LedgerError::NotFound { nonce })?;

            let mut proposal = decode(&current)?;
            mutate(&mut proposal)?;
            let next = encode(&proposal)?;

            match self
                .proposals
                .compare_and_swap(key, Some(current), Some(next))
                .map_err(StoreError::from)?
            {
                Ok(()) => {
                    self.flush()?;
                    return Ok(proposal);
                }
                Err(_) => {
                    debug!(nonce, attempt, "proposal changed underneath update, retrying");
                }
            }
        }
        Err(StoreError::Contention {
            nonce,
            attempts: STORE_CAS_MAX_ATTEMPTS,
        }
        .into())
    }

    fn highest_nonce(&self) -> StoreResult<Option<u64>> {
        match self.proposals.last()? {
            Some((key, _)) => {
                let raw: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                    StoreError::Serialization(format!("malformed nonce key ({} bytes)", key.len()))
                })?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    fn list(&self) -> StoreResult<Vec<Proposal>> {
        self.proposals
            .iter()
            .values()
            .map(|value| decode(&value?))
            .collect()
    }
}
