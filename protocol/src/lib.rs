// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # COSIGN Core Library
//!
//! COSIGN coordinates M-of-N approvals for an EVM multisig contract. Owners
//! sign an EIP-712 message off chain; once enough of them have, the
//! signatures are bundled into a single `executeTransaction` call. The hard
//! part isn't the cryptography, it's bookkeeping under concurrency: two
//! approvals racing for the last slot, an execution whose response got
//! lost, a proposal for a nonce the contract moved past an hour ago.
//!
//! ## Architecture
//!
//! - **signing**: EIP-712 domain, `TransactionRequest` hashing, signer
//!   recovery. If our digest is off by one byte, the contract disagrees.
//! - **action**: ABI encoding of `(to, value, data)` and the contract calls
//!   built from it.
//! - **ledger**: One proposal per nonce, its confirmations and status, on
//!   an in-memory or sled-backed store.
//! - **coordinator**: The state machine: propose, approve, finalize,
//!   execute. Every signature is recovered before anything is written.
//! - **execution**: The chain seen through a trait, plus the reconciler
//!   that keeps the ledger honest about what actually executed.
//! - **crypto**: secp256k1 keys and 65-byte recoverable signatures.
//! - **metrics**: Prometheus counters for operators.
//! - **config**: Protocol constants and coordinator policy.
//!
//! ## Design Philosophy
//!
//! 1. The ledger says `Executed` when the chain says so, not before.
//! 2. A claimed signer is a hint. The recovered signer is the fact.
//! 3. No global clients. Whatever talks to the chain is handed in.
//! 4. If it moves a status, it has tests. Plural.

pub mod action;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod execution;
pub mod ledger;
pub mod metrics;
pub mod signing;

pub use action::Action;
pub use config::{CoordinatorConfig, DomainConfig, SignatureOrder};
pub use coordinator::{Coordinator, CoordinatorError, FinalizedExecution};
pub use execution::{ExecutionService, RetryPolicy, SimulatedMultisig};
pub use ledger::{MemoryStore, Proposal, ProposalStatus, Receipt, SledStore};
