//! # Execution
//!
//! The last mile: handing a finalized payload to the multisig contract and
//! making the ledger agree with what the chain did.
//!
//! The chain is reached through an [`ExecutionService`] handle the caller
//! constructs and injects. There is no global client; a coordinator talks
//! to exactly the chain it was built with, and tests hand it a
//! [`SimulatedMultisig`] instead.
//!
//! ## Failure kinds
//!
//! Every service error is classified, because the right reaction differs:
//!
//! - **Transient**: the RPC timed out, the node was syncing, the mempool
//!   was full. Nothing happened on chain; trying again is safe.
//! - **Terminal**: the call reverted. Trying again with the same payload
//!   would fail the same way.
//!
//! The reconciler retries the first kind under a [`RetryPolicy`] and never
//! the second.

pub mod reconciler;
pub mod retry;
pub mod simulated;

use std::fmt;

use alloy_primitives::B256;
use async_trait::async_trait;
use thiserror::Error;

use crate::coordinator::FinalizedExecution;

pub use reconciler::Reconciler;
pub use retry::{retry_transient, RetryPolicy};
pub use simulated::SimulatedMultisig;

/// Whether a failed call is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transport-level; nothing reached the chain.
    Transient,
    /// Definitive; the same payload will fail again.
    Terminal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from the execution service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} execution service error: {cause}")]
pub struct ServiceError {
    pub kind: FailureKind,
    /// Human-readable cause, passed through to operators.
    pub cause: String,
}

impl ServiceError {
    pub fn transient(cause: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            cause: cause.into(),
        }
    }

    pub fn terminal(cause: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Terminal,
            cause: cause.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// What the chain said about a submitted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Hash of the submitted transaction.
    pub tx_hash: B256,
    /// `false` if the transaction was mined but reverted.
    pub success: bool,
}

/// The on-chain multisig, as far as the coordinator is concerned.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// The contract's current nonce: the next slot that can execute.
    async fn read_nonce(&self) -> Result<u64, ServiceError>;

    /// Submit `executeTransaction` for `payload` and wait for the outcome.
    async fn execute(&self, payload: &FinalizedExecution) -> Result<ExecutionOutcome, ServiceError>;
}
