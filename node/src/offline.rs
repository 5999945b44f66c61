//! The chain as seen from an operator's laptop: a nonce someone read off a
//! block explorer, and no way to submit anything.

use async_trait::async_trait;

use cosign_protocol::coordinator::FinalizedExecution;
use cosign_protocol::execution::{ExecutionOutcome, ExecutionService, ServiceError};

/// [`ExecutionService`] backed by an operator-supplied nonce.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineChain {
    nonce: Option<u64>,
}

impl OfflineChain {
    pub fn new(nonce: Option<u64>) -> Self {
        Self { nonce }
    }
}

#[async_trait]
impl ExecutionService for OfflineChain {
    async fn read_nonce(&self) -> Result<u64, ServiceError> {
        self.nonce
            .ok_or_else(|| ServiceError::terminal("on-chain nonce unknown, pass --chain-nonce"))
    }

    async fn execute(&self, payload: &FinalizedExecution) -> Result<ExecutionOutcome, ServiceError> {
        Err(ServiceError::terminal(format!(
            "cannot submit nonce {} offline; broadcast the finalize calldata instead",
            payload.nonce
        )))
    }
}
