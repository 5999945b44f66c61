//! The signing side of typed-data approvals.
//!
//! In production owners sign in their own wallets and hand the coordinator
//! a finished signature, so the coordinator never touches this trait. It
//! exists for the CLI and for tests, which need to play every owner.

use alloy_primitives::Address;
use async_trait::async_trait;
use thiserror::Error;

use super::typed_data::StructuredMessage;
use crate::crypto::{Signature, SignerKey};

#[derive(Debug, Error)]
pub enum SignerError {
    /// The signer refused (a user clicking "reject" in a wallet, say).
    #[error("signing request rejected: {0}")]
    Rejected(String),

    /// The signer could not be reached.
    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can produce an `eth_signTypedData_v4` signature.
#[async_trait]
pub trait TypedDataSigner: Send + Sync {
    /// The account this signer signs for.
    fn address(&self) -> Address;

    /// Sign `message` and return a 65-byte signature with `v` in {27, 28}.
    async fn sign_typed_data(&self, message: &StructuredMessage)
        -> Result<Signature, SignerError>;
}

/// A [`TypedDataSigner`] holding its key in process memory.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    key: SignerKey,
}

impl LocalSigner {
    pub fn new(key: SignerKey) -> Self {
        Self { key }
    }

    pub fn random() -> Self {
        Self::new(SignerKey::generate())
    }

    /// Synchronous signing, for callers that aren't in an async context.
    pub fn sign_message(&self, message: &StructuredMessage) -> Signature {
        self.key.sign_digest(&message.signing_hash())
    }
}

#[async_trait]
impl TypedDataSigner for LocalSigner {
    fn address(&self) -> Address {
        self.key.address()
    }

    async fn sign_typed_data(
        &self,
        message: &StructuredMessage,
    ) -> Result<Signature, SignerError> {
        Ok(self.sign_message(message))
    }
}
