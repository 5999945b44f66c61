//! # Actions
//!
//! An action is the call the multisig makes once quorum is reached:
//! a target address, an amount of native currency, and calldata.
//!
//! On the ledger an action is stored as an opaque ABI payload, the
//! parameter encoding of `(address to, uint256 value, bytes data)`. That's
//! the same head/tail layout the contract decodes, so bytes that make it
//! into the ledger are bytes the contract will accept.
//!
//! ## Strict decoding
//!
//! `decode` refuses anything that isn't the canonical encoding of some
//! action: truncated payloads, dirty padding, trailing garbage, offsets
//! pointing somewhere creative. We check this by re-encoding the decoded
//! value and demanding byte equality. An encoding with two valid spellings
//! is an encoding with two different signing hashes, and we'd rather not.

pub mod calls;

use std::fmt;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use calls::{decode_withdraw, execute_calldata, withdraw_calldata, Withdrawal};

/// Errors from encoding or decoding action payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The payload isn't a valid ABI encoding of the expected types.
    #[error("malformed action payload: {0}")]
    Malformed(String),

    /// The payload decodes, but isn't the canonical encoding of what it
    /// decodes to (trailing bytes, non-zero padding, odd offsets).
    #[error("non-canonical action payload ({actual} bytes, canonical form is {canonical})")]
    NonCanonical { actual: usize, canonical: usize },
}

/// A call the multisig contract will make on execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    /// Call target.
    pub to: Address,
    /// Native currency forwarded with the call, in wei.
    pub value: U256,
    /// Calldata for the target. Empty for a plain transfer.
    pub data: Bytes,
}

impl Action {
    pub fn new(to: Address, value: U256, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value,
            data: data.into(),
        }
    }

    /// ABI-encode as `(address, uint256, bytes)` parameters.
    pub fn encode(&self) -> Bytes {
        (self.to, self.value, self.data.clone())
            .abi_encode_params()
            .into()
    }

    /// Decode a payload produced by [`Action::encode`].
    pub fn decode(payload: &[u8]) -> Result<Self, ActionError> {
        let (to, value, data) = <(Address, U256, Bytes)>::abi_decode_params(payload, true)
            .map_err(|e| ActionError::Malformed(e.to_string()))?;
        let action = Self { to, value, data };

        let canonical = action.encode();
        if &canonical[..] != payload {
            return Err(ActionError::NonCanonical {
                actual: payload.len(),
                canonical: canonical.len(),
            });
        }
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "call {} value={} data={} bytes",
            self.to,
            self.value,
            self.data.len()
        )
    }
}

/// Encode a call as an action payload.
pub fn encode(to: Address, value: U256, data: &[u8]) -> Bytes {
    Action::new(to, value, Bytes::copy_from_slice(data)).encode()
}

/// Decode an action payload into `(to, value, data)`.
pub fn decode(payload: &[u8]) -> Result<(Address, U256, Bytes), ActionError> {
    let action = Action::decode(payload)?;
    Ok((action.to, action.value, action.data))
}
