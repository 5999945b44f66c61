//! Contract calls the coordinator builds.
//!
//! Two functions on the multisig contract matter to us:
//!
//! - `executeTransaction`, which takes the aggregated signatures plus the
//!   action and runs it once the contract has counted enough owners;
//! - `withdrawKToken`, the call the multisig makes on itself to release
//!   tokens, and the action operators propose most often.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

use super::{Action, ActionError};
use crate::crypto::Signature;

sol! {
    function executeTransaction(bytes[] signatures, address to, uint256 value, bytes data);
    function withdrawKToken(address token, address to, uint256 amount);
}

/// Calldata for `executeTransaction(signatures, to, value, data)`.
///
/// Signatures are passed through in the order given; choosing that order
/// is the finalizer's job.
pub fn execute_calldata(signatures: &[Signature], action: &Action) -> Bytes {
    let call = executeTransactionCall {
        signatures: signatures
            .iter()
            .map(|sig| Bytes::copy_from_slice(sig.as_bytes()))
            .collect(),
        to: action.to,
        value: action.value,
        data: action.data.clone(),
    };
    call.abi_encode().into()
}

/// A token withdrawal out of the multisig's custody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Withdrawal {
    /// ERC-20 token to release.
    pub token: Address,
    /// Recipient of the tokens.
    pub recipient: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
}

impl Withdrawal {
    /// The action a multisig at `multisig` runs to perform this withdrawal:
    /// a zero-value self-call carrying `withdrawKToken` calldata.
    pub fn into_action(self, multisig: Address) -> Action {
        Action::new(multisig, U256::ZERO, withdraw_calldata(&self))
    }
}

/// Calldata for `withdrawKToken(token, to, amount)`.
pub fn withdraw_calldata(withdrawal: &Withdrawal) -> Bytes {
    withdrawKTokenCall {
        token: withdrawal.token,
        to: withdrawal.recipient,
        amount: withdrawal.amount,
    }
    .abi_encode()
    .into()
}

/// Decode `withdrawKToken` calldata, e.g. to show approvers what they're
/// about to sign.
pub fn decode_withdraw(calldata: &[u8]) -> Result<Withdrawal, ActionError> {
    let call = withdrawKTokenCall::abi_decode(calldata, true)
        .map_err(|e| ActionError::Malformed(e.to_string()))?;
    Ok(Withdrawal {
        token: call.token,
        recipient: call.to,
        amount: call.amount,
    })
}
