//! Signer recovery for typed-data approvals.
//!
//! Every confirmation the coordinator accepts goes through a [`Verifier`].
//! The claimed account is a hint, never a credential: the verifier
//! recovers the real signer from the signature and the comparison decides.

use alloy_primitives::Address;

use super::typed_data::StructuredMessage;
use crate::crypto::{Signature, SignatureError};

/// Recovers who signed a [`StructuredMessage`].
///
/// A trait so tests and exotic deployments (contract wallets verifying via
/// EIP-1271, say) can swap the check out. The coordinator only ever calls
/// [`Verifier::recover`] and compares the result itself.
pub trait Verifier: Send + Sync {
    /// Recover the address that produced `signature` over `message`.
    fn recover(
        &self,
        message: &StructuredMessage,
        signature: &Signature,
    ) -> Result<Address, SignatureError>;

    /// `true` if `signature` over `message` was produced by `claimed`.
    fn verify(
        &self,
        message: &StructuredMessage,
        signature: &Signature,
        claimed: &Address,
    ) -> bool {
        matches!(self.recover(message, signature), Ok(signer) if signer == *claimed)
    }
}

/// ECDSA recovery over the EIP-712 signing hash, i.e. what `ecrecover`
/// does on chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveringVerifier;

impl Verifier for RecoveringVerifier {
    fn recover(
        &self,
        message: &StructuredMessage,
        signature: &Signature,
    ) -> Result<Address, SignatureError> {
        signature.recover(&message.signing_hash())
    }
}

/// Check that `signature` over `message` recovers to `claimed`.
pub fn verify(message: &StructuredMessage, signature: &Signature, claimed: &Address) -> bool {
    RecoveringVerifier.verify(message, signature, claimed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::config::DomainConfig;
    use crate::crypto::SignerKey;
    use crate::signing::TypedDataCodec;
    use alloy_primitives::U256;

    fn message(nonce: u64) -> StructuredMessage {
        let codec = TypedDataCodec::new(&DomainConfig::new(Address::repeat_byte(0x17)));
        let action = Action::new(Address::repeat_byte(0xab), U256::ZERO, vec![0x12u8, 0x34]);
        codec.build_message(&action, nonce)
    }

    #[test]
    fn genuine_signature_verifies() {
        let key = SignerKey::generate();
        let msg = message(5);
        let sig = key.sign_digest(&msg.signing_hash());
        assert!(verify(&msg, &sig, &key.address()));
        assert_eq!(RecoveringVerifier.recover(&msg, &sig).unwrap(), key.address());
    }

    #[test]
    fn claimed_account_must_match_signer() {
        let signer = SignerKey::generate();
        let impostor = SignerKey::generate();
        let msg = message(5);
        let sig = signer.sign_digest(&msg.signing_hash());
        assert!(!verify(&msg, &sig, &impostor.address()));
    }

    #[test]
    fn signature_for_other_nonce_fails() {
        let key = SignerKey::generate();
        let sig = key.sign_digest(&message(4).signing_hash());
        assert!(!verify(&message(5), &sig, &key.address()));
    }

    #[test]
    fn malformed_signature_fails_closed() {
        let key = SignerKey::generate();
        let mut bytes = [0u8; 65];
        bytes[64] = 99;
        assert!(!verify(&message(5), &Signature::from_bytes(bytes), &key.address()));
    }
}
