//! # Cryptographic Primitives for COSIGN
//!
//! Everything signature-shaped flows through here: owner keys, the 65-byte
//! recoverable signatures wallets hand us, and signer recovery.
//!
//! We use exactly one curve, secp256k1, because it's the curve the multisig
//! contract runs `ecrecover` on. Anything else would produce signatures the
//! chain can't check, which is an expensive way to learn about curves.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. Hashing is alloy's Keccak-256, curve arithmetic is
//! libsecp256k1. The code in this module is glue, and glue is where bugs
//! hide, so it's tested accordingly.

pub mod keys;
pub mod signature;

pub use keys::{address_from_public_key, KeyError, SignerKey};
pub use signature::{Signature, SignatureError};
