//! # Signature Payloads
//!
//! Owners don't sign raw bytes, they sign an EIP-712 `TransactionRequest`
//! that their wallet can render as "send 0 to 0x17C4... with this data at
//! nonce 5" instead of a wall of hex.
//!
//! - [`TypedDataCodec`] turns an action plus nonce into a
//!   [`StructuredMessage`] bound to one contract on one chain.
//! - [`Verifier`] recovers who signed a message. The coordinator runs it on
//!   every confirmation before anything touches the ledger.
//! - [`TypedDataSigner`] is the other side of the exchange: the thing that
//!   produces signatures. Tests and the CLI use [`LocalSigner`].

pub mod signer;
pub mod typed_data;
pub mod verifier;

pub use signer::{LocalSigner, SignerError, TypedDataSigner};
pub use typed_data::{StructuredMessage, TransactionRequest, TypedDataCodec};
pub use verifier::{verify, RecoveringVerifier, Verifier};
