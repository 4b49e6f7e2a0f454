//! # Hare Crypto
//!
//! Cryptographic primitives for the Hare consensus node.
//!
//! This crate provides:
//! - **Domain-separated Ed25519 signing** - message signatures for the
//!   consensus gossip layer
//! - **VRF signature type** - the 80-byte role proof carried inside
//!   eligibility certificates
//!
//! ## Example
//!
//! ```rust
//! use hare_crypto::{Domain, Signer, Verifier};
//!
//! // Generate an Ed25519 key and sign
//! let signer = Signer::random();
//! let signature = signer.sign(Domain::Hare, b"message");
//!
//! // Verify with domain separation
//! let verifier = Verifier::new();
//! assert!(verifier.verify(Domain::Hare, &signer.node_id(), b"message", &signature));
//! assert!(!verifier.verify(Domain::Atx, &signer.node_id(), b"message", &signature));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod ed25519;
pub mod vrf;

// Re-export commonly used items
pub use ed25519::{Domain, Signature, Signer, Verifier, SIGNATURE_SIZE};
pub use vrf::{VrfSignature, VRF_SIGNATURE_SIZE};
