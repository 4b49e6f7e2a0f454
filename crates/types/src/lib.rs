//! # Hare Types
//!
//! Core type definitions for the Hare consensus node.
//!
//! This crate provides the vocabulary the consensus core speaks:
//! - [`H256`] - 32-byte hashes with Keccak256 support
//! - [`LayerId`] and [`EpochId`] - block height and epoch arithmetic
//! - [`Beacon`] - per-epoch randomness
//! - [`NodeId`], [`AtxId`], [`ProposalId`] - 32-byte identity types
//! - [`Proposal`] - the candidate record served by the proposal store
//! - [`AtxHeader`] - the activation summary served by the ATX store
//!
//! ## Example
//!
//! ```rust
//! use hare_types::{H256, LayerId, ProposalId};
//!
//! let layer = LayerId::new(4032);
//! assert_eq!(layer.epoch(4032).get(), 1);
//!
//! let id = ProposalId::from(H256::keccak256(b"proposal").into_inner());
//! assert_ne!(id, ProposalId::default());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod hash;
pub mod ids;
pub mod layer;
pub mod proposal;

// Re-export main types at crate root
pub use hash::{H256, HASH_SIZE};
pub use ids::{AtxId, Beacon, NodeId, ProposalId, BEACON_SIZE, ID_SIZE};
pub use layer::{EpochId, LayerId};
pub use proposal::{AtxHeader, Proposal};

/// Result type alias for Hare type operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with Hare types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },
}
