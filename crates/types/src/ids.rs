//! Fixed-size identifier types.
//!
//! Node, activation and proposal identifiers are all 32-byte values; the
//! beacon is 32 bytes of per-epoch randomness. Each gets its own newtype so
//! the compiler keeps them apart, with a shared set of conversions and a
//! short hex form for log output.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of an identifier in bytes.
pub const ID_SIZE: usize = 32;

/// Size of a beacon in bytes.
pub const BEACON_SIZE: usize = 32;

macro_rules! impl_id {
    ($(#[$doc:meta])* $name:ident, $size:expr) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
            Encode, Decode, Serialize, Deserialize,
        )]
        pub struct $name(#[serde(with = "serde_bytes_array")] [u8; $size]);

        impl $name {
            /// Creates the identifier from a fixed byte array.
            #[inline]
            pub const fn new(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }

            /// Returns the identifier as a byte slice.
            #[inline]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Returns the inner fixed-size byte array.
            #[inline]
            pub const fn into_inner(self) -> [u8; $size] {
                self.0
            }

            /// Checks whether all bytes are zero.
            #[inline]
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $size]
            }

            /// Returns a short hex form (first four bytes) for log output.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }
        }

        impl From<$name> for [u8; $size] {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(0x{})"), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.short())
            }
        }
    };
}

impl_id!(
    /// Identity of a consensus participant (Ed25519 public key bytes).
    NodeId,
    ID_SIZE
);

impl_id!(
    /// Identifier of an activation transaction.
    AtxId,
    ID_SIZE
);

impl_id!(
    /// Identifier of a block proposal.
    ProposalId,
    ID_SIZE
);

impl_id!(
    /// Per-epoch randomness seeding VRF eligibility.
    Beacon,
    BEACON_SIZE
);

/// Serde helper serializing fixed byte arrays as hex strings.
mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let raw = hex::decode(s).map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|_| serde::de::Error::custom("invalid identifier length"))
    }
}
