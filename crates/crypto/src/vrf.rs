//! VRF signature type.
//!
//! The eligibility oracle produces 80-byte VRF role proofs; the consensus
//! core never evaluates the VRF itself, it only carries the proof, orders
//! proofs lexicographically for the weak coin, and extracts the coin bit.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a VRF signature in bytes.
pub const VRF_SIGNATURE_SIZE: usize = 80;

/// An 80-byte VRF role proof.
///
/// Ordering is plain byte-wise lexicographic, which is what the weak coin
/// minimum is defined over.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct VrfSignature([u8; VRF_SIGNATURE_SIZE]);

impl VrfSignature {
    /// Creates a VRF signature from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; VRF_SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the proof as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The least significant bit of the proof.
    ///
    /// Used as the weak coin value of the lexicographically minimal
    /// preround proof.
    #[inline]
    pub fn lsb(&self) -> bool {
        self.0[VRF_SIGNATURE_SIZE - 1] & 1 == 1
    }
}

impl Default for VrfSignature {
    fn default() -> Self {
        Self([0u8; VRF_SIGNATURE_SIZE])
    }
}

impl From<[u8; VRF_SIGNATURE_SIZE]> for VrfSignature {
    fn from(bytes: [u8; VRF_SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for VrfSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfSignature(0x{})", hex::encode(&self.0[..8]))
    }
}

impl Serialize for VrfSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for VrfSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map_err(serde::de::Error::custom)?;
        let bytes: [u8; VRF_SIGNATURE_SIZE] = raw
            .try_into()
            .map_err(|_| serde::de::Error::custom("vrf signature must be 80 bytes"))?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        let mut lo = [0u8; VRF_SIGNATURE_SIZE];
        let mut hi = [0u8; VRF_SIGNATURE_SIZE];
        lo[0] = 1;
        hi[0] = 2;
        assert!(VrfSignature::new(lo) < VrfSignature::new(hi));

        // first differing byte decides, not later ones
        lo[79] = 0xff;
        assert!(VrfSignature::new(lo) < VrfSignature::new(hi));
    }

    #[test]
    fn lsb_reads_last_byte() {
        let mut raw = [0u8; VRF_SIGNATURE_SIZE];
        assert!(!VrfSignature::new(raw).lsb());
        raw[79] = 1;
        assert!(VrfSignature::new(raw).lsb());
        raw[79] = 2;
        assert!(!VrfSignature::new(raw).lsb());
    }
}
