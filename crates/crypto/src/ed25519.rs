//! Domain-separated Ed25519 signing.
//!
//! Every signature in the system is made over `prefix || domain || message`,
//! so a signature produced for one context can never be replayed in
//! another. The node identity is the Ed25519 verifying key itself.

use ed25519_dalek::{Signer as DalekSigner, SigningKey, Verifier as DalekVerifier, VerifyingKey};
use hare_types::NodeId;
use parity_scale_codec::{Decode, Encode};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Prefix shared by every signing domain.
///
/// Separates this network's signatures from any other Ed25519 user before
/// the per-context domain byte is applied.
const SIGNING_PREFIX: &[u8] = b"hare-net";

/// Signing context for domain separation.
///
/// A signature made in one domain does not verify in another. The consensus
/// core only signs in [`Domain::Hare`]; the other variants exist so the same
/// key can serve the surrounding node without replay risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Domain {
    /// Activation transactions.
    Atx = 0,
    /// Block proposals.
    Proposal = 1,
    /// Hare consensus messages.
    Hare = 2,
    /// Beacon protocol messages.
    Beacon = 3,
}

impl Domain {
    fn tag(self) -> [u8; 1] {
        [self as u8]
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Atx => write!(f, "atx"),
            Domain::Proposal => write!(f, "proposal"),
            Domain::Hare => write!(f, "hare"),
            Domain::Beacon => write!(f, "beacon"),
        }
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Creates a signature from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the signature as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_SIZE])
    }
}

impl From<[u8; SIGNATURE_SIZE]> for Signature {
    fn from(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(&self.0[..8]))
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map_err(serde::de::Error::custom)?;
        let bytes: [u8; SIGNATURE_SIZE] = raw
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature must be 64 bytes"))?;
        Ok(Self(bytes))
    }
}

/// An Ed25519 signing key with a stable node identity.
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
    node_id: NodeId,
}

impl Signer {
    /// Generates a fresh random key.
    pub fn random() -> Self {
        Self::from_key(SigningKey::generate(&mut OsRng))
    }

    /// Builds a signer from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_key(SigningKey::from_bytes(seed))
    }

    fn from_key(key: SigningKey) -> Self {
        let node_id = NodeId::new(key.verifying_key().to_bytes());
        Self { key, node_id }
    }

    /// The node identity derived from this key.
    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Signs `message` in the given domain.
    pub fn sign(&self, domain: Domain, message: &[u8]) -> Signature {
        let mut buf = Vec::with_capacity(SIGNING_PREFIX.len() + 1 + message.len());
        buf.extend_from_slice(SIGNING_PREFIX);
        buf.extend_from_slice(&domain.tag());
        buf.extend_from_slice(message);
        Signature(self.key.sign(&buf).to_bytes())
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signer({})", self.node_id)
    }
}

/// Stateless verifier for domain-separated signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verifier;

impl Verifier {
    /// Creates a verifier.
    pub fn new() -> Self {
        Self
    }

    /// Verifies that `signature` was made by `node_id` over `message` in
    /// the given domain. Malformed public keys verify as false.
    pub fn verify(
        &self,
        domain: Domain,
        node_id: &NodeId,
        message: &[u8],
        signature: &Signature,
    ) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&node_id.into_inner()) else {
            return false;
        };
        let mut buf = Vec::with_capacity(SIGNING_PREFIX.len() + 1 + message.len());
        buf.extend_from_slice(SIGNING_PREFIX);
        buf.extend_from_slice(&domain.tag());
        buf.extend_from_slice(message);
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(&buf, &sig).is_ok()
    }
}
