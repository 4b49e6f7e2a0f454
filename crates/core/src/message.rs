//! Wire messages.
//!
//! A single envelope type carries every round's payload. The value list is
//! interpreted per round: preround, status and proposal messages carry a
//! full, strictly ascending list of proposal ids, while commit and notify
//! messages carry exactly one entry, the fingerprint of the value set they
//! reference.
//!
//! Signatures cover a domain-separated digest of the header fields and the
//! value-set fingerprint; the eligibility certificate is excluded because
//! the VRF proof authenticates itself.

use crate::error::MessageError;
use crate::rounds::{IterRound, Round};
use hare_crypto::{Signature, VrfSignature};
use hare_types::{LayerId, NodeId, ProposalId, H256};
use parity_scale_codec::{Decode, DecodeAll, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard cap on the number of values in one message.
pub const MAX_VALUES: usize = 1024;

/// Domain tag mixed into the signing digest.
const METADATA_DOMAIN: &[u8] = b"hare";

/// Eligibility certificate for one (signer, layer, round).
///
/// The count is the number of committee slots the VRF proof grants the
/// signer, and acts as the signer's vote weight in that round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode, Serialize, Deserialize)]
pub struct Eligibility {
    /// VRF role proof over (beacon, layer, round).
    pub proof: VrfSignature,
    /// Number of committee slots granted; at least one.
    pub count: u16,
}

/// A consensus gossip message.
///
/// Field order is the wire order; the SCALE encoding of this struct is the
/// canonical envelope.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Message {
    /// Layer the session runs for.
    pub layer: LayerId,
    /// Iteration and round the message belongs to.
    pub iter_round: IterRound,
    /// Identity of the signer.
    pub sender: NodeId,
    /// Eligibility certificate for this round.
    pub eligibility: Eligibility,
    /// Full value list, or a single referenced fingerprint for
    /// commit/notify.
    pub value_set: Vec<ProposalId>,
    /// Signature over the metadata digest.
    pub signature: Signature,
}

/// Fingerprint of a value list: Keccak-256 over the concatenated ids.
pub fn fingerprint_of(values: &[ProposalId]) -> H256 {
    let slices: Vec<&[u8]> = values.iter().map(|v| v.as_bytes()).collect();
    H256::keccak256_concat(&slices)
}

impl Message {
    /// Creates an unsigned template for a round.
    ///
    /// The scheduler fills layer, sender, eligibility and signature per
    /// local signer before publishing.
    pub fn template(iter_round: IterRound, value_set: Vec<ProposalId>) -> Self {
        Self {
            layer: LayerId::default(),
            iter_round,
            sender: NodeId::default(),
            eligibility: Eligibility::default(),
            value_set,
            signature: Signature::default(),
        }
    }

    /// Decodes an envelope from wire bytes; trailing bytes are an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        Self::decode_all(&mut &bytes[..]).map_err(|e| MessageError::Decode(e.to_string()))
    }

    /// Encodes the envelope to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }

    /// Syntactic validation, applied before any cryptography.
    pub fn validate(&self, iterations_limit: u8) -> Result<(), MessageError> {
        if !self.iter_round.is_message_round() {
            return Err(MessageError::SilentRound(self.iter_round.round));
        }
        if self.iter_round.round == Round::Preround && self.iter_round.iter != 0 {
            return Err(MessageError::PreroundIteration(self.iter_round.iter));
        }
        if self.iter_round.iter > iterations_limit {
            return Err(MessageError::IterationOutOfBounds {
                iter: self.iter_round.iter,
                limit: iterations_limit,
            });
        }
        if self.eligibility.count == 0 {
            return Err(MessageError::ZeroEligibility);
        }
        if self.value_set.len() > MAX_VALUES {
            return Err(MessageError::TooManyValues(self.value_set.len()));
        }
        match self.iter_round.round {
            Round::Commit | Round::Notify => {
                if self.value_set.len() != 1 {
                    return Err(MessageError::ReferenceArity(self.value_set.len()));
                }
            }
            _ => {
                if !self.value_set.windows(2).all(|w| w[0] < w[1]) {
                    return Err(MessageError::UnsortedValues);
                }
            }
        }
        Ok(())
    }

    /// Fingerprint of the carried value list.
    pub fn value_fingerprint(&self) -> H256 {
        fingerprint_of(&self.value_set)
    }

    /// The fingerprint this message counts toward in the tallies.
    ///
    /// Commit and notify messages reference an already-proposed set, so
    /// their single value IS the fingerprint; every other round's messages
    /// are keyed by the fingerprint of the list they carry.
    pub fn tally_fingerprint(&self) -> H256 {
        match self.iter_round.round {
            Round::Commit | Round::Notify if self.value_set.len() == 1 => {
                H256::new(self.value_set[0].into_inner())
            }
            _ => self.value_fingerprint(),
        }
    }

    /// Domain-separated digest the signature is made over.
    pub fn metadata_hash(&self) -> H256 {
        let fingerprint = self.value_fingerprint();
        H256::keccak256_concat(&[
            METADATA_DOMAIN,
            &self.layer.get().to_le_bytes(),
            &[self.iter_round.iter, self.iter_round.round.index() as u8],
            fingerprint.as_bytes(),
            self.sender.as_bytes(),
        ])
    }

    /// Hash of the full envelope, for deduplication.
    pub fn hash(&self) -> H256 {
        H256::keccak256(&self.to_bytes())
    }

    /// Graded-gossip key: one slot per (round, sender).
    pub fn key(&self) -> (IterRound, NodeId) {
        (self.iter_round, self.sender)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} from {} ({} values)",
            self.iter_round,
            self.layer,
            self.sender,
            self.value_set.len()
        )
    }
}
