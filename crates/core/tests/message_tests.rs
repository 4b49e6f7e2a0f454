//! Tests for the wire envelope: encoding, syntactic validation, and
//! signing digests.

use hare_core::error::MessageError;
use hare_core::message::{fingerprint_of, Eligibility, Message};
use hare_core::rounds::{IterRound, Round};
use hare_crypto::VrfSignature;
use hare_types::{LayerId, NodeId, ProposalId, H256};

fn pid(n: u8) -> ProposalId {
    ProposalId::new([n; 32])
}

fn sample_message(round: IterRound, values: Vec<ProposalId>) -> Message {
    let mut message = Message::template(round, values);
    message.layer = LayerId::new(11);
    message.sender = NodeId::new([5u8; 32]);
    message.eligibility = Eligibility {
        proof: VrfSignature::new([9u8; 80]),
        count: 3,
    };
    message
}

#[test]
fn encode_decode_round_trip() {
    let message = sample_message(IterRound::PREROUND, vec![pid(1), pid(2), pid(3)]);
    let bytes = message.to_bytes();
    let decoded = Message::from_bytes(&bytes).unwrap();
    assert_eq!(message, decoded);
    // bit-identical re-encoding
    assert_eq!(bytes, decoded.to_bytes());
}

#[test]
fn wire_layout_is_fixed_width_plus_value_list() {
    // layer (4) + iter_round (2) + sender (32) + eligibility (80 + 2)
    // + value list (1-byte compact prefix + 2 * 32) + signature (64)
    let message = sample_message(IterRound::PREROUND, vec![pid(1), pid(2)]);
    assert_eq!(message.to_bytes().len(), 4 + 2 + 32 + 82 + 1 + 64 + 64);
}

#[test]
fn truncated_envelope_fails_to_decode() {
    let bytes = sample_message(IterRound::PREROUND, vec![pid(1)]).to_bytes();
    assert!(matches!(
        Message::from_bytes(&bytes[..bytes.len() - 1]),
        Err(MessageError::Decode(_))
    ));
}

#[test]
fn unknown_round_tag_fails_to_decode() {
    let mut bytes = sample_message(IterRound::PREROUND, vec![pid(1)]).to_bytes();
    // round tag sits after the 4-byte layer and 1-byte iteration
    bytes[5] = 0x17;
    assert!(matches!(
        Message::from_bytes(&bytes),
        Err(MessageError::Decode(_))
    ));
}

#[test]
fn validate_accepts_well_formed_rounds() {
    let limit = 4;
    sample_message(IterRound::PREROUND, vec![pid(1), pid(2)])
        .validate(limit)
        .unwrap();
    sample_message(IterRound::new(2, Round::Status), vec![])
        .validate(limit)
        .unwrap();
    sample_message(IterRound::new(0, Round::Commit), vec![pid(7)])
        .validate(limit)
        .unwrap();
}

#[test]
fn validate_rejects_silent_rounds() {
    let message = sample_message(IterRound::new(1, Round::Hardlock), vec![]);
    assert!(matches!(
        message.validate(4),
        Err(MessageError::SilentRound(Round::Hardlock))
    ));
}

#[test]
fn validate_rejects_preround_outside_iteration_zero() {
    let message = sample_message(IterRound::new(1, Round::Preround), vec![]);
    assert!(matches!(
        message.validate(4),
        Err(MessageError::PreroundIteration(1))
    ));
}

#[test]
fn validate_rejects_iteration_beyond_limit() {
    let message = sample_message(IterRound::new(5, Round::Commit), vec![pid(1)]);
    assert!(matches!(
        message.validate(4),
        Err(MessageError::IterationOutOfBounds { iter: 5, limit: 4 })
    ));
}

#[test]
fn validate_rejects_zero_eligibility() {
    let mut message = sample_message(IterRound::PREROUND, vec![pid(1)]);
    message.eligibility.count = 0;
    assert!(matches!(
        message.validate(4),
        Err(MessageError::ZeroEligibility)
    ));
}

#[test]
fn validate_rejects_unsorted_or_duplicate_values() {
    let unsorted = sample_message(IterRound::PREROUND, vec![pid(2), pid(1)]);
    assert!(matches!(
        unsorted.validate(4),
        Err(MessageError::UnsortedValues)
    ));

    let duplicated = sample_message(IterRound::PREROUND, vec![pid(1), pid(1)]);
    assert!(matches!(
        duplicated.validate(4),
        Err(MessageError::UnsortedValues)
    ));
}

#[test]
fn validate_rejects_commit_without_single_reference() {
    let empty = sample_message(IterRound::new(0, Round::Notify), vec![]);
    assert!(matches!(
        empty.validate(4),
        Err(MessageError::ReferenceArity(0))
    ));

    let two = sample_message(IterRound::new(0, Round::Commit), vec![pid(1), pid(2)]);
    assert!(matches!(
        two.validate(4),
        Err(MessageError::ReferenceArity(2))
    ));
}

#[test]
fn tally_fingerprint_dereferences_commit_and_notify() {
    let full = sample_message(IterRound::PREROUND, vec![pid(1), pid(2)]);
    assert_eq!(full.tally_fingerprint(), fingerprint_of(&[pid(1), pid(2)]));

    let reference = fingerprint_of(&[pid(1), pid(2)]);
    let commit = sample_message(
        IterRound::new(0, Round::Commit),
        vec![ProposalId::new(reference.into_inner())],
    );
    assert_eq!(commit.tally_fingerprint(), reference);
}

#[test]
fn metadata_hash_covers_header_and_fingerprint() {
    let base = sample_message(IterRound::PREROUND, vec![pid(1)]);
    let hash = base.metadata_hash();
    assert_ne!(hash, H256::ZERO);

    let mut other_layer = base.clone();
    other_layer.layer = LayerId::new(12);
    assert_ne!(hash, other_layer.metadata_hash());

    let mut other_sender = base.clone();
    other_sender.sender = NodeId::new([6u8; 32]);
    assert_ne!(hash, other_sender.metadata_hash());

    let other_values = sample_message(IterRound::PREROUND, vec![pid(2)]);
    assert_ne!(hash, other_values.metadata_hash());

    let other_round = sample_message(IterRound::new(0, Round::Status), vec![pid(1)]);
    assert_ne!(hash, other_round.metadata_hash());

    // the eligibility certificate is self-proving and stays outside the
    // signed digest
    let mut other_eligibility = base.clone();
    other_eligibility.eligibility.count = 9;
    assert_eq!(hash, other_eligibility.metadata_hash());
}

#[test]
fn fingerprint_of_empty_set_is_stable() {
    assert_eq!(fingerprint_of(&[]), fingerprint_of(&[]));
    assert_ne!(fingerprint_of(&[]), fingerprint_of(&[pid(1)]));
}
