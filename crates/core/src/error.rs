//! Error taxonomy for the consensus core.
//!
//! The core never retries: the protocol's own redundancy (committee size,
//! iterations, graded gossip tolerance) is the recovery mechanism, so
//! every error here is either a verdict returned to the transport or a
//! terminal session outcome.

use crate::rounds::Round;
use hare_types::LayerId;
use std::time::Duration;

/// Verdict returned to the transport for a rejected gossip message.
///
/// Hard rejections tell the pub/sub layer to penalize the sending peer;
/// soft rejections only suppress rebroadcast.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    /// The envelope failed to decode or a syntactic check failed.
    #[error("malformed: {0}")]
    Malformed(#[from] MessageError),

    /// The message signature did not verify against the claimed sender.
    #[error("invalid signature")]
    BadSignature,

    /// The message arrived too late for its round.
    #[error("zero grade")]
    ZeroGrade,

    /// No session is registered for the message's layer.
    #[error("layer {0} is not registered")]
    NotRegistered(LayerId),

    /// The message was valid but graded gossip declined to relay it.
    #[error("dropped by graded gossip")]
    Dropped,
}

impl Rejection {
    /// Whether the transport should penalize the sending peer.
    pub fn is_hard(&self) -> bool {
        matches!(self, Rejection::Malformed(_) | Rejection::BadSignature)
    }
}

/// Syntactic defects detected while decoding or validating an envelope.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The binary envelope could not be decoded.
    #[error("decoding error: {0}")]
    Decode(String),

    /// The round tag names a silent round, which never carries messages.
    #[error("{0} is not a message round")]
    SilentRound(Round),

    /// A preround message claimed a non-zero iteration.
    #[error("preround in iteration {0}")]
    PreroundIteration(u8),

    /// The iteration index exceeds the configured limit.
    #[error("iteration {iter} out of bounds (limit {limit})")]
    IterationOutOfBounds {
        /// Claimed iteration.
        iter: u8,
        /// Configured iterations limit.
        limit: u8,
    },

    /// The eligibility certificate carries a zero count.
    #[error("zero eligibility count")]
    ZeroEligibility,

    /// The value list is not strictly ascending.
    #[error("values not sorted or not unique")]
    UnsortedValues,

    /// A commit or notify message must reference exactly one fingerprint.
    #[error("reference round carries {0} values instead of one")]
    ReferenceArity(usize),

    /// The value list exceeds the hard cap.
    #[error("too many values: {0}")]
    TooManyValues(usize),
}

/// Terminal outcomes of a layer session other than success.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No fingerprint reached notify threshold within the iterations
    /// limit.
    #[error("failed to reach consensus in {0} iterations")]
    NonTermination(u8),

    /// The state machine terminated without ever producing a result.
    #[error("terminated without result")]
    TerminatedWithoutResult,

    /// The session was cancelled while delivering an output.
    #[error("cancelled")]
    Cancelled,

    /// A consumer dropped the results or coins channel.
    #[error("output channel closed")]
    OutputsClosed,
}

/// Configuration validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The protocol would outlive the externally supplied bound.
    #[error("hare terminates later ({terminates:?}) than expected ({zdist:?})")]
    Terminates {
        /// Wall-clock offset of the last possible round.
        terminates: Duration,
        /// Externally supplied bound.
        zdist: Duration,
    },

    /// The enabled layer range is empty.
    #[error("disabled layer ({disable}) must be larger than enabled ({enable})")]
    LayerRange {
        /// First enabled layer.
        enable: LayerId,
        /// First disabled layer.
        disable: LayerId,
    },
}

/// Failure reported by a persistent store collaborator.
#[derive(Debug, thiserror::Error)]
#[error("store: {0}")]
pub struct StoreError(pub String);

/// Failure reported by the gossip transport on publish.
#[derive(Debug, thiserror::Error)]
#[error("transport: {0}")]
pub struct PublishError(pub String);
