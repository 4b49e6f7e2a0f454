//! Message grading and the eligibility oracle interface.
//!
//! Every admitted message carries a grade, a timeliness label assigned on
//! receipt. Grades gate what the message may be used for: anything at
//! grade 1 or better is relayed, commit and notify tallies only count
//! weight at grade 2 or better, and grade 3 marks messages that arrived
//! ahead of their round.

use crate::message::{Eligibility, Message};
use crate::rounds::IterRound;
use hare_types::{Beacon, LayerId, NodeId};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Timeliness label of a received message.
///
/// Ordered from worst to best; [`Grade::Grade0`] messages are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    /// Too late for its round; dropped.
    Grade0,
    /// Late but relayable.
    Grade1,
    /// In time for threshold counting.
    Grade2,
    /// Ahead of the round's expected send time.
    Grade3,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Grade0 => write!(f, "g0"),
            Grade::Grade1 => write!(f, "g1"),
            Grade::Grade2 => write!(f, "g2"),
            Grade::Grade3 => write!(f, "g3"),
        }
    }
}

/// Grades a message by its arrival delay past the round's expected send
/// time.
///
/// The grade is non-increasing in the delay: early or on-time arrivals are
/// grade 3, then each further `round_duration` of delay costs one grade,
/// down to grade 0 past two full rounds.
pub fn grade_by_delay(now: Instant, expected: Instant, round_duration: Duration) -> Grade {
    if now <= expected {
        return Grade::Grade3;
    }
    let delay = now - expected;
    if delay <= round_duration {
        Grade::Grade2
    } else if delay <= round_duration * 2 {
        Grade::Grade1
    } else {
        Grade::Grade0
    }
}

/// The committee-eligibility oracle.
///
/// Implementations evaluate the VRF lottery against the epoch's active
/// set. The core treats eligibility as opaque: it asks for a certificate
/// when a local signer wants to speak and for a verdict on received
/// certificates, and never inspects the proof itself.
pub trait Oracle: Send + Sync {
    /// Returns the eligibility certificate for a local signer in the given
    /// round, or `None` if the signer did not win any committee slot.
    fn active(
        &self,
        signer: &NodeId,
        beacon: &Beacon,
        layer: LayerId,
        round: IterRound,
    ) -> Option<Eligibility>;

    /// Grades a received message's eligibility certificate.
    ///
    /// Returning [`Grade::Grade0`] rejects the certificate; any higher
    /// grade caps the timing grade the validator computed from arrival
    /// time.
    fn validate(&self, message: &Message) -> Grade;
}
