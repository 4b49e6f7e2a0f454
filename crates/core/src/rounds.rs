//! Round and iteration bookkeeping.
//!
//! An iteration is one full pass over the agreement rounds; iterations
//! repeat until termination or the configured limit. The preround exists
//! only once, before iteration zero's first real round, and the hardlock
//! and softlock rounds are silent grace windows at the head of each
//! iteration that absorb late notifies from the previous one.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Number of rounds in one iteration (hardlock through notify).
pub const ROUNDS_PER_ITER: u32 = 6;

/// A single phase within an iteration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub enum Round {
    /// One-off opening round where every participant broadcasts its
    /// candidate proposal set.
    Preround,
    /// Silent grace window; commits of the previous iteration are
    /// inspected here to update the lock.
    Hardlock,
    /// Second silent grace window.
    Softlock,
    /// Participants report which preround values reached threshold
    /// support.
    Status,
    /// Leaders broadcast a unified candidate value set.
    Proposal,
    /// Participants commit to a single value-set fingerprint.
    Commit,
    /// Participants broadcast the committed fingerprint; threshold
    /// support here terminates the session.
    Notify,
}

impl Round {
    /// Position of the round within an iteration.
    #[inline]
    pub const fn index(self) -> u32 {
        match self {
            Round::Preround => 0,
            Round::Hardlock => 1,
            Round::Softlock => 2,
            Round::Status => 3,
            Round::Proposal => 4,
            Round::Commit => 5,
            Round::Notify => 6,
        }
    }

    /// Whether participants broadcast a message in this round.
    #[inline]
    pub const fn is_message_round(self) -> bool {
        !matches!(self, Round::Hardlock | Round::Softlock)
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Round::Preround => "preround",
            Round::Hardlock => "hardlock",
            Round::Softlock => "softlock",
            Round::Status => "status",
            Round::Proposal => "proposal",
            Round::Commit => "commit",
            Round::Notify => "notify",
        };
        write!(f, "{name}")
    }
}

/// An (iteration, round) pointer with a total order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub struct IterRound {
    /// Iteration index.
    pub iter: u8,
    /// Round within the iteration.
    pub round: Round,
}

impl IterRound {
    /// The initial pointer: `(0, preround)`.
    pub const PREROUND: Self = Self {
        iter: 0,
        round: Round::Preround,
    };

    /// Creates a pointer.
    #[inline]
    pub const fn new(iter: u8, round: Round) -> Self {
        Self { iter, round }
    }

    /// The absolute position of this round since the preround.
    ///
    /// `(0, preround)` is 0; the preround never recurs, so positions are
    /// consecutive across iterations.
    #[inline]
    pub const fn absolute(self) -> u32 {
        self.iter as u32 * ROUNDS_PER_ITER + self.round.index()
    }

    /// Whether participants broadcast a message in this round.
    #[inline]
    pub const fn is_message_round(self) -> bool {
        self.round.is_message_round()
    }

    /// The round after this one.
    ///
    /// The preround advances directly to the softlock: the iteration-zero
    /// hardlock has no previous iteration to collect commits from, and
    /// skipping it keeps every round's execution aligned with its expected
    /// start offset.
    pub fn next(self) -> Self {
        match self.round {
            Round::Preround => Self::new(self.iter, Round::Softlock),
            Round::Hardlock => Self::new(self.iter, Round::Softlock),
            Round::Softlock => Self::new(self.iter, Round::Status),
            Round::Status => Self::new(self.iter, Round::Proposal),
            Round::Proposal => Self::new(self.iter, Round::Commit),
            Round::Commit => Self::new(self.iter, Round::Notify),
            Round::Notify => Self::new(self.iter + 1, Round::Hardlock),
        }
    }
}

impl PartialOrd for IterRound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IterRound {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.iter, self.round.index()).cmp(&(other.iter, other.round.index()))
    }
}

impl fmt::Display for IterRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.iter, self.round)
    }
}
