//! Records served by the proposal and ATX stores.

use crate::{AtxId, Beacon, LayerId, NodeId, ProposalId};
use serde::{Deserialize, Serialize};

/// A candidate block proposal, as recorded by the proposal store.
///
/// The consensus core only needs enough of the proposal to decide whether
/// to vote for it: its identifier, the activation backing it, the identity
/// that produced it, and the beacon it committed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Proposal identifier.
    pub id: ProposalId,
    /// Layer the proposal targets.
    pub layer: LayerId,
    /// Activation the proposal is built on.
    pub atx: AtxId,
    /// Identity that signed the proposal.
    pub smesher: NodeId,
    /// Epoch beacon the proposal committed to.
    pub beacon: Beacon,
}

/// Summary of an activation, as recorded by the ATX store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtxHeader {
    /// Identity that published the activation.
    pub node: NodeId,
    /// Tick height the activation starts from.
    pub base_height: u64,
    /// Tick height the activation reaches.
    pub height: u64,
}
