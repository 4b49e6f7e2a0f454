//! Collaborator interfaces.
//!
//! The core reaches the rest of the node exclusively through these traits:
//! the clock, the gossip transport, the proposal/ATX/beacon stores, the
//! malfeasance persistence, the sync probe and the layer patrol. Tests
//! substitute in-memory implementations.

use crate::error::{PublishError, StoreError};
use async_trait::async_trait;
use hare_types::{AtxHeader, AtxId, Beacon, EpochId, LayerId, NodeId, Proposal, ProposalId};
use std::time::SystemTime;
use tokio::time::Instant;

/// The node's layer clock.
#[async_trait]
pub trait NodeClock: Send + Sync {
    /// The layer the clock currently points at.
    fn current_layer(&self) -> LayerId;

    /// Wall-clock start of a layer.
    fn layer_to_time(&self, layer: LayerId) -> Instant;

    /// Resolves when the given layer begins.
    async fn await_layer(&self, layer: LayerId);
}

/// Gossip transport handle.
///
/// Publishing is fire-and-forget from the core's perspective: the protocol
/// tolerates message loss, so publish failures are logged and ignored.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes an encoded message on a topic.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), PublishError>;
}

/// Store of candidate block proposals.
pub trait ProposalStore: Send + Sync {
    /// All proposals recorded for a layer.
    fn get_for_layer(&self, layer: LayerId) -> Vec<Proposal>;

    /// A single proposal, if known.
    fn get(&self, layer: LayerId, id: &ProposalId) -> Option<Proposal>;

    /// Advances the store's retention window.
    fn on_layer(&self, layer: LayerId);
}

/// In-memory view of activations and malicious identities.
pub trait AtxData: Send + Sync {
    /// Whether the identity is known malicious.
    fn is_malicious(&self, node: &NodeId) -> bool;

    /// Flags an identity as malicious.
    fn set_malicious(&self, node: &NodeId);

    /// The activation header published by `atx` for the given epoch.
    fn get(&self, epoch: EpochId, atx: &AtxId) -> Option<AtxHeader>;

    /// The activation an identity published in the given epoch.
    fn atx_by_node(&self, epoch: EpochId, node: &NodeId) -> Option<AtxId>;
}

/// Store of per-epoch beacons.
pub trait BeaconStore: Send + Sync {
    /// The beacon for an epoch, if already known.
    fn get(&self, epoch: EpochId) -> Option<Beacon>;
}

/// Persistent malfeasance registry.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Records an equivocation proof against an identity.
    async fn set_malicious(
        &self,
        node: NodeId,
        proof: Vec<u8>,
        received: SystemTime,
    ) -> Result<(), StoreError>;
}

/// Sync-status probe.
pub trait SyncStatus: Send + Sync {
    /// Whether the node considers itself synced.
    fn is_synced(&self) -> bool;
}

/// Bookkeeping hooks for the layer patrol.
pub trait LayerPatrol: Send + Sync {
    /// Marks consensus as in charge of the layer.
    fn set_hare_in_charge(&self, layer: LayerId);

    /// Reports that consensus gave up on the layer without a result.
    fn complete_hare(&self, layer: LayerId);
}
