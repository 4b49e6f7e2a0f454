//! The per-layer session scheduler.
//!
//! [`Hare`] owns the layer loop: at every layer boundary it decides
//! whether to open a session (synced, beacon known), snapshots the local
//! signer set, builds the candidate proposal set, and then drives the
//! session round by round at wall-clock deadlines. Outbound messages are
//! signed once per eligible signer and published; results and weak coins
//! go out on bounded channels.
//!
//! All timed waits race against a single cancellation token; stopping the
//! node aborts every layer task at its next suspension point.

use crate::config::Config;
use crate::error::SessionError;
use crate::interfaces::{
    AtxData, BeaconStore, IdentityStore, LayerPatrol, NodeClock, ProposalStore, Publisher,
    SyncStatus,
};
use crate::message::Eligibility;
use crate::oracle::Oracle;
use crate::protocol::{Output, Protocol};
use crate::registry::{Session, SessionRegistry};
use crate::rounds::IterRound;
use crate::validator::GossipHandler;
use hare_crypto::{Domain, Signer, Verifier};
use hare_types::{AtxHeader, AtxId, Beacon, LayerId, NodeId, ProposalId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Recommended capacity for the results and coins channels.
pub const OUTPUT_CHANNEL_SIZE: usize = 32;

/// Terminal output of one layer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusOutput {
    /// The decided layer.
    pub layer: LayerId,
    /// The agreed proposal set.
    pub proposals: Vec<ProposalId>,
}

/// Weak coin side output of one layer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeakCoinOutput {
    /// The layer the coin belongs to.
    pub layer: LayerId,
    /// The coin bit.
    pub coin: bool,
}

struct SessionRun {
    layer: LayerId,
    beacon: Beacon,
    signers: Vec<Arc<Signer>>,
    vrfs: Vec<Option<Eligibility>>,
    session: Arc<Session>,
}

/// The consensus core: layer loop, session scheduling and publishing.
pub struct Hare {
    config: Config,
    signers: Mutex<HashMap<NodeId, Arc<Signer>>>,
    registry: Arc<SessionRegistry>,
    handler: Arc<GossipHandler>,

    clock: Arc<dyn NodeClock>,
    publisher: Arc<dyn Publisher>,
    proposals: Arc<dyn ProposalStore>,
    atxs: Arc<dyn AtxData>,
    beacons: Arc<dyn BeaconStore>,
    oracle: Arc<dyn Oracle>,
    sync: Arc<dyn SyncStatus>,
    patrol: Arc<dyn LayerPatrol>,

    results: mpsc::Sender<ConsensusOutput>,
    coins: mpsc::Sender<WeakCoinOutput>,

    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Hare {
    /// Builds the core over its collaborators and output channels.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        clock: Arc<dyn NodeClock>,
        publisher: Arc<dyn Publisher>,
        proposals: Arc<dyn ProposalStore>,
        atxs: Arc<dyn AtxData>,
        beacons: Arc<dyn BeaconStore>,
        identities: Arc<dyn IdentityStore>,
        oracle: Arc<dyn Oracle>,
        sync: Arc<dyn SyncStatus>,
        patrol: Arc<dyn LayerPatrol>,
        results: mpsc::Sender<ConsensusOutput>,
        coins: mpsc::Sender<WeakCoinOutput>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let handler = Arc::new(GossipHandler::new(
            config.clone(),
            Arc::clone(&registry),
            Verifier::new(),
            Arc::clone(&clock),
            Arc::clone(&oracle),
            Arc::clone(&atxs),
            identities,
        ));
        Self {
            config,
            signers: Mutex::new(HashMap::new()),
            registry,
            handler,
            clock,
            publisher,
            proposals,
            atxs,
            beacons,
            oracle,
            sync,
            patrol,
            results,
            coins,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Registers a local signing key. Signers never join a session
    /// mid-layer; the set is snapshotted when each session starts.
    pub fn register_signer(&self, signer: Signer) {
        info!(id = %signer.node_id(), "registered signing key");
        self.signers.lock().insert(signer.node_id(), Arc::new(signer));
    }

    /// The inbound-gossip validator, for registration on the transport
    /// under [`Config::protocol_name`].
    pub fn handler(&self) -> Arc<GossipHandler> {
        Arc::clone(&self.handler)
    }

    /// Number of currently running layer sessions.
    pub fn running(&self) -> usize {
        self.registry.running()
    }

    /// Starts the layer loop.
    pub fn start(self: Arc<Self>) {
        let enabled = self
            .clock
            .current_layer()
            .next()
            .max(self.config.enable_layer);
        let disabled = self.config.disable_layer;
        info!(%enabled, %disabled, topic = %self.config.protocol_name, "started");

        let this = Arc::clone(&self);
        self.tasks.spawn(async move {
            let mut next = enabled;
            while next < disabled {
                tokio::select! {
                    _ = this.clock.await_layer(next) => {
                        debug!(layer = %next, "notified");
                        Hare::on_layer(&this, next);
                        next = next.next();
                    }
                    _ = this.cancel.cancelled() => return,
                }
            }
        });
    }

    /// Cancels every layer task and waits for them to drain.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("stopped");
    }

    fn on_layer(this: &Arc<Self>, layer: LayerId) {
        this.proposals.on_layer(layer);
        if !this.sync.is_synced() {
            debug!(%layer, "not synced");
            return;
        }
        let epoch = layer.epoch(this.config.layers_per_epoch);
        let Some(beacon) = this.beacons.get(epoch) else {
            debug!(%layer, %epoch, "no beacon");
            return;
        };
        this.patrol.set_hare_in_charge(layer);

        // signers can't join mid session
        let signers: Vec<Arc<Signer>> = this.signers.lock().values().cloned().collect();
        let vrfs = vec![None; signers.len()];
        let session = Arc::new(Session::new(
            layer,
            Protocol::new(this.config.threshold(layer)),
        ));
        this.registry.register(Arc::clone(&session));
        debug!(%layer, "registered layer");

        let hare = Arc::clone(this);
        this.tasks.spawn(async move {
            let run = SessionRun {
                layer,
                beacon,
                signers,
                vrfs,
                session,
            };
            match hare.run_session(run).await {
                Ok(()) => debug!(%layer, "terminated"),
                Err(SessionError::Cancelled) => debug!(%layer, "cancelled"),
                Err(err) => {
                    warn!(%layer, %err, "failed");
                    // a successful session notifies the block generator,
                    // which completes the layer; a failed one must do it
                    // here
                    hare.patrol.complete_hare(layer);
                }
            }
            hare.registry.unregister(layer);
        });
    }

    async fn run_session(&self, mut run: SessionRun) -> Result<(), SessionError> {
        let mut current = IterRound::PREROUND;
        let mut active = false;
        for i in 0..run.signers.len() {
            run.vrfs[i] =
                self.oracle
                    .active(&run.signers[i].node_id(), &run.beacon, run.layer, current);
            active = active || run.vrfs[i].is_some();
        }

        let mut walltime = self.clock.layer_to_time(run.layer) + self.config.preround_delay;
        if active {
            debug!(layer = %run.layer, "active in preround, waiting for preround delay");
            tokio::select! {
                _ = sleep_until(walltime) => {}
                _ = self.cancel.cancelled() => return Ok(()),
            }
            run.session.on_initial(self.select_proposals(&run));
        }
        self.on_output(&run, current, run.session.next()).await?;

        let mut result = false;
        loop {
            walltime += self.config.round_duration;
            current = run.session.iter_round();

            for i in 0..run.signers.len() {
                run.vrfs[i] = if current.is_message_round() {
                    self.oracle.active(
                        &run.signers[i].node_id(),
                        &run.beacon,
                        run.layer,
                        current,
                    )
                } else {
                    None
                };
            }

            tokio::select! {
                _ = sleep_until(walltime) => {}
                _ = self.cancel.cancelled() => return Ok(()),
            }
            debug!(layer = %run.layer, round = %current, active, "execute round");

            let out = run.session.next();
            if out.result.is_some() {
                result = true;
            }
            let terminated = out.terminated;
            self.on_output(&run, current, out).await?;
            if terminated {
                if !result {
                    return Err(SessionError::TerminatedWithoutResult);
                }
                return Ok(());
            }
            if current.iter == self.config.iterations_limit {
                return Err(SessionError::NonTermination(self.config.iterations_limit));
            }
        }
    }

    async fn on_output(
        &self,
        run: &SessionRun,
        round: IterRound,
        out: Output,
    ) -> Result<(), SessionError> {
        if let Some(template) = &out.message {
            for (i, vrf) in run.vrfs.iter().enumerate() {
                let Some(eligibility) = vrf else { continue };
                // shallow copy per signer
                let mut message = template.clone();
                message.layer = run.layer;
                message.eligibility = *eligibility;
                message.sender = run.signers[i].node_id();
                message.signature = run.signers[i]
                    .sign(Domain::Hare, message.metadata_hash().as_bytes());
                if let Err(err) = self
                    .publisher
                    .publish(&self.config.protocol_name, message.to_bytes())
                    .await
                {
                    // the protocol tolerates loss; nothing to retry
                    error!(%message, %err, "failed to publish");
                }
            }
        }
        debug!(
            layer = %run.layer,
            round = %round,
            message = out.message.is_some(),
            coin = out.coin.is_some(),
            result = out.result.is_some(),
            terminated = out.terminated,
            "round output"
        );

        if let Some(coin) = out.coin {
            let output = WeakCoinOutput {
                layer: run.layer,
                coin,
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                sent = self.coins.send(output) => {
                    sent.map_err(|_| SessionError::OutputsClosed)?;
                }
            }
        }
        if let Some(proposals) = out.result {
            let output = ConsensusOutput {
                layer: run.layer,
                proposals,
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                sent = self.results.send(output) => {
                    sent.map_err(|_| SessionError::OutputsClosed)?;
                }
            }
        }
        Ok(())
    }

    /// Builds the preround candidate set from the proposal store.
    ///
    /// Votes only on proposals from honest identities, backed by an ATX
    /// strictly below the local signers' minimum tick height, and matching
    /// the session beacon. Without an own ATX in the publish epoch the
    /// node has no reference height and votes for nothing.
    fn select_proposals(&self, run: &SessionRun) -> Vec<ProposalId> {
        debug!(layer = %run.layer, beacon = %run.beacon, "requested proposals");

        let target = run.layer.epoch(self.config.layers_per_epoch);
        let publish = target.prev();
        let mut min: Option<AtxHeader> = None;
        for signer in &run.signers {
            let Some(atx_id) = self.atxs.atx_by_node(publish, &signer.node_id()) else {
                continue;
            };
            if let Some(own) = self.atxs.get(target, &atx_id) {
                if min.map_or(true, |m| own.height < m.height) {
                    min = Some(own);
                }
            }
        }
        let Some(min) = min else {
            debug!(epoch = %publish, "no own atxs in the publish epoch");
            return Vec::new();
        };

        let candidates = self.proposals.get_for_layer(run.layer);
        let mut atx_uses: HashMap<AtxId, usize> = HashMap::new();
        for proposal in &candidates {
            *atx_uses.entry(proposal.atx).or_default() += 1;
        }

        let mut result = Vec::new();
        for proposal in &candidates {
            if self.atxs.is_malicious(&proposal.smesher) {
                warn!(id = %proposal.id, "not voting on proposal from malicious identity");
                continue;
            }
            // a single atx backing several proposals should already be
            // covered by the malicious check above
            let uses = atx_uses.get(&proposal.atx).copied().unwrap_or_default();
            if uses > 1 {
                error!(id = %proposal.id, atx = %proposal.atx, uses, "same atx recorded several times");
                continue;
            }
            let Some(header) = self.atxs.get(target, &proposal.atx) else {
                error!(atx = %proposal.atx, "atx is not loaded");
                return Vec::new();
            };
            if header.base_height >= min.height {
                warn!(
                    layer = %run.layer,
                    proposal_height = header.base_height,
                    min_height = min.height,
                    "proposal base tick height too high, skipping"
                );
                continue;
            }
            if proposal.beacon == run.beacon {
                result.push(proposal.id);
            } else {
                warn!(
                    layer = %run.layer,
                    id = %proposal.id,
                    proposal_beacon = %proposal.beacon,
                    epoch_beacon = %run.beacon,
                    "proposal has different beacon value"
                );
            }
        }
        result
    }
}
