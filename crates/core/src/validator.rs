//! Graded-gossip message validation.
//!
//! The transport invokes [`GossipHandler::handle`] inline for every
//! delivery on the protocol topic; the returned verdict decides whether
//! the message is forwarded. Validation runs in a fixed order: decode,
//! syntactic checks, session lookup, signature, grading, then dispatch
//! into the layer's state machine.

use crate::config::Config;
use crate::error::Rejection;
use crate::interfaces::{AtxData, IdentityStore, NodeClock};
use crate::message::Message;
use crate::oracle::{grade_by_delay, Grade, Oracle};
use crate::protocol::Input;
use crate::registry::SessionRegistry;
use hare_crypto::{Domain, Verifier};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::Instant;
use tracing::{debug, error, trace};

/// Synchronous validator for inbound gossip.
pub struct GossipHandler {
    config: Config,
    registry: Arc<SessionRegistry>,
    verifier: Verifier,
    clock: Arc<dyn NodeClock>,
    oracle: Arc<dyn Oracle>,
    atxs: Arc<dyn AtxData>,
    identities: Arc<dyn IdentityStore>,
}

impl GossipHandler {
    /// Builds a handler over the shared registry and collaborators.
    pub fn new(
        config: Config,
        registry: Arc<SessionRegistry>,
        verifier: Verifier,
        clock: Arc<dyn NodeClock>,
        oracle: Arc<dyn Oracle>,
        atxs: Arc<dyn AtxData>,
        identities: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            config,
            registry,
            verifier,
            clock,
            oracle,
            atxs,
            identities,
        }
    }

    /// Validates one delivery and feeds it to the owning session.
    ///
    /// `Ok(())` tells the transport to forward the message; any error is a
    /// rejection, hard or soft per [`Rejection::is_hard`].
    pub async fn handle(&self, peer: &str, bytes: &[u8]) -> Result<(), Rejection> {
        let message = Message::from_bytes(bytes)?;
        message.validate(self.config.iterations_limit)?;
        trace!(peer, message = %message, "received");

        let session = self
            .registry
            .get(message.layer)
            .ok_or(Rejection::NotRegistered(message.layer))?;

        if !self.verifier.verify(
            Domain::Hare,
            &message.sender,
            message.metadata_hash().as_bytes(),
            &message.signature,
        ) {
            return Err(Rejection::BadSignature);
        }

        let expected =
            self.clock.layer_to_time(message.layer) + self.config.round_start(message.iter_round);
        let timing = grade_by_delay(Instant::now(), expected, self.config.round_duration);
        let grade = timing.min(self.oracle.validate(&message));
        if grade == Grade::Grade0 {
            return Err(Rejection::ZeroGrade);
        }

        let malicious = self.atxs.is_malicious(&message.sender);
        let input = Input::new(message, malicious, grade);
        debug!(round = %input.message.iter_round, grade = %grade, malicious, "on message");
        let (gossip, equivocation) = session.on_input(&input);

        if let Some(proof) = equivocation {
            if !malicious {
                let sender = proof.sender();
                debug!(layer = %input.message.layer, sender = %sender, "registered equivocation");
                self.atxs.set_malicious(&sender);
                let identities = Arc::clone(&self.identities);
                let encoded = proof.to_bytes();
                // persistence happens off the validation path; a failed
                // save must not hold up the round
                tokio::spawn(async move {
                    if let Err(err) = identities
                        .set_malicious(sender, encoded, SystemTime::now())
                        .await
                    {
                        error!(sender = %sender, %err, "failed to save malicious identity");
                    }
                });
            }
        }

        if !gossip {
            return Err(Rejection::Dropped);
        }
        Ok(())
    }
}
