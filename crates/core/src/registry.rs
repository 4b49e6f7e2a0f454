//! Layer-to-session index.
//!
//! The registry maps layers to live sessions under a single coarse mutex.
//! Lookups clone the session handle and release the registry lock before
//! the session's own mutex is taken, so a slow state-machine transition
//! never blocks dispatch for other layers.

use crate::protocol::{EquivocationProof, Input, Output, Protocol};
use crate::rounds::IterRound;
use hare_types::{LayerId, ProposalId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// A live layer session: the state machine behind its own mutex.
pub struct Session {
    layer: LayerId,
    protocol: Mutex<Protocol>,
}

impl Session {
    /// Wraps a state machine for a layer.
    pub fn new(layer: LayerId, protocol: Protocol) -> Self {
        Self {
            layer,
            protocol: Mutex::new(protocol),
        }
    }

    /// The layer this session runs for.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Seeds the preround candidate set.
    pub fn on_initial(&self, candidates: Vec<ProposalId>) {
        self.protocol.lock().on_initial(candidates);
    }

    /// Feeds a validated input to the state machine.
    pub fn on_input(&self, input: &Input) -> (bool, Option<EquivocationProof>) {
        self.protocol.lock().on_input(input)
    }

    /// Advances the state machine one round.
    pub fn next(&self) -> Output {
        self.protocol.lock().next()
    }

    /// The round the next advance will execute.
    pub fn iter_round(&self) -> IterRound {
        self.protocol.lock().iter_round()
    }
}

/// Concurrent layer-to-session index.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<LayerId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a session for its layer.
    ///
    /// Registering a layer twice is a programming error; the later
    /// registration wins.
    pub fn register(&self, session: Arc<Session>) {
        let layer = session.layer();
        let previous = self.sessions.lock().insert(layer, session);
        if previous.is_some() {
            error!(layer = %layer, "session registered twice");
            debug_assert!(false, "session registered twice for layer {layer}");
        }
    }

    /// The session for a layer, if one is running.
    pub fn get(&self, layer: LayerId) -> Option<Arc<Session>> {
        self.sessions.lock().get(&layer).cloned()
    }

    /// Dispatches a validated input to the layer's state machine.
    ///
    /// The registry lock is released before the session mutex is taken.
    pub fn dispatch(
        &self,
        layer: LayerId,
        input: &Input,
    ) -> Option<(bool, Option<EquivocationProof>)> {
        let session = self.get(layer)?;
        Some(session.on_input(input))
    }

    /// Removes a layer's session.
    pub fn unregister(&self, layer: LayerId) {
        self.sessions.lock().remove(&layer);
    }

    /// Number of live sessions.
    pub fn running(&self) -> usize {
        self.sessions.lock().len()
    }
}
