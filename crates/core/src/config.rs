//! Consensus configuration.

use crate::error::ConfigError;
use crate::rounds::{IterRound, Round};
use hare_types::LayerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A committee-size change activating at a given layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeUpgrade {
    /// First layer the new size applies to.
    pub layer: LayerId,
    /// New target committee size.
    pub size: u16,
}

/// Configuration of the consensus core.
///
/// The timing fields tie the protocol to the wall clock: the preround is
/// expected `preround_delay` after layer start, and every later round
/// follows at `round_duration` spacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether the node participates at all.
    pub enabled: bool,
    /// First layer the core participates in.
    pub enable_layer: LayerId,
    /// First layer the core no longer participates in.
    pub disable_layer: LayerId,
    /// Target committee size.
    pub committee: u16,
    /// Optional committee-size change at a configured layer.
    pub committee_upgrade: Option<CommitteeUpgrade>,
    /// Expected number of leaders per proposal round.
    pub leaders: u16,
    /// Maximum iteration index before the layer is failed.
    pub iterations_limit: u8,
    /// Offset from layer start to the preround deadline.
    pub preround_delay: Duration,
    /// Wall-clock spacing between subsequent rounds.
    pub round_duration: Duration,
    /// Pub/sub topic the protocol speaks on.
    pub protocol_name: String,
    /// Layers per epoch, for beacon and active-set scoping.
    pub layers_per_epoch: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            enable_layer: LayerId::new(0),
            disable_layer: LayerId::new(u32::MAX),
            // A committee of ~800 keeps the probability of a sampled
            // dishonest majority around 2^-40 when the population holds a
            // 2/3 honest majority.
            committee: 800,
            committee_upgrade: None,
            leaders: 5,
            iterations_limit: 4,
            preround_delay: Duration::from_secs(25),
            round_duration: Duration::from_secs(12),
            protocol_name: "/h/3.0".to_string(),
            layers_per_epoch: 4032,
        }
    }
}

impl Config {
    /// Target committee size for a layer, honoring the upgrade record.
    pub fn committee_for(&self, layer: LayerId) -> u16 {
        match &self.committee_upgrade {
            Some(upgrade) if layer >= upgrade.layer => upgrade.size,
            _ => self.committee,
        }
    }

    /// Expected committee size for a specific round.
    ///
    /// The proposal round is a leader lottery; all other message rounds
    /// sample the full committee.
    pub fn committee_for_round(&self, layer: LayerId, round: IterRound) -> u16 {
        if round.round == Round::Proposal {
            self.leaders
        } else {
            self.committee_for(layer)
        }
    }

    /// Weight a value needs to carry a round at the given layer.
    pub fn threshold(&self, layer: LayerId) -> u64 {
        self.committee_for(layer) as u64 / 2 + 1
    }

    /// Expected send time for a round, relative to layer start.
    pub fn round_start(&self, round: IterRound) -> Duration {
        if round.round == Round::Preround {
            return self.preround_delay;
        }
        self.preround_delay + self.round_duration * (round.absolute() - 1)
    }

    /// Checks that the protocol fits inside the externally supplied bound
    /// and that the enabled layer range is not empty.
    pub fn validate(&self, zdist: Duration) -> Result<(), ConfigError> {
        let terminates = self.round_start(IterRound::new(self.iterations_limit, Round::Hardlock));
        if terminates > zdist {
            return Err(ConfigError::Terminates { terminates, zdist });
        }
        if self.enabled && self.disable_layer <= self.enable_layer {
            return Err(ConfigError::LayerRange {
                enable: self.enable_layer,
                disable: self.disable_layer,
            });
        }
        Ok(())
    }
}
