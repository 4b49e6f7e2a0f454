//! # Hare Core
//!
//! Per-layer, iterated, Byzantine-fault-tolerant agreement over proposal
//! sets, with graded gossip and a weak-coin side output.
//!
//! For every block layer the core receives a candidate proposal set from
//! the local collator, exchanges gossip with the committee sampled by the
//! eligibility oracle, and either commits the layer to a single ordered
//! set of proposal ids or fails it after a bounded number of iterations.
//!
//! ## Protocol Flow
//!
//! ```text
//! Layer L, iteration i:
//!
//! ┌──────────────┐
//! │   PREROUND   │  (once) broadcast the local candidate set
//! └──────┬───────┘
//! ┌──────▼───────┐
//! │ HARD/SOFTLOCK│  silent grace; adopt lock from prior commits
//! └──────┬───────┘
//! ┌──────▼───────┐
//! │    STATUS    │  report values with ≥ threshold preround support
//! └──────┬───────┘
//! ┌──────▼───────┐
//! │   PROPOSAL   │  leaders broadcast the unified candidate set
//! └──────┬───────┘
//! ┌──────▼───────┐
//! │    COMMIT    │  commit to one value-set fingerprint
//! └──────┬───────┘
//! ┌──────▼───────┐
//! │    NOTIFY    │  ≥ threshold notifies at grade 2 ⇒ RESULT
//! └──────────────┘
//! ```
//!
//! ## Components
//!
//! - [`Protocol`] - the pure round/iteration state machine
//! - [`GossipHandler`] - inline validator for inbound gossip: decode,
//!   syntax, signature, grading, equivocation handling
//! - [`Hare`] - the scheduler: one task per layer, wall-clock driven
//! - [`SessionRegistry`] - concurrent layer-to-session dispatch
//!
//! ## Guarantees
//!
//! - **At most one result per layer**, only with ≥ threshold notify
//!   weight at grade 2 behind it
//! - **Equivocator exclusion**: a signer caught double-signing stops
//!   contributing weight, and the proof is persisted once
//! - **Determinism**: identical inputs in identical order produce
//!   identical outputs

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod hare;
pub mod interfaces;
pub mod message;
pub mod oracle;
pub mod protocol;
pub mod registry;
pub mod rounds;
pub mod validator;

// Re-export main types at crate root for convenience
pub use config::{CommitteeUpgrade, Config};
pub use error::{ConfigError, MessageError, PublishError, Rejection, SessionError, StoreError};
pub use hare::{Hare, ConsensusOutput, WeakCoinOutput, OUTPUT_CHANNEL_SIZE};
pub use interfaces::{
    AtxData, BeaconStore, IdentityStore, LayerPatrol, NodeClock, ProposalStore, Publisher,
    SyncStatus,
};
pub use message::{fingerprint_of, Eligibility, Message, MAX_VALUES};
pub use oracle::{grade_by_delay, Grade, Oracle};
pub use protocol::{EquivocationProof, Input, Output, Protocol};
pub use registry::{Session, SessionRegistry};
pub use rounds::{IterRound, Round, ROUNDS_PER_ITER};
pub use validator::GossipHandler;
