//! The per-layer protocol state machine.
//!
//! A pure transition function over validated, graded inputs. Incoming
//! messages accumulate into weighted tallies; [`Protocol::next`] advances
//! the round pointer once per wall-clock tick and derives the outbound
//! message for the round being entered from the tallies of the rounds
//! before it:
//!
//! | round    | emits                                                  |
//! |----------|--------------------------------------------------------|
//! | preround | the local candidate set                                |
//! | status   | preround values whose support reached threshold        |
//! | proposal | union of threshold-supported status sets, plus the lock|
//! | commit   | the fingerprint of the chosen proposal set             |
//! | notify   | the fingerprint that gathered threshold commits        |
//!
//! The silent hardlock/softlock rounds at the head of each iteration give
//! the previous iteration's commits and notifies time to arrive; the
//! hardlock step also refreshes the lock from them.
//!
//! The state machine never suspends and takes no locks; callers serialize
//! access externally.

use crate::message::{fingerprint_of, Message};
use crate::oracle::Grade;
use crate::rounds::{IterRound, Round};
use hare_crypto::VrfSignature;
use hare_types::{NodeId, ProposalId, H256};
use parity_scale_codec::{Decode, Encode};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

/// A validated, graded message handed to the state machine.
#[derive(Debug, Clone)]
pub struct Input {
    /// The decoded message.
    pub message: Message,
    /// Hash of the full envelope, for deduplication.
    pub msg_hash: H256,
    /// The fingerprint this message counts toward.
    pub fingerprint: H256,
    /// Whether the sender is already known malicious externally.
    pub malicious: bool,
    /// Timeliness grade assigned on receipt.
    pub grade: Grade,
}

impl Input {
    /// Builds an input from a validated message.
    pub fn new(message: Message, malicious: bool, grade: Grade) -> Self {
        let msg_hash = message.hash();
        let fingerprint = message.tally_fingerprint();
        Self {
            message,
            msg_hash,
            fingerprint,
            malicious,
            grade,
        }
    }
}

/// Output of one round advance.
#[derive(Debug, Clone, Default)]
pub struct Output {
    /// Outbound message template for the round just entered, if the round
    /// has one. Layer, sender, eligibility and signature are filled by the
    /// scheduler per eligible signer.
    pub message: Option<Message>,
    /// Weak coin, emitted once per session.
    pub coin: Option<bool>,
    /// Terminal proposal set, emitted at most once.
    pub result: Option<Vec<ProposalId>>,
    /// Set once a result has been emitted; the session is over.
    pub terminated: bool,
}

/// Proof that a single signer produced two distinct messages for the same
/// (iteration, round).
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct EquivocationProof {
    /// The two conflicting messages, in order of local receipt.
    pub messages: [Message; 2],
}

impl EquivocationProof {
    /// The equivocating identity.
    pub fn sender(&self) -> NodeId {
        self.messages[0].sender
    }

    /// Canonical bytes for persistence.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }
}

/// Weight accumulated at two grade cut-offs.
///
/// `relay` counts everything admitted (grade >= 1), `full` only weight
/// that arrived at grade >= 2 and may be used for commit/notify
/// thresholds.
#[derive(Debug, Clone, Copy, Default)]
struct GradedWeight {
    relay: u64,
    full: u64,
}

impl GradedWeight {
    fn add(&mut self, count: u16, grade: Grade) {
        if grade >= Grade::Grade1 {
            self.relay += count as u64;
        }
        if grade >= Grade::Grade2 {
            self.full += count as u64;
        }
    }

    fn sub(&mut self, count: u16, grade: Grade) {
        if grade >= Grade::Grade1 {
            self.relay = self.relay.saturating_sub(count as u64);
        }
        if grade >= Grade::Grade2 {
            self.full = self.full.saturating_sub(count as u64);
        }
    }
}

/// One graded-gossip slot: the first message seen from a sender in a
/// round.
#[derive(Debug, Clone)]
struct GossipSlot {
    msg_hash: H256,
    fingerprint: H256,
    count: u16,
    grade: Grade,
    /// Whether this slot's weight entered the tallies.
    counted: bool,
    /// Kept until needed for an equivocation proof.
    message: Option<Message>,
    /// Set once a conflicting second message was seen.
    equivocated: bool,
}

#[derive(Debug, Clone, Default)]
struct StatusEntry {
    values: Vec<ProposalId>,
    weight: GradedWeight,
}

#[derive(Debug, Clone)]
struct ProposalEntry {
    values: Vec<ProposalId>,
    weight: GradedWeight,
    /// Lowest proposer VRF seen for this set; deterministic leader
    /// tie-break.
    min_vrf: VrfSignature,
}

#[derive(Debug, Clone)]
struct Lock {
    fingerprint: H256,
    values: Vec<ProposalId>,
}

/// The protocol state machine for one layer session.
#[derive(Debug)]
pub struct Protocol {
    iter_round: IterRound,
    threshold: u64,
    initial: Option<Vec<ProposalId>>,

    gossip: BTreeMap<(IterRound, NodeId), GossipSlot>,
    equivocators: BTreeSet<NodeId>,

    /// Per-value preround support.
    preround: BTreeMap<ProposalId, GradedWeight>,
    /// Lowest VRF among admitted preround messages, for the weak coin.
    min_preround_vrf: Option<VrfSignature>,

    /// Per-fingerprint tallies, keyed by iteration.
    statuses: BTreeMap<(u8, H256), StatusEntry>,
    proposals: BTreeMap<(u8, H256), ProposalEntry>,
    commits: BTreeMap<(u8, H256), GradedWeight>,
    notifies: BTreeMap<(u8, H256), GradedWeight>,

    /// Resolution of fingerprints to the value sets they name.
    valid_sets: BTreeMap<H256, Vec<ProposalId>>,

    locked: Option<Lock>,
    coin_emitted: bool,
    result_sent: bool,
}

impl Protocol {
    /// Creates a state machine with the layer's threshold.
    pub fn new(threshold: u64) -> Self {
        let mut valid_sets = BTreeMap::new();
        // the empty set is always resolvable
        valid_sets.insert(fingerprint_of(&[]), Vec::new());
        Self {
            iter_round: IterRound::PREROUND,
            threshold,
            initial: None,
            gossip: BTreeMap::new(),
            equivocators: BTreeSet::new(),
            preround: BTreeMap::new(),
            min_preround_vrf: None,
            statuses: BTreeMap::new(),
            proposals: BTreeMap::new(),
            commits: BTreeMap::new(),
            notifies: BTreeMap::new(),
            valid_sets,
            locked: None,
            coin_emitted: false,
            result_sent: false,
        }
    }

    /// The round the next [`Protocol::next`] call will execute.
    pub fn iter_round(&self) -> IterRound {
        self.iter_round
    }

    /// The weight threshold this session runs with.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Identities observed equivocating, or flagged malicious externally.
    pub fn equivocators(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.equivocators.iter()
    }

    /// Seeds the preround payload with the local candidate set.
    ///
    /// Called once per session, before the preround advance, if any local
    /// signer is preround-eligible. The set is canonicalized here so the
    /// published message passes remote syntactic validation.
    pub fn on_initial(&mut self, candidates: Vec<ProposalId>) {
        let set: BTreeSet<ProposalId> = candidates.into_iter().collect();
        self.initial = Some(set.into_iter().collect());
    }

    /// Applies a validated input message.
    ///
    /// Returns whether the message should be relayed and, on the first
    /// conflict from a sender in a round, the equivocation proof.
    pub fn on_input(&mut self, input: &Input) -> (bool, Option<EquivocationProof>) {
        let msg = &input.message;
        let relay = input.grade >= Grade::Grade1;

        if input.malicious {
            self.equivocators.insert(msg.sender);
        }

        let key = msg.key();
        if let Some(mut slot) = self.gossip.remove(&key) {
            if slot.msg_hash == input.msg_hash || slot.equivocated {
                // exact duplicate, or a sender already caught in this
                // round: nothing new to relay
                self.gossip.insert(key, slot);
                return (false, None);
            }
            // second distinct message for the same (iter, round)
            slot.equivocated = true;
            if slot.counted {
                self.remove_weight(&slot);
                slot.counted = false;
            }
            let proof = slot.message.take().map(|first| EquivocationProof {
                messages: [first, msg.clone()],
            });
            self.equivocators.insert(msg.sender);
            self.gossip.insert(key, slot);
            debug!(sender = %msg.sender, round = %msg.iter_round, "equivocation detected");
            return (relay, proof);
        }

        let counted = !self.equivocators.contains(&msg.sender);
        if counted {
            self.add_weight(input);
        }
        if msg.iter_round.round == Round::Preround {
            // every observed preround proof feeds the coin, weightless or
            // not
            let vrf = msg.eligibility.proof;
            if self.min_preround_vrf.map_or(true, |min| vrf < min) {
                self.min_preround_vrf = Some(vrf);
            }
        }
        self.gossip.insert(
            key,
            GossipSlot {
                msg_hash: input.msg_hash,
                fingerprint: input.fingerprint,
                count: msg.eligibility.count,
                grade: input.grade,
                counted,
                message: Some(msg.clone()),
                equivocated: false,
            },
        );
        trace!(sender = %msg.sender, round = %msg.iter_round, counted, "message admitted");
        (relay, None)
    }

    /// Advances to the next round and derives its outputs.
    pub fn next(&mut self) -> Output {
        let current = self.iter_round;
        let mut out = Output::default();

        if self.result_sent {
            out.terminated = true;
            return out;
        }
        if let Some(values) = self.find_result() {
            debug!(round = %current, values = values.len(), "result reached");
            self.result_sent = true;
            out.result = Some(values);
            out.terminated = true;
            return out;
        }

        match current.round {
            Round::Preround => {
                out.message = Some(Message::template(
                    current,
                    self.initial.clone().unwrap_or_default(),
                ));
            }
            Round::Hardlock => self.update_lock(current.iter),
            Round::Softlock => {}
            Round::Status => {
                if !self.coin_emitted {
                    if let Some(vrf) = self.min_preround_vrf {
                        out.coin = Some(vrf.lsb());
                        self.coin_emitted = true;
                    }
                }
                out.message = Some(Message::template(current, self.supported_values()));
            }
            Round::Proposal => {
                out.message = Some(Message::template(current, self.proposal_union(current.iter)));
            }
            Round::Commit => {
                if let Some(fp) = self.commit_target(current.iter) {
                    out.message = Some(Message::template(
                        current,
                        vec![ProposalId::new(fp.into_inner())],
                    ));
                }
            }
            Round::Notify => {
                if let Some(fp) = self.notify_target(current.iter) {
                    out.message = Some(Message::template(
                        current,
                        vec![ProposalId::new(fp.into_inner())],
                    ));
                }
            }
        }

        self.iter_round = current.next();
        out
    }

    fn add_weight(&mut self, input: &Input) {
        let msg = &input.message;
        let iter = msg.iter_round.iter;
        let count = msg.eligibility.count;
        let grade = input.grade;
        match msg.iter_round.round {
            Round::Preround => {
                for value in &msg.value_set {
                    self.preround.entry(*value).or_default().add(count, grade);
                }
            }
            Round::Status => {
                let entry = self
                    .statuses
                    .entry((iter, input.fingerprint))
                    .or_default();
                if entry.values.is_empty() {
                    entry.values = msg.value_set.clone();
                }
                entry.weight.add(count, grade);
            }
            Round::Proposal => {
                let vrf = msg.eligibility.proof;
                let entry = self
                    .proposals
                    .entry((iter, input.fingerprint))
                    .or_insert_with(|| ProposalEntry {
                        values: msg.value_set.clone(),
                        weight: GradedWeight::default(),
                        min_vrf: vrf,
                    });
                if vrf < entry.min_vrf {
                    entry.min_vrf = vrf;
                }
                entry.weight.add(count, grade);
                self.valid_sets
                    .entry(input.fingerprint)
                    .or_insert_with(|| msg.value_set.clone());
            }
            Round::Commit => {
                self.commits
                    .entry((iter, input.fingerprint))
                    .or_default()
                    .add(count, grade);
            }
            Round::Notify => {
                self.notifies
                    .entry((iter, input.fingerprint))
                    .or_default()
                    .add(count, grade);
            }
            Round::Hardlock | Round::Softlock => {}
        }
    }

    fn remove_weight(&mut self, slot: &GossipSlot) {
        let Some(msg) = &slot.message else { return };
        let iter = msg.iter_round.iter;
        match msg.iter_round.round {
            Round::Preround => {
                for value in &msg.value_set {
                    if let Some(weight) = self.preround.get_mut(value) {
                        weight.sub(slot.count, slot.grade);
                    }
                }
            }
            Round::Status => {
                if let Some(entry) = self.statuses.get_mut(&(iter, slot.fingerprint)) {
                    entry.weight.sub(slot.count, slot.grade);
                }
            }
            Round::Proposal => {
                if let Some(entry) = self.proposals.get_mut(&(iter, slot.fingerprint)) {
                    entry.weight.sub(slot.count, slot.grade);
                }
            }
            Round::Commit => {
                if let Some(weight) = self.commits.get_mut(&(iter, slot.fingerprint)) {
                    weight.sub(slot.count, slot.grade);
                }
            }
            Round::Notify => {
                if let Some(weight) = self.notifies.get_mut(&(iter, slot.fingerprint)) {
                    weight.sub(slot.count, slot.grade);
                }
            }
            Round::Hardlock | Round::Softlock => {}
        }
    }

    /// Preround values whose support reached threshold.
    fn supported_values(&self) -> Vec<ProposalId> {
        self.preround
            .iter()
            .filter(|(_, weight)| weight.relay >= self.threshold)
            .map(|(value, _)| *value)
            .collect()
    }

    /// Union of threshold-supported status sets for an iteration, plus the
    /// locked set.
    fn proposal_union(&self, iter: u8) -> Vec<ProposalId> {
        let mut union: BTreeSet<ProposalId> = BTreeSet::new();
        for ((entry_iter, _), entry) in &self.statuses {
            if *entry_iter == iter && entry.weight.relay >= self.threshold {
                union.extend(entry.values.iter().copied());
            }
        }
        if let Some(lock) = &self.locked {
            union.extend(lock.values.iter().copied());
        }
        union.into_iter().collect()
    }

    /// The fingerprint to commit to in an iteration, if any.
    ///
    /// A held lock is committed to unconditionally; it can only have been
    /// installed by a previous iteration's threshold of commits. Otherwise
    /// the candidate proposals are those received in time for full
    /// counting whose every value carries threshold preround support, and
    /// the lowest proposer VRF decides among them.
    fn commit_target(&self, iter: u8) -> Option<H256> {
        if let Some(lock) = &self.locked {
            return Some(lock.fingerprint);
        }
        self.proposals
            .iter()
            .filter(|((entry_iter, _), entry)| {
                *entry_iter == iter && entry.weight.full > 0 && self.values_supported(&entry.values)
            })
            .min_by(|(_, a), (_, b)| a.min_vrf.cmp(&b.min_vrf))
            .map(|((_, fingerprint), _)| *fingerprint)
    }

    fn values_supported(&self, values: &[ProposalId]) -> bool {
        values.iter().all(|value| {
            self.preround
                .get(value)
                .map_or(false, |weight| weight.relay >= self.threshold)
        })
    }

    /// The fingerprint that gathered threshold commits in an iteration.
    fn notify_target(&self, iter: u8) -> Option<H256> {
        self.commits
            .iter()
            .find(|((entry_iter, _), weight)| {
                *entry_iter == iter && weight.full >= self.threshold
            })
            .map(|((_, fingerprint), _)| *fingerprint)
    }

    /// Installs a lock from the previous iteration's commits.
    fn update_lock(&mut self, iter: u8) {
        if iter == 0 {
            return;
        }
        let prev = iter - 1;
        let candidate = self
            .commits
            .iter()
            .filter(|((entry_iter, _), weight)| {
                *entry_iter == prev && weight.full >= self.threshold
            })
            .map(|((_, fingerprint), _)| *fingerprint)
            .next();
        let Some(fingerprint) = candidate else { return };
        match self.valid_sets.get(&fingerprint) {
            Some(values) => {
                debug!(iter, fingerprint = %fingerprint, "lock installed");
                self.locked = Some(Lock {
                    fingerprint,
                    values: values.clone(),
                });
            }
            None => {
                warn!(iter, fingerprint = %fingerprint, "commit threshold for unknown value set");
            }
        }
    }

    /// A notify tally at or above threshold, resolved to its value set.
    fn find_result(&self) -> Option<Vec<ProposalId>> {
        for ((_, fingerprint), weight) in &self.notifies {
            if weight.full < self.threshold {
                continue;
            }
            match self.valid_sets.get(fingerprint) {
                Some(values) => return Some(values.clone()),
                None => {
                    warn!(fingerprint = %fingerprint, "notify threshold for unknown value set");
                }
            }
        }
        None
    }
}
