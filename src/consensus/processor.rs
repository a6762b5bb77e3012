use std::collections::HashSet;
use std::fmt;

use rand::{rngs::StdRng, Rng};
use serde::Serialize;
use tokio::sync::{mpsc::Receiver, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::{
    message::{Message, Phase, Value},
    peers::NodeId,
    quorum::{Outcome, Quorum},
    store::Store,
};
use crate::common::{ConsensusConfig, ConsensusError, Result};
use crate::network::Broadcaster;

/// Everything a node processes arrives through its inbox, so the round
/// loop, peer messages and external commands never race on the state.
pub enum Event {
    Message(Vec<u8>),
    Start(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<()>),
    Status(oneshot::Sender<NodeStatus>),
    GetState(oneshot::Sender<NodeState>),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub n: usize,
    pub f: usize,
    pub faulty: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Stage {
    /// Faulty nodes stay here forever.
    Inert,
    NotStarted,
    AwaitingPeers,
    Proposing { deadline: Instant },
    Voting { deadline: Instant },
    Decided,
    Stopped,
}

impl Stage {
    fn deadline(&self) -> Option<Instant> {
        match self {
            Stage::Proposing { deadline } | Stage::Voting { deadline } => Some(*deadline),
            _ => None,
        }
    }
}

pub struct ConsensusState {
    pub estimate: Value,
    pub round: u64,
    pub decided: bool,
    pub killed: bool,
}

/// Snapshot reported to external observers. Faulty nodes report `None`
/// for everything but `killed`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct NodeState {
    pub killed: bool,
    pub x: Option<Value>,
    pub decided: Option<bool>,
    pub k: Option<u64>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Faulty,
    Live,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Faulty => write!(f, "faulty"),
            NodeStatus::Live => write!(f, "live"),
        }
    }
}

pub struct ConsensusProcessor {
    pub identity: NodeIdentity,
    pub quorum: Quorum,
    pub stage: Stage,
    pub state: ConsensusState,
    pub store: Store,
    seen: HashSet<(Phase, u64, NodeId)>,
    broadcaster: Broadcaster,
    config: ConsensusConfig,
    rng: StdRng,
    // End of the last collection window. Windows are chained from it so
    // timer and scheduling delays do not pile up round after round.
    anchor: Instant,
    msg_rx: Receiver<Event>,
}

impl ConsensusProcessor {
    pub fn new(
        identity: NodeIdentity,
        initial: Value,
        config: ConsensusConfig,
        broadcaster: Broadcaster,
        msg_rx: Receiver<Event>,
        rng: StdRng,
    ) -> Self {
        ConsensusProcessor {
            identity,
            quorum: Quorum::new(identity.n, identity.f),
            stage: if identity.faulty { Stage::Inert } else { Stage::NotStarted },
            state: ConsensusState {
                estimate: initial,
                round: 1,
                decided: false,
                killed: false,
            },
            store: Store::new(),
            seen: HashSet::new(),
            broadcaster,
            config,
            rng,
            anchor: Instant::now(),
            msg_rx,
        }
    }

    pub async fn run(mut self) {
        let id = self.identity.id;
        self.broadcaster.mark_ready();
        debug!(node = id, faulty = self.identity.faulty, "node listening");

        loop {
            let deadline = self.stage.deadline();
            let awaiting_peers = self.stage == Stage::AwaitingPeers;

            tokio::select! {
                // Drain pending messages before letting a window close.
                biased;

                event = self.msg_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = self.broadcaster.ready(), if awaiting_peers => self.begin(),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_window_elapsed()
                }
            }
        }

        debug!(node = id, "inbox closed, node exiting");
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Message(payload) => self.handle_message(&payload),
            Event::Start(reply) => {
                let _ = reply.send(self.start());
            }
            Event::Stop(reply) => {
                self.stop();
                let _ = reply.send(());
            }
            Event::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Event::GetState(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    pub fn status(&self) -> NodeStatus {
        if self.identity.faulty {
            NodeStatus::Faulty
        } else {
            NodeStatus::Live
        }
    }

    pub fn snapshot(&self) -> NodeState {
        if self.identity.faulty {
            return NodeState {
                killed: self.state.killed,
                x: None,
                decided: None,
                k: None,
            };
        }

        NodeState {
            killed: self.state.killed,
            x: Some(self.state.estimate),
            decided: Some(self.state.decided),
            k: Some(self.state.round),
        }
    }

    fn start(&mut self) -> Result<()> {
        let id = self.identity.id;
        if self.identity.faulty {
            return Err(ConsensusError::FaultyNode(id));
        }
        if self.state.killed {
            return Err(ConsensusError::KilledNode(id));
        }

        if self.stage == Stage::NotStarted {
            info!(node = id, estimate = %self.state.estimate, "starting consensus");
            self.stage = Stage::AwaitingPeers;
        }
        Ok(())
    }

    fn stop(&mut self) {
        if !self.state.killed {
            info!(node = self.identity.id, round = self.state.round, decided = self.state.decided, "stopping");
        }
        self.state.killed = true;
        if self.stage != Stage::Inert {
            self.stage = Stage::Stopped;
        }
    }

    /// Runs once the readiness barrier has opened.
    pub fn begin(&mut self) {
        if self.stage == Stage::AwaitingPeers {
            self.anchor = Instant::now();
            self.propose();
        }
    }

    fn propose(&mut self) {
        if self.state.killed {
            return;
        }
        let round = self.state.round;
        let estimate = self.state.estimate;
        debug!(node = self.identity.id, round, value = %estimate, "propose");

        self.contribute(Message::propose(round, estimate, self.identity.id));
        self.anchor += self.config.propose_window;
        self.stage = Stage::Proposing { deadline: self.anchor };
    }

    pub fn on_window_elapsed(&mut self) {
        match self.stage {
            Stage::Proposing { .. } => self.vote(),
            Stage::Voting { .. } => self.conclude_round(),
            _ => {}
        }
    }

    fn vote(&mut self) {
        let round = self.state.round;
        let value = self
            .store
            .tally(Phase::Propose, round)
            .map(|proposals| self.quorum.vote_value(proposals))
            .unwrap_or(Value::Undecided);
        debug!(node = self.identity.id, round, value = %value, "vote");

        self.contribute(Message::vote(round, value, self.identity.id));
        self.anchor += self.config.vote_window;
        self.stage = Stage::Voting { deadline: self.anchor };
    }

    fn conclude_round(&mut self) {
        let id = self.identity.id;
        let round = self.state.round;
        let outcome = self
            .store
            .tally(Phase::Vote, round)
            .map(|votes| self.quorum.outcome(votes))
            .unwrap_or(Outcome::FlipCoin);

        match outcome {
            Outcome::Decide(value) => {
                self.state.estimate = value;
                self.state.decided = true;
                self.stage = Stage::Decided;
                self.store.prune_below(round);
                self.seen.retain(|(_, seen_round, _)| *seen_round >= round);
                info!(node = id, round, value = %value, "decided");
                return;
            }
            Outcome::Adopt(value) => self.state.estimate = value,
            Outcome::FlipCoin => {
                self.state.estimate = Value::from_bit(self.rng.gen_bool(0.5));
                debug!(node = id, round, value = %self.state.estimate, "coin flip");
            }
        }

        self.state.round += 1;
        self.propose();
    }

    // Counts our own message once, then hands it to the peers.
    fn contribute(&mut self, message: Message) {
        self.seen.insert((message.phase, message.round, message.sender));
        self.store.record(message.phase, message.round, message.value);
        self.broadcaster.broadcast(&message);
    }

    fn handle_message(&mut self, payload: &[u8]) {
        let id = self.identity.id;
        if self.identity.faulty {
            return;
        }

        let message = match self.validate(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(node = id, error = %e, "rejected inbound message");
                return;
            }
        };

        if !self.seen.insert((message.phase, message.round, message.sender)) {
            debug!(node = id, from = message.sender, round = message.round, phase = %message.phase, "duplicate message");
            return;
        }
        self.store.record(message.phase, message.round, message.value);

        if self.is_behind(&message) {
            self.catch_up(message.round);
            return;
        }

        if self.state.decided
            && !self.state.killed
            && message.phase == Phase::Propose
            && message.round > self.state.round
        {
            self.echo_decision(message.sender, message.round);
        }
    }

    // More than f peers already proposing at least two rounds ahead means
    // this node fell out of step. One round ahead is normal skew.
    fn is_behind(&self, message: &Message) -> bool {
        let running = matches!(self.stage, Stage::Proposing { .. } | Stage::Voting { .. });
        running
            && !self.state.killed
            && message.phase == Phase::Propose
            && message.round > self.state.round + 1
            && self
                .store
                .tally(Phase::Propose, message.round)
                .map(|proposals| proposals.total() > self.quorum.f)
                .unwrap_or(false)
    }

    fn catch_up(&mut self, round: u64) {
        let (zeros, ones) = match self.store.tally(Phase::Propose, round) {
            Some(proposals) => (proposals.count(Value::Zero), proposals.count(Value::One)),
            None => (0, 0),
        };
        if zeros > ones {
            self.state.estimate = Value::Zero;
        } else if ones > zeros {
            self.state.estimate = Value::One;
        }

        info!(node = self.identity.id, from = self.state.round, to = round, value = %self.state.estimate, "catching up");
        self.state.round = round;
        self.anchor = Instant::now();
        self.propose();
    }

    fn validate(&self, payload: &[u8]) -> Result<Message> {
        let message = Message::decode(payload)?;
        if !self.broadcaster.peers().is_member(message.sender) {
            return Err(ConsensusError::MalformedMessage(format!(
                "unknown sender {}",
                message.sender
            )));
        }
        if message.sender == self.identity.id {
            return Err(ConsensusError::MalformedMessage(
                "message claims to come from the receiver".to_string(),
            ));
        }
        Ok(message)
    }

    // A decided node starts no rounds of its own. It answers a peer's later
    // round with its decided value in both phases.
    fn echo_decision(&mut self, target: NodeId, round: u64) {
        let id = self.identity.id;
        let value = self.state.estimate;
        debug!(node = id, to = target, round, value = %value, "echoing decision");

        self.broadcaster.send_to(target, &Message::propose(round, value, id));
        self.broadcaster.send_to(target, &Message::vote(round, value, id));
    }
}
