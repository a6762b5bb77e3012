pub mod barrier;
pub mod launch;
pub mod node;

pub use barrier::*;
pub use launch::*;
pub use node::*;

use std::sync::Arc;

use tokio::sync::mpsc::Sender;
use tracing::debug;

use crate::common::{ConsensusError, Result};
use crate::consensus::{Event, Message, NodeId, Peers};

/*
    Links between live processes are asynchronous and may lose messages,
    but a message sent often enough between two live processes is
    eventually delivered. A crashed process neither sends nor answers.
    Senders therefore never wait on acknowledgements: a peer that does
    not take a message is treated as currently unreachable.
*/

/// Point-to-point delivery of encoded messages.
pub trait Transport: Send + Sync {
    fn send(&self, target: NodeId, payload: Vec<u8>) -> Result<()>;
}

/// Delivers payloads straight into the inbox of each in-process node.
pub struct ChannelTransport {
    inboxes: Vec<Sender<Event>>,
}

impl ChannelTransport {
    pub fn new(inboxes: Vec<Sender<Event>>) -> Self {
        ChannelTransport { inboxes }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, target: NodeId, payload: Vec<u8>) -> Result<()> {
        let inbox = self.inboxes.get(target).ok_or_else(|| ConsensusError::Transport {
            target,
            reason: "unknown node".to_string(),
        })?;

        // Never block the round loop on a full or closed inbox.
        inbox
            .try_send(Event::Message(payload))
            .map_err(|e| ConsensusError::Transport {
                target,
                reason: e.to_string(),
            })
    }
}

/// Best-effort delivery of a node's messages to all of its peers.
pub struct Broadcaster {
    id: NodeId,
    peers: Peers,
    transport: Arc<dyn Transport>,
    barrier: Arc<ReadinessBarrier>,
}

impl Broadcaster {
    pub fn new(
        id: NodeId,
        peers: Peers,
        transport: Arc<dyn Transport>,
        barrier: Arc<ReadinessBarrier>,
    ) -> Self {
        Broadcaster {
            id,
            peers,
            transport,
            barrier,
        }
    }

    pub fn peers(&self) -> &Peers {
        &self.peers
    }

    /// Signals that this node can receive messages.
    pub fn mark_ready(&self) {
        self.barrier.mark_ready(self.id);
    }

    /// Resolves once every node of the network can receive messages.
    /// Nothing may be broadcast before that.
    pub async fn ready(&self) {
        self.barrier.wait().await;
    }

    /// Sends `message` to every other peer and returns how many accepted it.
    /// Failures are logged and skipped.
    pub fn broadcast(&self, message: &Message) -> usize {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                debug!(node = self.id, error = %e, "dropping unencodable message");
                return 0;
            }
        };

        self.peers
            .others(self.id)
            .filter(|target| self.deliver(*target, payload.clone()))
            .count()
    }

    pub fn send_to(&self, target: NodeId, message: &Message) -> bool {
        match message.encode() {
            Ok(payload) => self.deliver(target, payload),
            Err(_) => false,
        }
    }

    fn deliver(&self, target: NodeId, payload: Vec<u8>) -> bool {
        match self.transport.send(target, payload) {
            Ok(()) => true,
            Err(e) => {
                debug!(node = self.id, error = %e, "peer unreachable");
                false
            }
        }
    }
}
