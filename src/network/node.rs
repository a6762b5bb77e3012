use tokio::sync::{mpsc::Sender, oneshot};

use crate::common::{ConsensusError, Result};
use crate::consensus::{Event, NodeId, NodeState, NodeStatus};

/// External handle on a running node.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    pub id: NodeId,
    tx: Sender<Event>,
}

impl NodeHandle {
    pub fn new(id: NodeId, tx: Sender<Event>) -> Self {
        NodeHandle { id, tx }
    }

    /// Begins round execution. Faulty and stopped nodes refuse.
    pub async fn start(&self) -> Result<()> {
        self.request(Event::Start).await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(Event::Stop).await
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        self.request(Event::Status).await
    }

    pub async fn state(&self) -> Result<NodeState> {
        self.request(Event::GetState).await
    }

    /// Hands a raw payload to the node as if it came off the wire.
    pub fn deliver(&self, payload: Vec<u8>) -> Result<()> {
        self.tx
            .try_send(Event::Message(payload))
            .map_err(|e| ConsensusError::Transport {
                target: self.id,
                reason: e.to_string(),
            })
    }

    async fn request<T>(&self, event: impl FnOnce(oneshot::Sender<T>) -> Event) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(event(reply))
            .await
            .map_err(|_| ConsensusError::NodeUnavailable(self.id))?;
        rx.await.map_err(|_| ConsensusError::NodeUnavailable(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_node_is_unavailable() {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        drop(rx);
        let handle = NodeHandle::new(4, tx);

        assert_eq!(handle.status().await, Err(ConsensusError::NodeUnavailable(4)));
        assert!(handle.deliver(b"{}".to_vec()).is_err());
    }
}
