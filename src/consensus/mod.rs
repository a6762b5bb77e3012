pub mod message;
pub mod peers;
pub mod processor;
pub mod quorum;
pub mod store;

pub use message::*;
pub use peers::*;
pub use processor::*;
pub use quorum::*;
pub use store::*;

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use rand::{rngs::StdRng, SeedableRng};
    use tokio::sync::{mpsc, oneshot};

    use super::*;
    use crate::common::ConsensusConfig;
    use crate::network::{Broadcaster, ChannelTransport, ReadinessBarrier, Transport};

    #[tokio::test]
    async fn test_end_to_end() {
        let n = 4;
        let f = 1;
        let initial = [Value::One, Value::One, Value::One, Value::Zero];
        let faulty = [false, false, false, true];

        // Arrange: inboxes for every node, shared by the transport
        let (inboxes, receivers): (Vec<_>, Vec<_>) = (0..n).map(|_| mpsc::channel(100)).unzip();
        let transport: Arc<dyn Transport> = Arc::new(ChannelTransport::new(inboxes.clone()));
        let barrier = Arc::new(ReadinessBarrier::new(n));

        // Arrange: one processor per node
        for (id, rx) in receivers.into_iter().enumerate() {
            let processor = ConsensusProcessor::new(
                NodeIdentity { id, n, f, faulty: faulty[id] },
                initial[id],
                ConsensusConfig::default(),
                Broadcaster::new(id, Peers::new(n), transport.clone(), barrier.clone()),
                rx,
                StdRng::seed_from_u64(id as u64),
            );
            tokio::spawn(processor.run());
        }
        barrier.wait().await;

        // Act: start every node
        for inbox in &inboxes {
            let (reply, _rx) = oneshot::channel();
            inbox.send(Event::Start(reply)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Assert: the three healthy nodes decided their common value
        for (id, inbox) in inboxes.iter().enumerate() {
            let (reply, rx) = oneshot::channel();
            inbox.send(Event::GetState(reply)).await.unwrap();
            let state = rx.await.unwrap();

            if faulty[id] {
                assert_eq!(state.decided, None);
            } else {
                assert_eq!(state.decided, Some(true));
                assert_eq!(state.x, Some(Value::One));
            }
        }
    }
}
