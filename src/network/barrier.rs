use tokio::sync::watch;

use crate::consensus::NodeId;

/// One-shot gate that opens once every node of the network has signalled
/// it can receive messages.
pub struct ReadinessBarrier {
    ready: watch::Sender<Vec<bool>>,
}

impl ReadinessBarrier {
    pub fn new(n: usize) -> Self {
        let (ready, _) = watch::channel(vec![false; n]);
        ReadinessBarrier { ready }
    }

    pub fn mark_ready(&self, id: NodeId) {
        self.ready.send_modify(|flags| {
            if let Some(flag) = flags.get_mut(id) {
                *flag = true;
            }
        });
    }

    pub fn is_ready(&self) -> bool {
        self.ready.borrow().iter().all(|flag| *flag)
    }

    /// Waits without polling. Dropping the future abandons the wait, which
    /// is how a stopped node gives up on it.
    pub async fn wait(&self) {
        let mut rx = self.ready.subscribe();
        loop {
            if rx.borrow_and_update().iter().all(|flag| *flag) {
                return;
            }
            // The sender lives as long as `self`, so this only fails on teardown.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn test_opens_after_every_node() {
        let barrier = Arc::new(ReadinessBarrier::new(3));
        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait().await })
        };

        barrier.mark_ready(0);
        barrier.mark_ready(2);
        barrier.mark_ready(2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!barrier.is_ready());
        assert!(!waiter.is_finished());

        barrier.mark_ready(1);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(barrier.is_ready());
    }

    #[tokio::test]
    async fn test_ready_barrier_returns_immediately() {
        let barrier = ReadinessBarrier::new(1);
        barrier.mark_ready(0);

        tokio::time::timeout(Duration::from_millis(100), barrier.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_can_be_abandoned() {
        let barrier = ReadinessBarrier::new(2);

        let waited = tokio::time::timeout(Duration::from_millis(20), barrier.wait()).await;
        assert!(waited.is_err());
    }
}
