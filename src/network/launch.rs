use std::sync::Arc;
use std::time::Duration;

use rand::{rngs::StdRng, SeedableRng};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{Broadcaster, ChannelTransport, NodeHandle, ReadinessBarrier, Transport};
use crate::common::{ConsensusConfig, ConsensusError, Result};
use crate::consensus::{ConsensusProcessor, NodeId, NodeIdentity, NodeState, NodeStatus, Peers, Quorum, Value};

/// True once every non-faulty node reports a decision.
pub fn reached_finality(states: &[NodeState]) -> bool {
    states.iter().all(|state| state.decided.unwrap_or(true))
}

/// A set of in-process nodes wired to each other.
pub struct Network {
    config: ConsensusConfig,
    nodes: Vec<NodeHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Network {
    /// Launches `n` nodes, `f` of them faulty, and returns once all of them
    /// can receive messages. Consensus does not begin until [`Network::start_all`].
    pub async fn launch(
        n: usize,
        f: usize,
        initial_values: &[Value],
        faulty: &[bool],
        config: ConsensusConfig,
    ) -> Result<Network> {
        Self::launch_with(n, f, initial_values, faulty, config, |_| StdRng::from_entropy()).await
    }

    /// Like [`Network::launch`] with a reproducible coin per node.
    pub async fn launch_seeded(
        n: usize,
        f: usize,
        initial_values: &[Value],
        faulty: &[bool],
        config: ConsensusConfig,
        seed: u64,
    ) -> Result<Network> {
        Self::launch_with(n, f, initial_values, faulty, config, |id| {
            StdRng::seed_from_u64(seed.wrapping_add(id as u64))
        })
        .await
    }

    async fn launch_with(
        n: usize,
        f: usize,
        initial_values: &[Value],
        faulty: &[bool],
        config: ConsensusConfig,
        rng_for: impl Fn(NodeId) -> StdRng,
    ) -> Result<Network> {
        validate(n, f, initial_values, faulty)?;
        if !Quorum::new(n, f).within_tolerance() {
            warn!(n, f, "fault count exceeds what the protocol tolerates");
        }

        let (inboxes, receivers): (Vec<_>, Vec<_>) =
            (0..n).map(|_| mpsc::channel(config.inbox_capacity)).unzip();

        let transport: Arc<dyn Transport> = Arc::new(ChannelTransport::new(inboxes.clone()));
        let barrier = Arc::new(ReadinessBarrier::new(n));

        let mut tasks = Vec::with_capacity(n);
        for (id, rx) in receivers.into_iter().enumerate() {
            let identity = NodeIdentity { id, n, f, faulty: faulty[id] };
            let broadcaster = Broadcaster::new(id, Peers::new(n), transport.clone(), barrier.clone());
            let processor = ConsensusProcessor::new(
                identity,
                initial_values[id],
                config.clone(),
                broadcaster,
                rx,
                rng_for(id),
            );
            tasks.push(tokio::spawn(processor.run()));
        }

        barrier.wait().await;
        info!(n, f, "network ready");

        let nodes = inboxes
            .into_iter()
            .enumerate()
            .map(|(id, tx)| NodeHandle::new(id, tx))
            .collect();

        Ok(Network { config, nodes, tasks })
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeHandle> {
        self.nodes.get(id)
    }

    /// Starts every node in id order. Faulty nodes refuse, which is expected.
    pub async fn start_all(&self) -> Result<()> {
        for node in &self.nodes {
            match node.start().await {
                Ok(()) => {}
                Err(ConsensusError::FaultyNode(id)) => debug!(node = id, "faulty node not started"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub async fn stop_all(&self) -> Result<()> {
        for node in &self.nodes {
            node.stop().await?;
        }
        Ok(())
    }

    pub async fn states(&self) -> Result<Vec<NodeState>> {
        let mut states = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            states.push(node.state().await?);
        }
        Ok(states)
    }

    pub async fn statuses(&self) -> Result<Vec<NodeStatus>> {
        let mut statuses = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            statuses.push(node.status().await?);
        }
        Ok(statuses)
    }

    /// Polls node states until every non-faulty node decided or `timeout`
    /// ran out, and returns the last states observed.
    pub async fn wait_for_finality(&self, timeout: Duration) -> Result<Vec<NodeState>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut states = self.states().await?;

        while !reached_finality(&states) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.config.finality_poll_interval).await;
            states = self.states().await?;
        }
        Ok(states)
    }

    /// Stops every node and tears the actors down.
    pub async fn shutdown(self) -> Result<()> {
        self.stop_all().await
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn validate(n: usize, f: usize, initial_values: &[Value], faulty: &[bool]) -> Result<()> {
    if n == 0 {
        return Err(ConsensusError::Config("network needs at least one node".to_string()));
    }
    if initial_values.len() != n || faulty.len() != n {
        return Err(ConsensusError::Config(format!(
            "expected {n} initial values and faulty flags, got {} and {}",
            initial_values.len(),
            faulty.len()
        )));
    }
    let flagged = faulty.iter().filter(|flag| **flag).count();
    if flagged != f {
        return Err(ConsensusError::Config(format!(
            "faulty flags mark {flagged} nodes, expected {f}"
        )));
    }
    Ok(())
}
