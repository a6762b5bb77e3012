use thiserror::Error;

use crate::consensus::NodeId;

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors surfaced by the consensus nodes and the network coordinator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Launch parameters are inconsistent. Nothing has been started.
    #[error("invalid network configuration: {0}")]
    Config(String),

    /// An inbound payload could not be decoded or is missing a field.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A message could not be handed to a peer.
    ///
    /// The broadcaster logs and swallows these, a silent peer is expected.
    #[error("delivery to node {target} failed: {reason}")]
    Transport { target: NodeId, reason: String },

    #[error("node {0} is faulty")]
    FaultyNode(NodeId),

    #[error("node {0} has been stopped")]
    KilledNode(NodeId),

    /// The node's actor is no longer running.
    #[error("node {0} is unavailable")]
    NodeUnavailable(NodeId),
}
