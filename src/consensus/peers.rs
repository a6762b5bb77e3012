pub type NodeId = usize;

/// The fixed membership of a network: ids `0..n`.
#[derive(Debug, Clone)]
pub struct Peers {
    pub members: Vec<NodeId>,
}

impl Peers {
    pub fn new(n: usize) -> Self {
        Peers {
            members: (0..n).collect(),
        }
    }

    pub fn is_member(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    /// Every member except `id`.
    pub fn others(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.members.iter().copied().filter(move |member| *member != id)
    }
}
