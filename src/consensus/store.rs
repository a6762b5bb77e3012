use std::collections::{BTreeMap, HashMap};

use super::message::{Phase, Value};

/// Counts of messages received in one phase of one round, own contribution included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    counts: HashMap<Value, usize>,
}

impl Tally {
    fn new() -> Self {
        Tally {
            counts: Value::ALL.iter().map(|value| (*value, 0)).collect(),
        }
    }

    pub fn count(&self, value: Value) -> usize {
        self.counts.get(&value).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[derive(Clone, Debug, Default)]
struct RoundTally {
    propose: Tally,
    vote: Tally,
}

impl RoundTally {
    fn new() -> Self {
        RoundTally {
            propose: Tally::new(),
            vote: Tally::new(),
        }
    }

    fn phase(&self, phase: Phase) -> &Tally {
        match phase {
            Phase::Propose => &self.propose,
            Phase::Vote => &self.vote,
        }
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut Tally {
        match phase {
            Phase::Propose => &mut self.propose,
            Phase::Vote => &mut self.vote,
        }
    }
}

/// Per-round message tallies.
///
/// Every call to [`Store::record`] counts as one distinct message. Callers are
/// responsible for not submitting the same physical message twice.
pub struct Store {
    rounds: BTreeMap<u64, RoundTally>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            rounds: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, phase: Phase, round: u64, value: Value) {
        let tally = self.rounds.entry(round).or_insert_with(RoundTally::new);
        *tally.phase_mut(phase).counts.entry(value).or_insert(0) += 1;
    }

    pub fn count(&self, phase: Phase, round: u64, value: Value) -> usize {
        self.tally(phase, round).map(|t| t.count(value)).unwrap_or(0)
    }

    pub fn tally(&self, phase: Phase, round: u64) -> Option<&Tally> {
        self.rounds.get(&round).map(|r| r.phase(phase))
    }

    /// Drops every round strictly below `round`.
    pub fn prune_below(&mut self, round: u64) {
        self.rounds = self.rounds.split_off(&round);
    }

    pub fn rounds(&self) -> usize {
        self.rounds.len()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
