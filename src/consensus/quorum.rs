use super::message::Value;
use super::store::Tally;

/*
    With n processes of which at most f may crash, a process decides v
    once it holds more than 2f votes for v. Holding more than f votes
    for v means some correct process voted v, so v becomes the estimate
    for the next round. Otherwise the estimate is a coin flip.
*/

/// What a node does with its estimate after the vote phase of a round.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Outcome {
    Decide(Value),
    Adopt(Value),
    FlipCoin,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Quorum {
    pub n: usize,
    pub f: usize,
}

impl Quorum {
    pub fn new(n: usize, f: usize) -> Self {
        Quorum { n, f }
    }

    /// Largest number of crashed nodes the protocol is guaranteed to survive.
    pub fn tolerance(&self) -> usize {
        self.n.saturating_sub(1) / 3
    }

    pub fn within_tolerance(&self) -> bool {
        self.f <= self.tolerance()
    }

    /// Vote for the value proposed by a strict majority, if any.
    pub fn vote_value(&self, proposals: &Tally) -> Value {
        let majority = self.n / 2;
        if proposals.count(Value::Zero) > majority {
            Value::Zero
        } else if proposals.count(Value::One) > majority {
            Value::One
        } else {
            Value::Undecided
        }
    }

    pub fn outcome(&self, votes: &Tally) -> Outcome {
        let zeros = votes.count(Value::Zero);
        let ones = votes.count(Value::One);

        if zeros > 2 * self.f {
            Outcome::Decide(Value::Zero)
        } else if ones > 2 * self.f {
            Outcome::Decide(Value::One)
        } else if zeros > self.f {
            Outcome::Adopt(Value::Zero)
        } else if ones > self.f {
            Outcome::Adopt(Value::One)
        } else {
            Outcome::FlipCoin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{message::Phase, store::Store};

    fn tally(phase: Phase, values: &[Value]) -> Tally {
        let mut store = Store::new();
        for value in values {
            store.record(phase, 1, *value);
        }
        store.tally(phase, 1).cloned().unwrap_or_default()
    }

    #[test]
    fn test_tolerance() {
        assert_eq!(Quorum::new(1, 0).tolerance(), 0);
        assert_eq!(Quorum::new(4, 1).tolerance(), 1);
        assert_eq!(Quorum::new(9, 4).tolerance(), 2);
        assert!(Quorum::new(4, 1).within_tolerance());
        assert!(!Quorum::new(9, 4).within_tolerance());
        assert!(!Quorum::new(10, 5).within_tolerance());
    }

    #[test]
    fn test_vote_requires_strict_majority() {
        use Value::*;
        let quorum = Quorum::new(5, 0);

        assert_eq!(quorum.vote_value(&tally(Phase::Propose, &[One, One, One, Zero, Zero])), One);
        assert_eq!(quorum.vote_value(&tally(Phase::Propose, &[Zero, Zero, Zero])), Zero);
        assert_eq!(quorum.vote_value(&tally(Phase::Propose, &[One, One, Zero, Zero])), Undecided);

        // 2 of 4 is not more than half.
        let quorum = Quorum::new(4, 1);
        assert_eq!(quorum.vote_value(&tally(Phase::Propose, &[One, One])), Undecided);
    }

    #[test]
    fn test_outcome_thresholds() {
        use Value::*;
        let quorum = Quorum::new(7, 2);

        assert_eq!(quorum.outcome(&tally(Phase::Vote, &[One; 5])), Outcome::Decide(One));
        assert_eq!(quorum.outcome(&tally(Phase::Vote, &[Zero; 5])), Outcome::Decide(Zero));
        assert_eq!(quorum.outcome(&tally(Phase::Vote, &[One, One, One, Undecided])), Outcome::Adopt(One));
        assert_eq!(quorum.outcome(&tally(Phase::Vote, &[Zero, Zero, Zero, One])), Outcome::Adopt(Zero));
        assert_eq!(quorum.outcome(&tally(Phase::Vote, &[Zero, Zero, Undecided, Undecided])), Outcome::FlipCoin);
        assert_eq!(quorum.outcome(&Tally::default()), Outcome::FlipCoin);
    }

    #[test]
    fn test_single_node_decides_own_vote() {
        let quorum = Quorum::new(1, 0);
        let vote = quorum.vote_value(&tally(Phase::Propose, &[Value::One]));

        assert_eq!(vote, Value::One);
        assert_eq!(quorum.outcome(&tally(Phase::Vote, &[vote])), Outcome::Decide(Value::One));
    }
}
