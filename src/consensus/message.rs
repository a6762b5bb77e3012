use std::fmt;

use serde::{Deserialize, Serialize};

use super::peers::NodeId;
use crate::common::{ConsensusError, Result};

/*
    Each round k has two phases. In the first, every process sends
    (R, k, x) carrying its current estimate. In the second, it sends
    (P, k, v) where v is a value it saw from more than n/2 processes
    in the first phase, or "?" if no such value exists.
*/

/// A binary estimate, or the "no majority observed" marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "WireValue", into = "WireValue")]
pub enum Value {
    Zero,
    One,
    Undecided,
}

impl Value {
    pub const ALL: [Value; 3] = [Value::Zero, Value::One, Value::Undecided];

    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Value::One
        } else {
            Value::Zero
        }
    }

    pub fn is_bit(&self) -> bool {
        !matches!(self, Value::Undecided)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Zero => write!(f, "0"),
            Value::One => write!(f, "1"),
            Value::Undecided => write!(f, "?"),
        }
    }
}

// 0 and 1 travel as numbers, the undecided marker as the string "?".
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireValue {
    Bit(u8),
    Symbol(String),
}

impl TryFrom<WireValue> for Value {
    type Error = String;

    fn try_from(wire: WireValue) -> std::result::Result<Self, Self::Error> {
        match wire {
            WireValue::Bit(0) => Ok(Value::Zero),
            WireValue::Bit(1) => Ok(Value::One),
            WireValue::Symbol(s) if s == "?" => Ok(Value::Undecided),
            WireValue::Bit(b) => Err(format!("unknown value {b}")),
            WireValue::Symbol(s) => Err(format!("unknown value {s:?}")),
        }
    }
}

impl From<Value> for WireValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Zero => WireValue::Bit(0),
            Value::One => WireValue::Bit(1),
            Value::Undecided => WireValue::Symbol("?".to_string()),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// R-phase, carries the sender's estimate.
    Propose,
    /// P-phase, carries the value the sender saw a majority for.
    Vote,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Propose => write!(f, "PROPOSE"),
            Phase::Vote => write!(f, "VOTE"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct Message {
    pub phase: Phase,
    pub round: u64,
    pub value: Value,
    pub sender: NodeId,
}

// Every field is optional so that a missing one is reported instead of
// failing inside serde with a less useful error.
#[derive(Deserialize)]
struct RawMessage {
    phase: Option<Phase>,
    round: Option<u64>,
    value: Option<Value>,
    sender: Option<NodeId>,
}

impl Message {
    pub fn propose(round: u64, value: Value, sender: NodeId) -> Self {
        Message { phase: Phase::Propose, round, value, sender }
    }

    pub fn vote(round: u64, value: Value, sender: NodeId) -> Self {
        Message { phase: Phase::Vote, round, value, sender }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ConsensusError::MalformedMessage(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: RawMessage = serde_json::from_slice(bytes)
            .map_err(|e| ConsensusError::MalformedMessage(e.to_string()))?;
        Message::from_raw(raw)
    }

    fn from_raw(raw: RawMessage) -> Result<Self> {
        let missing = |field: &str| ConsensusError::MalformedMessage(format!("missing {field}"));

        let round = raw.round.ok_or_else(|| missing("round"))?;
        if round == 0 {
            return Err(ConsensusError::MalformedMessage("round must start at 1".to_string()));
        }

        Ok(Message {
            phase: raw.phase.ok_or_else(|| missing("phase"))?,
            round,
            value: raw.value.ok_or_else(|| missing("value"))?,
            sender: raw.sender.ok_or_else(|| missing("sender"))?,
        })
    }
}
