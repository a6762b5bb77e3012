use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use super::error::{ConsensusError, Result};

/// Runtime parameters shared by every node of a network.
///
/// Loadable from JSON, durations given in milliseconds:
/// `{"propose_window": 20, "vote_window": 20, "inbox_capacity": 1024, "finality_poll_interval": 50}`.
/// Missing keys keep their defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// How long a node collects PROPOSE messages before choosing its vote.
    #[serde(deserialize_with = "millis")]
    pub propose_window: Duration,
    /// How long a node collects VOTE messages before applying the decision rule.
    #[serde(deserialize_with = "millis")]
    pub vote_window: Duration,
    /// Bound of each node's inbox. Messages beyond it are dropped like a lossy link.
    pub inbox_capacity: usize,
    /// Interval used when polling node states for finality.
    #[serde(deserialize_with = "millis")]
    pub finality_poll_interval: Duration,
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            propose_window: Duration::from_millis(20),
            vote_window: Duration::from_millis(20),
            inbox_capacity: 1024,
            finality_poll_interval: Duration::from_millis(50),
        }
    }
}

impl ConsensusConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ConsensusError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConsensusError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn with_windows(mut self, window: Duration) -> Self {
        self.propose_window = window;
        self.vote_window = window;
        self
    }

    pub fn round_duration(&self) -> Duration {
        self.propose_window + self.vote_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = ConsensusConfig::from_json(r#"{"inbox_capacity": 16, "vote_window": 5}"#).unwrap();

        assert_eq!(config.inbox_capacity, 16);
        assert_eq!(config.vote_window, Duration::from_millis(5));
        assert_eq!(config.propose_window, Duration::from_millis(20));
        assert_eq!(config.round_duration(), Duration::from_millis(25));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ben-or-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"propose_window": 3, "finality_poll_interval": 10}"#).unwrap();

        let config = ConsensusConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.propose_window, Duration::from_millis(3));
        assert_eq!(config.finality_poll_interval, Duration::from_millis(10));
        assert_eq!(config.inbox_capacity, 1024);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            ConsensusConfig::from_json(r#"{"vote_window": "soon"}"#),
            Err(ConsensusError::Config(_))
        ));
        assert!(matches!(
            ConsensusConfig::load(Path::new("/nonexistent/ben-or.json")),
            Err(ConsensusError::Config(_))
        ));
    }
}
