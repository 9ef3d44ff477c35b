//! Domain-level error taxonomy for PeerRank.
//!
//! Only conditions that must stop the validator live here. Per-entity
//! failures (a silent participant, a rejected rubric score) are recorded on
//! the entity and never surface as errors.

/// Configuration problems detected before the first epoch.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid rubric: {0}")]
    InvalidRubric(String),

    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("invalid evaluator endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// PeerRank domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PeerRankError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("ledger state error: {0}")]
    State(#[from] peerrank_state::StateError),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for PeerRank domain operations.
pub type Result<T> = std::result::Result<T, PeerRankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::OutOfRange {
            field: "reward.decay",
            value: "1.5".to_string(),
            expected: "0 < decay < 1",
        };
        let msg = err.to_string();
        assert!(msg.contains("reward.decay"));
        assert!(msg.contains("1.5"));
    }

    #[test]
    fn test_config_error_wraps_into_domain_error() {
        let err: PeerRankError =
            ConfigError::MissingCredential("OPENAI_API_KEY".to_string()).into();
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_state_error_wraps_into_domain_error() {
        let err: PeerRankError =
            peerrank_state::StateError::Serialization("bad json".to_string()).into();
        assert!(err.to_string().contains("ledger state error"));
    }
}
