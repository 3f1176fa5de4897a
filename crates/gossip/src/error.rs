//! Error types for the gossip layer.

use thiserror::Error;

/// Result type alias for the gossip layer.
pub type Result<T> = std::result::Result<T, GossipError>;

/// Errors raised while encoding, decoding or merging gossiped knowledge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GossipError {
    /// A received property value could not be decoded.
    #[error("malformed payload for property '{key}': {reason}")]
    MalformedPayload { key: String, reason: String },

    /// The node named inside a payload is not the node that sent it.
    #[error("payload declares node {declared} but was sent by {sender}")]
    PublisherMismatch { declared: String, sender: String },

    /// A local value could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The property key is not handled by this knowledge kind.
    #[error("property key '{0}' is not handled here")]
    UnknownKey(String),

    /// A callback worker thread could not be started.
    #[error("failed to start callback worker: {0}")]
    WorkerSpawn(String),
}

impl GossipError {
    pub fn malformed(key: &str, reason: impl ToString) -> Self {
        GossipError::MalformedPayload {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Label used for the `reason` dimension of the drop counter.
    pub fn reason_label(&self) -> &'static str {
        match self {
            GossipError::MalformedPayload { .. } => "malformed",
            GossipError::PublisherMismatch { .. } => "publisher_mismatch",
            GossipError::Serialization(_) => "serialization",
            GossipError::UnknownKey(_) => "unknown_key",
            GossipError::WorkerSpawn(_) => "worker_spawn",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = GossipError::malformed("lsa", "expected value at line 1 column 1");
        assert_eq!(
            err.to_string(),
            "malformed payload for property 'lsa': expected value at line 1 column 1"
        );
        assert_eq!(err.reason_label(), "malformed");
    }
}
