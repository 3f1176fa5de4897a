//! Error types for the RPC protocol.

use thiserror::Error;

/// Result type alias for the RPC protocol.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors raised while building requests or decoding protocol data.
///
/// These are caller-side programming or decoding errors; outcomes of remote
/// calls are always expressed as a [`crate::ServiceCallResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// A mandatory request field is missing or empty.
    #[error("invalid service call request: missing {field}")]
    InvalidRequest { field: &'static str },

    /// The request already carries a sequence number.
    #[error("sequence number already assigned ({0})")]
    SequenceNumberAlreadyAssigned(u64),

    /// The request is not bound to the stream that tried to sequence it.
    #[error("request belongs to reliable stream '{expected}', not '{actual}'")]
    StreamMismatch { expected: String, actual: String },

    /// An error-info string does not consist of exactly two fields.
    #[error("malformed error information: '{0}'")]
    MalformedErrorInfo(String),

    /// A payload could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_display() {
        assert_eq!(
            RpcError::InvalidRequest { field: "method name" }.to_string(),
            "invalid service call request: missing method name"
        );
        assert_eq!(
            RpcError::SequenceNumberAlreadyAssigned(7).to_string(),
            "sequence number already assigned (7)"
        );
        assert_eq!(
            RpcError::MalformedErrorInfo("a".to_string()).to_string(),
            "malformed error information: 'a'"
        );
    }

    #[test]
    fn test_rpc_error_is_error_trait() {
        let error: Box<dyn std::error::Error> = Box::new(RpcError::Serialization("eof".to_string()));
        assert!(error.to_string().contains("eof"));
    }
}
