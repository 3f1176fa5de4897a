//! Error types for the core library.

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The input is not the canonical string form of the requested id kind.
    #[error("'{input}' cannot be parsed to a valid {expected}: {reason}")]
    MalformedIdentity {
        input: String,
        expected: &'static str,
        reason: String,
    },

    /// Two ids that must belong to the same instance do not.
    #[error("the ids to combine refer to different instances: {left} / {right}")]
    InstanceMismatch { left: String, right: String },

    /// Configuration values failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}: {message}")]
    ConfigIo { path: String, message: String },
}

impl Error {
    pub(crate) fn malformed(input: &str, expected: &'static str, reason: impl Into<String>) -> Self {
        Error::MalformedIdentity {
            input: input.to_string(),
            expected,
            reason: reason.into(),
        }
    }

    /// True if this error was caused by unparsable identity input.
    pub fn is_malformed_identity(&self) -> bool {
        matches!(self, Error::MalformedIdentity { .. })
    }
}
