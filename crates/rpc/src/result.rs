//! Service call results.
//!
//! A [`ServiceCallResult`] holds exactly one of three outcomes:
//!
//! - **Success**: the method ran and returned a value
//! - **Method exception**: the method ran and failed with a declared error
//! - **Operation failure**: the call could not be performed; only a
//!   user-facing message (and possibly a log marker) crosses the boundary
//!
//! The outcome is a private enum, so no result can carry data of more than
//! one kind. Results are built by [`crate::ServiceCallResultFactory`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
enum Outcome {
    #[serde(rename_all = "camelCase")]
    Success {
        return_value: Value,
    },
    #[serde(rename_all = "camelCase")]
    MethodException {
        exception_type: String,
        exception_message: String,
    },
    OperationFailure {
        message: String,
    },
}

/// The outcome of one service call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCallResult {
    outcome: Outcome,
}

/// Failure side of [`ServiceCallResult::into_result`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The invoked method failed with a declared error.
    #[error("{exception_type}: {exception_message}")]
    MethodException {
        exception_type: String,
        exception_message: String,
    },

    /// The call could not be performed.
    #[error("{0}")]
    RemoteOperation(String),
}

impl ServiceCallResult {
    pub(crate) fn success(return_value: Value) -> Self {
        Self {
            outcome: Outcome::Success { return_value },
        }
    }

    pub(crate) fn method_exception(exception_type: String, exception_message: String) -> Self {
        Self {
            outcome: Outcome::MethodException {
                exception_type,
                exception_message,
            },
        }
    }

    pub(crate) fn operation_failure(message: String) -> Self {
        Self {
            outcome: Outcome::OperationFailure { message },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn is_method_exception(&self) -> bool {
        matches!(self.outcome, Outcome::MethodException { .. })
    }

    pub fn is_remote_operation_exception(&self) -> bool {
        matches!(self.outcome, Outcome::OperationFailure { .. })
    }

    pub fn return_value(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success { return_value } => Some(return_value),
            _ => None,
        }
    }

    pub fn method_exception_type(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::MethodException { exception_type, .. } => Some(exception_type),
            _ => None,
        }
    }

    pub fn method_exception_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::MethodException {
                exception_message, ..
            } => Some(exception_message),
            _ => None,
        }
    }

    pub fn remote_operation_exception_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::OperationFailure { message } => Some(message),
            _ => None,
        }
    }

    /// Short outcome label used in logs and metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self.outcome {
            Outcome::Success { .. } => "success",
            Outcome::MethodException { .. } => "method_exception",
            Outcome::OperationFailure { .. } => "operation_failure",
        }
    }

    pub fn into_result(self) -> Result<Value, CallError> {
        match self.outcome {
            Outcome::Success { return_value } => Ok(return_value),
            Outcome::MethodException {
                exception_type,
                exception_message,
            } => Err(CallError::MethodException {
                exception_type,
                exception_message,
            }),
            Outcome::OperationFailure { message } => Err(CallError::RemoteOperation(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exactly_one(result: &ServiceCallResult) -> bool {
        [
            result.is_success(),
            result.is_method_exception(),
            result.is_remote_operation_exception(),
        ]
        .iter()
        .filter(|flag| **flag)
        .count()
            == 1
    }

    #[test]
    fn test_accessors_match_outcome() {
        let success = ServiceCallResult::success(json!(42));
        assert!(exactly_one(&success));
        assert_eq!(success.return_value(), Some(&json!(42)));
        assert_eq!(success.method_exception_type(), None);

        let declared = ServiceCallResult::method_exception("QuotaExceeded".into(), "too many".into());
        assert!(exactly_one(&declared));
        assert_eq!(declared.method_exception_message(), Some("too many"));
        assert_eq!(declared.return_value(), None);

        let failure = ServiceCallResult::operation_failure("unreachable".into());
        assert!(exactly_one(&failure));
        assert_eq!(failure.remote_operation_exception_message(), Some("unreachable"));
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ServiceCallResult::success(Value::Null).into_result(), Ok(Value::Null));
        let err = ServiceCallResult::method_exception("E".into(), "m".into())
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "E: m");
        let err = ServiceCallResult::operation_failure("gone".into())
            .into_result()
            .unwrap_err();
        assert_eq!(err, CallError::RemoteOperation("gone".into()));
    }

    #[test]
    fn test_wire_form() {
        let result = ServiceCallResult::method_exception("E".into(), "m".into());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            json!({"outcome": "methodException", "exceptionType": "E", "exceptionMessage": "m"})
        );
        assert_eq!(serde_json::from_value::<ServiceCallResult>(json).unwrap(), result);
        assert!(serde_json::from_str::<ServiceCallResult>(r#"{"outcome": "both"}"#).is_err());
    }
}
