//! Network-level result codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of delivering a request and receiving its response.
///
/// Every code except [`ResultCode::Success`] describes a failure of the
/// network layer; the numeric code is what travels on the wire.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ResultCode {
    Success,
    NoRouteToDestinationAtSender,
    NoRouteToDestinationWhileForwarding,
    ChannelClosed,
    ChannelOrResponseListenerShutDownWhileWaitingForResponse,
    TimeoutWaitingForResponse,
    ExceptionDuringDelivery,
    ExceptionAtDestination,
    InvalidPayload,
}

impl ResultCode {
    pub const ALL: [ResultCode; 9] = [
        ResultCode::Success,
        ResultCode::NoRouteToDestinationAtSender,
        ResultCode::NoRouteToDestinationWhileForwarding,
        ResultCode::ChannelClosed,
        ResultCode::ChannelOrResponseListenerShutDownWhileWaitingForResponse,
        ResultCode::TimeoutWaitingForResponse,
        ResultCode::ExceptionDuringDelivery,
        ResultCode::ExceptionAtDestination,
        ResultCode::InvalidPayload,
    ];

    pub fn code(&self) -> u32 {
        match self {
            ResultCode::Success => 1,
            ResultCode::NoRouteToDestinationAtSender => 11,
            ResultCode::NoRouteToDestinationWhileForwarding => 12,
            ResultCode::ChannelClosed => 13,
            ResultCode::ChannelOrResponseListenerShutDownWhileWaitingForResponse => 14,
            ResultCode::TimeoutWaitingForResponse => 21,
            ResultCode::ExceptionDuringDelivery => 31,
            ResultCode::ExceptionAtDestination => 32,
            ResultCode::InvalidPayload => 41,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|candidate| candidate.code() == code)
    }

    /// Human-readable description; `None` for [`ResultCode::Success`].
    pub fn template(&self) -> Option<&'static str> {
        match self {
            ResultCode::Success => None,
            ResultCode::NoRouteToDestinationAtSender => {
                Some("No route to the destination node found at the sender")
            }
            ResultCode::NoRouteToDestinationWhileForwarding => {
                Some("No route to the destination node found while forwarding the request")
            }
            ResultCode::ChannelClosed => Some("The connection to the destination node was closed"),
            ResultCode::ChannelOrResponseListenerShutDownWhileWaitingForResponse => {
                Some("The connection was shut down while waiting for a response")
            }
            ResultCode::TimeoutWaitingForResponse => Some("Timeout while waiting for a response"),
            ResultCode::ExceptionDuringDelivery => Some("An error occurred while delivering the request"),
            ResultCode::ExceptionAtDestination => {
                Some("An error occurred at the destination node while handling the request")
            }
            ResultCode::InvalidPayload => Some("The request or response payload could not be decoded"),
        }
    }

    pub fn is_success(&self) -> bool {
        *self == ResultCode::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.template().unwrap_or("Success"), self.code())
    }
}

impl From<ResultCode> for u32 {
    fn from(code: ResultCode) -> u32 {
        code.code()
    }
}

impl TryFrom<u32> for ResultCode {
    type Error = String;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        ResultCode::from_code(code).ok_or_else(|| format!("unknown result code {}", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let mut codes: Vec<u32> = ResultCode::ALL.iter().map(|c| c.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ResultCode::ALL.len());
        for code in ResultCode::ALL {
            assert_eq!(ResultCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ResultCode::from_code(99), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ResultCode::TimeoutWaitingForResponse.to_string(),
            "Timeout while waiting for a response (code 21)"
        );
        assert_eq!(ResultCode::Success.to_string(), "Success (code 1)");
    }

    #[test]
    fn test_wire_form_is_numeric() {
        assert_eq!(serde_json::to_string(&ResultCode::ChannelClosed).unwrap(), "13");
        assert_eq!(
            serde_json::from_str::<ResultCode>("41").unwrap(),
            ResultCode::InvalidPayload
        );
        assert!(serde_json::from_str::<ResultCode>("2").is_err());
    }

    #[test]
    fn test_only_success_is_success() {
        let successes: Vec<_> = ResultCode::ALL.iter().filter(|c| c.is_success()).collect();
        assert_eq!(successes, vec![&ResultCode::Success]);
    }
}
