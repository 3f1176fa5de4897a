//! Classification of remote call outcomes.
//!
//! Every way a call can end is turned into a [`ServiceCallResult`] here:
//!
//! - network-level failures reported by the transport
//! - internal failures on the calling side
//! - declared errors of the invoked method
//! - internal failures on the handling side
//!
//! Internal failures are logged locally under a fresh correlation marker and
//! only a generic sentence naming that marker crosses the network, so that
//! no exception detail leaks to remote callers.

use std::error::Error as StdError;
use std::sync::Arc;

use corelib::naming::NameRegistry;
use corelib::node::InstanceSessionId;
use serde_json::Value;

use crate::error_info::ErrorInfo;
use crate::marker::CorrelationMarkers;
use crate::request::ServiceCallRequest;
use crate::result::ServiceCallResult;
use crate::result_code::ResultCode;

/// An error that a remote method declares as part of its contract.
///
/// These are the only errors whose type and message are passed back to the
/// caller.
pub trait DeclaredException: StdError {
    /// Type name reported to the caller; defaults to the Rust type path.
    fn exception_type(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// What the transport hands back for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkResponse {
    pub result_code: ResultCode,
    /// The serialized result on success, the encoded [`ErrorInfo`] on failure.
    pub content: Option<String>,
}

impl NetworkResponse {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            result_code: ResultCode::Success,
            content: Some(content.into()),
        }
    }

    pub fn failure(result_code: ResultCode, error_info: Option<&ErrorInfo>) -> Self {
        Self {
            result_code,
            content: error_info.map(ErrorInfo::encode),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }
}

/// Builds [`ServiceCallResult`]s with consistent user-facing messages.
pub struct ServiceCallResultFactory {
    registry: Arc<NameRegistry>,
    markers: CorrelationMarkers,
}

impl ServiceCallResultFactory {
    pub fn new(registry: Arc<NameRegistry>) -> Self {
        Self::with_markers(registry, CorrelationMarkers::new())
    }

    pub fn with_markers(registry: Arc<NameRegistry>, markers: CorrelationMarkers) -> Self {
        Self { registry, markers }
    }

    pub fn registry(&self) -> &Arc<NameRegistry> {
        &self.registry
    }

    /// Classifies the complete caller-side outcome of `request`.
    ///
    /// `None` means no response arrived in time.
    pub fn from_network_response(
        &self,
        request: &ServiceCallRequest,
        response: Option<&NetworkResponse>,
    ) -> ServiceCallResult {
        let response = match response {
            None => {
                let timeout = NetworkResponse::failure(ResultCode::TimeoutWaitingForResponse, None);
                return self.network_error(request, &timeout);
            }
            Some(response) => response,
        };
        if !response.is_success() {
            return self.network_error(request, response);
        }
        let decoded = response
            .content
            .as_deref()
            .ok_or_else(|| "the response carries no result".to_string())
            .and_then(|content| {
                serde_json::from_str::<ServiceCallResult>(content).map_err(|e| e.to_string())
            });
        match decoded {
            Ok(result) => self.count(result),
            Err(reason) => self.internal_error_at_sender(
                request,
                &format!("Failed to decode the response to {}: {}", describe_call(request), reason),
                None,
            ),
        }
    }

    /// A failure reported by the network layer.
    ///
    /// The message starts with the result code's template; if the response
    /// carries error information, a clause naming the node that logged the
    /// technical details is appended.
    pub fn network_error(&self, request: &ServiceCallRequest, response: &NetworkResponse) -> ServiceCallResult {
        let message = match response.content.as_deref() {
            None => response.result_code.to_string(),
            Some(raw) => format!("{}: {}", response.result_code, self.describe_error_info(raw)),
        };
        tracing::debug!(
            service = request.service_name(),
            method = request.method_name(),
            target = %request.target(),
            code = response.result_code.code(),
            "service call failed at the network level"
        );
        self.count(ServiceCallResult::operation_failure(message))
    }

    /// Renders a raw error-info string as a human-readable clause.
    ///
    /// Undecodable input is logged and returned verbatim.
    pub fn describe_error_info(&self, raw: &str) -> String {
        match ErrorInfo::decode(raw) {
            Ok(info) => self.error_info_clause(&info),
            Err(e) => {
                tracing::error!(raw, error = %e, "received undecodable error information");
                raw.to_string()
            }
        }
    }

    fn error_info_clause(&self, info: &ErrorInfo) -> String {
        let node = if info.reporting_node.is_empty() {
            None
        } else {
            Some(match InstanceSessionId::parse(&info.reporting_node) {
                Ok(node) => self.registry.describe(&node),
                Err(e) => format!(
                    "[Failed to parse received node id '{}': {}]",
                    info.reporting_node, e
                ),
            })
        };
        match (node, info.error_id.is_empty()) {
            (Some(node), false) => format!(
                "The error was reported by {}; technical details were logged there as error '{}'",
                node, info.error_id
            ),
            (Some(node), true) => format!("The error was reported by {}", node),
            (None, false) => format!(
                "Technical details were logged on the target instance as error '{}'",
                info.error_id
            ),
            (None, true) => "No further information available".to_string(),
        }
    }

    /// An internal failure on the calling side.
    ///
    /// `message` and `cause` are only logged; the result names the marker.
    pub fn internal_error_at_sender(
        &self,
        request: &ServiceCallRequest,
        message: &str,
        cause: Option<&dyn StdError>,
    ) -> ServiceCallResult {
        let marker = self.markers.next_marker();
        tracing::error!(
            marker = %marker,
            service = request.service_name(),
            method = request.method_name(),
            target = %request.target(),
            cause = ?cause.map(ToString::to_string),
            "{}",
            message
        );
        self.count(ServiceCallResult::operation_failure(format!(
            "There was a local error while performing this operation; you can find more \
             information by looking for the marker '{}' in your instance's log files",
            marker
        )))
    }

    pub fn wrap_return_value(&self, value: Value) -> ServiceCallResult {
        self.count(ServiceCallResult::success(value))
    }

    pub fn wrap_method_exception(&self, exception: &dyn DeclaredException) -> ServiceCallResult {
        self.count(ServiceCallResult::method_exception(
            exception.exception_type(),
            exception.to_string(),
        ))
    }

    /// A request the handling side refuses to execute.
    pub fn invalid_request_at_handler(&self, request: &ServiceCallRequest, message: &str) -> ServiceCallResult {
        let marker = self.markers.next_marker();
        tracing::warn!(
            marker = %marker,
            service = request.service_name(),
            method = request.method_name(),
            caller = %request.caller(),
            "refusing service call request: {}",
            message
        );
        self.count(ServiceCallResult::operation_failure(format!(
            "Request refused by destination instance (remote error id: {})",
            marker
        )))
    }

    /// An unexpected failure while the handling side executed the request.
    pub fn internal_error_at_handler(
        &self,
        request: &ServiceCallRequest,
        message: &str,
        cause: Option<&dyn StdError>,
    ) -> ServiceCallResult {
        let marker = self.markers.next_marker();
        tracing::error!(
            marker = %marker,
            service = request.service_name(),
            method = request.method_name(),
            caller = %request.caller(),
            cause = ?cause.map(ToString::to_string),
            "{}",
            message
        );
        self.count(ServiceCallResult::operation_failure(format!(
            "There was an error performing this remote operation; if you have access to the log \
             files of {}, you can find more information by looking for the marker '{}' in its log files",
            self.registry.describe(request.target()),
            marker
        )))
    }

    fn count(&self, result: ServiceCallResult) -> ServiceCallResult {
        metrics::counter!("rpc_results_total", "outcome" => result.outcome_label()).increment(1);
        result
    }
}

fn describe_call(request: &ServiceCallRequest) -> String {
    format!("{}.{}", request.service_name(), request.method_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::node::InstanceId;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("quota of {0} exceeded")]
    struct QuotaExceeded(u32);

    impl DeclaredException for QuotaExceeded {}

    fn factory() -> ServiceCallResultFactory {
        ServiceCallResultFactory::with_markers(Arc::new(NameRegistry::new()), CorrelationMarkers::with_base(7))
    }

    fn request() -> ServiceCallRequest {
        let node = InstanceId::generate().derive_session().default_logical_node_session_id();
        ServiceCallRequest::builder()
            .target(node.clone())
            .caller(node)
            .service("Echo")
            .method("echo")
            .build()
            .unwrap()
    }

    #[test]
    fn test_timeout_message() {
        let result = factory().from_network_response(&request(), None);
        assert!(result.is_remote_operation_exception());
        let message = result.remote_operation_exception_message().unwrap();
        assert!(message.contains("Timeout while waiting for a response"));
        assert!(!message.contains("panicked"));
        assert!(!message.contains("E#"));
    }

    #[test]
    fn test_error_info_clauses() {
        let factory = factory();
        let registry = factory.registry().clone();
        let node = InstanceId::generate().derive_session();
        registry.register_session(&node);
        registry.associate_display_name(&node, "Relay");

        let both = ErrorInfo::new("E#0000000001", node.to_string());
        assert_eq!(
            factory.describe_error_info(&both.encode()),
            format!(
                "The error was reported by \"Relay\" [{}]; technical details were logged there as error 'E#0000000001'",
                node
            )
        );
        let node_only = ErrorInfo::new("", node.to_string());
        assert!(factory
            .describe_error_info(&node_only.encode())
            .starts_with("The error was reported by \"Relay\""));
        let id_only = ErrorInfo::new("E#5", "");
        assert_eq!(
            factory.describe_error_info(&id_only.encode()),
            "Technical details were logged on the target instance as error 'E#5'"
        );
        assert_eq!(factory.describe_error_info(","), "No further information available");
        assert_eq!(factory.describe_error_info("garbage"), "garbage");
    }

    #[test]
    fn test_unparsable_reporting_node() {
        let info = ErrorInfo::new("E#1", "not-a-node");
        let clause = factory().describe_error_info(&info.encode());
        assert!(clause.starts_with("The error was reported by [Failed to parse received node id 'not-a-node': "));
    }

    #[test]
    fn test_network_error_message() {
        let response = NetworkResponse::failure(
            ResultCode::NoRouteToDestinationAtSender,
            Some(&ErrorInfo::new("E#9", "")),
        );
        let result = factory().from_network_response(&request(), Some(&response));
        assert_eq!(
            result.remote_operation_exception_message(),
            Some(
                "No route to the destination node found at the sender (code 11): \
                 Technical details were logged on the target instance as error 'E#9'"
            )
        );
    }

    #[test]
    fn test_successful_response_is_decoded() {
        let factory = factory();
        let body = serde_json::to_string(&factory.wrap_return_value(json!("pong"))).unwrap();
        let result = factory.from_network_response(&request(), Some(&NetworkResponse::success(body)));
        assert_eq!(result.return_value(), Some(&json!("pong")));

        let broken = factory.from_network_response(&request(), Some(&NetworkResponse::success("{")));
        let message = broken.remote_operation_exception_message().unwrap();
        assert!(message.contains("marker 'E#0000000007'"));
        assert!(!message.contains("decode"));
    }

    #[test]
    fn test_method_exception_type() {
        let result = factory().wrap_method_exception(&QuotaExceeded(3));
        assert!(result.is_method_exception());
        assert_eq!(
            result.method_exception_type(),
            Some(QuotaExceeded(3).exception_type().as_str())
        );
        assert!(result.method_exception_type().unwrap().ends_with("QuotaExceeded"));
        assert_eq!(result.method_exception_message(), Some("quota of 3 exceeded"));
    }

    #[test]
    fn test_handler_side_messages_hide_details() {
        let factory = factory();
        let request = request();
        let refused = factory.invalid_request_at_handler(&request, "unknown service 'Echo'");
        assert_eq!(
            refused.remote_operation_exception_message(),
            Some("Request refused by destination instance (remote error id: E#0000000007)")
        );

        let cause = QuotaExceeded(1);
        let failed = factory.internal_error_at_handler(&request, "secret detail", Some(&cause));
        let message = failed.remote_operation_exception_message().unwrap();
        assert!(message.contains("E#0000000008"));
        assert!(message.contains(&request.target().to_string()));
        assert!(!message.contains("secret detail"));
        assert!(!message.contains("quota"));
    }
}
