//! Service call requests.

use std::sync::atomic::{AtomicU64, Ordering};

use corelib::node::LogicalNodeSessionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RpcError};

/// Ordering context for a series of calls between one caller and callee.
pub trait ReliableRpcStream: Send + Sync {
    fn stream_id(&self) -> &str;

    /// Allocates the next sequence number; numbering starts at 1.
    fn next_sequence_number(&self) -> u64;
}

/// A [`ReliableRpcStream`] that numbers calls with a local counter.
#[derive(Debug)]
pub struct LocalReliableStream {
    id: String,
    last: AtomicU64,
}

impl LocalReliableStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last: AtomicU64::new(0),
        }
    }
}

impl ReliableRpcStream for LocalReliableStream {
    fn stream_id(&self) -> &str {
        &self.id
    }

    fn next_sequence_number(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// One call of a remote service method.
///
/// Immutable once built, except for the sequence number which the reliable
/// stream assigns once before the request is sent. A sequence number of 0
/// means "not sequenced".
///
/// Deserialization applies the same checks as [`ServiceCallRequestBuilder`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireRequest")]
pub struct ServiceCallRequest {
    target: LogicalNodeSessionId,
    caller: LogicalNodeSessionId,
    service_name: String,
    method_name: String,
    parameters: Vec<Value>,
    reliable_stream_id: Option<String>,
    sequence_number: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    target: Option<LogicalNodeSessionId>,
    caller: Option<LogicalNodeSessionId>,
    service_name: Option<String>,
    method_name: Option<String>,
    #[serde(default)]
    parameters: Vec<Value>,
    reliable_stream_id: Option<String>,
    #[serde(default)]
    sequence_number: u64,
}

impl TryFrom<WireRequest> for ServiceCallRequest {
    type Error = RpcError;

    fn try_from(wire: WireRequest) -> Result<Self> {
        let mut request = ServiceCallRequestBuilder {
            target: wire.target,
            caller: wire.caller,
            service_name: wire.service_name,
            method_name: wire.method_name,
            parameters: wire.parameters,
            reliable_stream_id: wire.reliable_stream_id,
        }
        .build()?;
        request.sequence_number = wire.sequence_number;
        Ok(request)
    }
}

impl ServiceCallRequest {
    pub fn builder() -> ServiceCallRequestBuilder {
        ServiceCallRequestBuilder::default()
    }

    pub fn target(&self) -> &LogicalNodeSessionId {
        &self.target
    }

    pub fn caller(&self) -> &LogicalNodeSessionId {
        &self.caller
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn reliable_stream_id(&self) -> Option<&str> {
        self.reliable_stream_id.as_deref()
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Takes the next sequence number from `stream`.
    ///
    /// Fails if the request was built for another stream (or none), or if it
    /// has been sequenced already.
    pub fn assign_sequence_number(&mut self, stream: &dyn ReliableRpcStream) -> Result<u64> {
        let expected = self.reliable_stream_id.as_deref().unwrap_or("<none>");
        if expected != stream.stream_id() {
            return Err(RpcError::StreamMismatch {
                expected: expected.to_string(),
                actual: stream.stream_id().to_string(),
            });
        }
        if self.sequence_number != 0 {
            return Err(RpcError::SequenceNumberAlreadyAssigned(self.sequence_number));
        }
        self.sequence_number = stream.next_sequence_number();
        tracing::trace!(
            stream = stream.stream_id(),
            sequence = self.sequence_number,
            service = %self.service_name,
            method = %self.method_name,
            "request sequenced"
        );
        Ok(self.sequence_number)
    }
}

/// Builder for [`ServiceCallRequest`].
///
/// # Example
///
/// ```rust,ignore
/// let request = ServiceCallRequest::builder()
///     .target(target)
///     .caller(caller)
///     .service("WorkflowHostService")
///     .method("getWorkflowHosts")
///     .build()?;
/// ```
#[derive(Default, Debug)]
pub struct ServiceCallRequestBuilder {
    target: Option<LogicalNodeSessionId>,
    caller: Option<LogicalNodeSessionId>,
    service_name: Option<String>,
    method_name: Option<String>,
    parameters: Vec<Value>,
    reliable_stream_id: Option<String>,
}

impl ServiceCallRequestBuilder {
    pub fn target(mut self, target: LogicalNodeSessionId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn caller(mut self, caller: LogicalNodeSessionId) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn service(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    pub fn method(mut self, method_name: impl Into<String>) -> Self {
        self.method_name = Some(method_name.into());
        self
    }

    pub fn parameter(mut self, value: Value) -> Self {
        self.parameters.push(value);
        self
    }

    pub fn parameters(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.parameters.extend(values);
        self
    }

    /// Binds the request to `stream`; the sequence number is assigned later.
    pub fn reliable_stream(mut self, stream: &dyn ReliableRpcStream) -> Self {
        self.reliable_stream_id = Some(stream.stream_id().to_string());
        self
    }

    pub fn build(self) -> Result<ServiceCallRequest> {
        let target = self.target.ok_or(RpcError::InvalidRequest { field: "target" })?;
        let caller = self.caller.ok_or(RpcError::InvalidRequest { field: "caller" })?;
        let service_name = self
            .service_name
            .filter(|name| !name.is_empty())
            .ok_or(RpcError::InvalidRequest { field: "service name" })?;
        let method_name = self
            .method_name
            .filter(|name| !name.is_empty())
            .ok_or(RpcError::InvalidRequest { field: "method name" })?;
        Ok(ServiceCallRequest {
            target,
            caller,
            service_name,
            method_name,
            parameters: self.parameters,
            reliable_stream_id: self.reliable_stream_id,
            sequence_number: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::node::InstanceId;

    fn node() -> LogicalNodeSessionId {
        InstanceId::generate().derive_session().default_logical_node_session_id()
    }

    fn builder() -> ServiceCallRequestBuilder {
        ServiceCallRequest::builder()
            .target(node())
            .caller(node())
            .service("Echo")
            .method("echo")
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let err = ServiceCallRequest::builder()
            .caller(node())
            .service("Echo")
            .method("echo")
            .build()
            .unwrap_err();
        assert_eq!(err, RpcError::InvalidRequest { field: "target" });

        let err = ServiceCallRequest::builder()
            .target(node())
            .caller(node())
            .method("echo")
            .build()
            .unwrap_err();
        assert_eq!(err, RpcError::InvalidRequest { field: "service name" });

        let err = builder().method("").build().unwrap_err();
        assert_eq!(err, RpcError::InvalidRequest { field: "method name" });
    }

    #[test]
    fn test_sequence_number_is_assigned_once() {
        let stream = LocalReliableStream::new("s1");
        let mut request = builder().reliable_stream(&stream).build().unwrap();
        assert_eq!(request.sequence_number(), 0);

        assert_eq!(request.assign_sequence_number(&stream).unwrap(), 1);
        assert_eq!(
            request.assign_sequence_number(&stream),
            Err(RpcError::SequenceNumberAlreadyAssigned(1))
        );
        assert_eq!(request.sequence_number(), 1);
    }

    #[test]
    fn test_sequence_number_requires_matching_stream() {
        let stream = LocalReliableStream::new("s1");
        let other = LocalReliableStream::new("s2");
        let mut bound = builder().reliable_stream(&stream).build().unwrap();
        assert!(matches!(
            bound.assign_sequence_number(&other),
            Err(RpcError::StreamMismatch { .. })
        ));

        let mut unbound = builder().build().unwrap();
        assert!(unbound.assign_sequence_number(&stream).is_err());
        assert_eq!(unbound.sequence_number(), 0);
    }

    #[test]
    fn test_wire_form() {
        let request = builder().parameter(serde_json::json!({"x": 1})).build().unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["serviceName"], "Echo");
        assert_eq!(json["target"], request.target().to_string());
        let back: ServiceCallRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_wire_form_is_validated() {
        let request = builder().build().unwrap();
        let mut json = serde_json::to_value(&request).unwrap();
        json["methodName"] = serde_json::json!("");
        let err = serde_json::from_value::<ServiceCallRequest>(json.clone()).unwrap_err();
        assert!(err.to_string().contains("missing method name"));

        json["methodName"] = serde_json::json!("echo");
        json.as_object_mut().unwrap().remove("caller");
        let err = serde_json::from_value::<ServiceCallRequest>(json).unwrap_err();
        assert!(err.to_string().contains("missing caller"));
    }

    #[test]
    fn test_wire_form_keeps_sequence_number() {
        let stream = LocalReliableStream::new("s1");
        let mut request = builder().reliable_stream(&stream).build().unwrap();
        request.assign_sequence_number(&stream).unwrap();
        let json = serde_json::to_string(&request).unwrap();
        let back: ServiceCallRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence_number(), 1);
        assert_eq!(back.reliable_stream_id(), Some("s1"));
    }
}
