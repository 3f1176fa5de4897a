//! Callee-side dispatch of service call requests.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use corelib::node::{InstanceSessionId, NodeIdentifier};
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use crate::factory::{DeclaredException, ServiceCallResultFactory};
use crate::request::ServiceCallRequest;
use crate::result::ServiceCallResult;

/// Failure of a service method invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The method failed with one of its declared errors.
    #[error("{0}")]
    Declared(Box<dyn DeclaredException + Send + Sync>),

    /// Anything the method did not declare.
    #[error("{0}")]
    Internal(String),
}

impl InvocationError {
    pub fn declared(exception: impl DeclaredException + Send + Sync + 'static) -> Self {
        InvocationError::Declared(Box::new(exception))
    }
}

/// A service whose methods can be called from other nodes.
pub trait RemotableService: Send + Sync {
    fn service_name(&self) -> &str;

    /// Names of the methods that remote callers may invoke.
    fn remotable_methods(&self) -> BTreeSet<String>;

    fn invoke(&self, method: &str, parameters: &[Value]) -> Result<Value, InvocationError>;
}

/// Executes incoming requests against the locally registered services.
///
/// Whatever happens during dispatch, the caller receives a
/// [`ServiceCallResult`]; no error or panic escapes.
pub struct ServiceDispatcher {
    local_node: InstanceSessionId,
    services: DashMap<String, Arc<dyn RemotableService>>,
    factory: Arc<ServiceCallResultFactory>,
}

impl ServiceDispatcher {
    pub fn new(local_node: InstanceSessionId, factory: Arc<ServiceCallResultFactory>) -> Self {
        Self {
            local_node,
            services: DashMap::new(),
            factory,
        }
    }

    pub fn local_node(&self) -> &InstanceSessionId {
        &self.local_node
    }

    /// Registers `service`, replacing any service of the same name.
    pub fn register(&self, service: Arc<dyn RemotableService>) {
        let name = service.service_name().to_string();
        tracing::debug!(service = %name, methods = service.remotable_methods().len(), "service registered");
        self.services.insert(name, service);
    }

    pub fn unregister(&self, service_name: &str) -> bool {
        self.services.remove(service_name).is_some()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn dispatch(&self, request: &ServiceCallRequest) -> ServiceCallResult {
        if !request.target().is_same_instance_as(&self.local_node) {
            return self.factory.internal_error_at_handler(
                request,
                &format!(
                    "Received a request for {} at {}",
                    request.target(),
                    self.local_node
                ),
                None,
            );
        }

        // Release the map shard before running the method.
        let service = match self.services.get(request.service_name()) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                return self.factory.invalid_request_at_handler(
                    request,
                    &format!("unknown service '{}'", request.service_name()),
                )
            }
        };
        if !service.remotable_methods().contains(request.method_name()) {
            return self.factory.invalid_request_at_handler(
                request,
                &format!(
                    "method '{}' of service '{}' is not remotely callable",
                    request.method_name(),
                    request.service_name()
                ),
            );
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            service.invoke(request.method_name(), request.parameters())
        }));
        match outcome {
            Ok(Ok(value)) => self.factory.wrap_return_value(value),
            Ok(Err(InvocationError::Declared(exception))) => {
                tracing::debug!(
                    service = request.service_name(),
                    method = request.method_name(),
                    error = %exception,
                    "service method failed with a declared error"
                );
                self.factory.wrap_method_exception(exception.as_ref())
            }
            Ok(Err(InvocationError::Internal(message))) => self.factory.internal_error_at_handler(
                request,
                &format!("Error while executing {}.{}: {}", request.service_name(), request.method_name(), message),
                None,
            ),
            Err(payload) => self.factory.internal_error_at_handler(
                request,
                &format!(
                    "Panic while executing {}.{}: {}",
                    request.service_name(),
                    request.method_name(),
                    panic_message(payload.as_ref())
                ),
                None,
            ),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "<non-string panic payload>");
    }
}
