//! Request and result types of the service call protocol.
//!
//! - [`ServiceCallRequest`]: one call, optionally sequenced by a reliable stream
//! - [`ServiceCallResult`]: success, declared method error or operation failure
//! - [`ServiceCallResultFactory`]: turns every possible outcome into a result
//!   with a consistent user-facing message
//! - [`ServiceDispatcher`]: runs incoming requests against local services
//!
//! Transport, routing and serialization of the network frames are not part
//! of this crate; the transport reports its outcome as a [`NetworkResponse`].

pub mod dispatch;
pub mod error;
pub mod error_info;
pub mod factory;
pub mod marker;
pub mod request;
pub mod result;
pub mod result_code;

pub use dispatch::{InvocationError, RemotableService, ServiceDispatcher};
pub use error::{Result, RpcError};
pub use error_info::ErrorInfo;
pub use factory::{DeclaredException, NetworkResponse, ServiceCallResultFactory};
pub use marker::CorrelationMarkers;
pub use request::{LocalReliableStream, ReliableRpcStream, ServiceCallRequest, ServiceCallRequestBuilder};
pub use result::{CallError, ServiceCallResult};
pub use result_code::ResultCode;
