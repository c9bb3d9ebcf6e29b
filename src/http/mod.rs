//! HTTP plumbing: request and response types, the transport abstraction and
//! status classification.

mod request;
mod response;
pub mod status;
mod transport;

pub use request::{Headers, Method, RequestDescriptor};
pub use response::ResponseEnvelope;
pub use transport::{ReqwestTransport, Transport};

#[cfg(test)]
pub use transport::MockTransport;
