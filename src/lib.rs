//! Runtime for declarative REST clients.
//!
//! An [`Operation`] describes one endpoint. A [`RequestExecutor`] bound to a
//! shared [`ClientContext`] builds the request, authorizes it, sends it
//! through the context's lazily created [`Transport`](http::Transport)
//! (optionally under a [`RetryPolicy`]) and turns the response into the
//! caller's type with a [`ResponseTransformer`](transform::ResponseTransformer).

pub mod auth;
pub mod cancel;
pub mod context;
pub mod error;
pub mod executor;
pub mod http;
pub mod retry;
pub mod serializer;
pub mod transform;

pub use auth::{AuthorizationProvider, AuthorizationSpec, StaticToken};
pub use cancel::CancellationToken;
pub use context::{ClientConfig, ClientContext, RetryConfig};
pub use error::{Cancelled, ContractError, PolicyError, TransportError, TransportErrorKind};
pub use executor::{Operation, RequestExecutor};
pub use http::{Method, ResponseEnvelope};
pub use retry::RetryPolicy;
